use cranelift_codegen::ir::{
    condcodes::{FloatCC, IntCC},
    types, InstBuilder, Value,
};
use cranelift_module::Module;

use crate::ast::{decode_string, ArithOp, CompareOp, LogicalOp, Node, Number};
use crate::frontend::category::{Category, TypedValue};
use crate::frontend::context::FunctionContext;
use crate::frontend::error::{unsupported, CodegenError};
use crate::frontend::intrinsics::Hook;

impl<M: Module> FunctionContext<'_, '_, M> {
    /// Lowers an expression to a category-tagged value
    pub fn expr(&mut self, node: &Node) -> Result<TypedValue, CodegenError> {
        match node {
            Node::Number(Number::Int(n)) => {
                let value = self.iconst(types::I32, i64::from(*n));
                Ok(TypedValue::new(value, Category::Int))
            }
            Node::Number(Number::Float(f)) => {
                let value = self.builder.ins().f64const(*f);
                Ok(TypedValue::new(value, Category::Double))
            }
            Node::String(raw) => self.string_constant(&decode_string(raw)),
            Node::Character(c) => {
                let Ok(byte) = u8::try_from(*c) else {
                    return Err(unsupported(format!("character `{}` does not fit in a char", c)));
                };
                let value = self.iconst(types::I8, i64::from(byte));
                Ok(TypedValue::new(value, Category::Char))
            }
            Node::Bool(b) => {
                let value = self.iconst(types::I8, i64::from(*b));
                Ok(TypedValue::new(value, Category::Bool))
            }
            Node::Null => {
                let ptr = self.ptr();
                let value = self.iconst(ptr, 0);
                Ok(TypedValue::new(value, Category::Pointer(Box::new(Category::Void))))
            }
            Node::Identifier(name) => {
                let handle = self.session.symbol_table.lookup(name)?;
                if let Some(literal) = &handle.literal {
                    return self.string_constant(literal);
                }
                let place = self.place(node)?;
                self.load_place(&place)
            }
            Node::BinaryOp { op, left, right } => self.arith(*op, left, right),
            Node::CompareOp { op, left, right } => self.compare(*op, left, right),
            Node::LogicalOp { op, left, right } => self.logical(*op, left, right.as_deref()),
            Node::Access { left, right } => self.access(left, right),
            Node::GetArray { .. } | Node::Pointer(_) => {
                let place = self.place(node)?;
                self.load_place(&place)
            }
            Node::Reference(inner) => {
                let place = self.place(inner)?;
                let addr = self.place_address(&place);
                Ok(TypedValue::new(addr, Category::Pointer(Box::new(place.category))))
            }
            Node::FunctionCall { name, args } => match self.call(name, args)? {
                Some(value) => Ok(value),
                None => Err(unsupported(format!("`{}` returns no value", name))),
            },
            other => Err(unsupported(format!(
                "`{}` is not an expression",
                other.describe()
            ))),
        }
    }

    fn string_constant(&mut self, bytes: &[u8]) -> Result<TypedValue, CodegenError> {
        let id = self.session.string_literal(bytes)?;
        let addr = self.data_address(id);
        Ok(TypedValue::new(addr, Category::Str))
    }

    /// Arithmetic dispatches on the left operand's category. An `i32` left
    /// operand meeting a double is promoted so that `0 - x` works on doubles.
    fn arith(&mut self, op: ArithOp, left: &Node, right: &Node) -> Result<TypedValue, CodegenError> {
        let lhs = self.expr(left)?;
        let rhs = self.expr(right)?;
        let category = match (&lhs.category, &rhs.category) {
            (Category::Int, Category::Double) => Category::Double,
            (Category::Int | Category::Bool | Category::Enum(_), _) => Category::Int,
            (Category::Double, _) => Category::Double,
            (Category::Char, _) => Category::Char,
            (other, _) => {
                return Err(unsupported(format!("operator {} on {}", op, other)));
            }
        };
        let l = self.coerce(lhs, &category)?;
        let r = self.coerce(rhs, &category)?;
        let ins = self.builder.ins();
        let value = if category == Category::Double {
            match op {
                ArithOp::Add => ins.fadd(l, r),
                ArithOp::Sub => ins.fsub(l, r),
                ArithOp::Mul => ins.fmul(l, r),
                ArithOp::Div => ins.fdiv(l, r),
            }
        } else {
            match op {
                ArithOp::Add => ins.iadd(l, r),
                ArithOp::Sub => ins.isub(l, r),
                ArithOp::Mul => ins.imul(l, r),
                // there are no unsigned types
                ArithOp::Div => ins.sdiv(l, r),
            }
        };
        Ok(TypedValue::new(value, category))
    }

    fn compare(&mut self, op: CompareOp, left: &Node, right: &Node) -> Result<TypedValue, CodegenError> {
        let lhs = self.expr(left)?;
        let rhs = self.expr(right)?;
        let value = if lhs.category == Category::Double || rhs.category == Category::Double {
            let l = self.coerce(lhs, &Category::Double)?;
            let r = self.coerce(rhs, &Category::Double)?;
            // equality holds on unordered operands, the others need ordered ones
            let cc = match op {
                CompareOp::Eq => FloatCC::UnorderedOrEqual,
                CompareOp::Neq => FloatCC::OrderedNotEqual,
                CompareOp::Lt => FloatCC::LessThan,
                CompareOp::Leq => FloatCC::LessThanOrEqual,
                CompareOp::Gt => FloatCC::GreaterThan,
                CompareOp::Geq => FloatCC::GreaterThanOrEqual,
            };
            self.builder.ins().fcmp(cc, l, r)
        } else {
            let (l, r) = self.integer_operands(op, lhs, rhs)?;
            let cc = match op {
                CompareOp::Eq => IntCC::Equal,
                CompareOp::Neq => IntCC::NotEqual,
                CompareOp::Lt => IntCC::SignedLessThan,
                CompareOp::Leq => IntCC::SignedLessThanOrEqual,
                CompareOp::Gt => IntCC::SignedGreaterThan,
                CompareOp::Geq => IntCC::SignedGreaterThanOrEqual,
            };
            self.builder.ins().icmp(cc, l, r)
        };
        Ok(TypedValue::new(value, Category::Bool))
    }

    /// Brings both operands of an integer comparison to one width. Addresses
    /// compare only for (in)equality.
    fn integer_operands(
        &mut self,
        op: CompareOp,
        lhs: TypedValue,
        rhs: TypedValue,
    ) -> Result<(Value, Value), CodegenError> {
        if lhs.category.is_address() || rhs.category.is_address() {
            let both = lhs.category.is_address() && rhs.category.is_address();
            if !both || !matches!(op, CompareOp::Eq | CompareOp::Neq) {
                return Err(unsupported(format!(
                    "comparison {} between {} and {}",
                    op, lhs.category, rhs.category
                )));
            }
            return Ok((lhs.value, rhs.value));
        }
        if !lhs.category.is_integral() || !rhs.category.is_integral() {
            return Err(unsupported(format!(
                "comparison {} between {} and {}",
                op, lhs.category, rhs.category
            )));
        }
        let narrow = matches!(
            (&lhs.category, &rhs.category),
            (Category::Char, Category::Char) | (Category::Bool, Category::Bool)
        );
        if narrow {
            return Ok((lhs.value, rhs.value));
        }
        let l = self.coerce(lhs, &Category::Int)?;
        let r = self.coerce(rhs, &Category::Int)?;
        Ok((l, r))
    }

    /// Both operands are evaluated and normalized to booleans, `not`
    /// has no right operand
    fn logical(&mut self, op: LogicalOp, left: &Node, right: Option<&Node>) -> Result<TypedValue, CodegenError> {
        let lhs = self.expr(left)?;
        let l = self.to_bool(lhs)?;
        let value = match (op, right) {
            (LogicalOp::Not, _) => self.builder.ins().icmp_imm(IntCC::Equal, l, 0),
            (LogicalOp::And | LogicalOp::Or, Some(right)) => {
                let rhs = self.expr(right)?;
                let r = self.to_bool(rhs)?;
                if op == LogicalOp::And {
                    self.builder.ins().band(l, r)
                } else {
                    self.builder.ins().bor(l, r)
                }
            }
            (_, None) => return Err(unsupported(format!("`{}` needs two operands", op))),
        };
        Ok(TypedValue::new(value, Category::Bool))
    }

    pub fn to_bool(&mut self, value: TypedValue) -> Result<Value, CodegenError> {
        self.coerce(value, &Category::Bool)
    }

    /// Branch condition that never fails: an erroneous condition is
    /// reported and replaced by `false`
    pub fn condition(&mut self, node: &Node) -> Value {
        let result = match self.expr(node) {
            Ok(value) => self.to_bool(value),
            Err(e) => Err(e),
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                self.session.diagnostics.report(e);
                self.iconst(types::I8, 0)
            }
        }
    }

    /// `write e` prints one value followed by a newline, `write (a, b)`
    /// prints each item in order
    pub fn write(&mut self, node: &Node) -> Result<(), CodegenError> {
        if let Node::Group(items) = node {
            for item in items {
                self.write(item)?;
            }
            return Ok(());
        }
        let value = self.expr(node)?;
        let (hook, arg) = match &value.category {
            Category::Int | Category::Enum(_) => (Hook::WriteI32, value.value),
            Category::Double => (Hook::WriteF64, value.value),
            Category::Char => (Hook::WriteChar, self.builder.ins().sextend(types::I32, value.value)),
            Category::Bool => (Hook::WriteBool, self.builder.ins().uextend(types::I32, value.value)),
            Category::Str => (Hook::WriteStr, value.value),
            Category::Pointer(inner) if **inner == Category::Char => (Hook::WriteStr, value.value),
            other => return Err(unsupported(format!("cannot write a value of type {}", other))),
        };
        self.call_hook(hook, &[arg])?;
        Ok(())
    }
}
