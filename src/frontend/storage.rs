use std::rc::Rc;

use cranelift_codegen::ir::{
    condcodes::{FloatCC, IntCC},
    types, Endianness, InstBuilder, MemFlags, StackSlot, StackSlotData, StackSlotKind, Value,
};
use cranelift_module::{DataId, Module};
use log::debug;

use crate::ast::{ArraySize, Assign, DeclaredType, Node, Number, TypeName, decode_string};
use crate::frontend::category::{Category, TypedValue};
use crate::frontend::context::FunctionContext;
use crate::frontend::error::{unsupported, CodegenError};
use crate::frontend::intrinsics::Hook;

/// Static storage or a slot in the frame of a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Global(DataId),
    Local { slot: StackSlot, frame: usize },
}

/// A storage location paired with its declared category
#[derive(Debug, Clone)]
pub struct StorageHandle {
    pub location: Location,
    pub category: Category,
    pub is_const: bool,
    // Literal contents of a `const str`, written without touching the cell
    pub literal: Option<Vec<u8>>,
}

impl StorageHandle {
    pub fn new(location: Location, category: Category) -> Self {
        StorageHandle {
            location,
            category,
            is_const: false,
            literal: None,
        }
    }
}

/// An addressable piece of memory: `addr + offset` holds a `category`
#[derive(Debug, Clone)]
pub struct Place {
    pub addr: Value,
    pub offset: i32,
    pub category: Category,
    pub is_const: bool,
}

/// `offset + delta` as a memory offset
pub(crate) fn displace(offset: i32, delta: i64) -> Result<i32, CodegenError> {
    i64::from(offset)
        .checked_add(delta)
        .and_then(|at| i32::try_from(at).ok())
        .ok_or_else(|| unsupported("object too large"))
}

/// Name bound by a declaration target, `x` or `*x`
pub(crate) fn declared_name(target: &Node) -> Result<(&str, bool), CodegenError> {
    match target {
        Node::Identifier(name) => Ok((name, false)),
        Node::Pointer(inner) => match inner.as_ref() {
            Node::Identifier(name) => Ok((name, true)),
            other => Err(unsupported(format!("cannot declare `{}`", other.describe()))),
        },
        other => Err(unsupported(format!("cannot declare `{}`", other.describe()))),
    }
}

impl<M: Module> FunctionContext<'_, '_, M> {
    pub fn resolve_type_name(&self, type_name: &TypeName) -> Result<Category, CodegenError> {
        match type_name {
            TypeName::I32 => Ok(Category::Int),
            TypeName::IDouble => Ok(Category::Double),
            TypeName::Char => Ok(Category::Char),
            TypeName::Bool => Ok(Category::Bool),
            TypeName::Str => Ok(Category::Str),
            TypeName::Void => Ok(Category::Void),
            TypeName::User(name) => Ok(self.session.type_registry.lookup_type(name)?.category()),
        }
    }

    /// Category of a declaration. `init` is consulted for arrays declared
    /// with empty brackets.
    pub fn declared_category(
        &self,
        declared: &DeclaredType,
        is_pointer: bool,
        init: Option<&Node>,
    ) -> Result<Category, CodegenError> {
        let category = match declared {
            DeclaredType::Named(type_name) => self.resolve_type_name(type_name)?,
            DeclaredType::Array { element, size } => {
                let element = self.resolve_type_name(element)?;
                if !element.is_scalar() && !matches!(element, Category::Struct(_)) {
                    return Err(unsupported(format!("arrays of {}", element)));
                }
                let len = match size {
                    ArraySize::Fixed(len) => match len.as_ref() {
                        Node::Number(Number::Int(n)) if *n > 0 => *n as u32,
                        other => {
                            return Err(unsupported(format!(
                                "array size `{}` is not a positive integer literal",
                                other.describe()
                            )))
                        }
                    },
                    ArraySize::Empty => match init {
                        Some(Node::Group(items)) if !items.is_empty() => items.len() as u32,
                        Some(Node::String(raw)) if element == Category::Char => {
                            decode_string(raw).len() as u32 + 1
                        }
                        _ => {
                            return Err(unsupported(
                                "array without a size needs an initializer list",
                            ))
                        }
                    },
                };
                let Some(array) = Category::array(element, len, self.session.pointer_bytes()) else {
                    return Err(unsupported("array too large"));
                };
                array
            }
        };
        if category == Category::Void {
            return Err(unsupported("variables cannot have type void"));
        }
        if is_pointer {
            if !category.is_scalar() {
                return Err(unsupported(format!("pointers to {}", category)));
            }
            return Ok(Category::Pointer(Box::new(category)));
        }
        Ok(category)
    }

    /// Lowers a declaration: allocates storage in the current scope, binds
    /// the name and stores the initializer
    pub fn declare(&mut self, assign: &Assign) -> Result<(), CodegenError> {
        let Some(declared) = &assign.declared else {
            return self.assign(assign);
        };
        let (name, is_pointer) = declared_name(&assign.target)?;
        let init = assign.value.as_deref();
        self.session.symbol_table.check_free(name)?;
        let category = self.declared_category(declared, is_pointer, init)?;
        if assign.is_const && init.is_none() {
            return Err(unsupported(format!("constant `{}` needs an initializer", name)));
        }
        debug!(
            "declaring {} `{}` at scope level {}",
            category,
            name,
            self.session.symbol_table.level()
        );

        let global = self.session.symbol_table.is_global_scope();
        let static_init = if global {
            init.and_then(|node| self.literal_bytes(&category, node))
        } else {
            None
        };
        let location = if global {
            let has_static_init = static_init.is_some();
            let id = self.session.global_data(name, &category, static_init)?;
            if has_static_init {
                let handle = self.handle(Location::Global(id), category, assign, init);
                return self.session.symbol_table.define(name, handle);
            }
            Location::Global(id)
        } else {
            self.stack_slot(&category)
        };

        // The initializer is evaluated before the name is bound, so it
        // still sees an outer binding of the same name.
        if let Some(node) = init {
            let addr = self.location_address(&location, name)?;
            if matches!(location, Location::Local { .. }) {
                self.clear_for_list(&category, addr, 0, node);
            }
            self.store_init(&category, addr, 0, node)?;
        }
        let handle = self.handle(location, category, assign, init);
        self.session.symbol_table.define(name, handle)
    }

    fn handle(
        &self,
        location: Location,
        category: Category,
        assign: &Assign,
        init: Option<&Node>,
    ) -> StorageHandle {
        let literal = match (assign.is_const, &category, init) {
            (true, Category::Str, Some(Node::String(raw))) => Some(decode_string(raw)),
            _ => None,
        };
        StorageHandle {
            location,
            category,
            is_const: assign.is_const,
            literal,
        }
    }

    fn stack_slot(&mut self, category: &Category) -> Location {
        let ptr_bytes = self.session.pointer_bytes();
        let size = category.size(ptr_bytes).max(1);
        let align_shift = category.align(ptr_bytes).trailing_zeros() as u8;
        let slot = self.builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            size,
            align_shift,
        ));
        Location::Local {
            slot,
            frame: self.frame(),
        }
    }

    /// Binds a function parameter to a fresh stack cell holding `value`
    pub fn bind_parameter(&mut self, name: &str, category: &Category, value: Value) -> Result<(), CodegenError> {
        self.session.symbol_table.check_free(name)?;
        let location = self.stack_slot(category);
        let addr = self.location_address(&location, name)?;
        self.builder.ins().store(MemFlags::trusted(), value, addr, 0);
        self.session
            .symbol_table
            .define(name, StorageHandle::new(location, category.clone()))
    }

    /// Encoded initializer of static storage, if `node` is a literal of a
    /// scalar category
    fn literal_bytes(&self, category: &Category, node: &Node) -> Option<Vec<u8>> {
        let (bits, width) = match (category, node) {
            (Category::Int | Category::Enum(_), Node::Number(Number::Int(n))) => (*n as u32 as u64, 4),
            (Category::Enum(desc), Node::Identifier(member))
                if !self.session.symbol_table.contains(member) =>
            {
                (desc.ordinal(member)? as u32 as u64, 4)
            }
            (Category::Double, Node::Number(Number::Float(f))) => (f.to_bits(), 8),
            (Category::Double, Node::Number(Number::Int(n))) => (f64::from(*n).to_bits(), 8),
            (Category::Char, Node::Character(c)) => (u64::from(u8::try_from(*c).ok()?), 1),
            (Category::Bool, Node::Bool(b)) => (u64::from(*b), 1),
            _ => return None,
        };
        let bytes = match self.session.module.isa().endianness() {
            Endianness::Little => bits.to_le_bytes()[..width].to_vec(),
            Endianness::Big => bits.to_be_bytes()[8 - width..].to_vec(),
        };
        Some(bytes)
    }

    fn location_address(&mut self, location: &Location, name: &str) -> Result<Value, CodegenError> {
        match *location {
            Location::Global(id) => Ok(self.data_address(id)),
            Location::Local { slot, frame } if frame == self.frame() => {
                let ptr = self.ptr();
                Ok(self.builder.ins().stack_addr(ptr, slot, 0))
            }
            Location::Local { .. } => Err(unsupported(format!(
                "`{}` is a local of an enclosing function",
                name
            ))),
        }
    }

    /// Resolves an lvalue expression to the memory it denotes
    pub fn place(&mut self, node: &Node) -> Result<Place, CodegenError> {
        match node {
            Node::Identifier(name) => {
                let handle = self.session.symbol_table.lookup(name)?;
                let addr = self.location_address(&handle.location, name)?;
                Ok(Place {
                    addr,
                    offset: 0,
                    category: handle.category,
                    is_const: handle.is_const,
                })
            }
            Node::Access { left, right } => self.field_place(left, right),
            Node::GetArray { base, index } => self.element_place(base, index),
            Node::Pointer(inner) => {
                // the pointer itself is the first load, the pointee the second
                let pointer = self.expr(inner)?;
                match pointer.category {
                    Category::Pointer(pointee) if *pointee != Category::Void => Ok(Place {
                        addr: pointer.value,
                        offset: 0,
                        category: *pointee,
                        is_const: false,
                    }),
                    other => Err(unsupported(format!("cannot dereference {}", other))),
                }
            }
            other => Err(unsupported(format!(
                "`{}` does not denote storage",
                other.describe()
            ))),
        }
    }

    fn element_place(&mut self, base: &Node, index: &Node) -> Result<Place, CodegenError> {
        let place = self.place(base)?;
        let (addr, offset, element, len, is_const) = match place.category {
            Category::Array(element, len) => (place.addr, place.offset, *element, Some(len), place.is_const),
            Category::Str => {
                let ptr = self.ptr();
                let addr = self.load_raw(ptr, place.addr, place.offset);
                (addr, 0, Category::Char, None, true)
            }
            Category::Pointer(element) if element.is_scalar() => {
                let ptr = self.ptr();
                let addr = self.load_raw(ptr, place.addr, place.offset);
                (addr, 0, *element, None, false)
            }
            other => return Err(unsupported(format!("cannot index {}", other))),
        };
        let stride = element.size(self.session.pointer_bytes());

        if let Node::Number(Number::Int(i)) = index {
            if *i < 0 || len.is_some_and(|len| *i as u32 >= len) {
                return Err(unsupported(format!(
                    "index {} is out of bounds for `{}`",
                    i,
                    base.describe()
                )));
            }
            // an offset past the 32 bit range is computed at run time
            if let Ok(at) = displace(offset, i64::from(*i) * i64::from(stride)) {
                return Ok(Place {
                    addr,
                    offset: at,
                    category: element,
                    is_const,
                });
            }
        }

        let index = self.expr(index)?;
        let index = self.coerce(index, &Category::Int)?;
        let ptr = self.ptr();
        let index = if ptr.bits() > 32 {
            self.builder.ins().sextend(ptr, index)
        } else {
            index
        };
        let scaled = self.builder.ins().imul_imm(index, i64::from(stride));
        let addr = self.builder.ins().iadd(addr, scaled);
        Ok(Place {
            addr,
            offset,
            category: element,
            is_const,
        })
    }

    fn load_raw(&mut self, ty: types::Type, addr: Value, offset: i32) -> Value {
        self.builder.ins().load(ty, MemFlags::trusted(), addr, offset)
    }

    /// Reads the value held at `place`. Char arrays decay to their address.
    pub fn load_place(&mut self, place: &Place) -> Result<TypedValue, CodegenError> {
        match &place.category {
            Category::Array(element, _) if **element == Category::Char => {
                let addr = self.place_address(place);
                Ok(TypedValue::new(addr, Category::Str))
            }
            category => {
                let ptr = self.ptr();
                let Some(ty) = category.ir_type(ptr) else {
                    return Err(unsupported(format!("{} cannot be used as a value", category)));
                };
                let value = self.load_raw(ty, place.addr, place.offset);
                Ok(TypedValue::new(value, category.clone()))
            }
        }
    }

    pub fn place_address(&mut self, place: &Place) -> Value {
        self.offset_address(place.addr, place.offset)
    }

    fn offset_address(&mut self, addr: Value, offset: i32) -> Value {
        if offset == 0 {
            addr
        } else {
            self.builder.ins().iadd_imm(addr, i64::from(offset))
        }
    }

    /// Stores the value of `node` into memory of `category` at `addr + offset`.
    /// Brace lists fill arrays and structs element by element, string
    /// literals fill char arrays.
    pub fn store_init(
        &mut self,
        category: &Category,
        addr: Value,
        offset: i32,
        node: &Node,
    ) -> Result<(), CodegenError> {
        let ptr_bytes = self.session.pointer_bytes();
        match (category, node) {
            (Category::Array(element, len), Node::Group(items)) => {
                if items.len() > *len as usize {
                    return Err(unsupported(format!(
                        "{} initializers for an array of {}",
                        items.len(),
                        len
                    )));
                }
                let stride = i64::from(element.size(ptr_bytes));
                for (i, item) in items.iter().enumerate() {
                    let at = displace(offset, i as i64 * stride)?;
                    self.store_init(element, addr, at, item)?;
                }
                Ok(())
            }
            (Category::Array(element, len), Node::String(raw)) if **element == Category::Char => {
                let mut bytes = decode_string(raw);
                bytes.push(0);
                if bytes.len() > *len as usize {
                    return Err(unsupported(format!(
                        "string of {} bytes does not fit in char[{}]",
                        bytes.len(),
                        len
                    )));
                }
                for (i, byte) in bytes.into_iter().enumerate() {
                    let at = displace(offset, i as i64)?;
                    let value = self.iconst(types::I8, i64::from(byte));
                    self.builder
                        .ins()
                        .store(MemFlags::trusted(), value, addr, at);
                }
                Ok(())
            }
            (Category::Struct(desc), Node::Group(items)) => {
                if items.len() > desc.fields.len() {
                    return Err(unsupported(format!(
                        "{} initializers for struct {} with {} fields",
                        items.len(),
                        desc.name,
                        desc.fields.len()
                    )));
                }
                let desc = Rc::clone(desc);
                for (field, item) in desc.fields.iter().zip(items) {
                    let at = displace(offset, i64::from(field.offset))?;
                    self.store_init(&field.category, addr, at, item)?;
                }
                Ok(())
            }
            (_, Node::Group(_)) => Err(unsupported(format!(
                "brace initializer for {}",
                category
            ))),
            (Category::Array(..) | Category::Struct(_), source) => {
                let source = self.place(source)?;
                if source.category != *category {
                    return Err(unsupported(format!(
                        "cannot assign {} to {}",
                        source.category, category
                    )));
                }
                let src = self.place_address(&source);
                let dst = self.offset_address(addr, offset);
                self.copy(category, src, dst);
                Ok(())
            }
            (_, source) => {
                let value = self.value_for(category, source)?;
                self.builder
                    .ins()
                    .store(MemFlags::trusted(), value, addr, offset);
                Ok(())
            }
        }
    }

    /// Copies an aggregate. Small ones are moved with a few loads and
    /// stores, larger ones with a `memmove` call.
    fn copy(&mut self, category: &Category, src: Value, dst: Value) {
        let config = self.session.module.target_config();
        let ptr_bytes = self.session.pointer_bytes();
        let size = category.size(ptr_bytes);
        let align = category.align(ptr_bytes) as u8;
        self.builder.emit_small_memory_copy(
            config,
            dst,
            src,
            u64::from(size),
            align,
            align,
            false,
            MemFlags::trusted(),
        );
    }

    /// Zero fills an aggregate about to be initialized from a brace list or
    /// a string, so that the elements left out read as zero
    fn clear_for_list(&mut self, category: &Category, addr: Value, offset: i32, node: &Node) {
        if category.is_scalar() || !matches!(node, Node::Group(_) | Node::String(_)) {
            return;
        }
        let config = self.session.module.target_config();
        let ptr_bytes = self.session.pointer_bytes();
        let size = category.size(ptr_bytes);
        let align = category.align(ptr_bytes) as u8;
        let buffer = self.offset_address(addr, offset);
        self.builder
            .emit_small_memset(config, buffer, 0, u64::from(size), align, MemFlags::trusted());
    }

    /// Evaluates `node` as a value of `category`. A bare member name is
    /// accepted for enum categories.
    pub fn value_for(&mut self, category: &Category, node: &Node) -> Result<Value, CodegenError> {
        if let (Category::Enum(desc), Node::Identifier(member)) = (category, node) {
            if !self.session.symbol_table.contains(member) {
                if let Some(ordinal) = desc.ordinal(member) {
                    return Ok(self.iconst(types::I32, i64::from(ordinal)));
                }
            }
        }
        let value = self.expr(node)?;
        self.coerce(value, category)
    }

    /// Converts between the scalar categories the way C does
    pub fn coerce(&mut self, value: TypedValue, to: &Category) -> Result<Value, CodegenError> {
        let from = &value.category;
        let v = value.value;
        if from == to {
            return Ok(v);
        }
        let ins = self.builder.ins();
        let converted = match (from, to) {
            // null, and strings seen as char pointers
            (Category::Pointer(inner), Category::Pointer(_) | Category::Str)
                if **inner == Category::Void =>
            {
                v
            }
            (Category::Str, Category::Pointer(inner)) | (Category::Pointer(inner), Category::Str)
                if **inner == Category::Char =>
            {
                v
            }
            (Category::Str | Category::Pointer(_), Category::Bool) => {
                ins.icmp_imm(IntCC::NotEqual, v, 0)
            }
            (Category::Int | Category::Enum(_), Category::Int | Category::Enum(_)) => v,
            (Category::Int | Category::Enum(_), Category::Char) => ins.ireduce(types::I8, v),
            (Category::Int | Category::Enum(_) | Category::Char, Category::Bool) => {
                ins.icmp_imm(IntCC::NotEqual, v, 0)
            }
            (Category::Int | Category::Enum(_), Category::Double) => ins.fcvt_from_sint(types::F64, v),
            (Category::Char, Category::Int | Category::Enum(_)) => ins.sextend(types::I32, v),
            (Category::Char, Category::Double) => {
                let wide = ins.sextend(types::I32, v);
                self.builder.ins().fcvt_from_sint(types::F64, wide)
            }
            (Category::Bool, Category::Char) => v,
            (Category::Bool, Category::Int | Category::Enum(_)) => ins.uextend(types::I32, v),
            (Category::Bool, Category::Double) => {
                let wide = ins.uextend(types::I32, v);
                self.builder.ins().fcvt_from_sint(types::F64, wide)
            }
            (Category::Double, Category::Int | Category::Enum(_)) => ins.fcvt_to_sint_sat(types::I32, v),
            (Category::Double, Category::Char) => {
                let wide = ins.fcvt_to_sint_sat(types::I32, v);
                self.builder.ins().ireduce(types::I8, wide)
            }
            (Category::Double, Category::Bool) => {
                let zero = ins.f64const(0.0);
                self.builder.ins().fcmp(FloatCC::NotEqual, v, zero)
            }
            _ => return Err(unsupported(format!("cannot convert {} to {}", from, to))),
        };
        Ok(converted)
    }

    /// Assignment to an existing name, field, element or pointee
    pub fn assign(&mut self, assign: &Assign) -> Result<(), CodegenError> {
        let Some(value) = assign.value.as_deref() else {
            return Err(unsupported("assignment without a value"));
        };
        let place = match self.place(&assign.target) {
            Ok(place) => place,
            Err(CodegenError::UndefinedName(name)) if matches!(assign.target.as_ref(), Node::Identifier(_)) => {
                return Err(CodegenError::UnknownType(name));
            }
            Err(e) => return Err(e),
        };
        if place.is_const {
            return Err(unsupported(format!(
                "cannot assign to constant `{}`",
                assign.target.describe()
            )));
        }
        self.clear_for_list(&place.category, place.addr, place.offset, value);
        self.store_init(&place.category, place.addr, place.offset, value)
    }

    /// `read x`: fills numeric or char storage from standard input
    pub fn read(&mut self, target: &Node) -> Result<(), CodegenError> {
        let place = self.place(target)?;
        if place.is_const {
            return Err(unsupported(format!(
                "cannot read into constant `{}`",
                target.describe()
            )));
        }
        let hook = match place.category {
            Category::Int | Category::Enum(_) => Hook::ReadI32,
            Category::Double => Hook::ReadF64,
            Category::Char => Hook::ReadChar,
            ref other => return Err(unsupported(format!("cannot read a value of type {}", other))),
        };
        let Some(mut value) = self.call_hook(hook, &[])? else {
            return Err(unsupported(format!("`{}` returns nothing", hook.symbol())));
        };
        if place.category == Category::Char {
            value = self.builder.ins().ireduce(types::I8, value);
        }
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, place.addr, place.offset);
        Ok(())
    }
}
