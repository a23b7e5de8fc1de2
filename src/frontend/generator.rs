use cranelift_module::Module;
use log::trace;

use crate::ast::*;
use crate::frontend::context::FunctionContext;
use crate::frontend::error::{unsupported, CodegenError};

/// Trait for generating Cranelift IR from syntax tree nodes
pub trait GenerateIr {
    fn generate<M: Module>(&self, ctx: &mut FunctionContext<'_, '_, M>) -> Result<(), CodegenError>;
}

impl<M: Module> FunctionContext<'_, '_, M> {
    /// Lowers a statement list. Functions defined in the list are declared
    /// first, so calls resolve ahead of the definition. Errors of single
    /// statements are collected and lowering goes on with the next statement.
    pub fn lower_statements(&mut self, items: &[Node]) {
        // a failed declaration is retried, and reported, at the definition
        let declared: Vec<_> = items
            .iter()
            .map(|item| match item {
                Node::Function(def) => self.declare_function(def).ok(),
                _ => None,
            })
            .collect();

        for (item, declared) in items.iter().zip(declared) {
            if self.is_terminated() && !item.is_definition() {
                // Dead code elimination: stop generating further instructions
                // e.g., return 1; return 2; <- the second return is dead code
                trace!("skipping unreachable `{}`", item.describe());
                continue;
            }
            let result = match (item, declared) {
                (Node::Function(def), Some(declared)) => {
                    self.lower_declared(def, declared);
                    Ok(())
                }
                _ => item.generate(self),
            };
            if let Err(e) = result {
                self.session.diagnostics.report(e);
            }
        }
    }
}

impl GenerateIr for Node {
    fn generate<M: Module>(&self, ctx: &mut FunctionContext<'_, '_, M>) -> Result<(), CodegenError> {
        match self {
            Node::Assign(assign) => assign.generate(ctx),
            Node::Write(value) => ctx.write(value),
            Node::Read(target) => ctx.read(target),
            Node::IfStatement(stmt) => {
                ctx.lower_if(stmt);
                Ok(())
            }
            Node::WhileLoop { condition, block } => {
                ctx.lower_while(condition, block);
                Ok(())
            }
            Node::ForLoop(stmt) => {
                ctx.lower_for(stmt);
                Ok(())
            }
            Node::DoWhileLoop { condition, block } => {
                ctx.lower_do_while(condition, block);
                Ok(())
            }
            Node::Struct { name, fields } => ctx.define_struct(name, fields),
            Node::Enum { name, values } => ctx.define_enum(name, values),
            Node::Function(def) => ctx.define_function(def),
            Node::FunctionCall { name, args } => ctx.call(name, args).map(|_| ()),
            Node::Return(value) => ctx.ret(value.as_deref()),
            Node::ControlFlow(kind) => ctx.lower_control_flow(*kind),
            Node::Class { name, .. } => Err(unsupported(format!("class `{}`", name))),
            Node::Define { name, .. } => Err(unsupported(format!("#define {}", name))),
            Node::Include(name) => Err(unsupported(format!("#include {}", name))),
            Node::Group(_) => Err(unsupported("brace list outside of an initializer")),
            // Expression statements are evaluated for their effects
            Node::Number(_)
            | Node::String(_)
            | Node::Character(_)
            | Node::Bool(_)
            | Node::Null
            | Node::Identifier(_)
            | Node::BinaryOp { .. }
            | Node::CompareOp { .. }
            | Node::LogicalOp { .. }
            | Node::GetArray { .. }
            | Node::Access { .. }
            | Node::Pointer(_)
            | Node::Reference(_) => ctx.expr(self).map(|_| ()),
        }
    }
}

impl GenerateIr for Assign {
    fn generate<M: Module>(&self, ctx: &mut FunctionContext<'_, '_, M>) -> Result<(), CodegenError> {
        if self.declared.is_some() {
            ctx.declare(self)
        } else {
            ctx.assign(self)
        }
    }
}
