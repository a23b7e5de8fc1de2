use cranelift_codegen::ir::{Function, InstBuilder, Signature, UserFuncName};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId, Linkage, Module};
use log::debug;

use crate::ast::{FunctionDef, Node};
use crate::frontend::category::{Category, TypedValue};
use crate::frontend::context::{CompiledFunction, FunctionContext, FunctionInfo, Session, ENTRY};
use crate::frontend::error::{unsupported, CodegenError};
use crate::frontend::storage::declared_name;

/// A function registered in the module whose body is not lowered yet
pub(crate) struct DeclaredFunction {
    id: FuncId,
    sig: Signature,
    ret: Category,
    params: Vec<(String, Category)>,
}

/// Everything needed to lower one function body
pub(crate) struct FunctionUnit<'n> {
    pub name: &'n str,
    pub id: FuncId,
    pub sig: Signature,
    pub ret: Category,
    pub params: Vec<(String, Category)>,
    pub body: &'n [Node],
    // top-level statements run in the global scope
    pub top_level: bool,
}

pub(crate) fn lower_function<M: Module>(session: &mut Session<'_, M>, unit: FunctionUnit<'_>) {
    let mut func = Function::with_name_signature(UserFuncName::user(0, unit.id.as_u32()), unit.sig);
    let mut builder_context = FunctionBuilderContext::new();
    {
        let builder = FunctionBuilder::new(&mut func, &mut builder_context);
        let mut ctx = FunctionContext::new(session, builder, unit.ret);
        let args = ctx.enter_entry_block();
        if !unit.top_level {
            ctx.enter_scope();
        }
        // Set up stack arguments: alloc & store
        for ((name, category), arg) in unit.params.iter().zip(args) {
            if let Err(e) = ctx.bind_parameter(name, category, arg) {
                ctx.session.diagnostics.report(e);
            }
        }
        ctx.lower_statements(unit.body);
        // Default return if control reaches the end of the body
        ctx.seal_with_return();
        if !unit.top_level {
            ctx.exit_scope();
        }
        ctx.finish();
    }
    session.compiled.push(CompiledFunction {
        name: unit.name.to_string(),
        id: unit.id,
        func,
    });
}

impl<M: Module> FunctionContext<'_, '_, M> {
    /// Registers and lowers a function
    pub fn define_function(&mut self, def: &FunctionDef) -> Result<(), CodegenError> {
        let declared = self.declare_function(def)?;
        self.lower_declared(def, declared);
        Ok(())
    }

    /// Registers the signature of `def`, so that calls to it resolve
    /// before its body is lowered
    pub(crate) fn declare_function(&mut self, def: &FunctionDef) -> Result<DeclaredFunction, CodegenError> {
        if def.name == ENTRY || self.session.functions.contains_key(&def.name) {
            return Err(CodegenError::Redefinition(def.name.clone()));
        }
        let ret = self.resolve_type_name(&def.return_type)?;
        if !ret.is_scalar() && ret != Category::Void {
            return Err(unsupported(format!("function `{}` returning {}", def.name, ret)));
        }
        let mut params = Vec::with_capacity(def.params.len());
        for param in &def.params {
            let (name, is_pointer) = declared_name(&param.target)?;
            let Some(declared) = &param.declared else {
                return Err(CodegenError::UnknownType(name.to_string()));
            };
            let category = self.declared_category(declared, is_pointer, None)?;
            if !category.is_scalar() {
                return Err(unsupported(format!("parameter `{}` of type {}", name, category)));
            }
            params.push((name.to_string(), category));
        }
        let categories: Vec<Category> = params.iter().map(|(_, c)| c.clone()).collect();
        let sig = self.session.signature(&categories, &ret);
        let id = self
            .session
            .module
            .declare_function(&def.name, Linkage::Local, &sig)?;
        self.session.functions.insert(
            def.name.clone(),
            FunctionInfo {
                id,
                ret: ret.clone(),
                params: categories,
            },
        );
        debug!("declared function {}({} params) -> {}", def.name, params.len(), ret);
        Ok(DeclaredFunction { id, sig, ret, params })
    }

    pub(crate) fn lower_declared(&mut self, def: &FunctionDef, declared: DeclaredFunction) {
        debug!("lowering function {}", def.name);
        lower_function(
            self.session,
            FunctionUnit {
                name: &def.name,
                id: declared.id,
                sig: declared.sig,
                ret: declared.ret,
                params: declared.params,
                body: &def.body,
                top_level: false,
            },
        );
    }

    /// Calls a registered function. Arguments are evaluated left to right
    /// and converted to the parameter categories.
    pub fn call(&mut self, name: &str, args: &[Node]) -> Result<Option<TypedValue>, CodegenError> {
        let Some(info) = self.session.functions.get(name).cloned() else {
            return Err(CodegenError::UndefinedName(name.to_string()));
        };
        if args.len() != info.params.len() {
            return Err(unsupported(format!(
                "`{}` takes {} arguments but {} were given",
                name,
                info.params.len(),
                args.len()
            )));
        }
        let mut values = Vec::with_capacity(args.len());
        for (arg, category) in args.iter().zip(&info.params) {
            values.push(self.value_for(category, arg)?);
        }
        let func_ref = self.func_ref(info.id);
        let inst = self.builder.ins().call(func_ref, &values);
        Ok(self
            .builder
            .inst_results(inst)
            .first()
            .map(|&value| TypedValue::new(value, info.ret.clone())))
    }

    /// Emits the return terminator. A mismatching return is reported, the
    /// block is still sealed with a well-typed return.
    pub fn ret(&mut self, value: Option<&Node>) -> Result<(), CodegenError> {
        let ret = self.ret.clone();
        if ret == Category::Void {
            self.builder.ins().return_(&[]);
            return match value {
                Some(_) => Err(unsupported("a void function cannot return a value")),
                None => Ok(()),
            };
        }
        let result = match value {
            Some(node) => self.value_for(&ret, node),
            None => Err(unsupported(format!("missing return value of type {}", ret))),
        };
        match result {
            Ok(value) => {
                self.builder.ins().return_(&[value]);
                Ok(())
            }
            Err(e) => {
                self.seal_with_return();
                Err(e)
            }
        }
    }
}
