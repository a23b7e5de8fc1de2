use std::collections::{HashMap, HashSet};

use cranelift_codegen::ir::{
    types, AbiParam, Block, FuncRef, Function, GlobalValue, InstBuilder, Opcode, Signature, Type,
    Value,
};
use cranelift_frontend::FunctionBuilder;
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module};
use log::trace;

use crate::frontend::category::Category;
use crate::frontend::error::{CodegenError, Diagnostics};
use crate::frontend::intrinsics::Hook;
use crate::frontend::symbol_table::SymbolTable;
use crate::frontend::type_registry::TypeRegistry;

/// Name of the exported entry function holding the top-level statements
pub const ENTRY: &str = "main";

/// Entry of the function registry
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub id: FuncId,
    pub ret: Category,
    pub params: Vec<Category>,
}

/// A lowered function, defined in the module once the whole program is known
/// to be free of errors
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub id: FuncId,
    pub func: Function,
}

/// State of one compilation. Created per program and never reused.
pub struct Session<'m, M: Module> {
    pub module: &'m mut M,
    pub symbol_table: SymbolTable,
    pub type_registry: TypeRegistry,
    pub functions: HashMap<String, FunctionInfo>,
    pub diagnostics: Diagnostics,
    pub compiled: Vec<CompiledFunction>,
    ptr: Type,
    strings: HashMap<Vec<u8>, DataId>,
    hooks: HashMap<Hook, FuncId>,
    data_count: usize,
    frame_count: usize,
    construct_count: usize,
}

impl<'m, M: Module> Session<'m, M> {
    pub fn new(module: &'m mut M) -> Self {
        let ptr = module.target_config().pointer_type();
        Session {
            module,
            symbol_table: SymbolTable::new(),
            type_registry: TypeRegistry::new(),
            functions: HashMap::new(),
            diagnostics: Diagnostics::default(),
            compiled: Vec::new(),
            ptr,
            strings: HashMap::new(),
            hooks: HashMap::new(),
            data_count: 0,
            frame_count: 0,
            construct_count: 0,
        }
    }

    pub fn pointer_type(&self) -> Type {
        self.ptr
    }

    pub fn pointer_bytes(&self) -> u32 {
        self.ptr.bytes()
    }

    /// Labels structural constructs in the log, carries no meaning otherwise
    pub fn next_construct(&mut self) -> usize {
        self.construct_count += 1;
        self.construct_count
    }

    pub fn next_frame(&mut self) -> usize {
        self.frame_count += 1;
        self.frame_count
    }

    pub fn hook(&mut self, hook: Hook) -> Result<FuncId, CodegenError> {
        if let Some(&id) = self.hooks.get(&hook) {
            return Ok(id);
        }
        let sig = hook.signature(self.module.make_signature(), self.ptr);
        let id = self
            .module
            .declare_function(hook.symbol(), Linkage::Import, &sig)?;
        self.hooks.insert(hook, id);
        Ok(id)
    }

    /// Read-only, NUL terminated copy of `bytes`. Equal literals share one object.
    pub fn string_literal(&mut self, bytes: &[u8]) -> Result<DataId, CodegenError> {
        if let Some(&id) = self.strings.get(bytes) {
            return Ok(id);
        }
        let symbol = format!("str.{}", self.strings.len());
        let id = self.module.declare_data(&symbol, Linkage::Local, false, false)?;
        let mut contents = bytes.to_vec();
        contents.push(0);
        let mut description = DataDescription::new();
        description.define(contents.into_boxed_slice());
        self.module.define_data(id, &description)?;
        trace!("pooled string literal {} ({} bytes)", symbol, bytes.len());
        self.strings.insert(bytes.to_vec(), id);
        Ok(id)
    }

    /// Static storage for a global variable, zero filled unless `init` is given
    pub fn global_data(
        &mut self,
        name: &str,
        category: &Category,
        init: Option<Vec<u8>>,
    ) -> Result<DataId, CodegenError> {
        let symbol = format!("{}.{}", name, self.data_count);
        self.data_count += 1;
        let id = self.module.declare_data(&symbol, Linkage::Local, true, false)?;
        let mut description = DataDescription::new();
        match init {
            Some(bytes) => description.define(bytes.into_boxed_slice()),
            None => description.define_zeroinit(category.size(self.ptr.bytes()).max(1) as usize),
        }
        description.set_align(u64::from(category.align(self.ptr.bytes())));
        self.module.define_data(id, &description)?;
        Ok(id)
    }

    /// Signature of a function taking `params` and returning `ret`
    pub fn signature(&self, params: &[Category], ret: &Category) -> Signature {
        let mut sig = self.module.make_signature();
        for param in params {
            if let Some(ty) = param.ir_type(self.ptr) {
                sig.params.push(AbiParam::new(ty));
            }
        }
        if let Some(ty) = ret.ir_type(self.ptr) {
            sig.returns.push(AbiParam::new(ty));
        }
        sig
    }
}

/// Where `break` and `continue` go inside the innermost loop
#[derive(Debug, Clone, Copy)]
pub struct LoopTargets {
    pub exit: Block,
    pub reentry: Block,
}

/// Context for lowering the body of one function
pub struct FunctionContext<'a, 'm, M: Module> {
    pub session: &'a mut Session<'m, M>,
    pub builder: FunctionBuilder<'a>,
    pub ret: Category,
    frame: usize,
    loops: Vec<LoopTargets>,
    reachable: HashSet<Block>,
    data_refs: HashMap<DataId, GlobalValue>,
    func_refs: HashMap<FuncId, FuncRef>,
}

impl<'a, 'm, M: Module> FunctionContext<'a, 'm, M> {
    pub fn new(session: &'a mut Session<'m, M>, builder: FunctionBuilder<'a>, ret: Category) -> Self {
        let frame = session.next_frame();
        FunctionContext {
            session,
            builder,
            ret,
            frame,
            loops: Vec::new(),
            reachable: HashSet::new(),
            data_refs: HashMap::new(),
            func_refs: HashMap::new(),
        }
    }

    /// Stack frame the local storage of this function belongs to
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn ptr(&self) -> Type {
        self.session.pointer_type()
    }

    /// Creates the entry block, binds the function parameters to it and
    /// makes it current. Returns the parameter values.
    pub fn enter_entry_block(&mut self) -> Vec<Value> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.reachable.insert(entry);
        self.builder.switch_to_block(entry);
        self.builder.block_params(entry).to_vec()
    }

    pub fn new_block(&mut self, label: &str) -> Block {
        let block = self.builder.create_block();
        trace!("created {} ({})", block, label);
        block
    }

    /// Whether the current block already ends with a terminator
    pub fn is_terminated(&self) -> bool {
        let Some(block) = self.builder.current_block() else {
            return true;
        };
        let Some(inst) = self.builder.func.layout.last_inst(block) else {
            return false;
        };
        matches!(
            self.builder.func.dfg.insts[inst].opcode(),
            Opcode::Return | Opcode::Jump | Opcode::Brif | Opcode::BrTable | Opcode::Trap
        )
    }

    pub fn jump(&mut self, target: Block) {
        self.reachable.insert(target);
        self.builder.ins().jump(target, &[]);
    }

    pub fn branch(&mut self, condition: Value, then_block: Block, else_block: Block) {
        self.reachable.insert(then_block);
        self.reachable.insert(else_block);
        self.builder
            .ins()
            .brif(condition, then_block, &[], else_block, &[]);
    }

    /// Seals the current block with a jump to `target` unless it is already sealed
    pub fn seal_with_jump(&mut self, target: Block) {
        if !self.is_terminated() {
            trace!("sealing fall-through edge to {}", target);
            self.jump(target);
        }
    }

    /// Makes `block` current if some branch targets it. Blocks without
    /// predecessors are never inserted into the function.
    pub fn enter_block(&mut self, block: Block) -> bool {
        if self.reachable.contains(&block) {
            self.builder.switch_to_block(block);
            true
        } else {
            trace!("dropping unreachable {}", block);
            false
        }
    }

    pub fn enter_scope(&mut self) {
        self.session.symbol_table.enter_scope();
        self.session.type_registry.enter_scope();
    }

    pub fn exit_scope(&mut self) {
        self.session.type_registry.exit_scope();
        self.session.symbol_table.exit_scope();
    }

    /// Push information for break/continue statements before
    /// generating a loop body
    pub fn enter_loop(&mut self, exit: Block, reentry: Block) {
        self.loops.push(LoopTargets { exit, reentry });
    }

    pub fn exit_loop(&mut self) {
        self.loops.pop();
    }

    pub fn current_loop(&self) -> Option<LoopTargets> {
        self.loops.last().copied()
    }

    /// Address of a data object inside this function
    pub fn data_address(&mut self, id: DataId) -> Value {
        let gv = match self.data_refs.get(&id) {
            Some(&gv) => gv,
            None => {
                let gv = self.session.module.declare_data_in_func(id, self.builder.func);
                self.data_refs.insert(id, gv);
                gv
            }
        };
        let ptr = self.ptr();
        self.builder.ins().global_value(ptr, gv)
    }

    pub fn func_ref(&mut self, id: FuncId) -> FuncRef {
        if let Some(&func_ref) = self.func_refs.get(&id) {
            return func_ref;
        }
        let func_ref = self.session.module.declare_func_in_func(id, self.builder.func);
        self.func_refs.insert(id, func_ref);
        func_ref
    }

    pub fn call_hook(&mut self, hook: Hook, args: &[Value]) -> Result<Option<Value>, CodegenError> {
        let id = self.session.hook(hook)?;
        let func_ref = self.func_ref(id);
        let inst = self.builder.ins().call(func_ref, args);
        Ok(self.builder.inst_results(inst).first().copied())
    }

    /// Integer constant of the given width, with the immediate masked to it
    pub fn iconst(&mut self, ty: Type, value: i64) -> Value {
        let masked = if ty.bits() >= 64 {
            value
        } else {
            value & ((1i64 << ty.bits()) - 1)
        };
        self.builder.ins().iconst(ty, masked)
    }

    pub fn zero(&mut self, category: &Category) -> Option<Value> {
        let ptr = self.ptr();
        let ty = category.ir_type(ptr)?;
        if ty == types::F64 {
            Some(self.builder.ins().f64const(0.0))
        } else {
            Some(self.iconst(ty, 0))
        }
    }

    /// Returns the zero value of the return category if control falls off
    /// the end of the function
    pub fn seal_with_return(&mut self) {
        if self.is_terminated() {
            return;
        }
        let ret = self.ret.clone();
        match self.zero(&ret) {
            Some(value) => self.builder.ins().return_(&[value]),
            None => self.builder.ins().return_(&[]),
        };
    }

    pub fn finish(mut self) {
        self.builder.seal_all_blocks();
        self.builder.finalize();
    }
}
