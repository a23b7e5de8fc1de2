mod aggregate;
mod category;
mod context;
mod control_flow;
mod error;
mod expr;
mod function;
mod generator;
mod intrinsics;
mod storage;
mod symbol_table;
mod type_registry;

use std::io;

use cranelift_codegen::Context;
use cranelift_module::{FuncId, Linkage, Module};
use log::{debug, info};

use crate::ast::Program;
use context::Session;
use function::{lower_function, FunctionUnit};

pub use category::Category;
pub use context::{CompiledFunction, ENTRY};
pub use error::{CodegenError, Diagnostics};
pub use intrinsics::Hook;

/// Result of lowering one program
#[derive(Debug)]
pub struct Translation {
    /// The exported `main` holding the top-level statements
    pub entry: FuncId,
    pub functions: Vec<CompiledFunction>,
    pub diagnostics: Diagnostics,
}

impl Translation {
    pub fn is_success(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Lowers `program` into `module`. Top-level statements become the body of
/// the exported `main: () -> i32`, every `function` becomes a local function.
///
/// Semantic errors do not stop the lowering, they are collected in the
/// returned diagnostics. Functions are only defined in the module if there
/// are none.
pub fn translate<M: Module>(program: &Program, module: &mut M) -> Result<Translation, CodegenError> {
    let (entry, functions, diagnostics) = {
        let mut session = Session::new(module);
        let sig = session.signature(&[], &Category::Int);
        let entry = session.module.declare_function(ENTRY, Linkage::Export, &sig)?;
        lower_function(
            &mut session,
            FunctionUnit {
                name: ENTRY,
                id: entry,
                sig,
                ret: Category::Int,
                params: Vec::new(),
                body: &program.statements,
                top_level: true,
            },
        );
        let functions = std::mem::take(&mut session.compiled);
        let diagnostics = std::mem::take(&mut session.diagnostics);
        (entry, functions, diagnostics)
    };

    if diagnostics.is_empty() {
        for function in &functions {
            debug!("defining {}", function.name);
            let mut ctx = Context::for_function(function.func.clone());
            module.define_function(function.id, &mut ctx)?;
        }
        info!("lowered {} functions", functions.len());
    } else {
        info!("lowering failed with {} errors", diagnostics.len());
    }

    Ok(Translation {
        entry,
        functions,
        diagnostics,
    })
}

/// Writes the textual IR of every lowered function
pub fn emit_ir(translation: &Translation, mut output: impl io::Write) -> io::Result<()> {
    for function in &translation.functions {
        writeln!(output, "; {}", function.name)?;
        write!(output, "{}", function.func.display())?;
        writeln!(output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use cranelift_codegen::flowgraph::ControlFlowGraph;
    use cranelift_codegen::ir::{Function, Opcode};
    use cranelift_codegen::settings;
    use cranelift_codegen::verify_function;
    use stripmargin::StripMargin;

    use super::*;
    use crate::backend::{object_module, parse};

    fn lower(source: &str) -> Translation {
        let program = parse(source).unwrap();
        let mut module = object_module("unit").unwrap();
        translate(&program, &mut module).unwrap()
    }

    fn function<'t>(translation: &'t Translation, name: &str) -> &'t Function {
        &translation
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap()
            .func
    }

    fn count_opcode(func: &Function, opcode: Opcode) -> usize {
        func.layout
            .blocks()
            .flat_map(|block| func.layout.block_insts(block))
            .filter(|&inst| func.dfg.insts[inst].opcode() == opcode)
            .count()
    }

    /// Every lowered function verifies and every block is reachable from
    /// the entry block
    fn assert_well_formed(translation: &Translation) {
        let flags = settings::Flags::new(settings::builder());
        for f in &translation.functions {
            verify_function(&f.func, &flags).unwrap();
            let cfg = ControlFlowGraph::with_function(&f.func);
            let entry = f.func.layout.entry_block().unwrap();
            let mut reached = HashSet::from([entry]);
            let mut pending = vec![entry];
            while let Some(block) = pending.pop() {
                for succ in cfg.succ_iter(block) {
                    if reached.insert(succ) {
                        pending.push(succ);
                    }
                }
            }
            for block in f.func.layout.blocks() {
                assert!(
                    reached.contains(&block),
                    "{} in {} is unreachable from the entry",
                    block,
                    f.name
                );
            }
        }
    }

    #[test]
    fn top_level_statements_form_main() {
        let t = lower("i32 x = 5; write x;");
        assert!(t.is_success());
        assert_eq!(t.functions.len(), 1);
        assert_eq!(t.functions[0].name, ENTRY);
        assert_well_formed(&t);
    }

    #[test]
    fn errors_are_accumulated() {
        let t = lower("i32 x = 1; i32 x = 2; write y; write x;");
        let errors: Vec<_> = t.diagnostics.iter().cloned().collect();
        assert_eq!(
            errors,
            vec![
                CodegenError::Redefinition("x".into()),
                CodegenError::UndefinedName("y".into()),
            ]
        );
        assert!(!t.is_success());
    }

    #[test]
    fn shadowing_in_nested_scope() {
        let source = "
            |i32 x = 1;
            |if (x == 1) {
            |    i32 x = 2;
            |    write x;
            |}
            |write x;
            |"
        .strip_margin();
        let t = lower(&source);
        assert!(t.is_success());
        assert_well_formed(&t);
    }

    #[test]
    fn if_chain_blocks() {
        let source = "
            |i32 a = 2;
            |if (a == 1) { write 1; } elif (a == 2) { write 2; } else { write 3; }
            |"
        .strip_margin();
        let t = lower(&source);
        assert!(t.is_success());
        // entry, then, elif test, elif body, else, end
        assert_eq!(function(&t, ENTRY).layout.blocks().count(), 6);
        assert_eq!(count_opcode(function(&t, ENTRY), Opcode::Brif), 2);
        assert_well_formed(&t);
    }

    #[test]
    fn end_block_dropped_when_every_branch_returns() {
        let source = "
            |function i32 sign(i32 n) {
            |    if (n < 0) { return 0 - 1; } else { return 1; }
            |}
            |write sign(3);
            |"
        .strip_margin();
        let t = lower(&source);
        assert!(t.is_success());
        // entry, then, else
        assert_eq!(function(&t, "sign").layout.blocks().count(), 3);
        assert_well_formed(&t);
    }

    #[test]
    fn statements_after_return_are_skipped() {
        let source = "
            |function i32 f() {
            |    return 1;
            |    write 7;
            |    return 2;
            |}
            |"
        .strip_margin();
        let t = lower(&source);
        assert!(t.is_success());
        let f = function(&t, "f");
        assert_eq!(count_opcode(f, Opcode::Return), 1);
        assert_eq!(count_opcode(f, Opcode::Call), 0);
        assert_well_formed(&t);
    }

    #[test]
    fn loops_are_well_formed() {
        let source = "
            |for (i32 i = 0; i < 10; i = i + 1) {
            |    if (i == 2) { continue; }
            |    if (i == 5) { break; }
            |    write i;
            |}
            |i32 n = 3;
            |while (n > 0) { n = n - 1; }
            |do { n = n + 1; } while (n < 3);
            |"
        .strip_margin();
        let t = lower(&source);
        assert!(t.is_success());
        assert_well_formed(&t);
    }

    #[test]
    fn break_outside_loop_is_reported() {
        let t = lower("break; write 1;");
        assert_eq!(t.diagnostics.len(), 1);
        assert!(matches!(
            t.diagnostics.iter().next(),
            Some(CodegenError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn literal_globals_become_static_data() {
        let t = lower("i32 x = 42; idouble d = 1.5; write x;");
        assert!(t.is_success());
        let main = function(&t, ENTRY);
        // no stores for literal initializers
        assert_eq!(count_opcode(main, Opcode::Store), 0);
        assert!(count_opcode(main, Opcode::GlobalValue) > 0);
    }

    #[test]
    fn equal_string_literals_are_pooled() {
        let t = lower("write \"hi\"; write \"hi\"; write \"ho\";");
        assert!(t.is_success());
        // two distinct data objects referenced by main
        assert_eq!(function(&t, ENTRY).global_values.len(), 2);
    }

    #[test]
    fn large_copies_call_out_small_ones_are_inline() {
        let source = "
            |i32 a[64];
            |i32 b[64];
            |b = a;
            |struct P { i32 x; i32 y; }
            |P p;
            |P q;
            |q = p;
            |"
        .strip_margin();
        let t = lower(&source);
        assert!(t.is_success());
        // only the array copy becomes a call
        assert_eq!(count_opcode(function(&t, ENTRY), Opcode::Call), 1);
        assert_well_formed(&t);
    }

    #[test]
    fn partial_local_initializer_clears_the_slot() {
        let t = lower("function void f() { i32 a[2] = {1}; write a[1]; }");
        assert!(t.is_success());
        let f = function(&t, "f");
        // zero fill, then the one listed element
        assert_eq!(count_opcode(f, Opcode::Store), 2);
        assert_well_formed(&t);
    }

    #[test]
    fn duplicate_function_is_reported_once() {
        let t = lower("function void f() { write 1; } function void f() { write 2; } f();");
        let errors: Vec<_> = t.diagnostics.iter().cloned().collect();
        assert_eq!(errors, vec![CodegenError::Redefinition("f".into())]);
    }

    #[test]
    fn entry_name_is_reserved() {
        let t = lower("function i32 main() { return 0; }");
        assert_eq!(
            t.diagnostics.iter().next(),
            Some(&CodegenError::Redefinition("main".into()))
        );
    }

    #[test]
    fn emitted_ir_lists_functions() {
        let t = lower("function void hello() { write \"hello\"; } hello();");
        let mut out = Vec::new();
        emit_ir(&t, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("; hello"));
        assert!(text.contains("; main"));
    }
}
