mod runtime;

use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable, SetError};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Module, ModuleError};
use cranelift_object::{ObjectBuilder, ObjectModule};
use log::{debug, info};
use thiserror::Error;

use crate::ast::Program;
use crate::frontend::{self, CodegenError, Hook, Translation};
use crate::lang::ProgramParser;

pub use runtime::capture;

/// C implementation of the I/O hooks, compiled next to every native program
const RUNTIME_SOURCE: &str = include_str!("../../runtime/cinder_rt.c");

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("syntax error: {0}")]
    Parse(String),
    #[error("compilation failed with {} error(s)", .0.len())]
    Compile(Vec<CodegenError>),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error("host machine is not supported: {0}")]
    Isa(String),
    #[error("invalid code generator setting: {0}")]
    Settings(#[from] SetError),
    #[error("module error: {0}")]
    Module(#[from] ModuleError),
    #[error("cannot emit object file: {0}")]
    Emit(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("`{0}` failed with {1}")]
    Link(String, ExitStatus),
}

/// 1-based position in the source text
#[derive(Debug, Clone, Copy)]
struct Position {
    line: usize,
    column: usize,
}

impl Position {
    fn of(source: &str, offset: usize) -> Position {
        let before = &source[..offset.min(source.len())];
        let line = before.matches('\n').count() + 1;
        let column = before.rfind('\n').map_or(before.len(), |nl| before.len() - nl - 1) + 1;
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

pub fn parse(source: &str) -> Result<Program, BuildError> {
    ProgramParser::new().parse(source).map_err(|e| {
        BuildError::Parse(e.map_location(|offset| Position::of(source, offset)).to_string())
    })
}

fn native_isa(pic: bool) -> Result<OwnedTargetIsa, BuildError> {
    let mut flags = settings::builder();
    flags.set("is_pic", if pic { "true" } else { "false" })?;
    let isa_builder = cranelift_native::builder().map_err(|msg| BuildError::Isa(msg.to_string()))?;
    isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(|e| BuildError::Isa(e.to_string()))
}

/// Module producing a relocatable object file for the host
pub fn object_module(name: &str) -> Result<ObjectModule, BuildError> {
    let builder = ObjectBuilder::new(native_isa(true)?, name, default_libcall_names())?;
    Ok(ObjectModule::new(builder))
}

/// In-process module with the I/O hooks bound to the Rust runtime
pub fn jit_module() -> Result<JITModule, BuildError> {
    let mut builder = JITBuilder::new(default_libcall_names())?;
    for hook in Hook::ALL {
        builder.symbol(hook.symbol(), runtime::address(hook));
    }
    Ok(JITModule::new(builder))
}

/// Parses and lowers `source` into `module`. Semantic errors are turned into
/// one `BuildError::Compile` holding all of them.
fn lower<M: Module>(source: &str, module: &mut M) -> Result<Translation, BuildError> {
    let program = parse(source)?;
    debug!("parsed {} top-level statements", program.statements.len());
    let translation = frontend::translate(&program, module)?;
    if !translation.is_success() {
        return Err(BuildError::Compile(translation.diagnostics.into_vec()));
    }
    Ok(translation)
}

/// Textual Cranelift IR of `source`
pub fn emit_ir_text(source: &str) -> Result<String, BuildError> {
    let mut module = object_module("cinder")?;
    let translation = lower(source, &mut module)?;
    let mut out = Vec::new();
    frontend::emit_ir(&translation, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Relocatable object file of `source`, exporting `main`
pub fn compile_object(source: &str) -> Result<Vec<u8>, BuildError> {
    let mut module = object_module("cinder")?;
    lower(source, &mut module)?;
    module
        .finish()
        .emit()
        .map_err(|e| BuildError::Emit(e.to_string()))
}

/// Compiles `source` and links it with the C runtime into an executable.
/// The C compiler is taken from `CC`, `cc` by default.
pub fn build_executable(source: &str, output: &Path) -> Result<(), BuildError> {
    let object = compile_object(source)?;
    let dir = tempfile::tempdir()?;
    let object_path = dir.path().join("program.o");
    let runtime_path = dir.path().join("cinder_rt.c");
    fs::write(&object_path, object)?;
    fs::write(&runtime_path, RUNTIME_SOURCE)?;

    let cc = env::var("CC").unwrap_or_else(|_| "cc".to_string());
    info!("linking {} with {}", output.display(), cc);
    let status = Command::new(&cc)
        .arg(&object_path)
        .arg(&runtime_path)
        .arg("-o")
        .arg(output)
        .status()?;
    if !status.success() {
        return Err(BuildError::Link(cc, status));
    }
    Ok(())
}

/// Compiles `source` in memory and runs its `main`, returning the exit code
pub fn run_jit(source: &str) -> Result<i32, BuildError> {
    let mut module = jit_module()?;
    let translation = lower(source, &mut module)?;
    module.finalize_definitions()?;
    let code = module.get_finalized_function(translation.entry);
    // SAFETY: `main` is declared and defined with signature `fn() -> i32`
    let main_fn: extern "C" fn() -> i32 = unsafe { std::mem::transmute(code) };
    Ok(main_fn())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let source = "i32 x;\nwrite y";
        let p = Position::of(source, 7);
        assert_eq!((p.line, p.column), (2, 1));
        let p = Position::of(source, 4);
        assert_eq!((p.line, p.column), (1, 5));
    }

    #[test]
    fn syntax_errors_carry_the_position() {
        let err = parse("i32 x = ;").unwrap_err();
        match err {
            BuildError::Parse(message) => assert!(message.contains("1:9"), "{}", message),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn semantic_errors_are_all_returned() {
        let err = compile_object("write a; write b;").unwrap_err();
        match err {
            BuildError::Compile(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn object_file_is_emitted() {
        let object = compile_object("write 1;").unwrap();
        assert!(!object.is_empty());
    }

    #[test]
    fn jit_returns_zero_from_main() {
        assert_eq!(run_jit("i32 x = 1;").unwrap(), 0);
    }
}
