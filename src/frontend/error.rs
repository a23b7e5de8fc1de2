use cranelift_module::ModuleError;
use log::error;
use thiserror::Error;

/// Semantic errors raised while lowering a program
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("redefinition of `{0}`")]
    Redefinition(String),
    #[error("undefined name `{0}`")]
    UndefinedName(String),
    #[error("cannot determine the type of `{0}`")]
    UnknownType(String),
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("module error: {0}")]
    Module(String),
}

impl From<ModuleError> for CodegenError {
    fn from(e: ModuleError) -> Self {
        CodegenError::Module(e.to_string())
    }
}

pub(crate) fn unsupported(message: impl Into<String>) -> CodegenError {
    CodegenError::UnsupportedOperation(message.into())
}

/// Errors collected over one compilation. Lowering goes on after an error,
/// a non-empty list means nothing may be emitted.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<CodegenError>,
}

impl Diagnostics {
    pub fn report(&mut self, e: CodegenError) {
        error!("{}", e);
        self.errors.push(e);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CodegenError> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<CodegenError> {
        self.errors
    }
}
