use lalrpop_util::lalrpop_mod;

pub mod ast;
pub mod backend;
pub mod frontend;

lalrpop_mod!(
    #[allow(clippy::all)]
    pub lang
);

pub use backend::BuildError;
pub use frontend::{translate, CodegenError, Translation};
