pub mod ast;
pub mod errors;
pub mod inference;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod typecheck;
pub mod types;
