//! Front end for the sandboxed JavaScript subset
//!
//! ```text
//! Source → Lexer → Tokens → Parser → AST
//! ```
//!
//! - [`lexer`]: tokenises source text, tracking line and column
//! - [`parse`]: the [`Parser`](parse::Parser) and its shared helpers;
//!   statement and expression parsing live in sibling modules that extend it
//! - [`ast`]: the syntax tree consumed by the sandbox engine
//!
//! Parse failures convert into a `SyntaxIssue` [`TraceError`](crate::errors::TraceError)
//! carrying the offending line.

pub mod ast;
mod expressions;
pub mod lexer;
pub mod parse;
mod statements;

pub use ast::Program;
pub use parse::{ParseError, Parser};

/// Tokenise and parse a whole program
pub fn parse(source: &str) -> Result<Program, ParseError> {
    Parser::new(source)?.parse_program()
}
