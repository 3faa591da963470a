//! Main parser coordinator
//!
//! This module provides the [`Parser`] struct and the shared helper methods.
//! Statement and expression parsing extend it from `statements` and
//! `expressions` through separate `impl Parser` blocks.
//!
//! Semicolons are optional at the end of a line, at a closing `}` and at end
//! of input, which covers the way learners usually write JavaScript.

use super::ast::*;
use super::lexer::{LexError, Lexer, Token, TokenKind};
use crate::errors::TraceError;
use std::fmt;

/// Parser error type
#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse error at line {}, column {}: {}",
            self.location.line, self.location.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError {
            message: err.message,
            location: err.location,
        }
    }
}

impl From<ParseError> for TraceError {
    fn from(err: ParseError) -> Self {
        TraceError::syntax(err.message, Some(err.location.line))
    }
}

/// Recursive descent parser for the JavaScript subset
pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) position: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            tokens,
            position: 0,
        })
    }

    /// Parse the entire program
    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program::default();
        while !self.is_at_end() {
            program.body.push(self.parse_statement()?);
        }
        Ok(program)
    }

    // ===== Helper methods =====

    pub(crate) fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            location: self.current_location(),
        }
    }

    pub(crate) fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Compares variants only, so `Ident(_)` matches any identifier
    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.is_at_end() {
            self.position += 1;
        }
        token
    }

    pub(crate) fn is_at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    pub(crate) fn peek(&self) -> &Token {
        // the lexer always ends the stream with Eof
        &self.tokens[self.position.min(self.tokens.len() - 1)]
    }

    pub(crate) fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn peek_ahead(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.position + n)
    }

    pub(crate) fn previous(&self) -> Option<&Token> {
        self.position.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    pub(crate) fn current_location(&self) -> SourceLocation {
        self.peek().location
    }

    /// Whether the next token starts a new source line
    pub(crate) fn at_line_break(&self) -> bool {
        self.previous()
            .is_some_and(|prev| self.peek().location.line > prev.location.line)
    }

    pub(crate) fn expect_token(&mut self, kind: &TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("{}, found {}", message, self.peek())))
        }
    }

    pub(crate) fn expect_identifier(&mut self, ctx: &str) -> Result<String, ParseError> {
        if let TokenKind::Ident(name) = self.peek_kind() {
            let name = name.clone();
            self.advance();
            Ok(name)
        } else {
            Err(self.error(format!("Expected identifier {}, found {}", ctx, self.peek())))
        }
    }

    /// Statement terminator: `;`, or an implied one at a line break, `}` or end
    pub(crate) fn consume_semicolon(&mut self, ctx: &str) -> Result<(), ParseError> {
        if self.match_token(&TokenKind::Semicolon)
            || self.check(&TokenKind::RBrace)
            || self.is_at_end()
            || self.at_line_break()
        {
            return Ok(());
        }
        Err(self.error(format!("Expected ';' {}, found {}", ctx, self.peek())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(source)
            .and_then(|mut p| p.parse_program())
            .expect("program should parse")
    }

    #[test]
    fn test_parse_function_declaration() {
        let program = parse("function add(a, b) {\n  return a + b;\n}");
        assert_eq!(program.body.len(), 1);
        match &program.body[0] {
            Stmt::FunctionDecl(def) => {
                assert_eq!(def.name.as_deref(), Some("add"));
                assert_eq!(def.params, vec!["a", "b"]);
                match &def.body {
                    FunctionBody::Block(body) => assert_eq!(body.len(), 1),
                    other => panic!("Expected block body, got {:?}", other),
                }
            }
            other => panic!("Expected function declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_semicolons_optional_at_line_end() {
        let program = parse("let x = 1\nx = x + 2\nconsole.log(x)");
        assert_eq!(program.body.len(), 3);
        assert_eq!(program.body[2].location().line, 3);
    }

    #[test]
    fn test_missing_semicolon_on_one_line_fails() {
        let err = Parser::new("let x = 1 let y = 2")
            .and_then(|mut p| p.parse_program())
            .expect_err("should fail");
        assert!(err.message.contains("Expected ';'"));
    }

    #[test]
    fn test_arrow_functions() {
        let program = parse("const sq = x => x * x;\nconst add = (a, b) => { return a + b; };");
        match &program.body[1] {
            Stmt::VarDecl { declarations, .. } => match &declarations[0].1 {
                Some(Expr::Function(def)) => assert_eq!(def.params.len(), 2),
                other => panic!("Expected arrow function, got {:?}", other),
            },
            other => panic!("Expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_for_of_and_classic_for() {
        let program = parse("for (const v of [1, 2]) {}\nfor (let i = 0; i < 3; i++) {}");
        assert!(matches!(program.body[0], Stmt::ForOf { .. }));
        assert!(matches!(program.body[1], Stmt::For { .. }));
    }

    #[test]
    fn test_object_literal_and_member_chain() {
        let program = parse("const o = { a: 1, 'b': [2], c };\no.b[0] = o.a;");
        match &program.body[1] {
            Stmt::Expression {
                expr: Expr::Assign { target, .. },
                ..
            } => assert!(matches!(**target, Expr::Index { .. })),
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_unclosed_block_reports_error() {
        let err = Parser::new("if (x) {\n  y = 1;\n")
            .and_then(|mut p| p.parse_program())
            .expect_err("should fail");
        assert!(err.message.contains("'}'"));
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(Parser::new("1 = 2;").and_then(|mut p| p.parse_program()).is_err());
    }

    #[test]
    fn test_const_requires_initializer() {
        assert!(Parser::new("const x;").and_then(|mut p| p.parse_program()).is_err());
    }
}
