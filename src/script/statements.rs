//! Statement parsing implementation
//!
//! All parsing methods are implemented as `pub(crate)` methods on the
//! [`Parser`] struct.

use super::ast::*;
use super::lexer::TokenKind;
use super::parse::{ParseError, Parser};
use std::rc::Rc;

impl Parser {
    pub(crate) fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let location = self.current_location();
        match self.peek_kind() {
            TokenKind::Let | TokenKind::Const | TokenKind::Var => {
                let stmt = self.parse_var_decl()?;
                self.consume_semicolon("after variable declaration")?;
                Ok(stmt)
            }
            TokenKind::Function
                if matches!(self.peek_ahead(1).map(|t| &t.kind), Some(TokenKind::Ident(_))) =>
            {
                let def = self.parse_function()?;
                Ok(Stmt::FunctionDecl(Rc::new(def)))
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Break => {
                self.advance();
                self.consume_semicolon("after 'break'")?;
                Ok(Stmt::Break { location })
            }
            TokenKind::Continue => {
                self.advance();
                self.consume_semicolon("after 'continue'")?;
                Ok(Stmt::Continue { location })
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semicolon)
                    || self.check(&TokenKind::RBrace)
                    || self.is_at_end()
                    || self.at_line_break()
                {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume_semicolon("after return value")?;
                Ok(Stmt::Return { value, location })
            }
            TokenKind::Throw => {
                self.advance();
                let value = self.parse_expression()?;
                self.consume_semicolon("after throw value")?;
                Ok(Stmt::Throw { value, location })
            }
            TokenKind::LBrace => {
                let body = self.parse_block()?;
                Ok(Stmt::Block { body, location })
            }
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::Empty { location })
            }
            _ => {
                let expr = self.parse_expression()?;
                self.consume_semicolon("after expression")?;
                Ok(Stmt::Expression { expr, location })
            }
        }
    }

    fn decl_kind(&mut self) -> Result<DeclKind, ParseError> {
        let kind = match self.peek_kind() {
            TokenKind::Let => DeclKind::Let,
            TokenKind::Const => DeclKind::Const,
            TokenKind::Var => DeclKind::Var,
            _ => return Err(self.error(format!("Expected declaration, found {}", self.peek()))),
        };
        self.advance();
        Ok(kind)
    }

    /// `let a = 1, b` without the terminator
    pub(crate) fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        let location = self.current_location();
        let kind = self.decl_kind()?;
        let mut declarations = Vec::new();
        loop {
            let name = self.expect_identifier("in declaration")?;
            let init = if self.match_token(&TokenKind::Eq) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            if kind == DeclKind::Const && init.is_none() {
                return Err(self.error("Missing initializer in const declaration"));
            }
            declarations.push((name, init));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        Ok(Stmt::VarDecl {
            kind,
            declarations,
            location,
        })
    }

    pub(crate) fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_token(&TokenKind::LBrace, "Expected '{'")?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            body.push(self.parse_statement()?);
        }
        self.expect_token(&TokenKind::RBrace, "Expected '}' to close block")?;
        Ok(body)
    }

    /// A braced block, or a single statement used as a body
    fn parse_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if self.check(&TokenKind::LBrace) {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_condition(&mut self, ctx: &str) -> Result<Expr, ParseError> {
        self.expect_token(&TokenKind::LParen, &format!("Expected '(' after '{}'", ctx))?;
        let condition = self.parse_expression()?;
        self.expect_token(&TokenKind::RParen, &format!("Expected ')' after {} condition", ctx))?;
        Ok(condition)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let location = self.advance().location;
        let condition = self.parse_condition("if")?;
        let then_branch = self.parse_body()?;
        let else_branch = if self.match_token(&TokenKind::Else) {
            Some(self.parse_body()?)
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            location,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let location = self.advance().location;
        let condition = self.parse_condition("while")?;
        let body = self.parse_body()?;
        Ok(Stmt::While {
            condition,
            body,
            location,
        })
    }

    fn parse_do_while(&mut self) -> Result<Stmt, ParseError> {
        let location = self.advance().location;
        let body = self.parse_body()?;
        self.expect_token(&TokenKind::While, "Expected 'while' after do body")?;
        let condition = self.parse_condition("while")?;
        self.match_token(&TokenKind::Semicolon);
        Ok(Stmt::DoWhile {
            body,
            condition,
            location,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let location = self.advance().location;
        self.expect_token(&TokenKind::LParen, "Expected '(' after 'for'")?;

        let is_for_of = matches!(
            self.peek_kind(),
            TokenKind::Let | TokenKind::Const | TokenKind::Var
        ) && matches!(self.peek_ahead(1).map(|t| &t.kind), Some(TokenKind::Ident(_)))
            && matches!(self.peek_ahead(2).map(|t| &t.kind), Some(TokenKind::Ident(word)) if word == "of");

        if is_for_of {
            let kind = self.decl_kind()?;
            let name = self.expect_identifier("in for...of")?;
            self.advance(); // 'of'
            let iterable = self.parse_expression()?;
            self.expect_token(&TokenKind::RParen, "Expected ')' after for...of iterable")?;
            let body = self.parse_body()?;
            return Ok(Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
                location,
            });
        }

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else if matches!(
            self.peek_kind(),
            TokenKind::Let | TokenKind::Const | TokenKind::Var
        ) {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let expr_location = self.current_location();
            let expr = self.parse_expression()?;
            Some(Box::new(Stmt::Expression {
                expr,
                location: expr_location,
            }))
        };
        self.expect_token(&TokenKind::Semicolon, "Expected ';' after for initializer")?;

        let condition = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_token(&TokenKind::Semicolon, "Expected ';' after for condition")?;

        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.expect_token(&TokenKind::RParen, "Expected ')' after for clauses")?;

        let body = self.parse_body()?;
        Ok(Stmt::For {
            init,
            condition,
            update,
            body,
            location,
        })
    }

    /// `function name(params) { ... }`; the name is optional in expressions
    pub(crate) fn parse_function(&mut self) -> Result<FunctionDef, ParseError> {
        let location = self.expect_token(&TokenKind::Function, "Expected 'function'")?.location;
        let name = match self.peek_kind() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name,
            params,
            body: FunctionBody::Block(body),
            location,
        })
    }

    pub(crate) fn parse_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_token(&TokenKind::LParen, "Expected '(' before parameters")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.expect_identifier("in parameter list")?);
                if !self.match_token(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect_token(&TokenKind::RParen, "Expected ')' after parameters")?;
        Ok(params)
    }
}
