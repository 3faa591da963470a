//! Expression parsing implementation
//!
//! Binary operators are parsed one precedence level at a time, from `||` down
//! to multiplication; unary, postfix and member/call chains sit below that.
//! Arrow functions are recognized by looking past the parameter list for `=>`.

use super::ast::*;
use super::lexer::TokenKind;
use super::parse::{ParseError, Parser};
use std::rc::Rc;

type Level = fn(&mut Parser) -> Result<Expr, ParseError>;

impl Parser {
    /// Parse expression (top-level entry point)
    pub(crate) fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    /// Parse assignment or ternary (right-associative)
    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        if self.is_arrow_ahead() {
            return self.parse_arrow();
        }

        let expr = self.parse_ternary()?;
        let location = self.current_location();

        if self.match_token(&TokenKind::Eq) {
            Self::check_target(&expr)?;
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expr::Assign {
                target: Box::new(expr),
                value,
                location,
            });
        }

        let compound = match self.peek_kind() {
            TokenKind::PlusEq => Some(BinOp::Add),
            TokenKind::MinusEq => Some(BinOp::Sub),
            TokenKind::StarEq => Some(BinOp::Mul),
            TokenKind::SlashEq => Some(BinOp::Div),
            TokenKind::PercentEq => Some(BinOp::Mod),
            _ => None,
        };
        if let Some(op) = compound {
            self.advance();
            Self::check_target(&expr)?;
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expr::CompoundAssign {
                op,
                target: Box::new(expr),
                value,
                location,
            });
        }

        Ok(expr)
    }

    fn check_target(expr: &Expr) -> Result<(), ParseError> {
        match expr {
            Expr::Ident(..) | Expr::Member { .. } | Expr::Index { .. } => Ok(()),
            other => Err(ParseError {
                message: "Invalid assignment target".to_string(),
                location: other.location(),
            }),
        }
    }

    /// Parse ternary: condition ? then : else
    fn parse_ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.parse_or()?;
        if !self.check(&TokenKind::Question) {
            return Ok(condition);
        }
        let location = self.advance().location;
        let then_expr = self.parse_assignment()?;
        self.expect_token(&TokenKind::Colon, "Expected ':' in conditional expression")?;
        let else_expr = self.parse_assignment()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            location,
        })
    }

    /// One left-associative precedence level
    fn parse_level(&mut self, next: Level, ops: &[(TokenKind, BinOp)]) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        loop {
            let Some(op) = ops
                .iter()
                .find(|(kind, _)| self.check(kind))
                .map(|(_, op)| *op)
            else {
                return Ok(left);
            };
            let location = self.advance().location;
            let right = next(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                location,
            };
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_level(Self::parse_and, &[(TokenKind::OrOr, BinOp::Or)])
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_level(Self::parse_equality, &[(TokenKind::AndAnd, BinOp::And)])
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        self.parse_level(
            Self::parse_comparison,
            &[
                (TokenKind::EqEqEq, BinOp::StrictEq),
                (TokenKind::NotEqEq, BinOp::StrictNe),
                (TokenKind::EqEq, BinOp::Eq),
                (TokenKind::NotEq, BinOp::Ne),
            ],
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        self.parse_level(
            Self::parse_additive,
            &[
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Gt, BinOp::Gt),
                (TokenKind::Ge, BinOp::Ge),
            ],
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.parse_level(
            Self::parse_multiplicative,
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.parse_level(
            Self::parse_unary,
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Mod),
            ],
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let location = self.current_location();
        let op = match self.peek_kind() {
            TokenKind::Bang => Some(UnOp::Not),
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Plus => Some(UnOp::Plus),
            TokenKind::Typeof => Some(UnOp::Typeof),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = Box::new(self.parse_unary()?);
            return Ok(Expr::Unary {
                op,
                operand,
                location,
            });
        }

        let update = match self.peek_kind() {
            TokenKind::PlusPlus => Some(UpdateOp::Inc),
            TokenKind::MinusMinus => Some(UpdateOp::Dec),
            _ => None,
        };
        if let Some(op) = update {
            self.advance();
            let target = self.parse_unary()?;
            Self::check_target(&target)?;
            return Ok(Expr::Update {
                op,
                prefix: true,
                target: Box::new(target),
                location,
            });
        }

        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_call_member()?;
        let op = match self.peek_kind() {
            TokenKind::PlusPlus => UpdateOp::Inc,
            TokenKind::MinusMinus => UpdateOp::Dec,
            _ => return Ok(expr),
        };
        // `x\n++y` is two statements
        if self.at_line_break() {
            return Ok(expr);
        }
        let location = self.advance().location;
        Self::check_target(&expr)?;
        Ok(Expr::Update {
            op,
            prefix: false,
            target: Box::new(expr),
            location,
        })
    }

    fn parse_call_member(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            let location = self.current_location();
            if self.match_token(&TokenKind::Dot) {
                let property = self.expect_identifier("after '.'")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    location,
                };
            } else if self.match_token(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect_token(&TokenKind::RBracket, "Expected ']' after index")?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                    location,
                };
            } else if self.check(&TokenKind::LParen) {
                let args = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    location,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_token(&TokenKind::LParen, "Expected '('")?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_assignment()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_token(&TokenKind::RParen, "Expected ')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let location = token.location;
        match &token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(*n, location))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s.clone(), location))
            }
            TokenKind::True | TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(token.kind == TokenKind::True, location))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null(location))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if name == "undefined" {
                    Ok(Expr::Undefined(location))
                } else {
                    Ok(Expr::Ident(name.clone(), location))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect_token(&TokenKind::RParen, "Expected ')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Function => Ok(Expr::Function(Rc::new(self.parse_function()?))),
            TokenKind::New => {
                self.advance();
                let class_name = self.expect_identifier("after 'new'")?;
                let args = if self.check(&TokenKind::LParen) {
                    self.parse_arguments()?
                } else {
                    Vec::new()
                };
                Ok(Expr::New {
                    class_name,
                    args,
                    location,
                })
            }
            _ => Err(self.error(format!("Unexpected {}", token))),
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let location = self.advance().location;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_assignment()?);
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_token(&TokenKind::RBracket, "Expected ']' to close array literal")?;
        Ok(Expr::Array(items, location))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let location = self.advance().location;
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key_location = self.current_location();
            let key = match self.advance().kind {
                TokenKind::Ident(name) => name,
                TokenKind::Str(s) => s,
                TokenKind::Number(n) => crate::sandbox::memory::format_number(n),
                other => {
                    return Err(ParseError {
                        message: format!("Unexpected {} in object literal", other),
                        location: key_location,
                    })
                }
            };
            let value = if self.match_token(&TokenKind::Colon) {
                self.parse_assignment()?
            } else if self.check(&TokenKind::LParen) {
                // method shorthand
                let params = self.parse_params()?;
                let body = self.parse_block()?;
                Expr::Function(Rc::new(FunctionDef {
                    name: Some(key.clone()),
                    params,
                    body: FunctionBody::Block(body),
                    location: key_location,
                }))
            } else {
                Expr::Ident(key.clone(), key_location)
            };
            entries.push((key, value));
            if !self.match_token(&TokenKind::Comma) {
                break;
            }
        }
        self.expect_token(&TokenKind::RBrace, "Expected '}' to close object literal")?;
        Ok(Expr::Object(entries, location))
    }

    /// `x =>` or `( ... ) =>`
    fn is_arrow_ahead(&self) -> bool {
        match self.peek_kind() {
            TokenKind::Ident(_) => matches!(
                self.peek_ahead(1).map(|t| &t.kind),
                Some(TokenKind::FatArrow)
            ),
            TokenKind::LParen => {
                let mut depth = 0usize;
                let mut offset = 0;
                while let Some(token) = self.peek_ahead(offset) {
                    match token.kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return matches!(
                                    self.peek_ahead(offset + 1).map(|t| &t.kind),
                                    Some(TokenKind::FatArrow)
                                );
                            }
                        }
                        TokenKind::Eof => return false,
                        _ => {}
                    }
                    offset += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn parse_arrow(&mut self) -> Result<Expr, ParseError> {
        let location = self.current_location();
        let params = if self.check(&TokenKind::LParen) {
            self.parse_params()?
        } else {
            vec![self.expect_identifier("as arrow parameter")?]
        };
        self.expect_token(&TokenKind::FatArrow, "Expected '=>'")?;
        let body = if self.check(&TokenKind::LBrace) {
            FunctionBody::Block(self.parse_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Expr::Function(Rc::new(FunctionDef {
            name: None,
            params,
            body,
            location,
        })))
    }
}
