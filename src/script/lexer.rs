//! Lexer for the interpreted JavaScript subset
//!
//! Converts raw source text into a flat [`Token`] stream consumed by the
//! parser. Every token carries its [`SourceLocation`], so the parser can tell
//! when a statement ends at a line break without a semicolon.

use super::ast::SourceLocation;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Number(f64),
    Str(String),
    Ident(String),

    // Keywords
    Let,
    Const,
    Var,
    Function,
    Return,
    If,
    Else,
    While,
    Do,
    For,
    Break,
    Continue,
    True,
    False,
    Null,
    Typeof,
    Throw,
    New,

    // Arithmetic
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %

    // Comparison
    EqEq,     // ==
    EqEqEq,   // ===
    NotEq,    // !=
    NotEqEq,  // !==
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=

    // Logical
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    // Assignment
    Eq,        // =
    PlusEq,    // +=
    MinusEq,   // -=
    StarEq,    // *=
    SlashEq,   // /=
    PercentEq, // %=

    PlusPlus,   // ++
    MinusMinus, // --

    Dot,      // .
    Question, // ?
    Colon,    // :
    FatArrow, // =>

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::Str(s) => write!(f, "string \"{}\"", s),
            TokenKind::Ident(s) => write!(f, "identifier '{}'", s),
            TokenKind::Eof => write!(f, "end of input"),
            other => write!(f, "'{}'", other.symbol()),
        }
    }
}

impl TokenKind {
    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::Let => "let",
            TokenKind::Const => "const",
            TokenKind::Var => "var",
            TokenKind::Function => "function",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Do => "do",
            TokenKind::For => "for",
            TokenKind::Break => "break",
            TokenKind::Continue => "continue",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Null => "null",
            TokenKind::Typeof => "typeof",
            TokenKind::Throw => "throw",
            TokenKind::New => "new",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::EqEq => "==",
            TokenKind::EqEqEq => "===",
            TokenKind::NotEq => "!=",
            TokenKind::NotEqEq => "!==",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::Eq => "=",
            TokenKind::PlusEq => "+=",
            TokenKind::MinusEq => "-=",
            TokenKind::StarEq => "*=",
            TokenKind::SlashEq => "/=",
            TokenKind::PercentEq => "%=",
            TokenKind::PlusPlus => "++",
            TokenKind::MinusMinus => "--",
            TokenKind::Dot => ".",
            TokenKind::Question => "?",
            TokenKind::Colon => ":",
            TokenKind::FatArrow => "=>",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Number(_) | TokenKind::Str(_) | TokenKind::Ident(_) | TokenKind::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

/// Lexer error type
#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Lexer error at line {}, column {}: {}",
            self.location.line, self.location.column, self.message
        )
    }
}

impl std::error::Error for LexError {}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments()?;

            if self.is_at_end() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    location: self.current_location(),
                });
                break;
            }

            let location = self.current_location();
            let kind = self.next_token()?;
            tokens.push(Token { kind, location });
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<TokenKind, LexError> {
        let loc = self.current_location();
        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of input".to_string(),
            location: loc,
        })?;

        let kind = match ch {
            '"' | '\'' | '`' => return self.string_literal(ch, loc),
            '0'..='9' => return self.number_literal(ch, loc),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                return self.number_literal(ch, loc)
            }
            'a'..='z' | 'A'..='Z' | '_' | '$' => return Ok(self.identifier_or_keyword(ch)),

            '+' => self.pick(&[("+", TokenKind::PlusPlus), ("=", TokenKind::PlusEq)], TokenKind::Plus),
            '-' => self.pick(
                &[("-", TokenKind::MinusMinus), ("=", TokenKind::MinusEq)],
                TokenKind::Minus,
            ),
            '*' => self.pick(&[("=", TokenKind::StarEq)], TokenKind::Star),
            '/' => self.pick(&[("=", TokenKind::SlashEq)], TokenKind::Slash),
            '%' => self.pick(&[("=", TokenKind::PercentEq)], TokenKind::Percent),
            '=' => self.pick(
                &[
                    ("==", TokenKind::EqEqEq),
                    ("=", TokenKind::EqEq),
                    (">", TokenKind::FatArrow),
                ],
                TokenKind::Eq,
            ),
            '!' => self.pick(
                &[("==", TokenKind::NotEqEq), ("=", TokenKind::NotEq)],
                TokenKind::Bang,
            ),
            '<' => self.pick(&[("=", TokenKind::Le)], TokenKind::Lt),
            '>' => self.pick(&[("=", TokenKind::Ge)], TokenKind::Gt),
            '&' if self.peek() == Some('&') => {
                self.advance();
                TokenKind::AndAnd
            }
            '|' if self.peek() == Some('|') => {
                self.advance();
                TokenKind::OrOr
            }
            '.' => TokenKind::Dot,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,

            _ => {
                return Err(LexError {
                    message: format!("Unexpected character: '{}'", ch),
                    location: loc,
                })
            }
        };
        Ok(kind)
    }

    /// Longest matching continuation wins; candidates are listed longest first
    fn pick(&mut self, candidates: &[(&str, TokenKind)], single: TokenKind) -> TokenKind {
        for (rest, kind) in candidates {
            let matches = rest
                .chars()
                .enumerate()
                .all(|(i, c)| self.input.get(self.position + i) == Some(&c));
            if matches {
                for _ in 0..rest.chars().count() {
                    self.advance();
                }
                return kind.clone();
            }
        }
        single
    }

    fn string_literal(&mut self, quote: char, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let mut string = String::new();

        while let Some(ch) = self.peek() {
            if ch == quote {
                self.advance();
                return Ok(TokenKind::Str(string));
            }
            if ch == '\n' && quote != '`' {
                break;
            }
            if quote == '`' && ch == '$' && self.peek_next() == Some('{') {
                return Err(LexError {
                    message: "Template substitutions are not supported".to_string(),
                    location: self.current_location(),
                });
            }

            if ch == '\\' {
                self.advance();
                let escaped = self.advance().ok_or_else(|| LexError {
                    message: "Unterminated string literal".to_string(),
                    location: loc,
                })?;
                string.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(LexError {
            message: "Unterminated string literal".to_string(),
            location: loc,
        })
    }

    fn number_literal(&mut self, first: char, loc: SourceLocation) -> Result<TokenKind, LexError> {
        let mut text = String::from(first);
        while let Some(ch) = self.peek() {
            let fraction = ch == '.'
                && !text.contains('.')
                && self.peek_next().is_some_and(|c| c.is_ascii_digit());
            if ch.is_ascii_digit() || ch == '_' || fraction {
                if ch != '_' {
                    text.push(ch);
                }
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek_next()
                    .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+')
            {
                text.push(ch);
                self.advance();
                if let Some(sign) = self.peek().filter(|c| *c == '-' || *c == '+') {
                    text.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }
        text.parse::<f64>().map(TokenKind::Number).map_err(|_| LexError {
            message: format!("Invalid number literal: {}", text),
            location: loc,
        })
    }

    fn identifier_or_keyword(&mut self, first: char) -> TokenKind {
        let mut ident = String::from(first);
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "var" => TokenKind::Var,
            "function" => TokenKind::Function,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "typeof" => TokenKind::Typeof,
            "throw" => TokenKind::Throw,
            "new" => TokenKind::New,
            _ => TokenKind::Ident(ident),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek_next() == Some('/') => {
                    while let Some(ch) = self.peek() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek_next() == Some('*') => {
                    let loc = self.current_location();
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => {
                                return Err(LexError {
                                    message: "Unterminated block comment".to_string(),
                                    location: loc,
                                })
                            }
                            Some('*') if self.peek_next() == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.input.get(self.position).copied()?;
        self.position += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .expect("tokenize")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators_prefer_longest_match() {
        assert_eq!(
            kinds("a === b !== c => d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::EqEqEq,
                TokenKind::Ident("b".into()),
                TokenKind::NotEqEq,
                TokenKind::Ident("c".into()),
                TokenKind::FatArrow,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_and_lines() {
        let tokens = Lexer::new("let x = 1; // one\n/* two\n */ x++")
            .tokenize()
            .expect("tokenize");
        let plus = tokens
            .iter()
            .find(|t| t.kind == TokenKind::PlusPlus)
            .expect("++ token");
        assert_eq!(plus.location.line, 3);
    }

    #[test]
    fn test_strings_and_numbers() {
        assert_eq!(
            kinds("'a\\n' `b` 1.5e2 .5"),
            vec![
                TokenKind::Str("a\n".into()),
                TokenKind::Str("b".into()),
                TokenKind::Number(150.0),
                TokenKind::Number(0.5),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_start() {
        let err = Lexer::new("let s = 'oops\nlet t = 1")
            .tokenize()
            .expect_err("should fail");
        assert_eq!(err.location.line, 1);
        assert!(err.message.contains("Unterminated"));
    }

    #[test]
    fn test_template_substitution_rejected() {
        assert!(Lexer::new("`a ${b}`").tokenize().is_err());
    }
}
