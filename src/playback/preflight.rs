//! Static checks run before any backend is engaged
//!
//! A single pass over the characters tracks comments, string literals and
//! the open bracket stack. Only structural problems are reported; anything
//! that scans cleanly is left to the backend.

use crate::errors::TraceError;
use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    /// Ends at the closing quote; a newline first is an error
    Line(char),
    /// Backtick template or raw string, may span lines
    Multi(char),
    /// Python `'''` / `"""`
    Triple(char),
}

fn bracket_message(open: char) -> &'static str {
    match open {
        '{' | '}' => "Unbalanced braces",
        '(' | ')' => "Unbalanced parentheses",
        _ => "Unbalanced brackets",
    }
}

fn opener_for(close: char) -> char {
    match close {
        '}' => '{',
        ')' => '(',
        _ => '[',
    }
}

fn starts_with_at(chars: &[char], i: usize, pat: &str) -> bool {
    let mut j = i;
    for p in pat.chars() {
        if chars.get(j) != Some(&p) {
            return false;
        }
        j += 1;
    }
    true
}

/// Length of a character literal starting at `i`, or `None` when the quote
/// is a lone apostrophe (a Rust lifetime, for instance)
fn char_literal_len(chars: &[char], i: usize) -> Option<usize> {
    match chars.get(i + 1) {
        Some('\\') => {
            // '\n', '\x41', '\u{1F600}'
            (i + 3..chars.len().min(i + 12))
                .find(|&j| chars[j] == '\'')
                .map(|j| j - i + 1)
        }
        Some('\n') | None => None,
        Some(_) if chars.get(i + 2) == Some(&'\'') => Some(3),
        Some(_) => None,
    }
}

/// Check bracket balance and literal termination for `source`.
///
/// Returns a `SyntaxIssue` carrying the 1-based line of the problem.
pub fn check(source: &str, language: Language) -> Result<(), TraceError> {
    let chars: Vec<char> = source.chars().collect();
    let line_comments = language.line_comments();
    let block_comments = language.has_block_comments();
    let backticks = matches!(
        language,
        Language::JavaScript | Language::TypeScript | Language::Go
    );

    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }

        if line_comments.iter().any(|p| starts_with_at(&chars, i, p)) {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if block_comments && starts_with_at(&chars, i, "/*") {
            let start = line;
            i += 2;
            loop {
                if i >= chars.len() {
                    return Err(TraceError::syntax("Unterminated block comment", Some(start)));
                }
                if starts_with_at(&chars, i, "*/") {
                    i += 2;
                    break;
                }
                if chars[i] == '\n' {
                    line += 1;
                }
                i += 1;
            }
            continue;
        }

        let quote = match c {
            '"' | '\''
                if language == Language::Python
                    && starts_with_at(&chars, i, &c.to_string().repeat(3)) =>
            {
                Some(Quote::Triple(c))
            }
            '"' => Some(Quote::Line('"')),
            '\'' if language.single_quote_is_char() => {
                if let Some(len) = char_literal_len(&chars, i) {
                    i += len;
                } else {
                    i += 1;
                }
                continue;
            }
            '\'' => Some(Quote::Line('\'')),
            '`' if backticks => Some(Quote::Multi('`')),
            _ => None,
        };

        if let Some(quote) = quote {
            let start = line;
            let escape = |i: &mut usize, line: &mut usize| {
                if chars.get(*i + 1) == Some(&'\n') {
                    *line += 1;
                }
                *i += 2;
            };
            i += match quote {
                Quote::Triple(_) => 3,
                _ => 1,
            };
            loop {
                let Some(&ch) = chars.get(i) else {
                    return Err(TraceError::syntax("Unterminated string literal", Some(start)));
                };
                match quote {
                    Quote::Line(q) => {
                        if ch == '\n' {
                            return Err(TraceError::syntax("Unterminated string literal", Some(start)));
                        }
                        if ch == '\\' {
                            escape(&mut i, &mut line);
                            continue;
                        }
                        if ch == q {
                            i += 1;
                            break;
                        }
                    }
                    Quote::Multi(q) => {
                        // Go raw strings have no escapes
                        if ch == '\\' && language != Language::Go {
                            escape(&mut i, &mut line);
                            continue;
                        }
                        if ch == q {
                            i += 1;
                            break;
                        }
                    }
                    Quote::Triple(q) => {
                        if ch == '\\' {
                            escape(&mut i, &mut line);
                            continue;
                        }
                        if starts_with_at(&chars, i, &q.to_string().repeat(3)) {
                            i += 3;
                            break;
                        }
                    }
                }
                if ch == '\n' {
                    line += 1;
                }
                i += 1;
            }
            continue;
        }

        match c {
            '{' | '(' | '[' => stack.push((c, line)),
            '}' | ')' | ']' => match stack.pop() {
                Some((open, _)) if open == opener_for(c) => {}
                Some((open, open_line)) => {
                    return Err(TraceError::syntax(bracket_message(open), Some(open_line)))
                }
                None => return Err(TraceError::syntax(bracket_message(c), Some(line))),
            },
            _ => {}
        }
        i += 1;
    }

    match stack.pop() {
        Some((open, open_line)) => Err(TraceError::syntax(bracket_message(open), Some(open_line))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn issue(source: &str, language: Language) -> (String, Option<usize>) {
        match check(source, language) {
            Err(err) => {
                assert_eq!(err.kind, ErrorKind::SyntaxIssue);
                (err.message, err.line)
            }
            Ok(()) => panic!("Expected a pre-flight issue for {:?}", source),
        }
    }

    #[test]
    fn test_balanced_programs_pass() {
        let js = "function f(a) {\n  return [a, { k: (1 + 2) }];\n}\n";
        assert!(check(js, Language::JavaScript).is_ok());
        let py = "def f(a):\n    return [a, {'k': (1 + 2)}]\n";
        assert!(check(py, Language::Python).is_ok());
    }

    #[test]
    fn test_unmatched_open_brace() {
        let (msg, line) = issue("int main() {\n  int x = 1;\n", Language::C);
        assert_eq!(msg, "Unbalanced braces");
        assert_eq!(line, Some(1));
    }

    #[test]
    fn test_stray_closers() {
        assert_eq!(issue("x = 1)\n", Language::Python).0, "Unbalanced parentheses");
        assert_eq!(issue("let a = 1];", Language::JavaScript).0, "Unbalanced brackets");
    }

    #[test]
    fn test_brackets_inside_strings_and_comments_ignored() {
        let src = "let s = \"{[(\"; // )\n/* } */ let t = '}';";
        assert!(check(src, Language::JavaScript).is_ok());
        let py = "s = '(' # )\nt = \"\"\"\n{\n\"\"\"\n";
        assert!(check(py, Language::Python).is_ok());
    }

    #[test]
    fn test_unterminated_literals() {
        let (msg, line) = issue("let x = 1;\nlet s = \"abc;\n", Language::JavaScript);
        assert_eq!(msg, "Unterminated string literal");
        assert_eq!(line, Some(2));

        let (msg, line) = issue("int x;\n/* never closed\n", Language::Java);
        assert_eq!(msg, "Unterminated block comment");
        assert_eq!(line, Some(2));

        assert_eq!(issue("s = '''open\n", Language::Python).0, "Unterminated string literal");
    }

    #[test]
    fn test_language_specific_quotes() {
        // Rust lifetimes and char literals are not strings
        let rust = "fn f<'a>(s: &'a str) -> char {\n    '}'\n}\n";
        assert!(check(rust, Language::Rust).is_ok());
        // template literals may span lines
        let js = "let s = `a\n{b`;";
        assert!(check(js, Language::JavaScript).is_ok());
        // Python has no block comments
        assert!(check("x = 2 /* 3\n", Language::Python).is_ok());
        // PHP accepts hash comments
        assert!(check("<?php\n$a = 1; # {\n", Language::Php).is_ok());
    }
}
