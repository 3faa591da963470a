//! Line patterns and text helpers for the heuristic simulator
//!
//! Every pattern is anchored against a single comment-stripped, trimmed line
//! with any trailing `;` removed.

use crate::language::Language;
use once_cell::sync::Lazy;
use regex::Regex;

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid simulator pattern {pattern}: {e}"))
}

/// `a[k] = v`
pub(crate) static INDEX_ASSIGN: Lazy<Regex> =
    Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\s*\[\s*([^\]]+?)\s*\]\s*=\s*([^=].*)$"));

/// `a.k = v`
pub(crate) static PROPERTY_ASSIGN: Lazy<Regex> =
    Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\.([A-Za-z_$][\w$]*)\s*=\s*([^=].*)$"));

/// `a.push(v)`, `a.append(v)`, `a.add(v)`, `a.pop()`
pub(crate) static MUTATING_METHOD: Lazy<Regex> =
    Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\.(push|append|add|pop)\s*\((.*)\)$"));

/// `let x = v`, `const x = v`, `var x int = v`, `let mut x: i32 = v`, `val x = v`
pub(crate) static KEYWORD_DECL: Lazy<Regex> = Lazy::new(|| {
    regex(r"^(?:let|const|var|val)\s+(?:mut\s+)?([A-Za-z_$][\w$]*)\s*(?::\s*[^=]+?)?\s*(?:[A-Za-z_][\w\[\]*.]*\s*)?=\s*([^=].*)$")
});

/// `let x` / `var x` with no initializer
pub(crate) static KEYWORD_DECL_EMPTY: Lazy<Regex> =
    Lazy::new(|| regex(r"^(?:let|var)\s+([A-Za-z_$][\w$]*)$"));

/// Go short declaration `x := v`
pub(crate) static SHORT_DECL: Lazy<Regex> =
    Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\s*:=\s*(.+)$"));

/// C-family typed declaration `int x = v`, `final String[] names = v`, `char *s = v`
pub(crate) static TYPED_DECL: Lazy<Regex> = Lazy::new(|| {
    regex(r"^((?:[A-Za-z_][\w:.]*(?:<[^=]*?>)?(?:\[\s*\])*[*&]*\s+)+)[*&]*([A-Za-z_$][\w$]*)\s*(?:\[[^\]]*\])*\s*=\s*([^=].*)$")
});

/// `x += v` and friends
pub(crate) static COMPOUND_ASSIGN: Lazy<Regex> =
    Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\s*(\+|-|\*|/|%)=\s*(.+)$"));

pub(crate) static POSTFIX_STEP: Lazy<Regex> =
    Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\s*(\+\+|--)$"));

pub(crate) static PREFIX_STEP: Lazy<Regex> =
    Lazy::new(|| regex(r"^(\+\+|--)\s*([A-Za-z_$][\w$]*)$"));

/// `x = v`
pub(crate) static BARE_ASSIGN: Lazy<Regex> =
    Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\s*=\s*([^=].*)$"));

/// `f(args)` as a whole expression; the caller checks the parens balance
pub(crate) static CALL: Lazy<Regex> = Lazy::new(|| regex(r"^([A-Za-z_$][\w$]*)\s*\((.*)\)$"));

/// `name(params) ... {` anywhere on a line
pub(crate) static BRACE_FUNCTION: Lazy<Regex> =
    Lazy::new(|| regex(r"([A-Za-z_$][\w$]*)\s*\(([^()]*)\)[^{};=()]*\{"));

/// `def name(params):`
pub(crate) static DEF_FUNCTION: Lazy<Regex> =
    Lazy::new(|| regex(r"^(?:async\s+)?def\s+([A-Za-z_]\w*)\s*\((.*)\)\s*(?:->\s*[^:]+)?:$"));

pub(crate) static RETURN: Lazy<Regex> = Lazy::new(|| regex(r"^return\s+(.+?);?$"));

pub(crate) static NUMBER: Lazy<Regex> =
    Lazy::new(|| regex(r"^-?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?([fFdDlLuU]*)$"));

/// Go `[]int{...}` / `[3]int{...}`
pub(crate) static GO_SLICE: Lazy<Regex> =
    Lazy::new(|| regex(r"^\[\d*\][\w.*]+\s*\{(.*)\}$"));

/// Java/C# `new int[]{...}`
pub(crate) static NEW_ARRAY: Lazy<Regex> =
    Lazy::new(|| regex(r"^new\s+[\w.<>]+\s*\[\s*\]\s*\{(.*)\}$"));

/// Rust `vec![...]`, Kotlin `listOf(...)` and friends: element lists
pub(crate) static LIST_CALL: Lazy<Regex> = Lazy::new(|| {
    regex(r"^(?:vec!\s*\[(.*)\]|(?:listOf|mutableListOf|arrayOf|arrayListOf|setOf|List\.of|Arrays\.asList)\s*\((.*)\))$")
});

/// `new Foo(...)`
pub(crate) static CONSTRUCTOR: Lazy<Regex> =
    Lazy::new(|| regex(r"^new\s+([A-Za-z_][\w.]*)"));

/// Collection factories with no literal elements
pub(crate) static COLLECTION_CALL: Lazy<Regex> = Lazy::new(|| {
    regex(r"^(list|dict|set|tuple|deque|defaultdict|Array|Object|Map|Set|ArrayList|LinkedList|HashMap|HashSet|TreeMap|Vec::new|Vec::with_capacity|HashMap::new|make|mutableMapOf|mapOf|hashMapOf)\s*(?:<[^>]*>)?\s*[(!]")
});

/// Words that look like a type in [`TYPED_DECL`] but start a statement
pub(crate) const STATEMENT_KEYWORDS: &[&str] = &[
    "return", "else", "throw", "yield", "await", "delete", "case", "go", "defer", "echo",
    "print", "typeof", "new", "goto", "in", "not", "and", "or", "elif", "if", "while", "for",
];

/// Call-like words that never open a function scope
pub(crate) const SCOPE_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "foreach", "function", "elif", "else", "do",
    "try", "synchronized", "using", "lock", "fixed", "match", "when", "with", "return",
];

/// Calls that are never visualized as a frame
pub(crate) const BUILTIN_CALLS: &[&str] = &[
    "print", "println", "printf", "puts", "echo", "len", "range", "input", "int", "str",
    "float", "bool", "list", "dict", "set", "tuple", "sorted", "sum", "min", "max", "abs",
    "isinstance", "type", "enumerate", "zip", "map", "filter", "open", "parseInt",
    "parseFloat", "String", "Number", "Boolean", "require", "alert", "setTimeout", "sizeof",
    "malloc", "free", "exit", "scanf", "assert", "super", "this", "if", "while", "for",
    "switch", "return", "catch", "function", "def", "elif", "not", "del", "await", "typeof",
    "listOf", "mutableListOf", "arrayOf", "setOf", "mapOf", "make", "new", "panic",
];

/// Leading whitespace width, tabs counting 4 columns
pub(crate) fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for c in line.chars() {
        match c {
            ' ' => width += 1,
            '\t' => width += 4,
            _ => break,
        }
    }
    width
}

/// Count `{` and `}` on a raw line, with no string or comment awareness
pub(crate) fn count_braces(line: &str) -> (usize, usize) {
    let opens = line.matches('{').count();
    let closes = line.matches('}').count();
    (opens, closes)
}

/// Whether the trimmed line is empty or only a comment
pub(crate) fn is_blank_or_comment(line: &str, language: Language) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return true;
    }
    if language.line_comments().iter().any(|p| trimmed.starts_with(p)) {
        return true;
    }
    language.has_block_comments()
        && (trimmed.starts_with("/*")
            || trimmed == "*"
            || trimmed.starts_with("* ")
            || trimmed.starts_with("*/")
            || trimmed.ends_with("*/") && !trimmed.contains(';'))
}

/// Cut a trailing line comment that sits outside string literals
pub(crate) fn strip_comment(line: &str, language: Language) -> &str {
    let prefixes = language.line_comments();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '`' => quote = Some(c),
            '\'' if !language.single_quote_is_char() || line[i + 1..].contains('\'') => {
                quote = Some(c)
            }
            _ => {
                let rest = &line[i..];
                if prefixes.iter().any(|p| rest.starts_with(p)) {
                    return &line[..i];
                }
                if language.has_block_comments() && rest.starts_with("/*") {
                    return &line[..i];
                }
            }
        }
    }
    line
}

/// Split on `sep` at nesting depth zero, outside string literals.
///
/// Empty trailing segments (from `[1, 2, ]`) are dropped.
pub(crate) fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut current = String::new();

    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth -= 1;
                current.push(c);
            }
            _ if c == sep && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Find `sep` at depth zero outside strings, returning its byte offset
pub(crate) fn find_top_level(text: &str, sep: &str) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ if depth == 0 && text[i..].starts_with(sep) => return Some(i),
            _ => {}
        }
    }
    None
}

/// Whether the bracket opening `text` is closed by its final character
pub(crate) fn wraps_whole(text: &str, open: char, close: char) -> bool {
    if !text.starts_with(open) || !text.ends_with(close) {
        return false;
    }
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let last = text.len() - close.len_utf8();
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c == '"' || c == '\'' || c == '`' {
            quote = Some(c);
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return i == last;
            }
        }
    }
    false
}

/// Inner text of a quoted literal with simple escapes resolved
pub(crate) fn unquote(text: &str) -> Option<String> {
    let mut chars = text.chars();
    let first = chars.next()?;
    if !matches!(first, '"' | '\'' | '`') || text.len() < 2 || !text.ends_with(first) {
        return None;
    }
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped {
            out.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == first {
            // an unescaped quote in the middle means this was two literals
            return None;
        } else {
            out.push(c);
        }
    }
    Some(out)
}

/// Parameter names from a parameter list, per the language's convention
pub(crate) fn param_names(params: &str, language: Language) -> Vec<String> {
    split_top_level(params, ',')
        .into_iter()
        .filter_map(|param| {
            let head = param.split('=').next().unwrap_or("").trim();
            let head = head.split(':').next().unwrap_or("").trim();
            let words: Vec<&str> = head
                .split(|c: char| c.is_whitespace() || c == '*' || c == '&')
                .filter(|w| !w.is_empty() && *w != "..." && *w != "const" && *w != "final")
                .collect();
            let word = if language.param_name_first() {
                words.first()
            } else {
                words.last()
            }?;
            let name = word.trim_start_matches("...").trim_end_matches("[]");
            if name.is_empty() || name == "void" {
                None
            } else {
                Some(name.trim_start_matches('*').to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_counts_tabs_as_four() {
        assert_eq!(indent_width("\t  x = 1"), 6);
        assert_eq!(indent_width("x"), 0);
    }

    #[test]
    fn test_strip_comment_respects_strings() {
        assert_eq!(strip_comment("x = \"a // b\" // note", Language::JavaScript), "x = \"a // b\" ");
        assert_eq!(strip_comment("x = '#' # note", Language::Python), "x = '#' ");
    }

    #[test]
    fn test_split_top_level_keeps_nesting() {
        assert_eq!(
            split_top_level("1, [2, 3], \"a,b\", f(4, 5)", ','),
            vec!["1", "[2, 3]", "\"a,b\"", "f(4, 5)"]
        );
    }

    #[test]
    fn test_wraps_whole() {
        assert!(wraps_whole("[1, [2]]", '[', ']'));
        assert!(!wraps_whole("[1] + [2]", '[', ']'));
    }

    #[test]
    fn test_param_names_by_convention() {
        assert_eq!(param_names("int a, String[] b", Language::Java), vec!["a", "b"]);
        assert_eq!(param_names("a int, b int", Language::Go), vec!["a", "b"]);
        assert_eq!(param_names("a, b=2", Language::Python), vec!["a", "b"]);
        assert_eq!(param_names("a: Int, b: Int", Language::Kotlin), vec!["a", "b"]);
        assert_eq!(param_names("void", Language::C), Vec::<String>::new());
    }

    #[test]
    fn test_brace_function_pattern() {
        let caps = BRACE_FUNCTION
            .captures("public static int add(int a, int b) {")
            .expect("should match");
        assert_eq!(&caps[1], "add");
        assert_eq!(&caps[2], "int a, int b");
    }
}
