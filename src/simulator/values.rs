//! Literal classification and a small arithmetic evaluator
//!
//! The simulator never executes code; it only recognizes literal text and
//! folds simple expressions over numbers, strings and already-bound names.
//! Anything it can't fold is kept as the raw source text.

use super::patterns::{self, split_top_level, unquote, wraps_whole};

/// A value the simulator can reason about
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Number(f64),
    /// String contents, without quotes
    Text(String),
    /// `true`, `None`, `nil` ... kept verbatim
    Keyword(String),
    /// Heap id of an existing object
    Ref(String),
    /// Source text that could not be evaluated
    Raw(String),
}

impl Operand {
    /// Literal text stored in a primitive variable
    pub(crate) fn display(&self) -> String {
        match self {
            Operand::Number(n) => format_number(*n),
            Operand::Text(s) => format!("\"{}\"", s),
            Operand::Keyword(s) | Operand::Ref(s) | Operand::Raw(s) => s.clone(),
        }
    }

    /// Text as it would be printed
    pub(crate) fn printed(&self) -> String {
        match self {
            Operand::Text(s) => s.clone(),
            other => other.display(),
        }
    }

    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Operand::Number(n) => Some(*n),
            Operand::Raw(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Text used when concatenating onto a string
    fn concat_text(&self) -> Option<String> {
        match self {
            Operand::Number(n) => Some(format_number(*n)),
            Operand::Text(s) | Operand::Keyword(s) => Some(s.clone()),
            Operand::Ref(_) | Operand::Raw(_) => None,
        }
    }

    /// Key used when indexing an object
    pub(crate) fn key(&self) -> String {
        self.printed()
    }
}

/// Integers print without a fractional part
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Name lookups the evaluator needs from the simulator
pub(crate) trait Scope {
    fn resolve(&self, name: &str) -> Option<Operand>;
    /// Property `key` of the object `ref_id`
    fn index(&self, ref_id: &str, key: &str) -> Option<Operand>;
    /// Number of properties on `ref_id`
    fn length(&self, ref_id: &str) -> Option<usize>;
}

/// Parse a single literal token: booleans, null-likes, numbers, strings
pub(crate) fn parse_scalar(text: &str) -> Option<Operand> {
    let text = text.trim();
    match text {
        "true" | "false" | "True" | "False" => return Some(Operand::Keyword(text.to_string())),
        "null" | "None" | "nil" | "undefined" | "NULL" | "nullptr" => {
            return Some(Operand::Keyword(text.to_string()))
        }
        _ => {}
    }
    if let Some(caps) = patterns::NUMBER.captures(text) {
        let suffix = caps.get(1).map_or(0, |m| m.as_str().len());
        return text[..text.len() - suffix].parse::<f64>().ok().map(Operand::Number);
    }
    unquote(text).map(Operand::Text)
}

/// The shape a right-hand side takes once classified
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ValueShape {
    Scalar(Operand),
    Collection {
        class_name: &'static str,
        entries: Vec<(String, Operand)>,
    },
    Opaque {
        class_name: String,
    },
}

/// Classify a right-hand side
pub(crate) fn classify(text: &str, scope: &dyn Scope, max_properties: usize) -> ValueShape {
    let text = text.trim();

    if let Some(shape) = literal_collection(text, scope, max_properties) {
        return shape;
    }
    if let Some(caps) = patterns::CONSTRUCTOR.captures(text) {
        let class_name = caps[1].rsplit('.').next().unwrap_or(&caps[1]).to_string();
        return ValueShape::Opaque { class_name };
    }
    if let Some(caps) = patterns::COLLECTION_CALL.captures(text) {
        let class_name = caps[1].split("::").next().unwrap_or(&caps[1]).to_string();
        return ValueShape::Opaque { class_name };
    }

    match evaluate(text, scope) {
        Some(op) => ValueShape::Scalar(op),
        None => ValueShape::Scalar(Operand::Raw(text.to_string())),
    }
}

fn literal_collection(text: &str, scope: &dyn Scope, max: usize) -> Option<ValueShape> {
    if wraps_whole(text, '[', ']') {
        let items = split_top_level(&text[1..text.len() - 1], ',');
        if !items.is_empty() && items.iter().all(|i| patterns::find_top_level(i, "=>").is_some()) {
            return Some(object_from(&items, "=>", scope, max));
        }
        return Some(array_from(&items, scope, max));
    }
    if wraps_whole(text, '{', '}') {
        let items = split_top_level(&text[1..text.len() - 1], ',');
        if items.is_empty() || items.iter().all(|i| patterns::find_top_level(i, ":").is_some()) {
            return Some(object_from(&items, ":", scope, max));
        }
        return Some(array_from(&items, scope, max));
    }
    for pattern in [&patterns::GO_SLICE, &patterns::NEW_ARRAY] {
        if let Some(caps) = pattern.captures(text) {
            return Some(array_from(&split_top_level(&caps[1], ','), scope, max));
        }
    }
    if let Some(caps) = patterns::LIST_CALL.captures(text) {
        let inner = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        return Some(array_from(&split_top_level(inner, ','), scope, max));
    }

    // the literal continues on later lines
    if text.starts_with('[') {
        return Some(ValueShape::Collection {
            class_name: "Array",
            entries: Vec::new(),
        });
    }
    if text.starts_with('{') {
        return Some(ValueShape::Collection {
            class_name: "Object",
            entries: Vec::new(),
        });
    }
    None
}

fn array_from(items: &[String], scope: &dyn Scope, max: usize) -> ValueShape {
    let entries = items
        .iter()
        .take(max)
        .enumerate()
        .map(|(i, item)| (i.to_string(), element(item, scope)))
        .collect();
    ValueShape::Collection {
        class_name: "Array",
        entries,
    }
}

fn object_from(items: &[String], sep: &str, scope: &dyn Scope, max: usize) -> ValueShape {
    let entries = items
        .iter()
        .filter_map(|item| {
            let at = patterns::find_top_level(item, sep)?;
            let key = item[..at].trim();
            let key = unquote(key).unwrap_or_else(|| key.to_string());
            Some((key, element(item[at + sep.len()..].trim(), scope)))
        })
        .take(max)
        .collect();
    ValueShape::Collection {
        class_name: "Object",
        entries,
    }
}

/// Nested collections stay as text inside a property
fn element(text: &str, scope: &dyn Scope) -> Operand {
    if text.starts_with('[') || text.starts_with('{') {
        return Operand::Raw(text.to_string());
    }
    evaluate(text, scope).unwrap_or_else(|| Operand::Raw(text.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Str(String),
    Ident(String),
    Op(char),
    Open(char),
    Close(char),
}

fn tokenize(text: &str) -> Option<Vec<Tok>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let number: String = chars[start..i].iter().collect();
            // numeric suffixes such as 1.5f or 10L
            while i < chars.len() && matches!(chars[i], 'f' | 'F' | 'd' | 'D' | 'l' | 'L' | 'u' | 'U') {
                i += 1;
            }
            tokens.push(Tok::Num(number.parse().ok()?));
        } else if c == '"' || c == '\'' || c == '`' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            if i >= chars.len() {
                return None;
            }
            i += 1;
            let literal: String = chars[start..i].iter().collect();
            tokens.push(Tok::Str(unquote(&literal)?));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '$' | '.')) {
                i += 1;
            }
            tokens.push(Tok::Ident(chars[start..i].iter().collect()));
        } else if matches!(c, '+' | '-' | '*' | '/' | '%') {
            tokens.push(Tok::Op(c));
            i += 1;
        } else if c == '(' || c == '[' {
            tokens.push(Tok::Open(c));
            i += 1;
        } else if c == ')' || c == ']' {
            tokens.push(Tok::Close(c));
            i += 1;
        } else {
            return None;
        }
    }
    Some(tokens)
}

/// Evaluate `text` as arithmetic over literals and bound names.
///
/// Returns `None` when any part is outside the supported grammar.
pub(crate) fn evaluate(text: &str, scope: &dyn Scope) -> Option<Operand> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(op) = parse_scalar(text) {
        return Some(op);
    }
    let tokens = tokenize(text)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        scope,
    };
    let value = parser.additive()?;
    if parser.pos == parser.tokens.len() {
        Some(value)
    } else {
        None
    }
}

struct ExprParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    scope: &'a dyn Scope,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn additive(&mut self) -> Option<Operand> {
        let mut left = self.multiplicative()?;
        while let Some(Tok::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.multiplicative()?;
            left = binary(op, left, right)?;
        }
        Some(left)
    }

    fn multiplicative(&mut self) -> Option<Operand> {
        let mut left = self.unary()?;
        while let Some(Tok::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let right = self.unary()?;
            left = binary(op, left, right)?;
        }
        Some(left)
    }

    fn unary(&mut self) -> Option<Operand> {
        if let Some(Tok::Op('-')) = self.peek() {
            self.pos += 1;
            let value = self.unary()?.as_number()?;
            return Some(Operand::Number(-value));
        }
        self.primary()
    }

    fn primary(&mut self) -> Option<Operand> {
        match self.next()? {
            Tok::Num(n) => Some(Operand::Number(n)),
            Tok::Str(s) => Some(Operand::Text(s)),
            Tok::Open('(') => {
                let value = self.additive()?;
                match self.next()? {
                    Tok::Close(')') => Some(value),
                    _ => None,
                }
            }
            Tok::Ident(name) => self.name(name),
            _ => None,
        }
    }

    fn name(&mut self, name: String) -> Option<Operand> {
        // len(x)
        if name == "len" && self.peek() == Some(&Tok::Open('(')) {
            self.pos += 1;
            let target = match self.next()? {
                Tok::Ident(target) => target,
                _ => return None,
            };
            if self.next()? != Tok::Close(')') {
                return None;
            }
            return match self.scope.resolve(&target)? {
                Operand::Ref(id) => self.scope.length(&id).map(|n| Operand::Number(n as f64)),
                Operand::Text(s) => Some(Operand::Number(s.chars().count() as f64)),
                _ => None,
            };
        }

        // x.length / x.size
        if let Some((target, field)) = name.split_once('.') {
            if !matches!(field, "length" | "size" | "len") {
                return None;
            }
            return match self.scope.resolve(target)? {
                Operand::Ref(id) => self.scope.length(&id).map(|n| Operand::Number(n as f64)),
                Operand::Text(s) => Some(Operand::Number(s.chars().count() as f64)),
                _ => None,
            };
        }

        let value = match name.as_str() {
            "true" | "false" | "True" | "False" | "null" | "None" | "nil" | "undefined" => {
                Operand::Keyword(name)
            }
            _ => self.scope.resolve(&name)?,
        };

        // x[i]
        if self.peek() == Some(&Tok::Open('[')) {
            self.pos += 1;
            let key = self.additive()?;
            if self.next()? != Tok::Close(']') {
                return None;
            }
            return match value {
                Operand::Ref(id) => self.scope.index(&id, &key.key()),
                Operand::Text(s) => {
                    let at = key.as_number()? as usize;
                    s.chars().nth(at).map(|c| Operand::Text(c.to_string()))
                }
                _ => None,
            };
        }
        Some(value)
    }
}

fn binary(op: char, left: Operand, right: Operand) -> Option<Operand> {
    if op == '+' {
        if let (Operand::Number(a), Operand::Number(b)) = (&left, &right) {
            return Some(Operand::Number(a + b));
        }
        if matches!(left, Operand::Text(_)) || matches!(right, Operand::Text(_)) {
            return Some(Operand::Text(left.concat_text()? + &right.concat_text()?));
        }
        return None;
    }

    let (a, b) = match (&left, &right) {
        (Operand::Number(a), Operand::Number(b)) => (*a, *b),
        _ => return None,
    };
    match op {
        '-' => Some(Operand::Number(a - b)),
        '*' => Some(Operand::Number(a * b)),
        '/' if b == 0.0 => Some(Operand::Raw(format_number(a / b))),
        '/' => Some(Operand::Number(a / b)),
        '%' if b == 0.0 => None,
        '%' => Some(Operand::Number(a % b)),
        _ => None,
    }
}
