//! Runtime memory for the sandboxed interpreter
//!
//! - [`Value`]: tagged runtime values; arrays and objects live on the [`Heap`]
//!   and are referenced by [`ObjectId`]
//! - [`Frame`] / [`CallStack`]: activation records with block scopes and
//!   shadowing
//!
//! Conversions follow JavaScript rules closely enough for teaching programs:
//! `String(x)`, `Number(x)`, truthiness and the `console.log` rendering.

use crate::script::ast::FunctionDef;
use rustc_hash::FxHashMap;
use std::rc::Rc;

pub type ObjectId = usize;

/// Largest array a single write may grow to
const MAX_ARRAY_LEN: usize = 1 << 20;

/// Render a number the way JavaScript prints it
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        // -0 prints as 0
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// A user-defined function value with the name it was bound under
#[derive(Debug, Clone)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub name: String,
}

/// Host-provided globals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Native {
    Console,
    Math,
    StringFn,
    NumberFn,
    ParseInt,
}

impl Native {
    pub fn lookup(name: &str) -> Option<Native> {
        Some(match name {
            "console" => Native::Console,
            "Math" => Native::Math,
            "String" => Native::StringFn,
            "Number" => Native::NumberFn,
            "parseInt" => Native::ParseInt,
            _ => return None,
        })
    }

    pub fn is_callable(self) -> bool {
        matches!(self, Native::StringFn | Native::NumberFn | Native::ParseInt)
    }

    fn label(self) -> &'static str {
        match self {
            Native::Console => "[object console]",
            Native::Math => "[object Math]",
            Native::StringFn => "[Function: String]",
            Native::NumberFn => "[Function: Number]",
            Native::ParseInt => "[Function: parseInt]",
        }
    }
}

/// Runtime values
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Object(ObjectId),
    Function(Function),
    Native(Native),
}

impl Value {
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Function(_) | Value::Native(_) => true,
        }
    }

    /// Result of the `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Function(_) => "function",
            Value::Native(n) if n.is_callable() => "function",
            Value::Native(_) => "object",
        }
    }

    /// `===` semantics
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(&a.def, &b.def),
            (Value::Native(a), Value::Native(b)) => a == b,
            _ => false,
        }
    }
}

/// Parse string contents the way `Number("...")` does
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    // Rust accepts "inf" and "nan", JavaScript does not
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// `parseInt(text, radix)`: leading digits only, NaN when there are none
pub fn parse_int(text: &str, radix: Option<u32>) -> f64 {
    let mut t = text.trim_start();
    let negative = t.starts_with('-');
    if negative || t.starts_with('+') {
        t = &t[1..];
    }
    let mut radix = radix.unwrap_or(10);
    if radix == 16 || (radix == 10 && (t.starts_with("0x") || t.starts_with("0X"))) {
        if let Some(rest) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
            t = rest;
            radix = 16;
        }
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: Vec<u32> = t.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let magnitude = digits
        .iter()
        .fold(0.0, |acc, d| acc * radix as f64 + *d as f64);
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Array or plain object storage
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Array(Vec<Value>),
    /// Properties in insertion order
    Plain(Vec<(String, Value)>),
}

#[derive(Debug, Clone)]
pub struct JsObject {
    pub class_name: String,
    pub kind: ObjectKind,
}

impl JsObject {
    pub fn get(&self, key: &str) -> Value {
        match &self.kind {
            ObjectKind::Array(items) => {
                if key == "length" {
                    return Value::Number(items.len() as f64);
                }
                array_index(key)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default()
            }
            ObjectKind::Plain(entries) => entries
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match &mut self.kind {
            ObjectKind::Array(items) => {
                if key == "length" {
                    if let Value::Number(n) = value {
                        if n >= 0.0 && n.fract() == 0.0 && n <= MAX_ARRAY_LEN as f64 {
                            items.resize(n as usize, Value::Undefined);
                        }
                    }
                } else if let Some(i) = array_index(key).filter(|i| *i < MAX_ARRAY_LEN) {
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                }
            }
            ObjectKind::Plain(entries) => match entries.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key.to_string(), value)),
            },
        }
    }

    /// Values held directly by this object
    pub fn children(&self) -> Vec<&Value> {
        match &self.kind {
            ObjectKind::Array(items) => items.iter().collect(),
            ObjectKind::Plain(entries) => entries.iter().map(|(_, v)| v).collect(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.class_name.ends_with("Error")
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

/// Object storage; ids are never reused within a run
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<JsObject>,
}

impl Heap {
    pub fn alloc(&mut self, class_name: impl Into<String>, kind: ObjectKind) -> ObjectId {
        self.objects.push(JsObject {
            class_name: class_name.into(),
            kind,
        });
        self.objects.len() - 1
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> ObjectId {
        self.alloc("Array", ObjectKind::Array(items))
    }

    pub fn alloc_error(&mut self, class_name: &str, message: String) -> ObjectId {
        self.alloc(
            class_name,
            ObjectKind::Plain(vec![("message".to_string(), Value::Str(message))]),
        )
    }

    pub fn get(&self, id: ObjectId) -> Option<&JsObject> {
        self.objects.get(id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut JsObject> {
        self.objects.get_mut(id)
    }

    /// `String(value)`
    pub fn to_js_string(&self, value: &Value) -> String {
        self.stringify(value, 0)
    }

    fn stringify(&self, value: &Value, depth: usize) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Function(f) => format!("function {}() {{ [code] }}", f.name),
            Value::Native(n) => n.label().to_string(),
            Value::Object(id) => {
                let Some(obj) = self.get(*id) else {
                    return "undefined".to_string();
                };
                match &obj.kind {
                    ObjectKind::Array(items) if depth < 8 => items
                        .iter()
                        .map(|v| {
                            if v.is_nullish() {
                                String::new()
                            } else {
                                self.stringify(v, depth + 1)
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    ObjectKind::Array(_) => String::new(),
                    ObjectKind::Plain(_) if obj.is_error() => self.error_text(obj),
                    ObjectKind::Plain(_) => "[object Object]".to_string(),
                }
            }
        }
    }

    fn error_text(&self, obj: &JsObject) -> String {
        match obj.get("message") {
            Value::Str(m) if !m.is_empty() => format!("{}: {}", obj.class_name, m),
            _ => obj.class_name.clone(),
        }
    }

    /// `Number(value)`
    pub fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Str(s) => string_to_number(s),
            Value::Object(_) => string_to_number(&self.to_js_string(value)),
            Value::Function(_) | Value::Native(_) => f64::NAN,
        }
    }

    /// Rendering used by `console.log`: strings are bare at the top level
    /// and quoted inside containers
    pub fn inspect(&self, value: &Value) -> String {
        match value {
            Value::Str(s) => s.clone(),
            other => self.inspect_nested(other, 0, &mut Vec::new()),
        }
    }

    fn inspect_nested(&self, value: &Value, depth: usize, seen: &mut Vec<ObjectId>) -> String {
        match value {
            Value::Str(s) => format!("'{}'", s),
            Value::Function(f) if f.def.name.is_none() && f.name == "anonymous" => {
                "[Function (anonymous)]".to_string()
            }
            Value::Function(f) => format!("[Function: {}]", f.name),
            Value::Object(id) => {
                let Some(obj) = self.get(*id) else {
                    return "undefined".to_string();
                };
                if seen.contains(id) {
                    return "[Circular]".to_string();
                }
                if obj.is_error() {
                    return self.error_text(obj);
                }
                let is_array = matches!(obj.kind, ObjectKind::Array(_));
                if depth > 2 {
                    return if is_array { "[Array]" } else { "[Object]" }.to_string();
                }
                seen.push(*id);
                let parts: Vec<String> = match &obj.kind {
                    ObjectKind::Array(items) => items
                        .iter()
                        .map(|v| self.inspect_nested(v, depth + 1, seen))
                        .collect(),
                    ObjectKind::Plain(entries) => entries
                        .iter()
                        .map(|(k, v)| format!("{}: {}", k, self.inspect_nested(v, depth + 1, seen)))
                        .collect(),
                };
                seen.pop();
                match (is_array, parts.is_empty()) {
                    (true, true) => "[]".to_string(),
                    (false, true) => "{}".to_string(),
                    (true, false) => format!("[ {} ]", parts.join(", ")),
                    (false, false) => format!("{{ {} }}", parts.join(", ")),
                }
            }
            other => self.stringify(other, 0),
        }
    }
}

/// A declared name in a frame
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub is_const: bool,
    /// Function declarations hoisted to the top of their scope
    pub hoisted: bool,
}

#[derive(Debug, Clone)]
struct ScopeData {
    shadowed: Vec<(String, Binding)>,
    declared: Vec<String>,
}

/// Activation record for the global program or one function call
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: usize,
    pub name: String,
    locals: FxHashMap<String, Binding>,
    insertion_order: Vec<String>,
    scope_stack: Vec<ScopeData>,
}

impl Frame {
    pub fn new(id: usize, name: String) -> Self {
        Frame {
            id,
            name,
            locals: FxHashMap::default(),
            insertion_order: Vec::new(),
            scope_stack: Vec::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scope_stack.push(ScopeData {
            shadowed: Vec::new(),
            declared: Vec::new(),
        });
    }

    pub fn pop_scope(&mut self) {
        if let Some(scope) = self.scope_stack.pop() {
            for name in scope.declared {
                self.locals.remove(&name);
                if let Some(pos) = self.insertion_order.iter().rposition(|x| x == &name) {
                    self.insertion_order.remove(pos);
                }
            }
            for (name, binding) in scope.shadowed {
                self.locals.insert(name, binding);
            }
        }
    }

    /// Declare in the innermost block scope (`let`, `const`, functions)
    pub fn declare(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scope_stack.last_mut() {
            if scope.declared.iter().any(|n| n == name) {
                self.locals.insert(name.to_string(), binding);
            } else if let Some(old) = self.locals.insert(name.to_string(), binding) {
                scope.shadowed.push((name.to_string(), old));
            } else {
                scope.declared.push(name.to_string());
                self.insertion_order.push(name.to_string());
            }
        } else {
            if !self.locals.contains_key(name) {
                self.insertion_order.push(name.to_string());
            }
            self.locals.insert(name.to_string(), binding);
        }
    }

    /// Declare at function level, ignoring block scopes (`var`)
    pub fn declare_function_level(&mut self, name: &str, value: Option<Value>) {
        match self.locals.get_mut(name) {
            Some(binding) => {
                if let Some(value) = value {
                    binding.value = value;
                }
            }
            None => {
                self.insertion_order.push(name.to_string());
                self.locals.insert(
                    name.to_string(),
                    Binding {
                        value: value.unwrap_or_default(),
                        is_const: false,
                        hoisted: false,
                    },
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.locals.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Binding> {
        self.locals.get_mut(name)
    }

    /// Visible bindings in declaration order
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.insertion_order
            .iter()
            .filter_map(|name| self.locals.get(name).map(|b| (name.as_str(), b)))
    }
}

/// The call stack; index 0 is the global frame
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<Frame>,
    next_id: usize,
}

impl CallStack {
    pub fn new() -> Self {
        CallStack {
            frames: vec![Frame::new(0, "global".to_string())],
            next_id: 1,
        }
    }

    pub fn push_frame(&mut self, name: String) {
        let id = self.next_id;
        self.next_id += 1;
        self.frames.push(Frame::new(id, name));
    }

    /// Pops the innermost frame; the global frame stays
    pub fn pop_frame(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn current(&self) -> &Frame {
        // never empty: the global frame is not popped
        &self.frames[self.frames.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn global_mut(&mut self) -> &mut Frame {
        &mut self.frames[0]
    }

    /// Innermost frame, then globals; no closure capture
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.current().get(name).or_else(|| self.frames[0].get(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Binding> {
        let last = self.frames.len() - 1;
        if self.frames[last].get(name).is_some() {
            self.frames[last].get_mut(name)
        } else {
            self.frames[0].get_mut(name)
        }
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.0 / 0.0), "Infinity");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1f"), 31.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("12px", None), 12.0);
        assert_eq!(parse_int("-7.9", None), -7.0);
        assert_eq!(parse_int("ff", Some(16)), 255.0);
        assert!(parse_int("abc", None).is_nan());
    }

    #[test]
    fn test_array_set_extends_with_holes() {
        let mut heap = Heap::default();
        let id = heap.alloc_array(vec![Value::Number(1.0)]);
        let obj = heap.get_mut(id).expect("allocated");
        obj.set("3", Value::Number(4.0));
        assert_eq!(heap.to_js_string(&Value::Object(id)), "1,,,4");
    }

    #[test]
    fn test_inspect_nested_values() {
        let mut heap = Heap::default();
        let inner = heap.alloc_array(vec![Value::Str("a".into())]);
        let outer = heap.alloc(
            "Object",
            ObjectKind::Plain(vec![
                ("n".to_string(), Value::Number(1.0)),
                ("list".to_string(), Value::Object(inner)),
            ]),
        );
        assert_eq!(heap.inspect(&Value::Object(outer)), "{ n: 1, list: [ 'a' ] }");
        assert_eq!(heap.inspect(&Value::Str("top".into())), "top");
    }

    #[test]
    fn test_block_scope_shadowing() {
        let mut stack = CallStack::new();
        let binding = |n: f64| Binding {
            value: Value::Number(n),
            is_const: false,
            hoisted: false,
        };
        stack.current_mut().declare("x", binding(1.0));
        stack.current_mut().push_scope();
        stack.current_mut().declare("x", binding(2.0));
        stack.current_mut().declare("y", binding(3.0));
        assert!(matches!(stack.lookup("x").map(|b| &b.value), Some(Value::Number(n)) if *n == 2.0));
        stack.current_mut().pop_scope();
        assert!(matches!(stack.lookup("x").map(|b| &b.value), Some(Value::Number(n)) if *n == 1.0));
        assert!(stack.lookup("y").is_none());
    }

    #[test]
    fn test_lookup_falls_back_to_globals() {
        let mut stack = CallStack::new();
        stack.global_mut().declare_function_level("g", Some(Value::Bool(true)));
        stack.push_frame("f()".to_string());
        assert!(stack.lookup("g").is_some());
        assert!(stack.pop_frame().is_some());
        assert!(stack.pop_frame().is_none());
    }
}
