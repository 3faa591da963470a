//! Built-in functions and methods available to sandboxed programs
//!
//! `console`, `Math`, `String()`, `Number()`, `parseInt()`, the array and
//! string methods, `new Error/Array/Object`, and the JSON bridge used for
//! entry-point arguments and results.

use super::engine::Engine;
use super::memory::{parse_int, Native, ObjectId, ObjectKind, Value};
use crate::errors::TraceError;
use crate::snapshot::OutputEntry;
use serde_json::Value as JsonValue;

/// Deepest nesting converted to JSON
const MAX_JSON_DEPTH: usize = 32;

impl Engine {
    pub(crate) fn call_value(&mut self, func: &Value, args: Vec<Value>, label: &str) -> Result<Value, TraceError> {
        match func {
            Value::Function(f) => {
                let f = f.clone();
                self.call_function(&f, args)
            }
            Value::Native(Native::StringFn) => Ok(Value::Str(
                args.first()
                    .map(|v| self.heap.to_js_string(v))
                    .unwrap_or_default(),
            )),
            Value::Native(Native::NumberFn) => Ok(Value::Number(
                args.first().map_or(0.0, |v| self.heap.to_number(v)),
            )),
            Value::Native(Native::ParseInt) => {
                let text = args
                    .first()
                    .map_or_else(|| "undefined".to_string(), |v| self.heap.to_js_string(v));
                let radix = args
                    .get(1)
                    .map(|v| self.heap.to_number(v))
                    .filter(|r| r.is_finite() && *r != 0.0)
                    .map(|r| r as u32);
                Ok(Value::Number(parse_int(&text, radix)))
            }
            _ => Err(self.error(format!("TypeError: {} is not a function", label))),
        }
    }

    pub(crate) fn call_method(
        &mut self,
        receiver: &Value,
        name: &str,
        args: Vec<Value>,
        label: &str,
    ) -> Result<Value, TraceError> {
        match receiver {
            Value::Native(Native::Console) => self.console(name, &args, label),
            Value::Native(Native::Math) => self.math(name, &args, label),
            Value::Str(s) => self.string_method(s, name, &args, label),
            Value::Number(n) if name == "toFixed" => {
                let digits = args.first().map_or(0.0, |v| self.heap.to_number(v));
                if !(0.0..=100.0).contains(&digits) {
                    return Err(self.error("RangeError: toFixed() digits argument must be between 0 and 100"));
                }
                Ok(Value::Str(format!("{:.*}", digits as usize, n)))
            }
            Value::Object(id) => {
                if let Some(result) = self.array_method(*id, name, &args)? {
                    return Ok(result);
                }
                let method = self.get_property(receiver, name)?;
                self.call_value(&method, args, label)
            }
            other => {
                // reading through undefined/null raises the usual TypeError
                let method = self.get_property(other, name)?;
                self.call_value(&method, args, label)
            }
        }
    }

    fn console(&mut self, name: &str, args: &[Value], label: &str) -> Result<Value, TraceError> {
        let text = args
            .iter()
            .map(|v| self.heap.inspect(v))
            .collect::<Vec<_>>()
            .join(" ")
            + "\n";
        let line = Some(self.current_line);
        let entry = match name {
            "log" | "info" | "debug" => OutputEntry::stdout(text, line),
            "warn" | "error" => OutputEntry::stderr(text, line),
            _ => return Err(self.error(format!("TypeError: {} is not a function", label))),
        };
        self.emit(entry)?;
        Ok(Value::Undefined)
    }

    fn math(&mut self, name: &str, args: &[Value], label: &str) -> Result<Value, TraceError> {
        let nums: Vec<f64> = args.iter().map(|v| self.heap.to_number(v)).collect();
        let first = nums.first().copied().unwrap_or(f64::NAN);
        let result = match name {
            "floor" => first.floor(),
            "ceil" => first.ceil(),
            // halves round toward +Infinity
            "round" => (first + 0.5).floor(),
            "abs" => first.abs(),
            "sqrt" => first.sqrt(),
            "trunc" => first.trunc(),
            "pow" => first.powf(nums.get(1).copied().unwrap_or(f64::NAN)),
            "max" => nums.iter().fold(f64::NEG_INFINITY, |acc, n| {
                if acc.is_nan() || n.is_nan() {
                    f64::NAN
                } else {
                    acc.max(*n)
                }
            }),
            "min" => nums.iter().fold(f64::INFINITY, |acc, n| {
                if acc.is_nan() || n.is_nan() {
                    f64::NAN
                } else {
                    acc.min(*n)
                }
            }),
            _ => return Err(self.error(format!("TypeError: {} is not a function", label))),
        };
        Ok(Value::Number(result))
    }

    /// `(start, end)` char positions for `slice`, with negative offsets
    /// counted from the end
    fn slice_bounds(&self, len: usize, args: &[Value]) -> (usize, usize) {
        let resolve = |arg: Option<&Value>, default: usize| match arg {
            None | Some(Value::Undefined) => default,
            Some(v) => {
                let n = self.heap.to_number(v);
                let n = if n.is_nan() { 0.0 } else { n.trunc() };
                if n < 0.0 {
                    (len as f64 + n).max(0.0) as usize
                } else {
                    (n as usize).min(len)
                }
            }
        };
        let start = resolve(args.first(), 0);
        let end = resolve(args.get(1), len);
        (start, end.max(start))
    }

    fn string_method(&mut self, s: &str, name: &str, args: &[Value], label: &str) -> Result<Value, TraceError> {
        let arg_text = |i: usize| {
            args.get(i)
                .map_or_else(|| "undefined".to_string(), |v| self.heap.to_js_string(v))
        };
        let chars: Vec<char> = s.chars().collect();
        Ok(match name {
            "toUpperCase" => Value::Str(s.to_uppercase()),
            "toLowerCase" => Value::Str(s.to_lowercase()),
            "trim" => Value::Str(s.trim().to_string()),
            "charAt" => {
                let at = args.first().map_or(0.0, |v| self.heap.to_number(v));
                let c = if at >= 0.0 { chars.get(at as usize) } else { None };
                Value::Str(c.map(char::to_string).unwrap_or_default())
            }
            "indexOf" => {
                let needle = arg_text(0);
                let found = s.find(&needle).map(|byte| s[..byte].chars().count() as f64);
                Value::Number(found.unwrap_or(-1.0))
            }
            "includes" => Value::Bool(s.contains(&arg_text(0))),
            "slice" => {
                let (start, end) = self.slice_bounds(chars.len(), args);
                Value::Str(chars[start..end].iter().collect())
            }
            "split" => {
                let parts: Vec<Value> = match args.first() {
                    None | Some(Value::Undefined) => vec![Value::Str(s.to_string())],
                    Some(sep) => {
                        let sep = self.heap.to_js_string(sep);
                        if sep.is_empty() {
                            chars.iter().map(|c| Value::Str(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(|p| Value::Str(p.to_string())).collect()
                        }
                    }
                };
                Value::Object(self.heap.alloc_array(parts))
            }
            _ => return Err(self.error(format!("TypeError: {} is not a function", label))),
        })
    }

    fn with_items<R>(&mut self, id: ObjectId, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        match self.heap.get_mut(id).map(|o| &mut o.kind) {
            Some(ObjectKind::Array(items)) => Some(f(items)),
            _ => None,
        }
    }

    fn callback(&self, args: &[Value], method: &str) -> Result<Value, TraceError> {
        match args.first() {
            Some(f @ Value::Function(_)) => Ok(f.clone()),
            Some(f @ Value::Native(n)) if n.is_callable() => Ok(f.clone()),
            other => Err(self.error(format!(
                "TypeError: {} is not a function (in {})",
                other.map_or_else(|| "undefined".to_string(), |v| self.heap.inspect(v)),
                method
            ))),
        }
    }

    /// Array methods; `None` when the receiver is not an array or the method
    /// is not built in
    fn array_method(&mut self, id: ObjectId, name: &str, args: &[Value]) -> Result<Option<Value>, TraceError> {
        let items = match self.heap.get(id).map(|o| &o.kind) {
            Some(ObjectKind::Array(items)) => items.clone(),
            _ => return Ok(None),
        };
        let value = match name {
            "push" => {
                let len = self.with_items(id, |items| {
                    items.extend(args.iter().cloned());
                    items.len()
                });
                Value::Number(len.unwrap_or_default() as f64)
            }
            "unshift" => {
                let len = self.with_items(id, |items| {
                    items.splice(0..0, args.iter().cloned());
                    items.len()
                });
                Value::Number(len.unwrap_or_default() as f64)
            }
            "pop" => self
                .with_items(id, |items| items.pop())
                .flatten()
                .unwrap_or_default(),
            "shift" => self
                .with_items(id, |items| (!items.is_empty()).then(|| items.remove(0)))
                .flatten()
                .unwrap_or_default(),
            "join" => {
                let sep = match args.first() {
                    None | Some(Value::Undefined) => ",".to_string(),
                    Some(v) => self.heap.to_js_string(v),
                };
                let parts: Vec<String> = items
                    .iter()
                    .map(|v| {
                        if v.is_nullish() {
                            String::new()
                        } else {
                            self.heap.to_js_string(v)
                        }
                    })
                    .collect();
                Value::Str(parts.join(&sep))
            }
            "indexOf" => {
                let needle = args.first().cloned().unwrap_or_default();
                let found = items.iter().position(|v| v.strict_equals(&needle));
                Value::Number(found.map_or(-1.0, |i| i as f64))
            }
            "includes" => {
                let needle = args.first().cloned().unwrap_or_default();
                let is_nan = |v: &Value| matches!(v, Value::Number(n) if n.is_nan());
                Value::Bool(
                    items
                        .iter()
                        .any(|v| v.strict_equals(&needle) || (is_nan(v) && is_nan(&needle))),
                )
            }
            "slice" => {
                let (start, end) = self.slice_bounds(items.len(), args);
                Value::Object(self.heap.alloc_array(items[start..end].to_vec()))
            }
            "map" | "filter" | "forEach" => {
                let f = self.callback(args, name)?;
                let mut mapped = Vec::new();
                for (i, item) in items.into_iter().enumerate() {
                    let result = self.call_value(&f, vec![item.clone(), Value::Number(i as f64)], "callback")?;
                    match name {
                        "map" => mapped.push(result),
                        "filter" if result.truthy() => mapped.push(item),
                        _ => {}
                    }
                }
                if name == "forEach" {
                    Value::Undefined
                } else {
                    Value::Object(self.heap.alloc_array(mapped))
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// `new Error(msg)`, `new Array(n)`, `new Object()`
    pub(crate) fn construct(&mut self, class_name: &str, args: Vec<Value>) -> Result<Value, TraceError> {
        match class_name {
            "Error" | "TypeError" | "RangeError" => {
                let message = match args.first() {
                    None | Some(Value::Undefined) => String::new(),
                    Some(v) => self.heap.to_js_string(v),
                };
                Ok(Value::Object(self.heap.alloc_error(class_name, message)))
            }
            "Array" => match args.as_slice() {
                [Value::Number(n)] => {
                    if *n < 0.0 || n.fract() != 0.0 || *n > u32::MAX as f64 {
                        return Err(self.error("RangeError: Invalid array length"));
                    }
                    let len = (*n as usize).min(1 << 20);
                    Ok(Value::Object(self.heap.alloc_array(vec![Value::Undefined; len])))
                }
                _ => Ok(Value::Object(self.heap.alloc_array(args))),
            },
            "Object" => Ok(Value::Object(self.heap.alloc("Object", ObjectKind::Plain(Vec::new())))),
            _ => Err(self.error(format!("TypeError: {} is not a constructor", class_name))),
        }
    }

    pub(crate) fn from_json(&mut self, json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::Str(s.clone()),
            JsonValue::Array(items) => {
                let values = items.iter().map(|v| self.from_json(v)).collect();
                Value::Object(self.heap.alloc_array(values))
            }
            JsonValue::Object(map) => {
                let entries = map.iter().map(|(k, v)| (k.clone(), self.from_json(v))).collect();
                Value::Object(self.heap.alloc("Object", ObjectKind::Plain(entries)))
            }
        }
    }

    pub(crate) fn to_json(&self, value: &Value) -> JsonValue {
        self.to_json_at(value, 0)
    }

    fn to_json_at(&self, value: &Value, depth: usize) -> JsonValue {
        match value {
            Value::Undefined | Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => JsonValue::from(*n as i64),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Function(_) | Value::Native(_) => JsonValue::String(self.heap.inspect(value)),
            Value::Object(_) if depth >= MAX_JSON_DEPTH => JsonValue::Null,
            Value::Object(id) => match self.heap.get(*id).map(|o| &o.kind) {
                Some(ObjectKind::Array(items)) => JsonValue::Array(
                    items.iter().map(|v| self.to_json_at(v, depth + 1)).collect(),
                ),
                Some(ObjectKind::Plain(entries)) => JsonValue::Object(
                    entries
                        .iter()
                        .map(|(k, v)| (k.clone(), self.to_json_at(v, depth + 1)))
                        .collect(),
                ),
                None => JsonValue::Null,
            },
        }
    }
}
