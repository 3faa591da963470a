//! Expression evaluation for the sandbox engine
//!
//! Adds `impl Engine` methods for every [`Expr`] form. Assignment targets are
//! resolved to a [`Place`] first so compound assignment and `++`/`--`
//! evaluate the object and key exactly once.

use super::engine::Engine;
use super::memory::{format_number, Function, Native, ObjectKind, Value};
use crate::errors::TraceError;
use crate::script::ast::*;
use std::rc::Rc;

/// A resolved assignment target
pub(crate) enum Place {
    Var(String),
    Prop(Value, String),
}

impl Engine {
    pub(crate) fn eval(&mut self, expr: &Expr) -> Result<Value, TraceError> {
        match expr {
            Expr::Number(n, _) => Ok(Value::Number(*n)),
            Expr::Str(s, _) => Ok(Value::Str(s.clone())),
            Expr::Bool(b, _) => Ok(Value::Bool(*b)),
            Expr::Null(_) => Ok(Value::Null),
            Expr::Undefined(_) => Ok(Value::Undefined),
            Expr::Ident(name, _) => self.lookup(name),
            Expr::Array(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Object(self.heap.alloc_array(values)))
            }
            Expr::Object(entries, _) => {
                let mut props: Vec<(String, Value)> = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.eval_named(value, key)?;
                    match props.iter_mut().find(|(k, _)| k == key) {
                        Some(slot) => slot.1 = value,
                        None => props.push((key.clone(), value)),
                    }
                }
                Ok(Value::Object(self.heap.alloc("Object", ObjectKind::Plain(props))))
            }
            Expr::Function(def) => Ok(Self::make_function(def, None)),
            Expr::Unary { op, operand, .. } => self.eval_unary(*op, operand),
            Expr::Update {
                op, prefix, target, ..
            } => {
                let place = self.place(target)?;
                let old = self.read_place(&place)?;
                let old = self.heap.to_number(&old);
                let new = match op {
                    UpdateOp::Inc => old + 1.0,
                    UpdateOp::Dec => old - 1.0,
                };
                self.write_place(&place, Value::Number(new))?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary {
                op, left, right, ..
            } => match op {
                BinOp::And => {
                    let left = self.eval(left)?;
                    if left.truthy() {
                        self.eval(right)
                    } else {
                        Ok(left)
                    }
                }
                BinOp::Or => {
                    let left = self.eval(left)?;
                    if left.truthy() {
                        Ok(left)
                    } else {
                        self.eval(right)
                    }
                }
                _ => {
                    let left = self.eval(left)?;
                    let right = self.eval(right)?;
                    Ok(self.binary(*op, &left, &right))
                }
            },
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
                ..
            } => {
                if self.eval(condition)?.truthy() {
                    self.eval(then_expr)
                } else {
                    self.eval(else_expr)
                }
            }
            Expr::Assign { target, value, .. } => {
                let place = self.place(target)?;
                let value = match &place {
                    Place::Var(name) | Place::Prop(_, name) => self.eval_named(value, name)?,
                };
                self.write_place(&place, value.clone())?;
                Ok(value)
            }
            Expr::CompoundAssign {
                op, target, value, ..
            } => {
                let place = self.place(target)?;
                let old = self.read_place(&place)?;
                let rhs = self.eval(value)?;
                let value = self.binary(*op, &old, &rhs);
                self.write_place(&place, value.clone())?;
                Ok(value)
            }
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval(object)?;
                self.get_property(&object, property)
            }
            Expr::Index { object, index, .. } => {
                let object = self.eval(object)?;
                let key = self.eval(index)?;
                let key = self.property_key(&key);
                self.get_property(&object, &key)
            }
            Expr::Call { callee, args, .. } => self.eval_call(callee, args),
            Expr::New {
                class_name, args, ..
            } => {
                let args = self.eval_args(args)?;
                self.construct(class_name, args)
            }
        }
    }

    /// Evaluate, naming anonymous functions after the binding they land in
    pub(crate) fn eval_named(&mut self, expr: &Expr, name: &str) -> Result<Value, TraceError> {
        match expr {
            Expr::Function(def) => Ok(Self::make_function(def, Some(name))),
            other => self.eval(other),
        }
    }

    fn make_function(def: &Rc<FunctionDef>, hint: Option<&str>) -> Value {
        let name = def
            .name
            .clone()
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_else(|| "anonymous".to_string());
        Value::Function(Function {
            def: def.clone(),
            name,
        })
    }

    fn lookup(&self, name: &str) -> Result<Value, TraceError> {
        if let Some(binding) = self.stack.lookup(name) {
            return Ok(binding.value.clone());
        }
        match name {
            "NaN" => Ok(Value::Number(f64::NAN)),
            "Infinity" => Ok(Value::Number(f64::INFINITY)),
            _ => Native::lookup(name)
                .map(Value::Native)
                .ok_or_else(|| self.error(format!("ReferenceError: {} is not defined", name))),
        }
    }

    fn assign_var(&mut self, name: &str, value: Value) -> Result<(), TraceError> {
        let line = self.current_line;
        match self.stack.lookup_mut(name) {
            Some(binding) if binding.is_const => Err(TraceError::runtime(
                "TypeError: Assignment to constant variable.",
                Some(line),
            )),
            Some(binding) => {
                binding.value = value;
                Ok(())
            }
            None => {
                // undeclared names become globals
                self.stack
                    .global_mut()
                    .declare_function_level(name, Some(value));
                Ok(())
            }
        }
    }

    fn eval_unary(&mut self, op: UnOp, operand: &Expr) -> Result<Value, TraceError> {
        if op == UnOp::Typeof {
            if let Expr::Ident(name, _) = operand {
                // typeof never throws on undeclared names
                let value = self.lookup(name).unwrap_or_default();
                return Ok(Value::Str(value.type_of().to_string()));
            }
        }
        let value = self.eval(operand)?;
        Ok(match op {
            UnOp::Neg => Value::Number(-self.heap.to_number(&value)),
            UnOp::Plus => Value::Number(self.heap.to_number(&value)),
            UnOp::Not => Value::Bool(!value.truthy()),
            UnOp::Typeof => Value::Str(value.type_of().to_string()),
        })
    }

    pub(crate) fn binary(&self, op: BinOp, left: &Value, right: &Value) -> Value {
        let num = |v: &Value| self.heap.to_number(v);
        match op {
            BinOp::Add => {
                let textual = |v: &Value| matches!(v, Value::Str(_) | Value::Object(_) | Value::Function(_));
                if textual(left) || textual(right) {
                    Value::Str(self.heap.to_js_string(left) + &self.heap.to_js_string(right))
                } else {
                    Value::Number(num(left) + num(right))
                }
            }
            BinOp::Sub => Value::Number(num(left) - num(right)),
            BinOp::Mul => Value::Number(num(left) * num(right)),
            BinOp::Div => Value::Number(num(left) / num(right)),
            BinOp::Mod => Value::Number(num(left) % num(right)),
            BinOp::StrictEq => Value::Bool(left.strict_equals(right)),
            BinOp::StrictNe => Value::Bool(!left.strict_equals(right)),
            BinOp::Eq => Value::Bool(self.loose_equals(left, right)),
            BinOp::Ne => Value::Bool(!self.loose_equals(left, right)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (left, right) {
                    (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                    _ => num(left).partial_cmp(&num(right)),
                };
                let Some(ordering) = ordering else {
                    return Value::Bool(false);
                };
                Value::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                })
            }
            BinOp::And => {
                if left.truthy() {
                    right.clone()
                } else {
                    left.clone()
                }
            }
            BinOp::Or => {
                if left.truthy() {
                    left.clone()
                } else {
                    right.clone()
                }
            }
        }
    }

    /// `==` semantics
    fn loose_equals(&self, left: &Value, right: &Value) -> bool {
        if left.is_nullish() || right.is_nullish() {
            return left.is_nullish() && right.is_nullish();
        }
        match (left, right) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(_), Value::Str(s)) => self.heap.to_js_string(left) == *s,
            (Value::Str(s), Value::Object(_)) => self.heap.to_js_string(right) == *s,
            _ if left.type_of() == right.type_of() => left.strict_equals(right),
            _ => self.heap.to_number(left) == self.heap.to_number(right),
        }
    }

    pub(crate) fn property_key(&self, key: &Value) -> String {
        match key {
            Value::Number(n) => format_number(*n),
            other => self.heap.to_js_string(other),
        }
    }

    pub(crate) fn get_property(&self, object: &Value, key: &str) -> Result<Value, TraceError> {
        match object {
            Value::Object(id) => Ok(self.heap.get(*id).map(|o| o.get(key)).unwrap_or_default()),
            Value::Str(s) => Ok(if key == "length" {
                Value::Number(s.chars().count() as f64)
            } else {
                key.parse::<usize>()
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(|c| Value::Str(c.to_string()))
                    .unwrap_or_default()
            }),
            Value::Native(Native::Math) => Ok(match key {
                "PI" => Value::Number(std::f64::consts::PI),
                "E" => Value::Number(std::f64::consts::E),
                _ => Value::Undefined,
            }),
            Value::Undefined | Value::Null => Err(self.error(format!(
                "TypeError: Cannot read properties of {} (reading '{}')",
                self.heap.to_js_string(object),
                key
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    fn set_property(&mut self, object: &Value, key: &str, value: Value) -> Result<(), TraceError> {
        match object {
            Value::Object(id) => {
                if let Some(obj) = self.heap.get_mut(*id) {
                    obj.set(key, value);
                }
                Ok(())
            }
            Value::Undefined | Value::Null => Err(self.error(format!(
                "TypeError: Cannot set properties of {} (setting '{}')",
                self.heap.to_js_string(object),
                key
            ))),
            // writes to primitives are dropped
            _ => Ok(()),
        }
    }

    fn place(&mut self, target: &Expr) -> Result<Place, TraceError> {
        match target {
            Expr::Ident(name, _) => Ok(Place::Var(name.clone())),
            Expr::Member {
                object, property, ..
            } => Ok(Place::Prop(self.eval(object)?, property.clone())),
            Expr::Index { object, index, .. } => {
                let object = self.eval(object)?;
                let key = self.eval(index)?;
                Ok(Place::Prop(object, self.property_key(&key)))
            }
            _ => Err(self.error("SyntaxError: Invalid assignment target")),
        }
    }

    fn read_place(&self, place: &Place) -> Result<Value, TraceError> {
        match place {
            Place::Var(name) => self.lookup(name),
            Place::Prop(object, key) => self.get_property(object, key),
        }
    }

    fn write_place(&mut self, place: &Place, value: Value) -> Result<(), TraceError> {
        match place {
            Place::Var(name) => self.assign_var(name, value),
            Place::Prop(object, key) => self.set_property(object, key, value),
        }
    }

    pub(crate) fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, TraceError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }
        Ok(values)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, TraceError> {
        if let Expr::Member {
            object, property, ..
        } = callee
        {
            let receiver = self.eval(object)?;
            let args = self.eval_args(args)?;
            return self.call_method(&receiver, property, args, &callee_label(callee));
        }
        let func = self.eval(callee)?;
        let args = self.eval_args(args)?;
        self.call_value(&func, args, &callee_label(callee))
    }
}

/// Source-like name of a callee for error messages
fn callee_label(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name, _) => name.clone(),
        Expr::Member {
            object, property, ..
        } => format!("{}.{}", callee_label(object), property),
        Expr::Index { object, .. } => format!("{}[...]", callee_label(object)),
        Expr::Call { callee, .. } => format!("{}(...)", callee_label(callee)),
        _ => "expression".to_string(),
    }
}
