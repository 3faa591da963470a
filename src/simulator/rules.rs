//! Ordered mutation rules; the first rule that matches a line wins

use super::patterns::{self, split_top_level};
use super::values::{self, Operand, Scope, ValueShape};
use super::LineSimulator;
use crate::snapshot::Variable;

type Rule = fn(&mut LineSimulator, &str) -> bool;

const RULES: &[(&str, Rule)] = &[
    ("indexed write", index_assign),
    ("property write", property_assign),
    ("mutating method", mutating_method),
    ("increment", increment),
    ("compound assignment", compound_assign),
    ("assignment", assignment),
];

/// Apply the first matching rule, returning its name
pub(super) fn apply(sim: &mut LineSimulator, stmt: &str) -> Option<&'static str> {
    RULES
        .iter()
        .find(|(_, rule)| rule(sim, stmt))
        .map(|(name, _)| *name)
}

/// A recognized `target = value` statement
pub(super) struct Assignment {
    pub name: String,
    pub value: String,
    /// Declarations bind in the current scope; plain writes search outwards
    pub declare: bool,
}

const TYPE_WORDS: &[&str] = &[
    "int", "long", "short", "char", "float", "double", "bool", "boolean", "auto", "unsigned",
    "signed", "string", "String", "byte", "size_t",
];

pub(super) fn split_assignment(stmt: &str) -> Option<Assignment> {
    if let Some(c) = patterns::KEYWORD_DECL.captures(stmt) {
        // `const int x = 1` reads as a typed declaration instead
        if !TYPE_WORDS.contains(&&c[1]) {
            return Some(Assignment {
                name: c[1].to_string(),
                value: c[2].to_string(),
                declare: true,
            });
        }
    }
    if let Some(c) = patterns::SHORT_DECL.captures(stmt) {
        return Some(Assignment {
            name: c[1].to_string(),
            value: c[2].to_string(),
            declare: true,
        });
    }
    if let Some(c) = patterns::TYPED_DECL.captures(stmt) {
        let first = c[1].split_whitespace().next().unwrap_or("");
        if !patterns::STATEMENT_KEYWORDS.contains(&first) {
            return Some(Assignment {
                name: c[2].to_string(),
                value: c[3].to_string(),
                declare: true,
            });
        }
    }
    patterns::BARE_ASSIGN.captures(stmt).map(|c| Assignment {
        name: c[1].to_string(),
        value: c[2].to_string(),
        declare: false,
    })
}

fn index_assign(sim: &mut LineSimulator, stmt: &str) -> bool {
    let Some(c) = patterns::INDEX_ASSIGN.captures(stmt) else {
        return false;
    };
    let (target, key, value) = (c[1].to_string(), c[2].to_string(), c[3].to_string());
    if let Some(id) = sim.ref_of(&target) {
        let key = values::evaluate(&key, sim).map_or(key, |k| k.key());
        write_property(sim, &id, &key, &value);
    }
    true
}

fn property_assign(sim: &mut LineSimulator, stmt: &str) -> bool {
    let Some(c) = patterns::PROPERTY_ASSIGN.captures(stmt) else {
        return false;
    };
    let (target, key, value) = (c[1].to_string(), c[2].to_string(), c[3].to_string());
    if let Some(id) = sim.ref_of(&target) {
        write_property(sim, &id, &key, &value);
    }
    true
}

fn write_property(sim: &mut LineSimulator, id: &str, key: &str, value: &str) {
    let shape = value_shape(sim, value);
    let prop = sim
        .materialize(format!("{}.{}", id, key), key, shape)
        .with_changed(true);
    if let Some(obj) = sim.heap_object_mut(id) {
        obj.set_property(prop);
    }
    sim.touched.insert(id.to_string());
}

fn mutating_method(sim: &mut LineSimulator, stmt: &str) -> bool {
    let Some(c) = patterns::MUTATING_METHOD.captures(stmt) else {
        return false;
    };
    let (target, method, args) = (c[1].to_string(), c[2].to_string(), c[3].to_string());
    let Some(id) = sim.ref_of(&target) else {
        return true;
    };
    if method == "pop" {
        pop_from(sim, &id, &args);
    } else {
        for arg in split_top_level(&args, ',') {
            let at = sim.length(&id).unwrap_or(0).to_string();
            write_property(sim, &id, &at, &arg);
        }
    }
    sim.touched.insert(id);
    true
}

/// Remove an element (arrays renumber) or a key, returning what was removed
fn pop_from(sim: &mut LineSimulator, id: &str, args: &str) -> Option<Operand> {
    let key = if args.trim().is_empty() {
        None
    } else {
        Some(values::evaluate(args, sim).map_or_else(|| args.trim().to_string(), |k| k.key()))
    };
    let obj = sim.heap_object_mut(id)?;
    let at = match &key {
        Some(key) => obj.properties.iter().position(|p| &p.name == key)?,
        None => obj.properties.len().checked_sub(1)?,
    };
    let removed = obj.properties.remove(at);
    if obj.class_name == "Array" {
        for (i, prop) in obj.properties.iter_mut().enumerate().skip(at) {
            prop.name = i.to_string();
            prop.changed = true;
        }
    }
    sim.touched.insert(id.to_string());
    Some(LineSimulator::operand_of(&removed))
}

fn increment(sim: &mut LineSimulator, stmt: &str) -> bool {
    let (name, op) = if let Some(c) = patterns::POSTFIX_STEP.captures(stmt) {
        (c[1].to_string(), c[2].to_string())
    } else if let Some(c) = patterns::PREFIX_STEP.captures(stmt) {
        (c[2].to_string(), c[1].to_string())
    } else {
        return false;
    };
    let current = sim.resolve(&name).unwrap_or_else(|| Operand::Raw(name.clone()));
    let sign = if op == "++" { 1.0 } else { -1.0 };
    let next = match current.as_number() {
        Some(n) => Operand::Number(n + sign),
        None => Operand::Raw(format!("{} {} 1", current.display(), &op[..1])),
    };
    sim.assign(&name, ValueShape::Scalar(next));
    true
}

fn compound_assign(sim: &mut LineSimulator, stmt: &str) -> bool {
    let Some(c) = patterns::COMPOUND_ASSIGN.captures(stmt) else {
        return false;
    };
    let (name, op, rhs) = (c[1].to_string(), c[2].to_string(), c[3].to_string());
    let current = sim.resolve(&name).unwrap_or_else(|| Operand::Raw(name.clone()));
    if let Operand::Ref(id) = &current {
        // the binding keeps pointing at the same object
        if op == "+" {
            extend_in_place(sim, id, &rhs);
        }
        return true;
    }
    let rhs_text = rhs.trim().to_string();
    let rhs = values::evaluate(&rhs, sim).unwrap_or_else(|| Operand::Raw(rhs_text.clone()));
    let rhs = match rhs {
        Operand::Ref(_) => Operand::Raw(rhs_text),
        other => other,
    };

    let numeric = |o: &Operand| match o {
        Operand::Text(s) if op != "+" => s.trim().parse::<f64>().ok(),
        other => other.as_number(),
    };
    let next = match (numeric(&current), numeric(&rhs)) {
        (Some(a), Some(b)) => match op.as_str() {
            "+" => Operand::Number(a + b),
            "-" => Operand::Number(a - b),
            "*" => Operand::Number(a * b),
            "/" if b == 0.0 => Operand::Raw("Infinity".to_string()),
            "/" => Operand::Number(a / b),
            "%" if b == 0.0 => Operand::Raw("NaN".to_string()),
            _ => Operand::Number(a % b),
        },
        _ if op == "+"
            && (matches!(current, Operand::Text(_)) || matches!(rhs, Operand::Text(_))) =>
        {
            Operand::Text(current.printed() + &rhs.printed())
        }
        _ => Operand::Raw(format!("{} {} {}", current.display(), op, rhs.display())),
    };
    sim.assign(&name, ValueShape::Scalar(next));
    true
}

/// `list += [..]` appends elements; object operands merge their keys
fn extend_in_place(sim: &mut LineSimulator, id: &str, rhs: &str) {
    let entries: Vec<(String, Operand)> = match sim.classify(rhs) {
        ValueShape::Collection { entries, .. } => entries,
        ValueShape::Scalar(Operand::Ref(other)) => match sim.heap.iter().find(|o| o.id == other) {
            Some(obj) => obj
                .properties
                .iter()
                .map(|p| (p.name.clone(), LineSimulator::operand_of(p)))
                .collect(),
            None => return,
        },
        _ => return,
    };
    let renumber = sim
        .heap
        .iter()
        .any(|o| o.id == id && o.class_name == "Array");
    for (key, value) in entries {
        if sim.length(id).unwrap_or(0) >= sim.max_properties {
            break;
        }
        let key = if renumber {
            sim.length(id).unwrap_or(0).to_string()
        } else {
            key
        };
        let prop = match value {
            Operand::Ref(target) => Variable::reference(key, target),
            other => Variable::primitive(key, other.display()),
        }
        .with_changed(true);
        if let Some(obj) = sim.heap_object_mut(id) {
            obj.set_property(prop);
        }
    }
    sim.touched.insert(id.to_string());
}

fn assignment(sim: &mut LineSimulator, stmt: &str) -> bool {
    if let Some(c) = patterns::KEYWORD_DECL_EMPTY.captures(stmt) {
        let name = c[1].to_string();
        sim.declare(&name, ValueShape::Scalar(Operand::Keyword("undefined".to_string())));
        return true;
    }
    let Some(assign) = split_assignment(stmt) else {
        return false;
    };
    let shape = value_shape(sim, &assign.value);
    if assign.declare {
        sim.declare(&assign.name, shape);
    } else {
        sim.assign(&assign.name, shape);
    }
    true
}

/// Classify a right-hand side, folding in `pop()` results and inferred returns
fn value_shape(sim: &mut LineSimulator, text: &str) -> ValueShape {
    let text = text.trim();
    if let Some(c) = patterns::MUTATING_METHOD.captures(text) {
        if &c[2] == "pop" {
            if let Some(id) = sim.ref_of(&c[1]) {
                let args = c[3].to_string();
                let popped = pop_from(sim, &id, &args);
                return ValueShape::Scalar(
                    popped.unwrap_or_else(|| Operand::Keyword("undefined".to_string())),
                );
            }
        }
    }
    if let Some(value) = sim.call_result(text) {
        return ValueShape::Scalar(value);
    }
    sim.classify(text)
}
