//! Snapshot model shared by every execution backend
//!
//! A [`Snapshot`] is the `(stack, heap)` pair a UI renders after one step.
//! The sandbox, the heuristic simulator and the full-trace replay all produce
//! this exact shape, so the panes never need to know which backend ran.
//!
//! The types serialize with camelCase field names (`refId`, `className`),
//! which is also the JSON shape emitted by the Python tracer.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Whether a variable holds a value or points at a [`HeapObject`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarKind {
    Primitive,
    Reference,
}

/// A named binding in a frame, or a property of a heap object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    /// Literal text for primitives, the heap id for references
    pub value: String,
    pub kind: VarKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub changed: bool,
}

impl Variable {
    pub fn primitive(name: impl Into<String>, value: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            value: value.into(),
            kind: VarKind::Primitive,
            ref_id: None,
            changed: false,
        }
    }

    pub fn reference(name: impl Into<String>, ref_id: impl Into<String>) -> Self {
        let ref_id = ref_id.into();
        Variable {
            name: name.into(),
            value: ref_id.clone(),
            kind: VarKind::Reference,
            ref_id: Some(ref_id),
            changed: false,
        }
    }

    pub fn with_changed(mut self, changed: bool) -> Self {
        self.changed = changed;
        self
    }

    pub fn is_reference(&self) -> bool {
        self.kind == VarKind::Reference
    }

    /// Same binding content, ignoring the `changed` flag
    fn same_content(&self, other: &Variable) -> bool {
        self.value == other.value && self.kind == other.kind && self.ref_id == other.ref_id
    }
}

/// One call-activation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub variables: Vec<Variable>,
}

impl StackFrame {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        StackFrame {
            id: id.into(),
            name: name.into(),
            active: false,
            variables: Vec::new(),
        }
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// A simulated reference-type value (array, object, instance)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapObject {
    pub id: String,
    pub class_name: String,
    #[serde(default)]
    pub properties: Vec<Variable>,
    #[serde(default)]
    pub highlight: bool,
}

impl HeapObject {
    pub fn new(id: impl Into<String>, class_name: impl Into<String>) -> Self {
        HeapObject {
            id: id.into(),
            class_name: class_name.into(),
            properties: Vec::new(),
            highlight: false,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Variable> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Insert or replace a property, keeping names unique
    pub fn set_property(&mut self, prop: Variable) {
        match self.properties.iter_mut().find(|p| p.name == prop.name) {
            Some(existing) => *existing = prop,
            None => self.properties.push(prop),
        }
    }
}

/// Program state at one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub stack: Vec<StackFrame>,
    pub heap: Vec<HeapObject>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty() && self.heap.is_empty()
    }

    /// The outermost frame
    pub fn global(&self) -> Option<&StackFrame> {
        self.stack.first()
    }

    pub fn active_frame(&self) -> Option<&StackFrame> {
        self.stack.iter().find(|f| f.active)
    }

    pub fn frame_named(&self, name: &str) -> Option<&StackFrame> {
        self.stack.iter().rev().find(|f| f.name == name)
    }

    pub fn heap_object(&self, id: &str) -> Option<&HeapObject> {
        self.heap.iter().find(|o| o.id == id)
    }

    /// Resolve a reference variable to the object it points at
    pub fn deref(&self, var: &Variable) -> Option<&HeapObject> {
        var.ref_id.as_deref().and_then(|id| self.heap_object(id))
    }

    /// Look a name up from the innermost frame outwards
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.stack.iter().rev().find_map(|f| f.variable(name))
    }

    /// Names of every variable and property flagged as changed
    pub fn changed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .stack
            .iter()
            .flat_map(|f| f.variables.iter())
            .filter(|v| v.changed)
            .map(|v| v.name.clone())
            .collect();
        for obj in &self.heap {
            for prop in obj.properties.iter().filter(|p| p.changed) {
                names.push(format!("{}[{}]", obj.id, prop.name));
            }
        }
        names
    }

    /// Check the structural invariants every backend must uphold.
    ///
    /// Exactly one active frame (the innermost), unique property names, and
    /// every reference resolving to an object in this snapshot.
    pub fn check_invariants(&self) -> Result<(), String> {
        if !self.stack.is_empty() {
            let active: Vec<usize> = self
                .stack
                .iter()
                .enumerate()
                .filter(|(_, f)| f.active)
                .map(|(i, _)| i)
                .collect();
            if active != vec![self.stack.len() - 1] {
                return Err(format!("expected only the innermost frame active, got {:?}", active));
            }
        }

        for obj in &self.heap {
            let mut seen = rustc_hash::FxHashSet::default();
            for prop in &obj.properties {
                if !seen.insert(prop.name.as_str()) {
                    return Err(format!("duplicate property '{}' on {}", prop.name, obj.id));
                }
            }
        }

        let vars = self
            .stack
            .iter()
            .flat_map(|f| f.variables.iter())
            .chain(self.heap.iter().flat_map(|o| o.properties.iter()));
        for var in vars {
            if var.is_reference() {
                match &var.ref_id {
                    Some(id) if self.heap_object(id).is_some() => {}
                    Some(id) => return Err(format!("'{}' points at missing object {}", var.name, id)),
                    None => return Err(format!("reference '{}' has no refId", var.name)),
                }
            }
        }
        Ok(())
    }
}

/// Set `changed`/`highlight` on `next` by diffing it against `previous`.
///
/// Frames are matched by id, variables and properties by name, objects by id.
/// A binding absent from `previous` counts as changed; with no previous
/// snapshot every flag is cleared instead, since the first step has nothing
/// to compare against.
pub fn mark_changes(previous: Option<&Snapshot>, next: &mut Snapshot) {
    let Some(previous) = previous else {
        for frame in &mut next.stack {
            frame.variables.iter_mut().for_each(|v| v.changed = false);
        }
        for obj in &mut next.heap {
            obj.highlight = false;
            obj.properties.iter_mut().for_each(|p| p.changed = false);
        }
        return;
    };

    let prev_frames: FxHashMap<&str, &StackFrame> =
        previous.stack.iter().map(|f| (f.id.as_str(), f)).collect();
    for frame in &mut next.stack {
        let before = prev_frames.get(frame.id.as_str());
        for var in &mut frame.variables {
            var.changed = match before.and_then(|f| f.variable(&var.name)) {
                Some(old) => !old.same_content(var),
                None => true,
            };
        }
    }

    let prev_heap: FxHashMap<&str, &HeapObject> =
        previous.heap.iter().map(|o| (o.id.as_str(), o)).collect();
    for obj in &mut next.heap {
        match prev_heap.get(obj.id.as_str()) {
            Some(old) => {
                let mut touched = old.properties.len() != obj.properties.len()
                    || old.class_name != obj.class_name;
                for prop in &mut obj.properties {
                    prop.changed = match old.property(&prop.name) {
                        Some(before) => !before.same_content(prop),
                        None => true,
                    };
                    touched |= prop.changed;
                }
                obj.highlight = touched;
            }
            None => {
                obj.highlight = true;
                obj.properties.iter_mut().for_each(|p| p.changed = false);
            }
        }
    }
}

/// Which stream an output entry was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

/// One chunk of program output with the source line that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub stream: Stream,
    pub text: String,
    #[serde(default)]
    pub line: Option<usize>,
}

impl OutputEntry {
    pub fn stdout(text: impl Into<String>, line: Option<usize>) -> Self {
        OutputEntry {
            stream: Stream::Stdout,
            text: text.into(),
            line,
        }
    }

    pub fn stderr(text: impl Into<String>, line: Option<usize>) -> Self {
        OutputEntry {
            stream: Stream::Stderr,
            text: text.into(),
            line,
        }
    }
}

/// Bounded, ordered output buffer; the oldest entries are dropped first
#[derive(Debug, Clone)]
pub struct OutputLog {
    entries: VecDeque<OutputEntry>,
    capacity: usize,
    dropped: usize,
}

impl OutputLog {
    pub fn new(capacity: usize) -> Self {
        OutputLog {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, entry: OutputEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = OutputEntry>) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }

    pub fn entries(&self) -> impl Iterator<Item = &OutputEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many entries were evicted since the last clear
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Output split into display lines, one entry per line of text
    pub fn lines(&self) -> Vec<(Stream, String)> {
        let mut lines: Vec<(Stream, String)> = Vec::new();
        let mut current: Option<(Stream, String)> = None;
        for entry in &self.entries {
            for (i, part) in entry.text.split('\n').enumerate() {
                if i > 0 {
                    // a newline terminates whatever is pending, even if empty
                    lines.push(current.take().unwrap_or((entry.stream, String::new())));
                }
                if part.is_empty() {
                    continue;
                }
                match current.take() {
                    Some((stream, mut text)) if stream == entry.stream => {
                        text.push_str(part);
                        current = Some((stream, text));
                    }
                    Some(other) => {
                        lines.push(other);
                        current = Some((entry.stream, part.to_string()));
                    }
                    None => current = Some((entry.stream, part.to_string())),
                }
            }
        }
        if let Some(pending) = current {
            lines.push(pending);
        }
        lines
    }
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(id: &str, vars: Vec<Variable>) -> StackFrame {
        StackFrame {
            id: id.to_string(),
            name: id.to_string(),
            active: true,
            variables: vars,
        }
    }

    #[test]
    fn test_output_log_drops_oldest() {
        let mut log = OutputLog::new(2);
        log.push(OutputEntry::stdout("a", Some(1)));
        log.push(OutputEntry::stdout("b", Some(2)));
        log.push(OutputEntry::stdout("c", Some(3)));
        let texts: Vec<&str> = log.entries().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn test_output_lines_join_partial_writes() {
        let mut log = OutputLog::new(10);
        log.push(OutputEntry::stdout("hello ", Some(1)));
        log.push(OutputEntry::stdout("world\n", Some(1)));
        log.push(OutputEntry::stdout("next\n", Some(2)));
        let lines: Vec<String> = log.lines().into_iter().map(|(_, t)| t).collect();
        assert_eq!(lines, vec!["hello world", "next"]);
    }

    #[test]
    fn test_mark_changes_flags_only_differences() {
        let before = Snapshot {
            stack: vec![frame_with(
                "global",
                vec![Variable::primitive("x", "1"), Variable::primitive("y", "2")],
            )],
            heap: vec![],
        };
        let mut after = Snapshot {
            stack: vec![frame_with(
                "global",
                vec![
                    Variable::primitive("x", "1"),
                    Variable::primitive("y", "5"),
                    Variable::primitive("z", "0"),
                ],
            )],
            heap: vec![],
        };
        mark_changes(Some(&before), &mut after);
        let flags: Vec<bool> = after.stack[0].variables.iter().map(|v| v.changed).collect();
        assert_eq!(flags, vec![false, true, true]);
    }

    #[test]
    fn test_mark_changes_highlights_mutated_object() {
        let mut arr = HeapObject::new("h1", "Array");
        arr.set_property(Variable::primitive("0", "1"));
        let before = Snapshot {
            stack: vec![],
            heap: vec![arr.clone()],
        };
        let mut after_obj = arr.clone();
        after_obj.set_property(Variable::primitive("0", "99"));
        let mut after = Snapshot {
            stack: vec![],
            heap: vec![after_obj, HeapObject::new("h2", "Object")],
        };
        mark_changes(Some(&before), &mut after);
        assert!(after.heap[0].highlight);
        assert!(after.heap[0].properties[0].changed);
        assert!(after.heap[1].highlight);
    }

    #[test]
    fn test_invariants_catch_dangling_reference() {
        let snap = Snapshot {
            stack: vec![frame_with("global", vec![Variable::reference("a", "h9")])],
            heap: vec![],
        };
        assert!(snap.check_invariants().is_err());
    }
}
