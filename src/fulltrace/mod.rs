//! Upfront full-trace backend
//!
//! An external interpreter runs the whole program once under a line tracer
//! and reports every step as JSON. The resulting [`Trace`] is immutable;
//! [`TraceReplay`] walks it forwards and backwards.
//!
//! ```text
//! source ─▶ TraceRunner::run ─▶ Trace { events, output, status } ─▶ TraceReplay
//! ```

mod python;

pub use python::PythonTraceRunner;

use crate::errors::TraceError;
use crate::snapshot::{mark_changes, HeapObject, OutputEntry, Snapshot, StackFrame, Stream};
use serde::{Deserialize, Serialize};

/// One recorded line event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub line: usize,
    #[serde(default)]
    pub stack: Vec<StackFrame>,
    #[serde(default)]
    pub heap: Vec<HeapObject>,
}

impl TraceEvent {
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            stack: self.stack.clone(),
            heap: self.heap.clone(),
        }
    }
}

/// Output written while the program ran, tagged with the first event at
/// which it has become visible
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceOutput {
    pub event_index: usize,
    pub stream: Stream,
    pub text: String,
    #[serde(default)]
    pub line: Option<usize>,
}

impl TraceOutput {
    pub fn entry(&self) -> OutputEntry {
        OutputEntry {
            stream: self.stream,
            text: self.text.clone(),
            line: self.line,
        }
    }
}

/// How the traced run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStatus {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub line: Option<usize>,
}

impl TraceStatus {
    pub fn ok() -> Self {
        TraceStatus {
            ok: true,
            error: None,
            line: None,
        }
    }

    /// The failure as a runtime error; `None` for a clean run.
    ///
    /// A Python `SyntaxError` is reported as a syntax issue.
    pub fn error(&self) -> Option<TraceError> {
        if self.ok {
            return None;
        }
        let message = self
            .error
            .clone()
            .unwrap_or_else(|| "The program failed".to_string());
        if message.starts_with("SyntaxError") || message.starts_with("IndentationError") {
            Some(TraceError::syntax(message, self.line))
        } else {
            Some(TraceError::runtime(message, self.line))
        }
    }
}

/// The complete, ordered record of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub events: Vec<TraceEvent>,
    #[serde(default)]
    pub output: Vec<TraceOutput>,
    pub status: TraceStatus,
    /// The event cap was reached before the program ended
    #[serde(default)]
    pub truncated: bool,
}

impl Trace {
    /// Enforce the event cap and keep output indices inside the event list
    pub fn normalize(&mut self, max_events: usize) {
        if self.events.len() > max_events {
            self.events.truncate(max_events);
            self.truncated = true;
        }
        let last = self.events.len().saturating_sub(1);
        for out in &mut self.output {
            out.event_index = out.event_index.min(last);
        }
    }
}

/// Anything that can run a program to completion and record it
pub trait TraceRunner {
    fn run(&self, source: &str) -> Result<Trace, TraceError>;
}

/// Cursor over an immutable [`Trace`]
///
/// The cursor starts before the first event. Stepping past either end does
/// nothing.
#[derive(Debug, Clone)]
pub struct TraceReplay {
    trace: Trace,
    cursor: Option<usize>,
}

impl TraceReplay {
    pub fn new(trace: Trace) -> Self {
        TraceReplay {
            trace,
            cursor: None,
        }
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Index of the current event, `None` before the first step
    pub fn position(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.trace.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.events.is_empty()
    }

    /// Move to the next event; returns false when already on the last one
    pub fn step_forward(&mut self) -> bool {
        let next = self.cursor.map_or(0, |c| c + 1);
        if next >= self.trace.events.len() {
            return false;
        }
        self.cursor = Some(next);
        true
    }

    /// Move to the previous event; returns false on the first event
    pub fn step_back(&mut self) -> bool {
        match self.cursor {
            Some(c) if c > 0 => {
                self.cursor = Some(c - 1);
                true
            }
            _ => false,
        }
    }

    pub fn is_at_end(&self) -> bool {
        match self.cursor {
            Some(c) => c + 1 >= self.trace.events.len(),
            None => self.trace.events.is_empty(),
        }
    }

    /// Line and change-marked snapshot at the cursor
    pub fn current(&self) -> Option<(usize, Snapshot)> {
        let index = self.cursor?;
        let event = self.trace.events.get(index)?;
        let mut snapshot = event.snapshot();
        let previous = index
            .checked_sub(1)
            .and_then(|i| self.trace.events.get(i))
            .map(TraceEvent::snapshot);
        mark_changes(previous.as_ref(), &mut snapshot);
        Some((event.line, snapshot))
    }

    /// Output visible at the cursor. Everything is visible on the last event.
    pub fn revealed_output(&self) -> Vec<OutputEntry> {
        let Some(cursor) = self.cursor else {
            return Vec::new();
        };
        let all = self.is_at_end();
        self.trace
            .output
            .iter()
            .filter(|o| all || o.event_index <= cursor)
            .map(TraceOutput::entry)
            .collect()
    }

    pub fn error(&self) -> Option<TraceError> {
        self.trace.status.error()
    }

    pub fn truncated(&self) -> bool {
        self.trace.truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::snapshot::Variable;

    fn event(line: usize, x: &str) -> TraceEvent {
        let mut global = StackFrame::new("global", "global");
        global.active = true;
        global.variables.push(Variable::primitive("x", x));
        TraceEvent {
            line,
            stack: vec![global],
            heap: Vec::new(),
        }
    }

    fn sample() -> Trace {
        Trace {
            events: vec![event(1, "1"), event(2, "1"), event(3, "4")],
            output: vec![TraceOutput {
                event_index: 2,
                stream: Stream::Stdout,
                text: "hi\n".to_string(),
                line: Some(2),
            }],
            status: TraceStatus::ok(),
            truncated: false,
        }
    }

    #[test]
    fn test_cursor_stops_at_both_ends() {
        let mut replay = TraceReplay::new(sample());
        assert!(!replay.step_back());
        assert!(replay.current().is_none());

        assert!(replay.step_forward());
        assert!(replay.step_forward());
        assert!(replay.step_forward());
        assert!(!replay.step_forward());
        assert_eq!(replay.position(), Some(2));
        assert!(replay.is_at_end());

        assert!(replay.step_back());
        assert!(replay.step_back());
        assert!(!replay.step_back());
        assert_eq!(replay.position(), Some(0));
    }

    #[test]
    fn test_snapshots_marked_against_previous_event() {
        let mut replay = TraceReplay::new(sample());
        replay.step_forward();
        replay.step_forward();
        let (line, snap) = replay.current().expect("second event");
        assert_eq!(line, 2);
        assert!(!snap.lookup("x").expect("x").changed);

        replay.step_forward();
        let (_, snap) = replay.current().expect("third event");
        assert!(snap.lookup("x").expect("x").changed);
    }

    #[test]
    fn test_output_revealed_by_event_index() {
        let mut replay = TraceReplay::new(sample());
        replay.step_forward();
        replay.step_forward();
        assert!(replay.revealed_output().is_empty());
        replay.step_forward();
        assert_eq!(replay.revealed_output().len(), 1);
        replay.step_back();
        assert!(replay.revealed_output().is_empty());
    }

    #[test]
    fn test_normalize_truncates_and_clamps() {
        let mut trace = sample();
        trace.normalize(2);
        assert!(trace.truncated);
        assert_eq!(trace.events.len(), 2);
        assert_eq!(trace.output[0].event_index, 1);
    }

    #[test]
    fn test_status_error_kinds() {
        let syntax = TraceStatus {
            ok: false,
            error: Some("SyntaxError: invalid syntax".to_string()),
            line: Some(3),
        };
        let err = syntax.error().expect("error");
        assert_eq!(err.kind, ErrorKind::SyntaxIssue);
        assert_eq!(err.line, Some(3));

        let runtime = TraceStatus {
            ok: false,
            error: Some("ZeroDivisionError: division by zero".to_string()),
            line: Some(2),
        };
        assert_eq!(runtime.error().expect("error").kind, ErrorKind::RuntimeError);
        assert!(TraceStatus::ok().error().is_none());
    }

    #[test]
    fn test_trace_json_shape() {
        let json = r#"{
            "events": [{"line": 1, "stack": [{"id": "global", "name": "global", "active": true,
                "variables": [{"name": "a", "value": "obj1", "kind": "reference", "refId": "obj1"}]}],
                "heap": [{"id": "obj1", "className": "list",
                    "properties": [{"name": "0", "value": "1", "kind": "primitive"}]}]}],
            "output": [{"eventIndex": 0, "stream": "stdout", "text": "x\n", "line": 1}],
            "status": {"ok": true}
        }"#;
        let trace: Trace = serde_json::from_str(json).expect("valid trace");
        assert!(!trace.truncated);
        let snap = trace.events[0].snapshot();
        assert!(snap.check_invariants().is_ok());
        let a = snap.lookup("a").expect("a");
        assert_eq!(snap.deref(a).expect("list").class_name, "list");
    }
}
