//! Error contract shared by every execution backend
//!
//! Backend-specific failures (pre-flight issues, sandbox exceptions, Python
//! tracebacks, subprocess crashes, budget overruns) are normalized into a
//! single [`TraceError`] before they reach the playback controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a [`TraceError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Detected before execution started (pre-flight check or parse failure)
    SyntaxIssue,
    /// Raised by the program while it ran
    RuntimeError,
    /// Execution exceeded one of its budgets and was forcibly stopped
    Timeout,
    /// Execution was stopped on request
    Terminated,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::SyntaxIssue => "Syntax issue",
            ErrorKind::RuntimeError => "Runtime error",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Terminated => "Terminated",
        };
        f.write_str(label)
    }
}

/// A normalized execution error: `{ message, line?, kind }`
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TraceError {
    pub kind: ErrorKind,
    pub message: String,
    /// 1-based source line, when the backend could supply one
    pub line: Option<usize>,
}

impl TraceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, line: Option<usize>) -> Self {
        TraceError {
            kind,
            message: message.into(),
            line,
        }
    }

    pub fn syntax(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::new(ErrorKind::SyntaxIssue, message, line)
    }

    pub fn runtime(message: impl Into<String>, line: Option<usize>) -> Self {
        Self::new(ErrorKind::RuntimeError, message, line)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message, None)
    }

    pub fn terminated() -> Self {
        Self::new(ErrorKind::Terminated, "Execution was terminated", None)
    }

    /// Message with the line appended, for status bars and logs
    pub fn describe(&self) -> String {
        match self.line {
            Some(line) => format!("{} (line {})", self, line),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind() {
        let err = TraceError::runtime("x is not defined", Some(3));
        assert_eq!(err.to_string(), "Runtime error: x is not defined");
        assert_eq!(err.describe(), "Runtime error: x is not defined (line 3)");
    }

    #[test]
    fn test_timeout_has_no_line() {
        let err = TraceError::timeout("step took too long");
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.line.is_none());
    }
}
