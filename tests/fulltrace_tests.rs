// Integration tests for the Python full-trace runner and replay

use std::process::Command;
use std::time::Duration;
use stepviz::errors::ErrorKind;
use stepviz::fulltrace::{PythonTraceRunner, Trace, TraceReplay, TraceRunner};

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn trace(source: &str) -> Option<Trace> {
    if !python_available() {
        eprintln!("python3 not found, skipping");
        return None;
    }
    let runner = PythonTraceRunner::default();
    Some(runner.run(source).expect("tracer should run"))
}

#[test]
fn test_trace_records_every_line() {
    let Some(trace) = trace("x = 1\ny = x + 2\n") else {
        return;
    };
    assert!(trace.status.ok);
    let lines: Vec<usize> = trace.events.iter().map(|e| e.line).collect();
    // the closing event repeats the last line with the final state
    assert_eq!(lines, vec![1, 2, 2]);

    let last = trace.events.last().expect("final event").snapshot();
    assert_eq!(last.lookup("y").expect("y").value, "3");
    assert!(last.check_invariants().is_ok());
}

#[test]
fn test_function_frames_and_heap() {
    let source = "def double(a):\n    b = a * 2\n    return b\n\nitems = [1]\nitems.append(double(3))\n";
    let Some(trace) = trace(source) else {
        return;
    };
    let inside = trace
        .events
        .iter()
        .find(|e| e.line == 3)
        .expect("return line traced");
    let snap = inside.snapshot();
    let frame = snap.active_frame().expect("active frame");
    assert_eq!(frame.name, "double()");
    assert_eq!(frame.variable("b").expect("b").value, "6");
    assert!(snap.global().expect("global").variable("double").is_none());

    let end = trace.events.last().expect("final event").snapshot();
    let items = end.lookup("items").expect("items");
    let list = end.deref(items).expect("list object");
    assert_eq!(list.class_name, "list");
    assert_eq!(list.property("1").expect("second item").value, "6");
}

#[test]
fn test_runtime_error_keeps_events() {
    let Some(trace) = trace("x = 1\ny = x / 0\nz = 2\n") else {
        return;
    };
    assert!(!trace.status.ok);
    let err = trace.status.error().expect("error");
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert!(err.message.starts_with("ZeroDivisionError"));
    assert_eq!(err.line, Some(2));
    assert_eq!(trace.events.len(), 2);
}

#[test]
fn test_syntax_error_reported() {
    let Some(trace) = trace("x = (\n") else {
        return;
    };
    assert!(trace.events.is_empty());
    let err = trace.status.error().expect("error");
    assert_eq!(err.kind, ErrorKind::SyntaxIssue);
    assert_eq!(err.line, Some(1));
}

#[test]
fn test_event_cap_truncates() {
    if !python_available() {
        return;
    }
    let runner = PythonTraceRunner::new("python3", Duration::from_secs(5), 10);
    let trace = runner
        .run("while True:\n    pass\n")
        .expect("capped trace");
    assert!(trace.truncated);
    assert_eq!(trace.events.len(), 10);
}

#[test]
fn test_timeout_kills_tracer() {
    if !python_available() {
        return;
    }
    let runner = PythonTraceRunner::new("python3", Duration::from_millis(300), 5000);
    let err = runner
        .run("import time\ntime.sleep(10)\n")
        .expect_err("should time out");
    assert_eq!(err.kind, ErrorKind::Timeout);
}

#[test]
fn test_missing_interpreter() {
    let runner = PythonTraceRunner::new("stepviz-no-such-python", Duration::from_secs(1), 10);
    match runner.run("x = 1\n") {
        Err(err) => {
            assert_eq!(err.kind, ErrorKind::RuntimeError);
            assert!(err.message.contains("Could not start"));
        }
        Ok(_) => panic!("Expected a launch failure"),
    }
}

#[test]
fn test_replay_reveals_output_progressively() {
    let Some(trace) = trace("print('a')\nprint('b')\nx = 1\n") else {
        return;
    };
    let mut replay = TraceReplay::new(trace);
    let mut seen = Vec::new();
    while replay.step_forward() {
        seen.push(replay.revealed_output().len());
    }
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&2));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));

    replay.step_back();
    replay.step_back();
    assert!(replay.revealed_output().len() < 2);
}
