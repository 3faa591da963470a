// Integration tests for the playback controller

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use stepviz::errors::{ErrorKind, TraceError};
use stepviz::fulltrace::{Trace, TraceEvent, TraceOutput, TraceRunner, TraceStatus};
use stepviz::language::{BackendKind, Language};
use stepviz::playback::{Playback, PlaybackOptions};
use stepviz::sandbox::SandboxConfig;
use stepviz::snapshot::{StackFrame, Stream, Variable};

/// Hands out a prepared trace and counts how often it was asked
struct CannedRunner {
    trace: Result<Trace, TraceError>,
    calls: Rc<Cell<usize>>,
}

impl TraceRunner for CannedRunner {
    fn run(&self, _source: &str) -> Result<Trace, TraceError> {
        self.calls.set(self.calls.get() + 1);
        self.trace.clone()
    }
}

fn event(line: usize, vars: &[(&str, &str)]) -> TraceEvent {
    let mut global = StackFrame::new("global", "global");
    global.active = true;
    for (name, value) in vars {
        global.variables.push(Variable::primitive(*name, *value));
    }
    TraceEvent {
        line,
        stack: vec![global],
        heap: Vec::new(),
    }
}

fn canned(trace: Result<Trace, TraceError>) -> (Playback, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    let runner = CannedRunner {
        trace,
        calls: calls.clone(),
    };
    (
        Playback::with_runner(PlaybackOptions::default(), Box::new(runner)),
        calls,
    )
}

fn python_trace(status: TraceStatus) -> Trace {
    Trace {
        events: vec![
            event(1, &[]),
            event(2, &[("x", "1")]),
            event(3, &[("x", "1"), ("y", "2")]),
        ],
        output: vec![TraceOutput {
            event_index: 2,
            stream: Stream::Stdout,
            text: "1\n".to_string(),
            line: Some(2),
        }],
        status,
        truncated: false,
    }
}

fn run_to_end(playback: &mut Playback) -> usize {
    let mut steps = 0;
    while playback.step_once() {
        steps += 1;
        assert!(steps < 10_000, "playback never finished");
    }
    steps
}

#[test]
fn test_simulator_backend_for_other_languages() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("int x = 1;\nx = x + 2;", Language::C);
    assert!(playback.backend_kind().is_none());

    assert!(playback.step_once());
    assert_eq!(playback.backend_kind(), Some(BackendKind::Simulator));
    assert!(playback.is_executing());
    assert_eq!(playback.active_line(), 1);
    let x = playback.snapshot().lookup("x").expect("x bound");
    assert_eq!(x.value, "1");
    assert!(x.changed);

    assert!(playback.step_once());
    assert_eq!(playback.snapshot().lookup("x").expect("x").value, "3");

    // the closing step reports the end
    assert!(playback.step_once());
    assert!(playback.is_finished());
    assert!(!playback.is_executing());
    assert!(!playback.step_once());
}

#[test]
fn test_simulator_skips_blank_and_comment_lines() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("let a = 1;\n\n// note\nlet b = 2;", Language::TypeScript);
    playback.step_once();
    assert_eq!(playback.active_line(), 1);
    playback.step_once();
    assert_eq!(playback.active_line(), 4);
}

#[test]
fn test_python_falls_back_to_simulator() {
    let options = PlaybackOptions {
        full_trace: false,
        ..PlaybackOptions::default()
    };
    let mut playback = Playback::new(options);
    playback.load("def f():\n  return 1\nx = f()", Language::Python);
    run_to_end(&mut playback);
    assert_eq!(playback.backend_kind(), Some(BackendKind::Simulator));
    assert_eq!(playback.snapshot().lookup("x").expect("x").value, "1");
    assert_eq!(playback.snapshot().stack.len(), 1);
}

#[test]
fn test_preflight_blocks_backend() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("function f() {\n  let x = 1;\n", Language::JavaScript);
    assert!(!playback.step_once());

    let err = playback.error().expect("pre-flight error");
    assert_eq!(err.kind, ErrorKind::SyntaxIssue);
    assert_eq!(err.message, "Unbalanced braces");
    assert_eq!(playback.active_line(), 1);
    assert!(playback.backend_kind().is_none());
    assert!(!playback.is_executing());
}

#[test]
fn test_sandbox_backend_runs_javascript() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("let x = 1;\nconsole.log(x + 1);\nx = 5;", Language::JavaScript);
    run_to_end(&mut playback);

    assert_eq!(playback.backend_kind(), Some(BackendKind::Sandbox));
    assert!(playback.is_finished());
    assert!(playback.error().is_none());
    let lines: Vec<String> = playback.output().lines().into_iter().map(|(_, t)| t).collect();
    assert_eq!(lines, vec!["2"]);
    assert_eq!(playback.snapshot().lookup("x").expect("x").value, "5");
}

#[test]
fn test_sandbox_entry_point_result() {
    let options = PlaybackOptions {
        entry_point: Some("add".to_string()),
        args: vec![serde_json::json!(2), serde_json::json!(3)],
        ..PlaybackOptions::default()
    };
    let mut playback = Playback::new(options);
    playback.load("function add(a, b) {\n  return a + b;\n}", Language::JavaScript);
    run_to_end(&mut playback);
    assert_eq!(playback.result(), Some(&serde_json::json!(5)));
}

#[test]
fn test_runtime_error_moves_active_line() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("let a = 1;\nlet b = a.c.d;\nlet z = 0;", Language::JavaScript);
    run_to_end(&mut playback);

    let err = playback.error().expect("runtime error");
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(playback.active_line(), 2);
    assert!(!playback.is_executing());
    assert!(!playback.step_once());
}

#[test]
fn test_play_infinite_loop_times_out() {
    let options = PlaybackOptions {
        sandbox: SandboxConfig {
            max_steps: 30,
            ..SandboxConfig::default()
        },
        ..PlaybackOptions::default()
    };
    let mut playback = Playback::new(options);
    playback.load("let i = 0;\nwhile (true) {\n  i++;\n}", Language::JavaScript);

    let mut now = Instant::now();
    assert!(playback.play(now));
    let mut ticks = 0;
    while playback.is_playing() {
        playback.tick(now);
        now += Duration::from_millis(playback.speed_ms());
        ticks += 1;
        assert!(ticks < 1000, "timer never stopped");
    }

    let err = playback.error().expect("timeout");
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(!playback.is_playing());
    assert!(!playback.tick(now));
}

#[test]
fn test_tick_waits_for_the_timer() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("x = 1\ny = 2\nz = 3", Language::Kotlin);
    let start = Instant::now();
    assert!(!playback.tick(start), "paused playback must not step");

    playback.play(start);
    assert!(playback.tick(start));
    assert_eq!(playback.steps_taken(), 1);
    assert!(!playback.tick(start + Duration::from_millis(10)));
    assert!(playback.tick(start + Duration::from_millis(1200)));
    assert_eq!(playback.steps_taken(), 2);

    playback.pause();
    assert!(!playback.tick(start + Duration::from_secs(60)));
}

#[test]
fn test_speed_is_clamped() {
    let mut playback = Playback::new(PlaybackOptions::default());
    assert_eq!(playback.speed_ms(), 1200);
    assert_eq!(playback.set_speed_ms(10), 80);
    assert_eq!(playback.speed_ms(), 80);
    assert_eq!(playback.set_speed_ms(400), 400);
}

#[test]
fn test_reset_is_idempotent() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("let x = 1;\nconsole.log(x);", Language::JavaScript);
    run_to_end(&mut playback);
    assert!(!playback.output().is_empty());

    playback.reset();
    playback.reset();
    assert!(playback.snapshot().is_empty());
    assert!(playback.output().is_empty());
    assert!(playback.error().is_none());
    assert!(playback.backend_kind().is_none());
    assert!(!playback.is_finished());
    assert_eq!(playback.active_line(), 1);

    // and the program can be played again
    assert!(playback.step_once());
    assert_eq!(playback.active_line(), 1);
}

#[test]
fn test_replay_steps_both_ways() {
    let (mut playback, calls) = canned(Ok(python_trace(TraceStatus::ok())));
    playback.load("x = 1\nprint(x)\ny = 2\n", Language::Python);

    assert!(playback.step_once());
    assert_eq!(playback.backend_kind(), Some(BackendKind::FullTrace));
    assert!(!playback.can_step_back());
    assert!(playback.step_once());
    assert!(playback.output().is_empty());
    assert!(playback.step_once());
    assert_eq!(playback.active_line(), 3);
    assert_eq!(playback.output().len(), 1);
    assert!(playback.is_finished());
    assert!(playback.snapshot().lookup("y").expect("y").changed);

    assert!(playback.step_back());
    assert_eq!(playback.active_line(), 2);
    assert!(playback.output().is_empty());
    assert!(!playback.is_finished());
    assert!(playback.step_once());
    assert!(playback.is_finished());
    assert_eq!(calls.get(), 1, "the program is traced once");
}

#[test]
fn test_replay_error_surfaces_at_the_end() {
    let status = TraceStatus {
        ok: false,
        error: Some("NameError: name 'q' is not defined".to_string()),
        line: Some(3),
    };
    let (mut playback, _) = canned(Ok(python_trace(status)));
    playback.load("x = 1\nprint(x)\ny = q\n", Language::Python);
    playback.step_once();
    playback.step_once();
    assert!(playback.error().is_none());
    playback.step_once();

    let err = playback.error().expect("error at the last event");
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(err.line, Some(3));
    assert!(!playback.is_executing());
}

#[test]
fn test_replay_runner_failure() {
    let (mut playback, _) = canned(Err(TraceError::timeout("The program ran longer than 5000 ms")));
    playback.load("while True:\n    pass\n", Language::Python);
    assert!(!playback.step_once());
    assert_eq!(playback.error().expect("timeout").kind, ErrorKind::Timeout);
    assert!(playback.backend_kind().is_none());
}

#[test]
fn test_step_back_is_noop_elsewhere() {
    let mut playback = Playback::new(PlaybackOptions::default());
    playback.load("int a = 1;\nint b = 2;", Language::Java);
    playback.step_once();
    playback.step_once();
    assert!(!playback.step_back());
    assert_eq!(playback.active_line(), 2);
}
