// Integration tests for the sandboxed interpreter controller

use serde_json::json;
use stepviz::errors::{ErrorKind, TraceError};
use stepviz::sandbox::{SandboxConfig, SandboxController, SandboxState, SandboxStep, StepOutcome};
use stepviz::snapshot::{OutputEntry, Snapshot, Stream, VarKind};

struct Run {
    steps: Vec<SandboxStep>,
    output: Vec<OutputEntry>,
    end: Result<Snapshot, TraceError>,
}

fn run_with(source: &str, config: SandboxConfig) -> Run {
    let mut sandbox =
        SandboxController::create(source, None, Vec::new(), config).expect("sandbox should start");
    let mut steps = Vec::new();
    let mut output = Vec::new();
    loop {
        let outcome = sandbox.step();
        output.extend(sandbox.drain_output());
        match outcome {
            Ok(StepOutcome::Suspended(step)) => steps.push(step),
            Ok(StepOutcome::Finished { snapshot, .. }) => {
                return Run {
                    steps,
                    output,
                    end: Ok(snapshot),
                }
            }
            Err(err) => {
                return Run {
                    steps,
                    output,
                    end: Err(err),
                }
            }
        }
        assert!(steps.len() < 20_000, "program never finished");
    }
}

fn run(source: &str) -> Run {
    run_with(source, SandboxConfig::default())
}

fn texts(output: &[OutputEntry]) -> Vec<&str> {
    output
        .iter()
        .map(|e| e.text.trim_end_matches('\n'))
        .collect()
}

#[test]
fn test_pauses_before_each_statement() {
    let result = run("let x = 1;\nlet y = x + 1;\nconsole.log(y);");
    let lines: Vec<usize> = result.steps.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![1, 2, 3]);

    let before_log = &result.steps[2].snapshot;
    let y = before_log.lookup("y").expect("y declared");
    assert_eq!(y.value, "2");
    assert!(y.changed);
    assert!(!before_log.lookup("x").expect("x declared").changed);

    let end = result.end.expect("program should finish");
    assert_eq!(end.lookup("y").map(|v| v.value.as_str()), Some("2"));
    assert_eq!(texts(&result.output), vec!["2"]);
}

#[test]
fn test_output_arrives_before_the_following_pause() {
    let mut sandbox = SandboxController::create(
        "console.log('a');\nlet n = 2;\nconsole.error('b', n);",
        None,
        Vec::new(),
        SandboxConfig::default(),
    )
    .expect("sandbox should start");
    sandbox.wait_ready().expect("program parses");
    assert_eq!(sandbox.state(), SandboxState::Ready);

    match sandbox.step() {
        Ok(StepOutcome::Suspended(step)) => assert_eq!(step.line, 1),
        other => panic!("Expected pause at line 1, got {:?}", other),
    }
    assert!(sandbox.drain_output().is_empty());

    match sandbox.step() {
        Ok(StepOutcome::Suspended(step)) => assert_eq!(step.line, 2),
        other => panic!("Expected pause at line 2, got {:?}", other),
    }
    let first = sandbox.drain_output();
    assert_eq!(texts(&first), vec!["a"]);
    assert_eq!(first[0].line, Some(1));
    assert_eq!(first[0].stream, Stream::Stdout);

    sandbox.step().expect("pause at line 3");
    assert!(matches!(sandbox.step(), Ok(StepOutcome::Finished { .. })));
    let last = sandbox.drain_output();
    assert_eq!(texts(&last), vec!["b 2"]);
    assert_eq!(last[0].stream, Stream::Stderr);
    assert_eq!(sandbox.state(), SandboxState::Finished);
}

#[test]
fn test_function_call_pushes_frame() {
    let result = run("function add(a, b) {\n  return a + b;\n}\nconst r = add(2, 3);");
    let lines: Vec<usize> = result.steps.iter().map(|s| s.line).collect();
    assert_eq!(lines, vec![4, 2]);

    let inside = &result.steps[1].snapshot;
    assert_eq!(inside.stack.len(), 2);
    let frame = inside.active_frame().expect("active frame");
    assert_eq!(frame.name, "add()");
    assert_eq!(frame.variable("a").map(|v| v.value.as_str()), Some("2"));
    assert_eq!(frame.variable("b").map(|v| v.value.as_str()), Some("3"));
    inside.check_invariants().expect("valid snapshot");

    // hoisted declarations are not shown as variables
    let global = inside.global().expect("global frame");
    assert!(global.variable("add").is_none());

    let end = result.end.expect("program should finish");
    assert_eq!(end.stack.len(), 1);
    let r = end.lookup("r").expect("r declared");
    assert_eq!(r.value, "5");
    assert!(r.changed);
}

#[test]
fn test_array_mutation_highlights_object() {
    let result = run("const arr = [1, 2];\narr.push(3);\narr[0] = 9;");
    let end = result.end.expect("program should finish");
    end.check_invariants().expect("valid snapshot");

    let arr = end.lookup("arr").expect("arr declared");
    assert_eq!(arr.kind, VarKind::Reference);
    assert!(!arr.changed);

    let obj = end.deref(arr).expect("array on heap");
    assert_eq!(obj.class_name, "Array");
    assert!(obj.highlight);
    let values: Vec<&str> = obj.properties.iter().map(|p| p.value.as_str()).collect();
    assert_eq!(values, vec!["9", "2", "3"]);
    assert!(obj.property("0").expect("index 0").changed);
    assert!(!obj.property("1").expect("index 1").changed);
}

#[test]
fn test_objects_and_nested_references() {
    let result = run("const p = { name: 'Ada', tags: ['x'] };\np.age = 36;");
    let end = result.end.expect("program should finish");
    end.check_invariants().expect("valid snapshot");

    let p = end.deref(end.lookup("p").expect("p declared")).expect("object on heap");
    assert_eq!(p.class_name, "Object");
    let names: Vec<&str> = p.properties.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["name", "tags", "age"]);
    assert_eq!(p.property("name").map(|v| v.value.as_str()), Some("\"Ada\""));
    let tags = p.property("tags").expect("tags property");
    assert!(end.deref(tags).is_some());
}

#[test]
fn test_infinite_loop_runs_out_of_steps() {
    let config = SandboxConfig {
        max_steps: 50,
        ..SandboxConfig::default()
    };
    let result = run_with("let i = 0;\nwhile (true) {\n  i++;\n}", config.clone());
    let err = result.end.expect_err("loop should be stopped");
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(result.steps.len() <= 50);

    let empty = run_with("while (true) {}", config);
    assert_eq!(empty.end.expect_err("loop should be stopped").kind, ErrorKind::Timeout);
}

#[test]
fn test_timeout_leaves_controller_timed_out() {
    let config = SandboxConfig {
        max_steps: 5,
        ..SandboxConfig::default()
    };
    let mut sandbox = SandboxController::create("for (;;) {}", None, Vec::new(), config)
        .expect("sandbox should start");
    let err = loop {
        match sandbox.step() {
            Ok(StepOutcome::Suspended(_)) => continue,
            Ok(StepOutcome::Finished { .. }) => panic!("Expected timeout"),
            Err(err) => break err,
        }
    };
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(sandbox.state(), SandboxState::TimedOut);
    assert!(matches!(sandbox.result(), Some(Err(e)) if e.kind == ErrorKind::Timeout));
    // further steps report the same error
    assert_eq!(sandbox.step().expect_err("still failed").kind, ErrorKind::Timeout);
}

#[test]
fn test_runtime_error_reports_line() {
    let result = run("let o = null;\nlet v = o.x;");
    let err = result.end.expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(err.line, Some(2));
    assert!(err.message.contains("Cannot read properties of null"));
}

#[test]
fn test_undefined_variable() {
    let err = run("let a = 1;\nconsole.log(b);").end.expect_err("should fail");
    assert!(err.message.contains("b is not defined"));
    assert_eq!(err.line, Some(2));
}

#[test]
fn test_uncaught_throw() {
    let err = run("let n = 1;\nthrow new Error('boom');").end.expect_err("should fail");
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert_eq!(err.message, "Uncaught Error: boom");
    assert_eq!(err.line, Some(2));
}

#[test]
fn test_const_reassignment_fails() {
    let err = run("const k = 1;\nk = 2;").end.expect_err("should fail");
    assert!(err.message.contains("Assignment to constant variable"));
}

#[test]
fn test_syntax_error_before_any_step() {
    let mut sandbox = SandboxController::create("let = 5;", None, Vec::new(), SandboxConfig::default())
        .expect("sandbox should start");
    let err = sandbox.wait_ready().expect_err("should not parse");
    assert_eq!(err.kind, ErrorKind::SyntaxIssue);
    assert_eq!(err.line, Some(1));
    assert_eq!(sandbox.state(), SandboxState::Errored);
    assert!(sandbox.step().is_err());
}

#[test]
fn test_entry_point_result() {
    let mut sandbox = SandboxController::create(
        "function add(a, b) {\n  return a + b;\n}",
        Some("add"),
        vec![json!(2), json!(3)],
        SandboxConfig::default(),
    )
    .expect("sandbox should start");

    let mut lines = Vec::new();
    let result = loop {
        match sandbox.step().expect("no errors") {
            StepOutcome::Suspended(step) => lines.push(step.line),
            StepOutcome::Finished { result, .. } => break result,
        }
    };
    assert_eq!(lines, vec![2]);
    assert_eq!(result, json!(5));
    assert!(matches!(sandbox.result(), Some(Ok(v)) if *v == json!(5)));
}

#[test]
fn test_entry_point_with_array_argument() {
    let mut sandbox = SandboxController::create(
        "function total(xs) {\n  let sum = 0;\n  for (const x of xs) {\n    sum += x;\n  }\n  return sum;\n}",
        Some("total"),
        vec![json!([1, 2, 3])],
        SandboxConfig::default(),
    )
    .expect("sandbox should start");
    let result = loop {
        if let StepOutcome::Finished { result, .. } = sandbox.step().expect("no errors") {
            break result;
        }
    };
    assert_eq!(result, json!(6));
}

#[test]
fn test_missing_entry_point() {
    let mut sandbox = SandboxController::create("let x = 1;", Some("main"), Vec::new(), SandboxConfig::default())
        .expect("sandbox should start");
    let err = loop {
        match sandbox.step() {
            Ok(_) => continue,
            Err(err) => break err,
        }
    };
    assert!(err.message.contains("main"));
}

#[test]
fn test_terminate_is_idempotent() {
    let mut sandbox = SandboxController::create(
        "let x = 1;\nx = 2;",
        None,
        Vec::new(),
        SandboxConfig::default(),
    )
    .expect("sandbox should start");
    sandbox.step().expect("first pause");

    sandbox.terminate();
    assert_eq!(sandbox.state(), SandboxState::Terminated);
    sandbox.terminate();
    assert_eq!(sandbox.state(), SandboxState::Terminated);

    let err = sandbox.step().expect_err("terminated sandbox cannot step");
    assert_eq!(err.kind, ErrorKind::Terminated);
}

#[test]
fn test_terminate_before_ready() {
    let mut sandbox = SandboxController::create("let x = 1;", None, Vec::new(), SandboxConfig::default())
        .expect("sandbox should start");
    sandbox.terminate();
    assert_eq!(sandbox.state(), SandboxState::Terminated);
}

#[test]
fn test_terminate_after_finish_keeps_result() {
    let mut sandbox = SandboxController::create("let x = 1;", None, Vec::new(), SandboxConfig::default())
        .expect("sandbox should start");
    while !matches!(sandbox.step(), Ok(StepOutcome::Finished { .. })) {}
    sandbox.terminate();
    assert_eq!(sandbox.state(), SandboxState::Finished);
    assert!(matches!(sandbox.result(), Some(Ok(_))));
}

#[test]
fn test_call_depth_is_capped() {
    let result = run("function f(n) {\n  return f(n + 1);\n}\nf(0);");
    let err = result.end.expect_err("should overflow");
    assert_eq!(err.kind, ErrorKind::RuntimeError);
    assert!(err.message.contains("Maximum call stack size exceeded"));
}

#[test]
fn test_builtins_and_console_formatting() {
    let result = run(
        "const words = 'a,b,c'.split(',');\n\
         console.log(words.map(w => w.toUpperCase()).join('-'));\n\
         console.log(Math.max(1, 5, 3), [1, 'x'], { k: true });\n\
         console.log(parseInt('42px') + Number('1'), String(7) + 1, typeof words);",
    );
    result.end.expect("program should finish");
    assert_eq!(
        texts(&result.output),
        vec!["A-B-C", "5 [ 1, 'x' ] { k: true }", "43 71 object"]
    );
}

#[test]
fn test_loops_and_control_flow() {
    let source = "let out = [];\n\
                  for (let i = 0; i < 5; i++) {\n\
                    if (i === 1) continue;\n\
                    if (i === 4) break;\n\
                    out.push(i * 10);\n\
                  }\n\
                  let n = 3;\n\
                  do {\n\
                    n--;\n\
                  } while (n > 0);\n\
                  console.log(out.join(','), n, out.length > 2 ? 'long' : 'short');";
    let result = run(source);
    result.end.expect("program should finish");
    assert_eq!(texts(&result.output), vec!["0,20,30 0 long"]);
}

#[test]
fn test_loop_variable_scoped_to_loop() {
    let result = run("for (let i = 0; i < 2; i++) {\n  let sq = i * i;\n}\nlet done = true;");
    let end = result.end.expect("program should finish");
    let global = end.global().expect("global frame");
    assert!(global.variable("i").is_none());
    assert!(global.variable("sq").is_none());
    assert!(global.variable("done").is_some());
}

#[test]
fn test_changed_flags_only_on_written_step() {
    let result = run("let a = 1;\nlet b = 2;\na = 5;\nlet c = 0;");
    // pause before line 4: only `a` was written by line 3
    let snapshot = &result.steps[3].snapshot;
    assert_eq!(snapshot.changed_names(), vec!["a".to_string()]);
}
