// Integration tests for the heuristic line simulator

use stepviz::language::Language;
use stepviz::simulator::{LineSimulator, SimStep};
use stepviz::snapshot::{Snapshot, VarKind};

fn run(source: &str, language: Language) -> (LineSimulator, Vec<SimStep>) {
    let mut sim = LineSimulator::new(source, language);
    let steps = (0..sim.line_count()).map(|i| sim.advance(i)).collect();
    (sim, steps)
}

fn value_of<'a>(snapshot: &'a Snapshot, name: &str) -> &'a str {
    snapshot
        .lookup(name)
        .map(|v| v.value.as_str())
        .unwrap_or_else(|| panic!("no variable {}", name))
}

#[test]
fn test_let_then_reassign() {
    let (_, steps) = run("let x = 1;\nx = x + 2;", Language::JavaScript);

    let x = steps[0].snapshot.lookup("x").expect("x declared");
    assert_eq!(x.value, "1");
    assert!(x.changed);

    let x = steps[1].snapshot.lookup("x").expect("x still bound");
    assert_eq!(x.value, "3");
    assert!(x.changed);
    assert_eq!(steps[1].snapshot.stack.len(), 1);
}

#[test]
fn test_array_literal_then_index_write() {
    let (_, steps) = run("arr = [1, 2, 3]\narr[0] = 99", Language::Python);

    let first = &steps[0].snapshot;
    let arr = first.lookup("arr").expect("arr bound");
    assert_eq!(arr.kind, VarKind::Reference);
    let obj = first.deref(arr).expect("array on the heap");
    assert_eq!(obj.class_name, "Array");
    let props: Vec<(&str, &str)> = obj
        .properties
        .iter()
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect();
    assert_eq!(props, vec![("0", "1"), ("1", "2"), ("2", "3")]);

    let second = &steps[1].snapshot;
    let obj = second.heap_object(&obj.id).expect("same object");
    assert!(obj.highlight);
    let zero = obj.property("0").expect("index 0");
    assert_eq!(zero.value, "99");
    assert!(zero.changed);
    assert!(!obj.property("1").expect("index 1").changed);
    assert!(second.check_invariants().is_ok());
}

#[test]
fn test_python_call_frame_and_return_inference() {
    let (mut sim, steps) = run("def f():\n  return 1\nx = f()", Language::Python);

    // the definition line opens f's scope, the body keeps it
    assert_eq!(steps[0].snapshot.stack.len(), 2);
    assert_eq!(steps[1].snapshot.stack[1].name, "f()");

    let call = &steps[2].snapshot;
    assert_eq!(call.stack.len(), 2);
    assert_eq!(call.stack[1].name, "f()");
    assert!(call.stack[1].active);
    let global = call.global().expect("global frame");
    assert_eq!(global.variable("x").map(|v| v.value.as_str()), Some("1"));

    let end = sim.finish();
    assert_eq!(end.stack.len(), 1);
    assert_eq!(sim.frame_pushes(), sim.frame_pops());
}

#[test]
fn test_java_call_binds_params_and_writes_to_caller() {
    let source = r#"public class Main {
    static int add(int a, int b) {
        return a + b;
    }
    public static void main(String[] args) {
        int r = add(2, 3);
        System.out.println(r);
    }
}"#;
    let (mut sim, steps) = run(source, Language::Java);

    let call = &steps[5].snapshot;
    let names: Vec<&str> = call.stack.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["global", "main()", "add()"]);
    let add = &call.stack[2];
    assert_eq!(add.variable("a").map(|v| v.value.as_str()), Some("2"));
    assert_eq!(add.variable("b").map(|v| v.value.as_str()), Some("3"));
    assert!(add.variables.iter().all(|v| v.changed));
    assert_eq!(call.stack[1].variable("r").map(|v| v.value.as_str()), Some("5"));

    // the call frame is gone on the next line
    let next = &steps[6];
    assert_eq!(next.snapshot.stack.len(), 2);
    assert_eq!(next.output.len(), 1);
    assert_eq!(next.output[0].text, "5\n");

    sim.finish();
    assert_eq!(sim.frame_pushes(), sim.frame_pops());
}

#[test]
fn test_scope_balance_with_nested_definitions() {
    let source = r#"def outer(n):
    def inner(m):
        return m
    y = inner(n)
    return y

total = outer(4)
print(total)
"#;
    let (mut sim, steps) = run(source, Language::Python);
    for step in &steps {
        assert!(step.snapshot.check_invariants().is_ok(), "line {}", step.line);
    }
    sim.finish();
    assert_eq!(sim.frame_pushes(), sim.frame_pops());
    assert_eq!(sim.depth(), 1);
}

#[test]
fn test_compound_division_by_zero() {
    let (_, steps) = run("let x = 5;\nx /= 0;", Language::JavaScript);
    assert_eq!(value_of(&steps[1].snapshot, "x"), "Infinity");
}

#[test]
fn test_compound_concatenates_strings() {
    let (_, steps) = run("s = \"ab\"\ns += \"cd\"\nn = 2\nn *= 4", Language::Python);
    assert_eq!(value_of(&steps[1].snapshot, "s"), "\"abcd\"");
    assert_eq!(value_of(&steps[3].snapshot, "n"), "8");
}

#[test]
fn test_increment_and_decrement() {
    let (_, steps) = run("int i = 0;\ni++;\n--i;\n++i;", Language::C);
    assert_eq!(value_of(&steps[1].snapshot, "i"), "1");
    assert_eq!(value_of(&steps[2].snapshot, "i"), "0");
    assert_eq!(value_of(&steps[3].snapshot, "i"), "1");
}

#[test]
fn test_push_and_pop() {
    let (_, steps) = run(
        "const a = [1];\na.push(2, 3);\nlet last = a.pop();",
        Language::JavaScript,
    );
    let pushed = &steps[1].snapshot;
    let arr = pushed.deref(pushed.lookup("a").expect("a")).expect("object");
    assert_eq!(arr.properties.len(), 3);
    assert!(arr.highlight);

    let popped = &steps[2].snapshot;
    let arr = popped.deref(popped.lookup("a").expect("a")).expect("object");
    assert_eq!(arr.properties.len(), 2);
    assert_eq!(value_of(popped, "last"), "3");
}

#[test]
fn test_python_list_pop_front_renumbers() {
    let (_, steps) = run("q = [10, 20, 30]\nhead = q.pop(0)", Language::Python);
    let snap = &steps[1].snapshot;
    let q = snap.deref(snap.lookup("q").expect("q")).expect("object");
    let props: Vec<(&str, &str)> = q
        .properties
        .iter()
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect();
    assert_eq!(props, vec![("0", "20"), ("1", "30")]);
    assert_eq!(value_of(snap, "head"), "10");
}

#[test]
fn test_alias_shares_object() {
    let (_, steps) = run("a = [1]\nb = a\nb.append(2)", Language::Python);
    let snap = &steps[2].snapshot;
    let a = snap.lookup("a").expect("a");
    let b = snap.lookup("b").expect("b");
    assert_eq!(a.ref_id, b.ref_id);
    assert_eq!(snap.heap.len(), 1);
    assert_eq!(snap.deref(a).map(|o| o.properties.len()), Some(2));
}

#[test]
fn test_object_literal_and_property_write() {
    let (_, steps) = run(
        "const user = { name: \"ada\", age: 36 };\nuser.age = 37;",
        Language::TypeScript,
    );
    let snap = &steps[1].snapshot;
    let user = snap.deref(snap.lookup("user").expect("user")).expect("object");
    assert_eq!(user.class_name, "Object");
    assert_eq!(user.property("name").map(|p| p.value.as_str()), Some("\"ada\""));
    assert_eq!(user.property("age").map(|p| p.value.as_str()), Some("37"));
    assert!(user.highlight);
}

#[test]
fn test_go_short_declarations_and_slices() {
    let source = "package main\n\nfunc main() {\n\tnums := []int{4, 5, 6}\n\tx := 5\n\tx++\n\tfmt.Println(x, nums)\n}";
    let (mut sim, steps) = run(source, Language::Go);
    let snap = &steps[5].snapshot;
    assert_eq!(snap.stack[1].name, "main()");
    assert_eq!(value_of(snap, "x"), "6");
    let nums = snap.deref(snap.lookup("nums").expect("nums")).expect("slice");
    assert_eq!(nums.properties.len(), 3);
    assert_eq!(steps[6].output[0].text, "6 [4, 5, 6]\n");
    sim.finish();
    assert_eq!(sim.frame_pushes(), sim.frame_pops());
}

#[test]
fn test_typed_declarations() {
    let (_, steps) = run(
        "char *s = \"hi\";\nconst int k = 3;\ndouble d = k * 1.5;",
        Language::C,
    );
    let snap = &steps[2].snapshot;
    assert_eq!(value_of(snap, "s"), "\"hi\"");
    assert_eq!(value_of(snap, "k"), "3");
    assert_eq!(value_of(snap, "d"), "4.5");
}

#[test]
fn test_literal_property_cap() {
    let mut sim = LineSimulator::new("xs = [1, 2, 3, 4, 5]", Language::Python).with_max_properties(2);
    let snap = sim.advance(0).snapshot;
    let xs = snap.deref(snap.lookup("xs").expect("xs")).expect("object");
    assert_eq!(xs.properties.len(), 2);
}

#[test]
fn test_unclosed_literal_spawns_empty_collection() {
    let (_, steps) = run("items = [\n    1,\n    2,\n]", Language::Python);
    let snap = &steps[3].snapshot;
    let items = snap.deref(snap.lookup("items").expect("items")).expect("object");
    assert_eq!(items.class_name, "Array");
    assert!(items.properties.is_empty());
}

#[test]
fn test_constructor_call_is_opaque_reference() {
    let (_, steps) = run(
        "List<Integer> xs = new ArrayList<>();\nxs.add(4);",
        Language::Java,
    );
    let snap = &steps[1].snapshot;
    let xs = snap.deref(snap.lookup("xs").expect("xs")).expect("object");
    assert_eq!(xs.class_name, "ArrayList");
    assert_eq!(xs.property("0").map(|p| p.value.as_str()), Some("4"));
}

#[test]
fn test_unrecognized_lines_change_nothing() {
    let (_, steps) = run("let x = 1;\nwhile (x < 3) {\nfoo.bar().baz;\n}", Language::JavaScript);
    for step in &steps[1..] {
        assert_eq!(step.snapshot.stack.len(), 1);
        let x = step.snapshot.lookup("x").expect("x");
        assert_eq!(x.value, "1");
        assert!(!x.changed);
        assert!(step.output.is_empty());
    }
}

#[test]
fn test_unknown_call_uses_positional_names() {
    let (_, steps) = run("let r = helper(1, \"two\");", Language::JavaScript);
    let frame = &steps[0].snapshot.stack[1];
    assert_eq!(frame.name, "helper()");
    let names: Vec<&str> = frame.variables.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["arg0", "arg1"]);
    assert_eq!(frame.variables[1].value, "\"two\"");
}

#[test]
fn test_changed_flags_are_exclusive_to_one_step() {
    let (_, steps) = run("a = 1\nb = 2\nc = a + b", Language::Python);
    for (i, step) in steps.iter().enumerate() {
        let changed = step.snapshot.changed_names();
        assert_eq!(changed.len(), 1, "step {} changed {:?}", i, changed);
    }
    assert_eq!(value_of(&steps[2].snapshot, "c"), "3");
}

#[test]
fn test_blank_and_comment_lines_keep_state() {
    let (_, steps) = run("x = 1\n\n# note\nx = 2", Language::Python);
    assert_eq!(value_of(&steps[1].snapshot, "x"), "1");
    assert_eq!(value_of(&steps[2].snapshot, "x"), "1");
    assert_eq!(value_of(&steps[3].snapshot, "x"), "2");
}

#[test]
fn test_list_plus_equals_extends_the_same_object() {
    let (_, steps) = run("nums = [1, 2]\nnums += [3]", Language::Python);
    let before = steps[0].snapshot.lookup("nums").expect("nums").clone();

    let snap = &steps[1].snapshot;
    let nums = snap.lookup("nums").expect("nums");
    assert_eq!(nums.kind, VarKind::Reference);
    assert_eq!(nums.ref_id, before.ref_id);
    assert_eq!(snap.heap.len(), 1);
    let obj = snap.deref(nums).expect("array on the heap");
    let props: Vec<(&str, &str)> = obj
        .properties
        .iter()
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect();
    assert_eq!(props, vec![("0", "1"), ("1", "2"), ("2", "3")]);
    assert!(obj.highlight);
    assert!(obj.property("2").expect("index 2").changed);
    assert!(snap.check_invariants().is_ok());
}

#[test]
fn test_list_plus_equals_another_list() {
    let (_, steps) = run("a = [1]\nb = [2, 3]\na += b", Language::Python);
    let snap = &steps[2].snapshot;
    let a = snap.deref(snap.lookup("a").expect("a")).expect("object");
    assert_eq!(a.properties.len(), 3);
    assert_eq!(a.property("2").map(|p| p.value.as_str()), Some("3"));
    let b = snap.deref(snap.lookup("b").expect("b")).expect("object");
    assert_eq!(b.properties.len(), 2);
}

#[test]
fn test_number_plus_unknown_call_is_a_placeholder() {
    let (_, steps) = run("let t = 0;\nt += mystery(1);", Language::JavaScript);
    assert_eq!(value_of(&steps[1].snapshot, "t"), "0 + mystery(1)");
}

#[test]
fn test_brace_scopes_balance_before_finish() {
    let source = r#"int add(int a, int b) {
    return a + b;
}

int main() {
    int total = 0;
    for (int i = 0; i < 3; i++) {
        if (i % 2 == 0) {
            int s = add(i, 1);
        } else {
            total = total - 1;
        }
    }
    return 0;
}"#;
    let (sim, steps) = run(source, Language::C);

    let names = |i: usize| -> Vec<String> {
        steps[i].snapshot.stack.iter().map(|f| f.name.clone()).collect()
    };
    assert_eq!(names(1), vec!["global", "add()"]);
    assert_eq!(names(8), vec!["global", "main()", "add()"]);
    assert_eq!(names(10), vec!["global", "main()"]);

    // no call to finish(): the closing braces alone must unwind every frame
    assert_eq!(sim.depth(), 1);
    assert_eq!(sim.frame_pushes(), sim.frame_pops());
    assert_eq!(steps.last().map(|s| s.snapshot.stack.len()), Some(1));
}

#[test]
fn test_blank_line_clears_changed_flags() {
    let (_, steps) = run("x = 1\n\ny = 2", Language::Python);
    assert_eq!(steps[0].snapshot.changed_names(), vec!["x".to_string()]);
    assert!(steps[1].snapshot.changed_names().is_empty());
    assert_eq!(value_of(&steps[1].snapshot, "x"), "1");
    assert_eq!(steps[2].snapshot.changed_names(), vec!["y".to_string()]);
}
