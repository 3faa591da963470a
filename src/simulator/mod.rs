//! Heuristic line simulator
//!
//! For languages without an embedded interpreter, program state is inferred
//! from the literal source text one line at a time. Nothing is executed: each
//! line runs through a fixed pipeline of scope tracking, call visualization,
//! mutation rules and literal parsing, and the result is a [`Snapshot`] in the
//! same shape the real backends produce.
//!
//! The simulator walks lines in source order, so loop bodies run once and
//! function bodies are visited where they are written. It never fails: a line
//! it doesn't understand leaves the state untouched.

mod output;
pub(crate) mod patterns;
mod rules;
pub(crate) mod values;

use crate::language::{Language, Scoping};
use crate::snapshot::{HeapObject, OutputEntry, Snapshot, StackFrame, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use values::{Operand, Scope, ValueShape};

/// Default cap on the entries read from a single collection literal
pub const DEFAULT_MAX_LITERAL_PROPERTIES: usize = 20;

/// Result of advancing over one line
#[derive(Debug, Clone)]
pub struct SimStep {
    /// 1-based line that was just simulated
    pub line: usize,
    pub snapshot: Snapshot,
    pub output: Vec<OutputEntry>,
}

/// When a simulated frame is popped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeExit {
    /// Never popped
    Global,
    /// Popped by the first later line indented at or below this width
    Indent(usize),
    /// Popped once the running brace depth falls back to this value
    BraceDepth(usize),
    /// Call-visualization frame, popped when this 0-based line is reached
    AfterLine(usize),
}

#[derive(Debug, Clone)]
struct SimFrame {
    id: String,
    name: String,
    variables: Vec<Variable>,
    exit: ScopeExit,
}

impl SimFrame {
    fn is_temporary(&self) -> bool {
        matches!(self.exit, ScopeExit::AfterLine(_))
    }
}

/// What the pre-scan learned about a function definition
#[derive(Debug, Clone, Default)]
struct FunctionInfo {
    params: Vec<String>,
    /// Expression of the first `return` in the body
    returns: Option<String>,
}

pub struct LineSimulator {
    language: Language,
    lines: Vec<String>,
    frames: Vec<SimFrame>,
    heap: Vec<HeapObject>,
    /// Objects mutated or spawned by the current line
    touched: FxHashSet<String>,
    brace_depth: usize,
    next_frame: usize,
    functions: FxHashMap<String, FunctionInfo>,
    max_properties: usize,
    pushes: usize,
    pops: usize,
}

impl LineSimulator {
    pub fn new(source: &str, language: Language) -> Self {
        let lines: Vec<String> = source.lines().map(str::to_string).collect();
        let functions = scan_functions(&lines, language);
        debug!(lines = lines.len(), functions = functions.len(), %language, "simulator ready");
        LineSimulator {
            language,
            lines,
            frames: vec![SimFrame {
                id: "global".to_string(),
                name: "global".to_string(),
                variables: Vec::new(),
                exit: ScopeExit::Global,
            }],
            heap: Vec::new(),
            touched: FxHashSet::default(),
            brace_depth: 0,
            next_frame: 0,
            functions,
            max_properties: DEFAULT_MAX_LITERAL_PROPERTIES,
            pushes: 0,
            pops: 0,
        }
    }

    pub fn with_max_properties(mut self, max: usize) -> Self {
        self.max_properties = max.max(1);
        self
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Whether a 0-based line carries code rather than whitespace or comments
    pub fn is_meaningful(&self, index: usize) -> bool {
        self.lines
            .get(index)
            .is_some_and(|l| !patterns::is_blank_or_comment(l, self.language))
    }

    /// Frames pushed so far, including call-visualization frames
    pub fn frame_pushes(&self) -> usize {
        self.pushes
    }

    pub fn frame_pops(&self) -> usize {
        self.pops
    }

    /// Current number of frames including the global one
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Simulate the 0-based line `index`
    pub fn advance(&mut self, index: usize) -> SimStep {
        let raw = self.lines.get(index).cloned().unwrap_or_default();
        self.touched.clear();
        self.pop_expired_calls(index);

        let mut output = Vec::new();
        if patterns::is_blank_or_comment(&raw, self.language) {
            self.clear_changed();
            self.refresh_highlights();
            return SimStep {
                line: index + 1,
                snapshot: self.snapshot(),
                output,
            };
        }

        let code = patterns::strip_comment(&raw, self.language).trim().to_string();
        let entered = match self.language.scoping() {
            Scoping::Indentation => {
                self.exit_indent_scopes(patterns::indent_width(&raw));
                self.enter_def_scope(&code, patterns::indent_width(&raw))
            }
            Scoping::Braces => {
                let before = self.brace_depth;
                self.exit_brace_scopes(&raw);
                self.enter_brace_scope(&code, before)
            }
        };

        let stmt = code.trim_end_matches(';').trim().to_string();
        self.clear_changed();
        if !entered {
            self.visualize_call(&stmt, index);
        }
        if let Some(rule) = rules::apply(self, &stmt) {
            debug!(line = index + 1, rule, "mutation");
        }
        if let Some(entry) = output::capture(self, &stmt, index + 1) {
            output.push(entry);
        }
        self.refresh_highlights();

        SimStep {
            line: index + 1,
            snapshot: self.snapshot(),
            output,
        }
    }

    /// Pop every frame except the global one, as at program end
    pub fn finish(&mut self) -> Snapshot {
        while self.frames.len() > 1 {
            self.frames.pop();
            self.pops += 1;
        }
        self.touched.clear();
        self.clear_changed();
        self.refresh_highlights();
        self.snapshot()
    }

    pub fn snapshot(&self) -> Snapshot {
        let last = self.frames.len().saturating_sub(1);
        let stack = self
            .frames
            .iter()
            .enumerate()
            .map(|(i, f)| StackFrame {
                id: f.id.clone(),
                name: f.name.clone(),
                active: i == last,
                variables: f.variables.clone(),
            })
            .collect();
        Snapshot {
            stack,
            heap: self.heap.clone(),
        }
    }

    fn pop_expired_calls(&mut self, index: usize) {
        while let Some(exit) = self.frames.last().map(|f| f.exit) {
            match exit {
                ScopeExit::AfterLine(line) if index >= line => {
                    self.frames.pop();
                    self.pops += 1;
                }
                _ => break,
            }
        }
    }

    fn exit_indent_scopes(&mut self, indent: usize) {
        while let Some(exit) = self.frames.last().map(|f| f.exit) {
            match exit {
                ScopeExit::Indent(level) if indent <= level => {
                    self.frames.pop();
                    self.pops += 1;
                }
                _ => break,
            }
        }
    }

    fn exit_brace_scopes(&mut self, raw: &str) {
        let (opens, closes) = patterns::count_braces(raw);
        self.brace_depth = (self.brace_depth + opens).saturating_sub(closes);
        while let Some(exit) = self.frames.last().map(|f| f.exit) {
            match exit {
                ScopeExit::BraceDepth(depth) if self.brace_depth <= depth => {
                    self.frames.pop();
                    self.pops += 1;
                }
                _ => break,
            }
        }
    }

    fn enter_brace_scope(&mut self, code: &str, depth_before: usize) -> bool {
        if self.brace_depth <= depth_before {
            return false;
        }
        let Some(caps) = patterns::BRACE_FUNCTION.captures(code) else {
            return false;
        };
        let name = &caps[1];
        if patterns::SCOPE_KEYWORDS.contains(&name) {
            return false;
        }
        let params = patterns::param_names(&caps[2], self.language);
        self.push_definition_frame(name, &params, ScopeExit::BraceDepth(depth_before));
        true
    }

    fn enter_def_scope(&mut self, code: &str, indent: usize) -> bool {
        let Some(caps) = patterns::DEF_FUNCTION.captures(code) else {
            return false;
        };
        let params = patterns::param_names(&caps[2], self.language);
        self.push_definition_frame(&caps[1], &params, ScopeExit::Indent(indent));
        true
    }

    fn push_definition_frame(&mut self, name: &str, params: &[String], exit: ScopeExit) {
        self.next_frame += 1;
        let variables = params.iter().map(|p| Variable::primitive(p.as_str(), "?")).collect();
        self.frames.push(SimFrame {
            id: format!("f{}", self.next_frame),
            name: format!("{}()", name),
            variables,
            exit,
        });
        self.pushes += 1;
    }

    /// Push a temporary frame for `f(args)` or `x = f(args)`
    fn visualize_call(&mut self, stmt: &str, index: usize) {
        let call = match rules::split_assignment(stmt) {
            Some(assign) => assign.value,
            None => stmt.to_string(),
        };
        let Some((name, args)) = call_parts(&call) else {
            return;
        };
        if patterns::BUILTIN_CALLS.contains(&name.as_str()) {
            return;
        }

        let args = patterns::split_top_level(&args, ',');
        let params = self.functions.get(&name).map(|f| f.params.clone()).unwrap_or_default();
        let scope: &Self = self;
        let variables = args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                let param = params.get(i).cloned().unwrap_or_else(|| format!("arg{}", i));
                let var = match values::evaluate(arg, scope) {
                    Some(Operand::Ref(id)) => Variable::reference(param, id),
                    Some(op) => Variable::primitive(param, op.display()),
                    None => Variable::primitive(param, arg.as_str()),
                };
                var.with_changed(true)
            })
            .collect();

        self.next_frame += 1;
        self.frames.push(SimFrame {
            id: format!("call{}", self.next_frame),
            name: format!("{}()", name),
            variables,
            exit: ScopeExit::AfterLine(index + 1),
        });
        self.pushes += 1;
    }

    /// Value of `f(args)` from the function's first `return`, when it folds
    fn call_result(&self, text: &str) -> Option<Operand> {
        let (name, args) = call_parts(text)?;
        let info = self.functions.get(&name)?;
        let expr = info.returns.as_deref()?;
        let mut bound = FxHashMap::default();
        for (param, arg) in info.params.iter().zip(patterns::split_top_level(&args, ',')) {
            bound.insert(param.clone(), values::evaluate(&arg, self)?);
        }
        let scope = CallScope {
            bound,
            outer: self,
        };
        match values::evaluate(expr, &scope)? {
            Operand::Raw(_) => None,
            value => Some(value),
        }
    }

    fn clear_changed(&mut self) {
        for frame in &mut self.frames {
            frame.variables.iter_mut().for_each(|v| v.changed = false);
        }
        for obj in &mut self.heap {
            obj.properties.iter_mut().for_each(|p| p.changed = false);
        }
    }

    fn refresh_highlights(&mut self) {
        for obj in &mut self.heap {
            obj.highlight = self.touched.contains(&obj.id);
        }
    }

    /// Innermost frame that isn't a call visualization; writes land here
    fn scope_index(&self) -> usize {
        self.frames.iter().rposition(|f| !f.is_temporary()).unwrap_or(0)
    }

    /// Find a binding along the scope chain, skipping call visualizations
    fn lookup(&self, name: &str) -> Option<(usize, usize)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, f)| !f.is_temporary())
            .find_map(|(fi, f)| f.variables.iter().position(|v| v.name == name).map(|vi| (fi, vi)))
    }

    fn variable(&self, name: &str) -> Option<&Variable> {
        self.lookup(name).map(|(fi, vi)| &self.frames[fi].variables[vi])
    }

    /// Heap id a reference variable points at
    fn ref_of(&self, name: &str) -> Option<String> {
        self.variable(name).and_then(|v| v.ref_id.clone())
    }

    fn heap_object_mut(&mut self, id: &str) -> Option<&mut HeapObject> {
        self.heap.iter_mut().find(|o| o.id == id)
    }

    fn classify(&self, text: &str) -> ValueShape {
        values::classify(text, self, self.max_properties)
    }

    /// Bind `name` in frame `frame` to `shape`, spawning heap objects as needed
    fn bind(&mut self, frame: usize, name: &str, shape: ValueShape) {
        let id = format!("{}:{}", self.frames[frame].id, name);
        let var = self.materialize(id, name, shape).with_changed(true);
        let vars = &mut self.frames[frame].variables;
        match vars.iter_mut().find(|v| v.name == name) {
            Some(existing) => *existing = var,
            None => vars.push(var),
        }
    }

    /// Write to an existing binding, or declare it in the current scope
    fn assign(&mut self, name: &str, shape: ValueShape) {
        let frame = match self.lookup(name) {
            Some((fi, _)) => fi,
            None => self.scope_index(),
        };
        self.bind(frame, name, shape);
    }

    fn declare(&mut self, name: &str, shape: ValueShape) {
        let frame = self.scope_index();
        self.bind(frame, name, shape);
    }

    /// Turn a classified value into a variable, creating or overwriting the
    /// object at `id` for collections
    fn materialize(&mut self, id: String, name: &str, shape: ValueShape) -> Variable {
        match shape {
            ValueShape::Scalar(Operand::Ref(target)) => Variable::reference(name, target),
            ValueShape::Scalar(op) => Variable::primitive(name, op.display()),
            ValueShape::Collection { class_name, entries } => {
                let mut obj = HeapObject::new(id.as_str(), class_name);
                for (key, value) in entries {
                    obj.set_property(match value {
                        Operand::Ref(target) => Variable::reference(key, target),
                        other => Variable::primitive(key, other.display()),
                    });
                }
                self.store_object(obj);
                Variable::reference(name, id)
            }
            ValueShape::Opaque { class_name } => {
                self.store_object(HeapObject::new(id.as_str(), class_name));
                Variable::reference(name, id)
            }
        }
    }

    fn store_object(&mut self, obj: HeapObject) {
        self.touched.insert(obj.id.clone());
        match self.heap.iter_mut().find(|o| o.id == obj.id) {
            Some(existing) => *existing = obj,
            None => self.heap.push(obj),
        }
    }

    fn operand_of(var: &Variable) -> Operand {
        match &var.ref_id {
            Some(id) => Operand::Ref(id.clone()),
            None => values::parse_scalar(&var.value).unwrap_or_else(|| Operand::Raw(var.value.clone())),
        }
    }
}

impl Scope for LineSimulator {
    fn resolve(&self, name: &str) -> Option<Operand> {
        self.variable(name).map(Self::operand_of)
    }

    fn index(&self, ref_id: &str, key: &str) -> Option<Operand> {
        let obj = self.heap.iter().find(|o| o.id == ref_id)?;
        obj.property(key).map(Self::operand_of)
    }

    fn length(&self, ref_id: &str) -> Option<usize> {
        self.heap.iter().find(|o| o.id == ref_id).map(|o| o.properties.len())
    }
}

/// Parameters bound over the simulator's own scope chain
struct CallScope<'a> {
    bound: FxHashMap<String, Operand>,
    outer: &'a LineSimulator,
}

impl Scope for CallScope<'_> {
    fn resolve(&self, name: &str) -> Option<Operand> {
        self.bound.get(name).cloned().or_else(|| self.outer.resolve(name))
    }

    fn index(&self, ref_id: &str, key: &str) -> Option<Operand> {
        self.outer.index(ref_id, key)
    }

    fn length(&self, ref_id: &str) -> Option<usize> {
        self.outer.length(ref_id)
    }
}

/// `f(a, b)` as `("f", "a, b")`, only when the parens wrap the whole tail
fn call_parts(text: &str) -> Option<(String, String)> {
    let caps = patterns::CALL.captures(text.trim())?;
    let name = caps.get(1)?;
    let tail = text.trim()[name.end()..].trim_start();
    if !patterns::wraps_whole(tail, '(', ')') {
        return None;
    }
    Some((name.as_str().to_string(), caps[2].to_string()))
}

/// Learn parameter lists and first return expressions up front
fn scan_functions(lines: &[String], language: Language) -> FxHashMap<String, FunctionInfo> {
    let mut functions = FxHashMap::default();
    for (i, line) in lines.iter().enumerate() {
        if patterns::is_blank_or_comment(line, language) {
            continue;
        }
        let code = patterns::strip_comment(line, language).trim();
        let found = match language.scoping() {
            Scoping::Indentation => patterns::DEF_FUNCTION.captures(code).map(|caps| {
                let body = indented_body(lines, i, language);
                (caps[1].to_string(), caps[2].to_string(), first_return(body, language))
            }),
            Scoping::Braces => patterns::BRACE_FUNCTION
                .captures(code)
                .filter(|caps| !patterns::SCOPE_KEYWORDS.contains(&&caps[1]))
                .map(|caps| {
                    let body = braced_body(lines, i);
                    // one-line bodies: `int f() { return 1; }`
                    let inline = code
                        .find('{')
                        .map(|at| code[at + 1..].trim_end_matches('}').trim())
                        .and_then(|rest| patterns::RETURN.captures(rest))
                        .map(|c| c[1].trim().to_string());
                    let returns = inline.or_else(|| first_return(body, language));
                    (caps[1].to_string(), caps[2].to_string(), returns)
                }),
        };
        if let Some((name, params, returns)) = found {
            functions.entry(name).or_insert(FunctionInfo {
                params: patterns::param_names(&params, language),
                returns,
            });
        }
    }
    functions
}

fn indented_body(lines: &[String], def: usize, language: Language) -> &[String] {
    let level = patterns::indent_width(&lines[def]);
    let mut end = def + 1;
    while end < lines.len()
        && (patterns::is_blank_or_comment(&lines[end], language)
            || patterns::indent_width(&lines[end]) > level)
    {
        end += 1;
    }
    &lines[def + 1..end]
}

fn braced_body(lines: &[String], def: usize) -> &[String] {
    let mut depth = 0usize;
    for (offset, line) in lines[def..].iter().enumerate() {
        let (opens, closes) = patterns::count_braces(line);
        depth = (depth + opens).saturating_sub(closes);
        if depth == 0 {
            return &lines[def + 1..(def + offset).max(def + 1)];
        }
    }
    &lines[def + 1..]
}

fn first_return(body: &[String], language: Language) -> Option<String> {
    body.iter().find_map(|line| {
        let code = patterns::strip_comment(line, language).trim().trim_start_matches('}').trim();
        patterns::RETURN.captures(code).map(|c| c[1].trim().trim_end_matches(';').to_string())
    })
}
