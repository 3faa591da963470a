// Execution engine for the sandboxed JavaScript subset

use super::memory::{Binding, CallStack, Function, Heap, ObjectId, ObjectKind, Value};
use super::{Link, Request, Response, SandboxConfig};
use crate::errors::{ErrorKind, TraceError};
use crate::script::ast::*;
use crate::snapshot::{self, HeapObject, OutputEntry, Snapshot, StackFrame, Variable};
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::debug;

/// How a statement list finished
pub(crate) enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Tree-walking interpreter that parks before every statement
///
/// The engine lives on the sandbox worker thread. Before each statement it
/// publishes a [`Response::Paused`] with the current snapshot and blocks until
/// the host sends [`Request::Advance`].
pub(crate) struct Engine {
    pub(crate) stack: CallStack,
    pub(crate) heap: Heap,
    link: Link,
    pub(crate) config: SandboxConfig,

    /// Line of the statement being executed
    pub(crate) current_line: usize,

    /// Statements started so far
    steps: usize,

    /// Running time accumulated over completed steps
    active: Duration,

    /// When the host last let the engine run
    resumed_at: Instant,

    /// Objects that have been shown at least once; they stay in every
    /// later snapshot
    published: BTreeSet<ObjectId>,

    /// Last published snapshot, for change marking
    previous: Option<Snapshot>,
}

impl Engine {
    pub(crate) fn new(config: SandboxConfig, link: Link) -> Self {
        Engine {
            stack: CallStack::new(),
            heap: Heap::default(),
            link,
            config,
            current_line: 1,
            steps: 0,
            active: Duration::ZERO,
            resumed_at: Instant::now(),
            published: BTreeSet::new(),
            previous: None,
        }
    }

    /// Run the program, then the entry point if one was named
    pub(crate) fn run(
        &mut self,
        program: &Program,
        entry_point: Option<&str>,
        args: &[serde_json::Value],
    ) -> Result<(serde_json::Value, Snapshot), TraceError> {
        self.exec_statements(&program.body)?;

        let result = match entry_point {
            Some(name) => {
                let callee = match self.stack.lookup(name).map(|b| b.value.clone()) {
                    Some(value @ Value::Function(_)) => value,
                    _ => {
                        return Err(TraceError::runtime(
                            format!("Entry point '{}' is not a defined function", name),
                            None,
                        ))
                    }
                };
                let args = args.iter().map(|a| self.from_json(a)).collect();
                let value = self.call_value(&callee, args, name)?;
                self.to_json(&value)
            }
            None => serde_json::Value::Null,
        };

        let mut snapshot = self.snapshot();
        snapshot::mark_changes(self.previous.as_ref(), &mut snapshot);
        Ok((result, snapshot))
    }

    // ===== Host protocol =====

    /// Block until the host asks for the next step
    pub(crate) fn wait_advance(&mut self) -> Result<(), TraceError> {
        match self.link.requests.recv() {
            Ok(Request::Advance) if !self.link.cancelled() => {
                self.resumed_at = Instant::now();
                Ok(())
            }
            Ok(_) | Err(_) => Err(TraceError::terminated()),
        }
    }

    /// Publish the state before the statement at `line` and wait
    pub(crate) fn pause(&mut self, line: usize) -> Result<(), TraceError> {
        self.current_line = line;
        self.check_budget()?;
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(self.timeout(format!(
                "Exceeded the limit of {} steps",
                self.config.max_steps
            )));
        }
        self.active += self.resumed_at.elapsed();

        let mut snapshot = self.snapshot();
        snapshot::mark_changes(self.previous.as_ref(), &mut snapshot);
        self.previous = Some(snapshot.clone());
        debug!(line, steps = self.steps, "sandbox paused");
        self.link.send(Response::Paused { line, snapshot })?;
        self.wait_advance()
    }

    /// Cancellation and time budgets; checked at every pause, loop
    /// iteration and call
    pub(crate) fn check_budget(&self) -> Result<(), TraceError> {
        if self.link.cancelled() {
            return Err(TraceError::terminated());
        }
        let running = self.resumed_at.elapsed();
        if running > self.config.step_timeout {
            return Err(self.timeout(format!(
                "A single step ran longer than {} ms",
                self.config.step_timeout.as_millis()
            )));
        }
        if self.active + running > self.config.active_budget {
            return Err(self.timeout(format!(
                "Exceeded the active time budget of {} ms",
                self.config.active_budget.as_millis()
            )));
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self, entry: OutputEntry) -> Result<(), TraceError> {
        self.link.send(Response::Output(entry))
    }

    /// Final message of the run; the host may already be gone
    pub(crate) fn respond(&self, response: Response) {
        let _ = self.link.send(response);
    }

    fn timeout(&self, message: String) -> TraceError {
        TraceError::new(ErrorKind::Timeout, message, Some(self.current_line))
    }

    pub(crate) fn error(&self, message: impl Into<String>) -> TraceError {
        TraceError::runtime(message, Some(self.current_line))
    }

    // ===== Statements =====

    /// Execute a statement list in the current scope
    pub(crate) fn exec_statements(&mut self, stmts: &[Stmt]) -> Result<ControlFlow, TraceError> {
        self.hoist(stmts);
        for stmt in stmts {
            let flow = self.exec_statement(stmt)?;
            if !matches!(flow, ControlFlow::Normal) {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal)
    }

    /// Execute a statement list inside a fresh block scope
    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<ControlFlow, TraceError> {
        self.stack.current_mut().push_scope();
        let flow = self.exec_statements(stmts);
        self.stack.current_mut().pop_scope();
        flow
    }

    /// Function declarations are visible before the statements run
    fn hoist(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::FunctionDecl(def) = stmt {
                let name = def.name.clone().unwrap_or_default();
                let value = Value::Function(Function {
                    def: def.clone(),
                    name: name.clone(),
                });
                self.stack.current_mut().declare(
                    &name,
                    Binding {
                        value,
                        is_const: false,
                        hoisted: true,
                    },
                );
            }
        }
    }

    fn exec_statement(&mut self, stmt: &Stmt) -> Result<ControlFlow, TraceError> {
        let line = stmt.location().line;
        if stmt.is_step() {
            self.pause(line)?;
        }
        self.current_line = line;

        match stmt {
            Stmt::VarDecl {
                kind, declarations, ..
            } => {
                self.exec_var_decl(*kind, declarations)?;
                Ok(ControlFlow::Normal)
            }
            Stmt::FunctionDecl(_) | Stmt::Empty { .. } => Ok(ControlFlow::Normal),
            Stmt::Expression { expr, .. } => {
                self.eval(expr)?;
                Ok(ControlFlow::Normal)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval(condition)?.truthy() {
                    self.exec_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_block(else_branch)
                } else {
                    Ok(ControlFlow::Normal)
                }
            }
            Stmt::While {
                condition, body, ..
            } => self.exec_while(condition, body, line),
            Stmt::DoWhile {
                body, condition, ..
            } => self.exec_do_while(body, condition, line),
            Stmt::For {
                init,
                condition,
                update,
                body,
                ..
            } => {
                self.stack.current_mut().push_scope();
                let flow = self.exec_for(init.as_deref(), condition.as_ref(), update.as_ref(), body, line);
                self.stack.current_mut().pop_scope();
                flow
            }
            Stmt::ForOf {
                kind,
                name,
                iterable,
                body,
                ..
            } => self.exec_for_of(*kind, name, iterable, body, line),
            Stmt::Break { .. } => Ok(ControlFlow::Break),
            Stmt::Continue { .. } => Ok(ControlFlow::Continue),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Undefined,
                };
                Ok(ControlFlow::Return(value))
            }
            Stmt::Throw { value, .. } => {
                let thrown = self.eval(value)?;
                Err(self.error(format!("Uncaught {}", self.heap.inspect(&thrown))))
            }
            Stmt::Block { body, .. } => self.exec_block(body),
        }
    }

    fn exec_var_decl(
        &mut self,
        kind: DeclKind,
        declarations: &[(String, Option<Expr>)],
    ) -> Result<(), TraceError> {
        for (name, init) in declarations {
            let value = match init {
                Some(expr) => Some(self.eval_named(expr, name)?),
                None => None,
            };
            let frame = self.stack.current_mut();
            match kind {
                DeclKind::Var => frame.declare_function_level(name, value),
                DeclKind::Let | DeclKind::Const => frame.declare(
                    name,
                    Binding {
                        value: value.unwrap_or_default(),
                        is_const: kind == DeclKind::Const,
                        hoisted: false,
                    },
                ),
            }
        }
        Ok(())
    }

    /// Loops pause on their header line before every re-check of the
    /// condition, so an empty infinite loop still runs out of steps
    fn exec_while(&mut self, condition: &Expr, body: &[Stmt], line: usize) -> Result<ControlFlow, TraceError> {
        while self.eval(condition)?.truthy() {
            match self.exec_block(body)? {
                ControlFlow::Break => break,
                ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                ControlFlow::Normal | ControlFlow::Continue => {}
            }
            self.pause(line)?;
        }
        Ok(ControlFlow::Normal)
    }

    fn exec_do_while(&mut self, body: &[Stmt], condition: &Expr, line: usize) -> Result<ControlFlow, TraceError> {
        loop {
            match self.exec_block(body)? {
                ControlFlow::Break => break,
                ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                ControlFlow::Normal | ControlFlow::Continue => {}
            }
            self.pause(line)?;
            if !self.eval(condition)?.truthy() {
                break;
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn exec_for(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &[Stmt],
        line: usize,
    ) -> Result<ControlFlow, TraceError> {
        match init {
            Some(Stmt::VarDecl {
                kind, declarations, ..
            }) => self.exec_var_decl(*kind, declarations)?,
            Some(Stmt::Expression { expr, .. }) => {
                self.eval(expr)?;
            }
            _ => {}
        }
        loop {
            if let Some(condition) = condition {
                if !self.eval(condition)?.truthy() {
                    break;
                }
            }
            match self.exec_block(body)? {
                ControlFlow::Break => break,
                ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                ControlFlow::Normal | ControlFlow::Continue => {}
            }
            self.pause(line)?;
            if let Some(update) = update {
                self.eval(update)?;
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn exec_for_of(
        &mut self,
        kind: DeclKind,
        name: &str,
        iterable: &Expr,
        body: &[Stmt],
        line: usize,
    ) -> Result<ControlFlow, TraceError> {
        let source = self.eval(iterable)?;
        let mut index = 0;
        loop {
            // arrays are read live so pushes inside the body are visited
            let item = match &source {
                Value::Object(id) => match self.heap.get(*id).map(|o| &o.kind) {
                    Some(ObjectKind::Array(items)) => items.get(index).cloned(),
                    _ => return Err(self.error("TypeError: object is not iterable")),
                },
                Value::Str(s) => s.chars().nth(index).map(|c| Value::Str(c.to_string())),
                other => {
                    return Err(self.error(format!(
                        "TypeError: {} is not iterable",
                        self.heap.inspect(other)
                    )))
                }
            };
            let Some(item) = item else {
                break;
            };
            if index > 0 {
                self.pause(line)?;
            }
            index += 1;

            let frame = self.stack.current_mut();
            frame.push_scope();
            frame.declare(
                name,
                Binding {
                    value: item,
                    is_const: kind == DeclKind::Const,
                    hoisted: false,
                },
            );
            let flow = self.exec_statements(body);
            self.stack.current_mut().pop_scope();
            match flow? {
                ControlFlow::Break => break,
                ControlFlow::Return(value) => return Ok(ControlFlow::Return(value)),
                ControlFlow::Normal | ControlFlow::Continue => {}
            }
        }
        Ok(ControlFlow::Normal)
    }

    // ===== Functions =====

    pub(crate) fn call_function(&mut self, func: &Function, args: Vec<Value>) -> Result<Value, TraceError> {
        self.check_budget()?;
        if self.stack.depth() >= self.config.max_call_depth {
            return Err(self.error("RangeError: Maximum call stack size exceeded"));
        }

        let saved_line = self.current_line;
        self.stack.push_frame(format!("{}()", func.name));
        let mut args = args.into_iter();
        for param in &func.def.params {
            let value = args.next().unwrap_or_default();
            self.stack.current_mut().declare(
                param,
                Binding {
                    value,
                    is_const: false,
                    hoisted: false,
                },
            );
        }

        let result = match &func.def.body {
            FunctionBody::Block(body) => match self.exec_statements(body)? {
                ControlFlow::Return(value) => value,
                _ => Value::Undefined,
            },
            FunctionBody::Expr(expr) => self.eval(expr)?,
        };

        self.stack.pop_frame();
        self.current_line = saved_line;
        Ok(result)
    }

    // ===== Snapshots =====

    fn frame_id(id: usize) -> String {
        if id == 0 {
            "global".to_string()
        } else {
            format!("call{}", id)
        }
    }

    pub(crate) fn object_ref(id: ObjectId) -> String {
        format!("obj{}", id + 1)
    }

    fn describe(&self, name: &str, value: &Value) -> Variable {
        match value {
            Value::Object(id) => Variable::reference(name, Self::object_ref(*id)),
            Value::Str(s) => Variable::primitive(name, format!("\"{}\"", s)),
            Value::Function(f) => Variable::primitive(name, format!("[Function: {}]", f.name)),
            other => Variable::primitive(name, self.heap.to_js_string(other)),
        }
    }

    /// Current state in the shared snapshot shape, flags unset
    pub(crate) fn snapshot(&mut self) -> Snapshot {
        let frames = self.stack.frames();
        let innermost = frames.len() - 1;
        let mut roots = Vec::new();
        let mut stack = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            let mut out = StackFrame::new(Self::frame_id(frame.id), frame.name.clone());
            out.active = i == innermost;
            for (name, binding) in frame.bindings() {
                if binding.hoisted {
                    continue;
                }
                if let Value::Object(id) = binding.value {
                    roots.push(id);
                }
                out.variables.push(self.describe(name, &binding.value));
            }
            stack.push(out);
        }

        self.publish(roots);
        let heap = self
            .published
            .iter()
            .filter_map(|id| self.heap_object(*id))
            .collect();
        Snapshot { stack, heap }
    }

    /// Mark everything reachable from `roots` as shown
    fn publish(&mut self, mut pending: Vec<ObjectId>) {
        let mut visited = FxHashSet::default();
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            self.published.insert(id);
            if let Some(obj) = self.heap.get(id) {
                pending.extend(obj.children().into_iter().filter_map(|v| match v {
                    Value::Object(child) => Some(*child),
                    _ => None,
                }));
            }
        }
    }

    fn heap_object(&self, id: ObjectId) -> Option<HeapObject> {
        let obj = self.heap.get(id)?;
        let mut out = HeapObject::new(Self::object_ref(id), obj.class_name.clone());
        match &obj.kind {
            ObjectKind::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    out.properties.push(self.describe(&i.to_string(), item));
                }
            }
            ObjectKind::Plain(entries) => {
                for (key, value) in entries {
                    out.properties.push(self.describe(key, value));
                }
            }
        }
        Some(out)
    }
}
