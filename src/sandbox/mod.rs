//! Sandboxed interpreter controller
//!
//! JavaScript programs run on a dedicated worker thread inside a tree-walking
//! interpreter for a JavaScript subset. The host and the worker talk over two
//! `mpsc` channels:
//!
//! ```text
//! host ── Advance / Stop ──────────────────────────────▶ worker
//! host ◀── Ready / Output / Paused / Finished / Failed ── worker
//! ```
//!
//! The worker parses the program, reports `Ready`, and then never runs
//! without an `Advance`. Before each statement it publishes the current
//! snapshot and parks. Console output is forwarded as it happens, so it
//! always arrives before the pause that follows the producing statement.
//!
//! Budgets (per-step wall clock, cumulative active time, statement count)
//! are enforced on the worker, and the host additionally gives up on a step
//! that does not come back in time. Either way the shared cancel flag is set
//! and the controller ends in [`SandboxState::TimedOut`].

mod builtins;
mod engine;
mod expressions;
pub mod memory;

use crate::errors::{ErrorKind, TraceError};
use crate::script;
use crate::snapshot::{OutputEntry, Snapshot};
use engine::Engine;
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extra time the host waits beyond the step timeout before cancelling
const HOST_GRACE: Duration = Duration::from_millis(250);

/// Deep recursion in the interpreted program recurses in the engine too
const WORKER_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Execution budgets for one sandbox run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Wall-clock limit for a single step
    pub step_timeout: Duration,
    /// Total running time across all steps, excluding time spent paused
    pub active_budget: Duration,
    /// Maximum number of statements executed
    pub max_steps: usize,
    /// Maximum call stack depth, global frame included
    pub max_call_depth: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            step_timeout: Duration::from_millis(1000),
            active_budget: Duration::from_millis(5000),
            max_steps: 10_000,
            max_call_depth: 200,
        }
    }
}

pub(crate) enum Request {
    Advance,
    Stop,
}

pub(crate) enum Response {
    Ready,
    Output(OutputEntry),
    Paused { line: usize, snapshot: Snapshot },
    Finished { result: JsonValue, snapshot: Snapshot },
    Failed(TraceError),
}

/// Worker side of the channel pair
pub(crate) struct Link {
    pub(crate) requests: Receiver<Request>,
    responses: Sender<Response>,
    cancel: Arc<AtomicBool>,
}

impl Link {
    pub(crate) fn send(&self, response: Response) -> Result<(), TraceError> {
        // a closed channel means the host dropped the controller
        self.responses
            .send(response)
            .map_err(|_| TraceError::terminated())
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Lifecycle of a [`SandboxController`]
///
/// `Created → Ready → {Stepping ⇄ Suspended} → Finished | Errored | TimedOut | Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Created,
    Ready,
    Stepping,
    Suspended,
    Finished,
    Errored,
    TimedOut,
    Terminated,
}

impl SandboxState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SandboxState::Finished
                | SandboxState::Errored
                | SandboxState::TimedOut
                | SandboxState::Terminated
        )
    }
}

/// The program is parked before the statement on `line`
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxStep {
    pub line: usize,
    pub snapshot: Snapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Suspended(SandboxStep),
    Finished { result: JsonValue, snapshot: Snapshot },
}

/// Host-side handle to one sandboxed run
pub struct SandboxController {
    state: SandboxState,
    requests: Sender<Request>,
    responses: Receiver<Response>,
    cancel: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
    config: SandboxConfig,

    /// Output received since the last drain
    pending_output: Vec<OutputEntry>,

    /// Final return value or the error that ended the run
    result: Option<Result<JsonValue, TraceError>>,

    final_snapshot: Option<Snapshot>,
}

impl SandboxController {
    /// Spawn a worker for `source`.
    ///
    /// When `entry_point` is given, that global function is called with
    /// `args` after the top-level code has run, and its return value becomes
    /// the result.
    pub fn create(
        source: &str,
        entry_point: Option<&str>,
        args: Vec<JsonValue>,
        config: SandboxConfig,
    ) -> Result<Self, TraceError> {
        let (request_tx, request_rx) = mpsc::channel();
        let (response_tx, response_rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let link = Link {
            requests: request_rx,
            responses: response_tx,
            cancel: cancel.clone(),
        };

        let source = source.to_string();
        let entry_point = entry_point.map(str::to_string);
        let worker_config = config.clone();
        let worker = thread::Builder::new()
            .name("stepviz-sandbox".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || run_worker(&source, entry_point.as_deref(), &args, worker_config, link))
            .map_err(|e| TraceError::runtime(format!("Failed to start the sandbox worker: {}", e), None))?;
        info!("sandbox worker started");

        Ok(SandboxController {
            state: SandboxState::Created,
            requests: request_tx,
            responses: response_rx,
            cancel,
            worker: Some(worker),
            config,
            pending_output: Vec::new(),
            result: None,
            final_snapshot: None,
        })
    }

    /// Block until the program parsed; a parse failure is a `SyntaxIssue`
    pub fn wait_ready(&mut self) -> Result<(), TraceError> {
        match self.state {
            SandboxState::Created => {}
            state if state.is_terminal() && state != SandboxState::Finished => {
                return Err(self.stored_error())
            }
            _ => return Ok(()),
        }

        match self.responses.recv_timeout(self.config.step_timeout + HOST_GRACE) {
            Ok(Response::Ready) => {
                self.state = SandboxState::Ready;
                debug!("sandbox ready");
                Ok(())
            }
            Ok(Response::Failed(err)) => Err(self.fail(err)),
            Ok(_) => Err(self.fail(TraceError::runtime(
                "Unexpected message from the sandbox worker",
                None,
            ))),
            Err(RecvTimeoutError::Timeout) => Err(self.fail(TraceError::timeout(
                "The sandbox did not become ready in time",
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(self.fail(Self::worker_exited())),
        }
    }

    /// Run until the next pause or the end of the program
    pub fn step(&mut self) -> Result<StepOutcome, TraceError> {
        match self.state {
            SandboxState::Created => self.wait_ready()?,
            SandboxState::Ready | SandboxState::Suspended | SandboxState::Stepping => {}
            SandboxState::Finished => return self.finished_outcome(),
            SandboxState::Errored | SandboxState::TimedOut | SandboxState::Terminated => {
                return Err(self.stored_error())
            }
        }

        if self.requests.send(Request::Advance).is_err() {
            return Err(self.fail(Self::worker_exited()));
        }
        self.state = SandboxState::Stepping;

        let deadline = Instant::now() + self.config.step_timeout + HOST_GRACE;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(Response::Output(entry)) => self.pending_output.push(entry),
                Ok(Response::Paused { line, snapshot }) => {
                    self.state = SandboxState::Suspended;
                    return Ok(StepOutcome::Suspended(SandboxStep { line, snapshot }));
                }
                Ok(Response::Finished { result, snapshot }) => {
                    self.state = SandboxState::Finished;
                    info!("sandbox finished");
                    self.result = Some(Ok(result.clone()));
                    self.final_snapshot = Some(snapshot.clone());
                    return Ok(StepOutcome::Finished { result, snapshot });
                }
                Ok(Response::Failed(err)) => return Err(self.fail(err)),
                Ok(Response::Ready) => {}
                Err(RecvTimeoutError::Timeout) => {
                    return Err(self.fail(TraceError::timeout(format!(
                        "A single step ran longer than {} ms",
                        self.config.step_timeout.as_millis()
                    ))))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(self.fail(Self::worker_exited())),
            }
        }
    }

    /// Output produced since the previous drain, in program order
    pub fn drain_output(&mut self) -> Vec<OutputEntry> {
        std::mem::take(&mut self.pending_output)
    }

    /// Final return value or the error that ended the run; `None` while
    /// the program is still running
    pub fn result(&self) -> Option<&Result<JsonValue, TraceError>> {
        self.result.as_ref()
    }

    pub fn state(&self) -> SandboxState {
        self.state
    }

    /// Force-stop the worker. Safe from any state and idempotent.
    pub fn terminate(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        let _ = self.requests.send(Request::Stop);

        let running = matches!(self.state, SandboxState::Stepping | SandboxState::TimedOut);
        if !self.state.is_terminal() {
            info!("sandbox terminated");
            self.state = SandboxState::Terminated;
            self.result.get_or_insert_with(|| Err(TraceError::terminated()));
        }

        if let Some(worker) = self.worker.take() {
            // a parked worker exits on Stop; a busy one is left to notice
            // the cancel flag
            if !running {
                let _ = worker.join();
            }
        }
    }

    fn fail(&mut self, err: TraceError) -> TraceError {
        self.state = match err.kind {
            ErrorKind::Timeout => SandboxState::TimedOut,
            ErrorKind::Terminated => SandboxState::Terminated,
            ErrorKind::SyntaxIssue | ErrorKind::RuntimeError => SandboxState::Errored,
        };
        if self.state == SandboxState::TimedOut {
            self.cancel.store(true, Ordering::SeqCst);
            let _ = self.requests.send(Request::Stop);
        }
        warn!(error = %err.describe(), "sandbox run failed");
        self.result = Some(Err(err.clone()));
        err
    }

    fn stored_error(&self) -> TraceError {
        match &self.result {
            Some(Err(err)) => err.clone(),
            _ => TraceError::terminated(),
        }
    }

    fn finished_outcome(&self) -> Result<StepOutcome, TraceError> {
        match (&self.result, &self.final_snapshot) {
            (Some(Ok(result)), Some(snapshot)) => Ok(StepOutcome::Finished {
                result: result.clone(),
                snapshot: snapshot.clone(),
            }),
            _ => Err(self.stored_error()),
        }
    }

    fn worker_exited() -> TraceError {
        TraceError::runtime("The sandbox worker exited unexpectedly", None)
    }
}

impl Drop for SandboxController {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run_worker(
    source: &str,
    entry_point: Option<&str>,
    args: &[JsonValue],
    config: SandboxConfig,
    link: Link,
) {
    let program = match script::parse(source) {
        Ok(program) => program,
        Err(err) => {
            let _ = link.send(Response::Failed(err.into()));
            return;
        }
    };
    if link.send(Response::Ready).is_err() {
        return;
    }

    let mut engine = Engine::new(config, link);
    let outcome = engine
        .wait_advance()
        .and_then(|()| engine.run(&program, entry_point, args));
    let response = match outcome {
        Ok((result, snapshot)) => Response::Finished { result, snapshot },
        Err(err) => Response::Failed(err),
    };
    engine.respond(response);
}
