//! Playback controller
//!
//! One [`Playback`] owns at most one live backend and presents every backend
//! through the same contract: step once, play on a timer, pause, reset. The
//! host loop drives the timer by calling [`Playback::tick`] with the current
//! time; nothing here spawns its own timer thread.
//!
//! ```text
//! load/reset ─▶ idle ─▶ step_once / tick ─▶ engage backend (pre-flight first)
//!                              │
//!                              ├─ Sandbox   (JavaScript)
//!                              ├─ Replay    (Python via the full-trace runner)
//!                              └─ Simulator (everything else)
//! ```

pub mod preflight;

use crate::errors::{ErrorKind, TraceError};
use crate::fulltrace::{PythonTraceRunner, TraceReplay, TraceRunner};
use crate::language::{BackendKind, Language};
use crate::sandbox::{SandboxConfig, SandboxController, StepOutcome};
use crate::simulator::{LineSimulator, DEFAULT_MAX_LITERAL_PROPERTIES};
use crate::snapshot::{OutputLog, Snapshot};
use serde_json::Value as JsonValue;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_SPEED_MS: u64 = 1200;
pub const MIN_SPEED_MS: u64 = 80;

/// Everything a playback session can be tuned with
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    pub speed_ms: u64,
    pub min_speed_ms: u64,
    pub output_capacity: usize,
    pub sandbox: SandboxConfig,
    /// Global function called after the top-level code, sandbox only
    pub entry_point: Option<String>,
    pub args: Vec<JsonValue>,
    /// Play Python through the external tracer instead of the simulator
    pub full_trace: bool,
    pub python: String,
    pub trace_timeout: Duration,
    pub max_events: usize,
    pub max_literal_properties: usize,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        PlaybackOptions {
            speed_ms: DEFAULT_SPEED_MS,
            min_speed_ms: MIN_SPEED_MS,
            output_capacity: 500,
            sandbox: SandboxConfig::default(),
            entry_point: None,
            args: Vec::new(),
            full_trace: true,
            python: "python3".to_string(),
            trace_timeout: Duration::from_secs(5),
            max_events: 5000,
            max_literal_properties: DEFAULT_MAX_LITERAL_PROPERTIES,
        }
    }
}

impl PlaybackOptions {
    /// Which backend plays `language` under these options
    pub fn backend_for(&self, language: Language) -> BackendKind {
        match language.default_backend() {
            BackendKind::FullTrace if !self.full_trace => BackendKind::Simulator,
            kind => kind,
        }
    }

    fn runner(&self) -> PythonTraceRunner {
        PythonTraceRunner::new(self.python.clone(), self.trace_timeout, self.max_events)
    }
}

enum Backend {
    Sandbox(SandboxController),
    Replay(TraceReplay),
    Simulator {
        sim: LineSimulator,
        /// Next 0-based line to simulate
        next: usize,
    },
}

impl Backend {
    fn kind(&self) -> BackendKind {
        match self {
            Backend::Sandbox(_) => BackendKind::Sandbox,
            Backend::Replay(_) => BackendKind::FullTrace,
            Backend::Simulator { .. } => BackendKind::Simulator,
        }
    }
}

pub struct Playback {
    options: PlaybackOptions,
    runner: Box<dyn TraceRunner>,
    source: String,
    language: Language,
    backend: Option<Backend>,

    snapshot: Snapshot,
    output: OutputLog,
    error: Option<TraceError>,
    result: Option<JsonValue>,
    active_line: usize,

    executing: bool,
    playing: bool,
    finished: bool,
    speed: Duration,
    next_tick: Option<Instant>,
    steps: usize,
}

impl Playback {
    pub fn new(options: PlaybackOptions) -> Self {
        let runner = Box::new(options.runner());
        Self::with_runner(options, runner)
    }

    /// Use a custom full-trace runner instead of the Python subprocess
    pub fn with_runner(options: PlaybackOptions, runner: Box<dyn TraceRunner>) -> Self {
        let speed = Duration::from_millis(options.speed_ms.max(options.min_speed_ms));
        let output = OutputLog::new(options.output_capacity);
        Playback {
            options,
            runner,
            source: String::new(),
            language: Language::JavaScript,
            backend: None,
            snapshot: Snapshot::default(),
            output,
            error: None,
            result: None,
            active_line: 1,
            executing: false,
            playing: false,
            finished: false,
            speed,
            next_tick: None,
            steps: 0,
        }
    }

    /// Replace the program and start over
    pub fn load(&mut self, source: impl Into<String>, language: Language) {
        self.source = source.into();
        self.language = language;
        self.reset();
    }

    /// Stop playback, drop the backend and clear every piece of state
    pub fn reset(&mut self) {
        self.pause();
        if let Some(Backend::Sandbox(mut sandbox)) = self.backend.take() {
            sandbox.terminate();
        }
        self.snapshot = Snapshot::default();
        self.output.clear();
        self.error = None;
        self.result = None;
        self.active_line = 1;
        self.executing = false;
        self.finished = false;
        self.steps = 0;
    }

    /// Advance by one step. Returns whether the state moved.
    pub fn step_once(&mut self) -> bool {
        if self.finished || self.error.is_some() {
            return false;
        }
        if self.backend.is_none() && !self.engage() {
            return false;
        }
        let moved = match self.backend_kind() {
            Some(BackendKind::Sandbox) => self.step_sandbox(),
            Some(BackendKind::FullTrace) => self.step_replay(),
            Some(BackendKind::Simulator) => self.step_simulator(),
            None => false,
        };
        if moved {
            self.steps += 1;
            debug!(line = self.active_line, step = self.steps, "stepped");
        }
        moved
    }

    /// Step backwards; only full-trace replay can do this
    pub fn step_back(&mut self) -> bool {
        let Some(Backend::Replay(replay)) = self.backend.as_mut() else {
            return false;
        };
        if !replay.step_back() {
            return false;
        }
        self.error = None;
        self.finished = false;
        self.executing = true;
        self.show_replay();
        true
    }

    /// Start the repeating timer; the first step is due immediately
    pub fn play(&mut self, now: Instant) -> bool {
        if self.finished || self.error.is_some() {
            return false;
        }
        self.playing = true;
        self.next_tick = Some(now);
        true
    }

    pub fn pause(&mut self) {
        self.playing = false;
        self.next_tick = None;
    }

    /// Drive the play timer. Returns whether a step was taken.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.next_tick {
            Some(due) if self.playing && now >= due => {}
            _ => return false,
        }
        self.step_once();
        if self.playing {
            self.next_tick = Some(now + self.speed);
        }
        true
    }

    /// Set the delay between played steps; returns the clamped value
    pub fn set_speed_ms(&mut self, ms: u64) -> u64 {
        let ms = ms.max(self.options.min_speed_ms);
        self.speed = Duration::from_millis(ms);
        ms
    }

    fn engage(&mut self) -> bool {
        if let Err(err) = preflight::check(&self.source, self.language) {
            self.fail(err);
            return false;
        }
        let kind = self.options.backend_for(self.language);
        info!(language = %self.language, backend = %kind, "engaging backend");

        let backend = match kind {
            BackendKind::Sandbox => {
                let created = SandboxController::create(
                    &self.source,
                    self.options.entry_point.as_deref(),
                    self.options.args.clone(),
                    self.options.sandbox.clone(),
                )
                .and_then(|mut sandbox| sandbox.wait_ready().map(|()| sandbox));
                match created {
                    Ok(sandbox) => Backend::Sandbox(sandbox),
                    Err(err) => {
                        self.fail(err);
                        return false;
                    }
                }
            }
            BackendKind::FullTrace => match self.runner.run(&self.source) {
                Ok(trace) if trace.events.is_empty() => {
                    let err = trace.status.error();
                    self.executing = true;
                    match err {
                        Some(err) => self.fail(err),
                        None => self.end(),
                    }
                    return false;
                }
                Ok(trace) => Backend::Replay(TraceReplay::new(trace)),
                Err(err) => {
                    self.fail(err);
                    return false;
                }
            },
            BackendKind::Simulator => Backend::Simulator {
                sim: LineSimulator::new(&self.source, self.language)
                    .with_max_properties(self.options.max_literal_properties),
                next: 0,
            },
        };
        self.backend = Some(backend);
        self.executing = true;
        true
    }

    fn step_sandbox(&mut self) -> bool {
        let Some(Backend::Sandbox(sandbox)) = self.backend.as_mut() else {
            return false;
        };
        let outcome = sandbox.step();
        self.output.extend(sandbox.drain_output());
        match outcome {
            Ok(StepOutcome::Suspended(step)) => {
                self.active_line = step.line;
                self.snapshot = step.snapshot;
                true
            }
            Ok(StepOutcome::Finished { result, snapshot }) => {
                self.snapshot = snapshot;
                if !result.is_null() {
                    self.result = Some(result);
                }
                self.end();
                true
            }
            Err(err) => {
                self.fail(err);
                true
            }
        }
    }

    fn step_replay(&mut self) -> bool {
        let Some(Backend::Replay(replay)) = self.backend.as_mut() else {
            return false;
        };
        if !replay.step_forward() {
            self.end();
            return false;
        }
        self.show_replay();
        self.check_replay_end();
        true
    }

    /// Mirror the replay cursor into the visible state
    fn show_replay(&mut self) {
        let Some(Backend::Replay(replay)) = self.backend.as_ref() else {
            return;
        };
        if let Some((line, snapshot)) = replay.current() {
            self.active_line = line;
            self.snapshot = snapshot;
        }
        let revealed = replay.revealed_output();
        self.output.clear();
        self.output.extend(revealed);
    }

    fn check_replay_end(&mut self) {
        let Some(Backend::Replay(replay)) = self.backend.as_ref() else {
            return;
        };
        if !replay.is_at_end() {
            return;
        }
        if let Some(err) = replay.error() {
            self.fail(err);
        } else if replay.truncated() {
            let err = TraceError::new(
                ErrorKind::Timeout,
                format!("Stopped after {} steps", replay.len()),
                Some(self.active_line),
            );
            self.fail(err);
        } else {
            self.end();
        }
    }

    fn step_simulator(&mut self) -> bool {
        let Some(Backend::Simulator { sim, next }) = self.backend.as_mut() else {
            return false;
        };
        // blank and comment lines pass in the same step as the next code line
        while *next < sim.line_count() && !sim.is_meaningful(*next) {
            sim.advance(*next);
            *next += 1;
        }
        if *next >= sim.line_count() {
            self.snapshot = sim.finish();
            self.end();
            return true;
        }
        let step = sim.advance(*next);
        *next += 1;
        self.active_line = step.line;
        self.snapshot = step.snapshot;
        self.output.extend(step.output);
        true
    }

    fn end(&mut self) {
        if self.executing {
            self.executing = false;
            info!(steps = self.steps, "program finished");
        }
        self.finished = true;
        self.pause();
    }

    fn fail(&mut self, err: TraceError) {
        warn!(error = %err.describe(), "playback stopped on error");
        if let Some(line) = err.line {
            self.active_line = line;
        }
        self.error = Some(err);
        self.executing = false;
        self.pause();
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Backend currently engaged, if any
    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(Backend::kind)
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn output(&self) -> &OutputLog {
        &self.output
    }

    pub fn error(&self) -> Option<&TraceError> {
        self.error.as_ref()
    }

    /// Return value of the sandbox entry point
    pub fn result(&self) -> Option<&JsonValue> {
        self.result.as_ref()
    }

    pub fn active_line(&self) -> usize {
        self.active_line
    }

    pub fn is_executing(&self) -> bool {
        self.executing
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn can_step_back(&self) -> bool {
        matches!(&self.backend, Some(Backend::Replay(r)) if r.position().is_some_and(|p| p > 0))
    }

    pub fn speed_ms(&self) -> u64 {
        self.speed.as_millis() as u64
    }

    pub fn steps_taken(&self) -> usize {
        self.steps
    }

    pub fn options(&self) -> &PlaybackOptions {
        &self.options
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.reset();
    }
}
