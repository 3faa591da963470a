//! # Introduction
//!
//! stepviz turns a learner's program into a steppable sequence of execution
//! states (active line, call stack, heap objects, output) and plays it in a
//! terminal UI built with [ratatui](https://docs.rs/ratatui).
//!
//! ## Execution pipeline
//!
//! ```text
//! Source + Language → pre-flight → backend → Snapshots → Playback → TUI
//! ```
//!
//! Three backends produce the same [`snapshot::Snapshot`] shape:
//!
//! 1. [`sandbox`]: JavaScript runs in a tree-walking interpreter on a worker
//!    thread that parks before every statement. The language front end lives
//!    in [`script`].
//! 2. [`fulltrace`]: Python runs once under an external `python3` tracer; the
//!    recorded events are replayed forwards and backwards.
//! 3. [`simulator`]: every other language is simulated heuristically from
//!    the source text, one line at a time.
//!
//! [`playback`] picks the backend, runs the pre-flight check and drives the
//! play timer. [`config`], [`logging`] and [`cache`] serve the binary;
//! [`ui`] is not part of the stable library API.

pub mod cache;
pub mod config;
pub mod errors;
pub mod fulltrace;
pub mod language;
pub mod logging;
pub mod playback;
pub mod sandbox;
pub mod script;
pub mod simulator;
pub mod snapshot;
pub mod ui;
