//! Logging setup for the binary
//!
//! The TUI owns the terminal, so interactive runs log to a daily file under
//! the data directory (or the temp directory when there is none). Headless
//! runs log to stderr, keeping stdout for the JSON step stream. `RUST_LOG`
//! overrides the default `info` filter in both cases.

use eyre::Result;
use std::env;
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    File,
    Stderr,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Directory holding `stepviz.log.*` files
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(env::temp_dir)
        .join("stepviz")
        .join("logs")
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped, so keep it alive
/// for the lifetime of the program.
pub fn init(target: LogTarget) -> Result<Option<WorkerGuard>> {
    match target {
        LogTarget::File => {
            let dir = log_directory();
            fs::create_dir_all(&dir)?;
            let (writer, guard) = non_blocking(rolling::daily(&dir, "stepviz.log"));
            tracing_subscriber::registry()
                .with(env_filter())
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_names(true)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .try_init()
                .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;
            tracing::info!(log_dir = %dir.display(), "logging to file");
            Ok(Some(guard))
        }
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| eyre::eyre!("Failed to initialize tracing subscriber: {}", e))?;
            Ok(None)
        }
    }
}
