use super::{Trace, TraceRunner};
use crate::errors::TraceError;
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const TRACER: &str = include_str!("tracer.py");

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs Python programs under the bundled `sys.settrace` tracer
#[derive(Debug, Clone)]
pub struct PythonTraceRunner {
    pub python: String,
    pub timeout: Duration,
    pub max_events: usize,
}

impl Default for PythonTraceRunner {
    fn default() -> Self {
        PythonTraceRunner {
            python: "python3".to_string(),
            timeout: Duration::from_secs(5),
            max_events: 5000,
        }
    }
}

impl PythonTraceRunner {
    pub fn new(python: impl Into<String>, timeout: Duration, max_events: usize) -> Self {
        PythonTraceRunner {
            python: python.into(),
            timeout,
            max_events,
        }
    }

    fn spawn(&self) -> Result<Child, TraceError> {
        Command::new(&self.python)
            .arg("-c")
            .arg(TRACER)
            .arg(self.max_events.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TraceError::runtime(format!("Could not start '{}': {}", self.python, e), None)
            })
    }

    /// Poll until the child exits; kill it once the deadline passes
    fn wait(&self, child: &mut Child) -> Result<(), TraceError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(%status, "tracer exited");
                    return Ok(());
                }
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(timeout_ms = self.timeout.as_millis() as u64, "tracer killed");
                    return Err(TraceError::timeout(format!(
                        "The program ran longer than {} ms",
                        self.timeout.as_millis()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    let _ = child.kill();
                    return Err(TraceError::runtime(
                        format!("Lost track of the tracer process: {}", e),
                        None,
                    ));
                }
            }
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_string(&mut text);
        }
        text
    })
}

impl TraceRunner for PythonTraceRunner {
    fn run(&self, source: &str) -> Result<Trace, TraceError> {
        let mut child = self.spawn()?;
        info!(python = %self.python, "tracing program");

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let writer = child.stdin.take().map(|mut stdin| {
            let source = source.to_string();
            // dropping stdin at the end of the closure closes the pipe
            thread::spawn(move || {
                let _ = stdin.write_all(source.as_bytes());
            })
        });

        self.wait(&mut child)?;
        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let out = stdout.join().unwrap_or_default();
        let err = stderr.join().unwrap_or_default();

        let mut trace: Trace = serde_json::from_str(&out).map_err(|e| {
            let detail = err.lines().last().unwrap_or("no diagnostics").to_string();
            TraceError::runtime(format!("Malformed trace output ({}): {}", e, detail), None)
        })?;
        trace.normalize(self.max_events);
        info!(
            events = trace.events.len(),
            ok = trace.status.ok,
            truncated = trace.truncated,
            "trace complete"
        );
        Ok(trace)
    }
}
