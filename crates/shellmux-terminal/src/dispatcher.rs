//! Command dispatch
//!
//! Serializes command execution against a session, detects completion via a
//! unique sentinel marker echoed after the command, enforces the caller's
//! timeout as an upper bound, and feeds the history store and metrics
//! collector.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use shellmux_types::{EngineError, ExecOutcome, SessionStatus, DEFAULT_EXEC_TIMEOUT_MS};

use crate::history::HistoryStore;
use crate::metrics::MetricsCollector;
use crate::session::Session;

const SENTINEL_PREFIX: &str = "__SHELLMUX_DONE_";

pub struct CommandDispatcher {
    history: Arc<HistoryStore>,
    metrics: Arc<MetricsCollector>,
}

impl CommandDispatcher {
    pub fn new(history: Arc<HistoryStore>, metrics: Arc<MetricsCollector>) -> Self {
        Self { history, metrics }
    }

    /// Run one command against the session and capture its output.
    ///
    /// Dispatches against the same session queue behind each other; the
    /// timeout covers both queueing and execution. A timeout rejects only
    /// the waiting caller: the process keeps running and trailing output
    /// lands in the session's ambient accumulator.
    pub async fn execute(
        &self,
        session: Arc<Session>,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> Result<ExecOutcome, EngineError> {
        let timeout_ms = timeout_ms.unwrap_or(DEFAULT_EXEC_TIMEOUT_MS);
        let deadline = Duration::from_millis(timeout_ms);
        let trimmed = command.trim();

        // Recorded before execution; a later timeout does not unrecord it
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            self.history.append(trimmed);
        }

        let started = Instant::now();

        let slot = match timeout(deadline, session.exec_slot.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                self.metrics.record(started.elapsed().as_millis() as u64);
                return Err(EngineError::Timeout { timeout_ms });
            }
        };

        session.set_status(SessionStatus::Executing);
        let (observer_id, mut rx) = session.attach_observer();
        let sentinel = format!("{}{}__", SENTINEL_PREFIX, Uuid::new_v4().simple());
        // The sentinel echo goes on its own line so commands ending in
        // control operators (`&`) or comments cannot absorb it
        let line = if trimmed.is_empty() {
            format!("echo {}\n", sentinel)
        } else {
            format!("{}\necho {}\n", trimmed, sentinel)
        };
        debug!(session_id = %session.id(), %sentinel, "dispatching command");

        let result = match session.write_raw(line.as_bytes()) {
            Ok(()) => {
                let remaining = deadline.saturating_sub(started.elapsed());
                match timeout(remaining, capture_until_sentinel(&mut rx, &sentinel)).await {
                    Ok(raw) => Ok(raw),
                    Err(_) => Err(EngineError::Timeout { timeout_ms }),
                }
            }
            Err(e) => Err(e),
        };

        session.detach_observer(observer_id);
        session.set_status(SessionStatus::Running);
        drop(slot);

        let execution_time_ms = started.elapsed().as_millis() as u64;
        self.metrics.record(execution_time_ms);

        match result {
            Ok(raw) => {
                let command_number = session.next_command_number();
                debug!(
                    session_id = %session.id(),
                    command_number,
                    execution_time_ms,
                    "command completed"
                );
                Ok(ExecOutcome {
                    output: scrub_capture(&raw),
                    execution_time_ms,
                    command_number,
                })
            }
            Err(e) => {
                debug!(session_id = %session.id(), execution_time_ms, error = %e, "dispatch failed");
                Err(e)
            }
        }
    }
}

/// Collect observer chunks until the sentinel appears at the start of an
/// output line. The echoed `echo` line carries the sentinel mid-line and
/// is skipped. Stream end (process exit) also completes the capture.
async fn capture_until_sentinel(rx: &mut UnboundedReceiver<String>, sentinel: &str) -> String {
    let mut captured = String::new();
    while let Some(chunk) = rx.recv().await {
        captured.push_str(&chunk);
        if let Some(pos) = find_sentinel_line(&captured, sentinel) {
            captured.truncate(pos);
            return captured;
        }
    }
    captured
}

/// Byte offset of a sentinel occurrence that begins a line, if any
fn find_sentinel_line(buf: &str, sentinel: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = buf[from..].find(sentinel) {
        let pos = from + rel;
        if pos == 0 || matches!(buf.as_bytes()[pos - 1], b'\n' | b'\r') {
            return Some(pos);
        }
        from = pos + sentinel.len();
    }
    None
}

/// Drop sentinel lines from the capture: the echoed injection plus any
/// straggler sentinel from an earlier timed-out dispatch
fn scrub_capture(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for line in raw.split_inclusive('\n') {
        if !is_sentinel_line(line) {
            cleaned.push_str(line);
        }
    }
    cleaned.trim_end().to_string()
}

fn is_sentinel_line(line: &str) -> bool {
    let text = line.trim();
    let text = text.strip_prefix("echo ").unwrap_or(text);
    text.starts_with(SENTINEL_PREFIX) && text.ends_with("__")
}
