//! Core types and structures for shellmux
//!
//! This crate provides the foundational types shared by the engine and
//! application crates: session options and summaries, the error taxonomy,
//! and the tuning constants for the session engine.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Constants
// ============================================================================

/// Default terminal width in columns
pub const DEFAULT_COLS: u16 = 80;

/// Default terminal height in rows
pub const DEFAULT_ROWS: u16 = 24;

/// Default command execution timeout in milliseconds
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 30_000;

/// Maximum number of persisted history entries
pub const HISTORY_MAX_ENTRIES: usize = 1000;

/// Maximum number of concurrently open sessions
pub const MAX_CONCURRENT_SESSIONS: usize = 15;

/// How long a graceful close waits before force-terminating the process
pub const CLOSE_GRACE_PERIOD_MS: u64 = 2_000;

/// Upper bound on the per-session output accumulator
pub const DEFAULT_SCROLLBACK_BYTES: usize = 256 * 1024;

/// Session identifier, formatted `shell-<n>` with a monotonic counter
pub type SessionId = String;

// ============================================================================
// Session types
// ============================================================================

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Allocated but the process has not been spawned yet
    Created,
    /// Process alive, no command in flight
    Running,
    /// A dispatched command currently owns the execution slot
    Executing,
    /// Graceful close requested, waiting for the process to exit
    Closing,
    /// Process has exited
    Closed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Created => "created",
            SessionStatus::Running => "running",
            SessionStatus::Executing => "executing",
            SessionStatus::Closing => "closing",
            SessionStatus::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// Options for creating a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub cols: u16,
    pub rows: u16,
    /// Working directory; defaults to the current directory
    pub cwd: Option<PathBuf>,
    /// Environment overrides, merged over the ambient environment
    pub env: HashMap<String, String>,
    /// Pass `-ExecutionPolicy Bypass` to PowerShell at spawn time
    pub bypass_execution_policy: bool,
    /// Explicit shell binary; defaults to the resolved shell
    pub shell: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            cwd: None,
            env: HashMap::new(),
            bypass_execution_policy: false,
            shell: None,
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub pid: u32,
    pub shell: String,
    pub working_dir: String,
    pub created_at: DateTime<Utc>,
    pub cols: u16,
    pub rows: u16,
    pub status: SessionStatus,
    pub commands_executed: u64,
}

/// Emitted when a session's process exits, spontaneously or after a close
#[derive(Debug, Clone)]
pub struct SessionExit {
    pub session_id: SessionId,
    pub exit_code: Option<u32>,
}

// ============================================================================
// Dispatch types
// ============================================================================

/// Successful outcome of one command dispatch
#[derive(Debug, Clone, Serialize)]
pub struct ExecOutcome {
    /// Output captured between dispatch and completion
    pub output: String,
    pub execution_time_ms: u64,
    /// Per-session ordinal of this command
    pub command_number: u64,
}

/// Aggregate counters across all dispatches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub commands_executed: u64,
    pub total_execution_time_ms: u64,
    pub average_execution_time_ms: u64,
    /// Read live from the registry at snapshot time
    pub active_sessions: usize,
}

// ============================================================================
// Errors
// ============================================================================

/// Error taxonomy of the session engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal: no usable shell could be located at startup
    #[error("no usable shell executable found")]
    ExecutableNotFound,

    /// Per-session: spawning the PTY process failed; the caller may retry
    #[error("failed to spawn session: {0}")]
    SpawnFailure(String),

    /// Per-call: the session was already closed or never existed
    #[error("session '{0}' not found")]
    SessionNotFound(SessionId),

    /// Per-call: the command did not complete within the timeout.
    /// The process may still be running; the session stays usable.
    #[error("command timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_match_engine_defaults() {
        let opts = SessionOptions::default();
        assert_eq!(opts.cols, DEFAULT_COLS);
        assert_eq!(opts.rows, DEFAULT_ROWS);
        assert!(opts.cwd.is_none());
        assert!(opts.env.is_empty());
        assert!(!opts.bypass_execution_policy);
        assert!(opts.shell.is_none());
    }

    #[test]
    fn error_messages_name_the_failure() {
        let e = EngineError::SessionNotFound("shell-7".to_string());
        assert_eq!(e.to_string(), "session 'shell-7' not found");

        let e = EngineError::Timeout { timeout_ms: 30_000 };
        assert!(e.to_string().contains("30000 ms"));
    }

    #[test]
    fn status_display_is_lowercase() {
        assert_eq!(SessionStatus::Executing.to_string(), "executing");
        assert_eq!(SessionStatus::Closed.to_string(), "closed");
    }
}
