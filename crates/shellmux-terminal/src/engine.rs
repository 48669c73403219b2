//! Engine facade
//!
//! Ties the registry, dispatcher, history store, and metrics collector
//! together behind the full session-engine operation surface.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use shellmux_types::{
    EngineError, ExecOutcome, MetricsSnapshot, SessionExit, SessionId, SessionOptions,
    SessionStatus, SessionSummary, CLOSE_GRACE_PERIOD_MS,
};

use crate::dispatcher::CommandDispatcher;
use crate::history::HistoryStore;
use crate::metrics::MetricsCollector;
use crate::registry::SessionRegistry;

pub struct TerminalEngine {
    registry: SessionRegistry,
    dispatcher: CommandDispatcher,
    history: Arc<HistoryStore>,
    metrics: Arc<MetricsCollector>,
}

impl TerminalEngine {
    pub fn new() -> Self {
        Self::with_history(HistoryStore::new())
    }

    pub fn with_history(history: HistoryStore) -> Self {
        let history = Arc::new(history);
        let metrics = Arc::new(MetricsCollector::new());
        Self {
            registry: SessionRegistry::new(),
            dispatcher: CommandDispatcher::new(Arc::clone(&history), Arc::clone(&metrics)),
            history,
            metrics,
        }
    }

    pub fn create_session(
        &self,
        options: &SessionOptions,
    ) -> Result<(SessionId, u32), EngineError> {
        self.registry.create(options)
    }

    pub async fn execute_command(
        &self,
        session_id: &str,
        command: &str,
        timeout_ms: Option<u64>,
    ) -> Result<ExecOutcome, EngineError> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        self.dispatcher.execute(session, command, timeout_ms).await
    }

    /// Fire-and-forget raw write to the session's process input
    pub fn write_to_session(&self, session_id: &str, data: &[u8]) -> Result<(), EngineError> {
        self.registry
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?
            .write_raw(data)
    }

    pub fn resize_terminal(
        &self,
        session_id: &str,
        cols: u16,
        rows: u16,
    ) -> Result<(), EngineError> {
        self.registry
            .get(session_id)
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?
            .resize(cols, rows)
    }

    pub fn session_info(&self, session_id: &str) -> Option<SessionSummary> {
        self.registry.get(session_id).map(|s| s.summary())
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.registry.list()
    }

    /// Graceful close: ask the shell to exit, wait the grace period, then
    /// force-terminate. Returns false when the session id is unknown.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let Some(session) = self.registry.get(session_id) else {
            return false;
        };

        session.set_status(SessionStatus::Closing);
        let _ = session.write_raw(b"exit\n");

        let grace = Duration::from_millis(CLOSE_GRACE_PERIOD_MS);
        let started = Instant::now();
        while started.elapsed() < grace && !session.has_exited() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if !session.has_exited() {
            warn!(session_id, "session did not exit within grace period, killing");
            let _ = session.kill();
        }

        // The reader task also removes the entry on EOF; removal is idempotent
        self.registry.remove(session_id);
        true
    }

    /// Most-recent-first command history
    pub fn history(&self, limit: usize) -> Vec<String> {
        self.history.list(limit)
    }

    pub fn clear_history(&self) {
        self.history.clear();
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.registry.active_count())
    }

    /// Exit notifications for sessions created through this engine.
    /// Can be taken once.
    pub fn take_exit_events(&self) -> Option<UnboundedReceiver<SessionExit>> {
        self.registry.take_exit_events()
    }
}

impl Default for TerminalEngine {
    fn default() -> Self {
        Self::new()
    }
}
