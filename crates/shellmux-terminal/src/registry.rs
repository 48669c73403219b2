//! Session registry
//!
//! Creates, indexes, and destroys sessions. The session map is private and
//! mutated only through registry methods; identifiers come from a monotonic
//! counter and are never reused, even after removal.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::info;

use shellmux_types::{
    EngineError, SessionExit, SessionId, SessionOptions, SessionStatus, SessionSummary,
    MAX_CONCURRENT_SESSIONS,
};

use crate::resolver::resolve_shell;
use crate::session::Session;

pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, Arc<Session>>>>,
    next_id: AtomicU32,
    exit_tx: UnboundedSender<SessionExit>,
    exit_rx: Mutex<Option<UnboundedReceiver<SessionExit>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU32::new(1),
            exit_tx,
            exit_rx: Mutex::new(Some(exit_rx)),
        }
    }

    /// Spawn a shell on a fresh PTY and register the session.
    /// Returns the session id and the process id.
    pub fn create(&self, options: &SessionOptions) -> Result<(SessionId, u32), EngineError> {
        if self.sessions.lock().unwrap().len() >= MAX_CONCURRENT_SESSIONS {
            return Err(EngineError::SpawnFailure(format!(
                "maximum concurrent sessions ({}) reached",
                MAX_CONCURRENT_SESSIONS
            )));
        }

        let shell = match &options.shell {
            Some(shell) => shell.clone(),
            None => resolve_shell()?,
        };

        let id = format!("shell-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Session::spawn(id.clone(), shell, options)?;
        let pid = session.pid();

        // Register before starting the reader so a fast-exiting process
        // still finds its entry to remove.
        self.sessions
            .lock()
            .unwrap()
            .insert(id.clone(), Arc::clone(&session));

        let sessions = Arc::clone(&self.sessions);
        let exit_tx = self.exit_tx.clone();
        if let Err(e) = Session::start_reader(Arc::clone(&session), move |session_id, exit_code| {
            sessions.lock().unwrap().remove(&session_id);
            info!(session_id = %session_id, ?exit_code, "session process exited");
            let _ = exit_tx.send(SessionExit {
                session_id,
                exit_code,
            });
        }) {
            self.sessions.lock().unwrap().remove(&id);
            return Err(e);
        }
        session.set_status(SessionStatus::Running);

        info!(session_id = %id, pid, "session created");
        Ok((id, pid))
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// Summaries of all registered sessions, in creation order
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .map(|s| s.summary())
            .collect();
        summaries.sort_by_key(|s| id_ordinal(&s.id));
        summaries
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.lock().unwrap().remove(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Exit notifications for all sessions ever created through this
    /// registry. Can be taken once.
    pub fn take_exit_events(&self) -> Option<UnboundedReceiver<SessionExit>> {
        self.exit_rx.lock().unwrap().take()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        // Kill any remaining processes so blocked reader tasks reach EOF
        for session in self.sessions.lock().unwrap().values() {
            let _ = session.kill();
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn id_ordinal(id: &str) -> u32 {
    id.rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}
