//! A single PTY shell session
//!
//! Each session exclusively owns one spawned shell process behind a PTY
//! master, an output accumulator, and a set of attached output observers.
//! A blocking reader task pumps PTY output into the accumulator and fans
//! it out to observers in registration order; on EOF it reports the exit
//! code upstream.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use shellmux_types::{
    EngineError, SessionId, SessionOptions, SessionStatus, SessionSummary,
    DEFAULT_SCROLLBACK_BYTES,
};

pub(crate) type ObserverId = u64;

struct Observer {
    id: ObserverId,
    tx: UnboundedSender<String>,
}

/// One spawned shell process and its I/O state
pub struct Session {
    id: SessionId,
    pid: u32,
    shell: PathBuf,
    working_dir: PathBuf,
    created_at: DateTime<Utc>,
    size: Mutex<(u16, u16)>,
    status: Mutex<SessionStatus>,
    command_counter: AtomicU64,
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    output: Mutex<String>,
    observers: Mutex<Vec<Observer>>,
    next_observer_id: AtomicU64,
    /// Admits one in-flight command; later dispatches queue behind it
    pub(crate) exec_slot: tokio::sync::Mutex<()>,
}

impl Session {
    /// Spawn the shell process on a fresh PTY
    pub(crate) fn spawn(
        id: SessionId,
        shell: PathBuf,
        options: &SessionOptions,
    ) -> Result<Arc<Self>, EngineError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: options.rows,
                cols: options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| EngineError::SpawnFailure(format!("openpty: {}", e)))?;

        let working_dir = options.cwd.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
        });

        let mut cmd = CommandBuilder::new(&shell);
        if is_powershell(&shell) {
            // Suppress the startup banner and keep the shell alive
            cmd.args(["-NoLogo", "-NoExit"]);
            if options.bypass_execution_policy {
                cmd.args(["-ExecutionPolicy", "Bypass"]);
            }
        }
        cmd.cwd(&working_dir);
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| EngineError::SpawnFailure(e.to_string()))?;
        drop(pair.slave);

        let pid = child.process_id().unwrap_or(0);
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| EngineError::SpawnFailure(e.to_string()))?;

        debug!(session_id = %id, pid, shell = %shell.display(), "spawned session process");

        Ok(Arc::new(Self {
            id,
            pid,
            shell,
            working_dir,
            created_at: Utc::now(),
            size: Mutex::new((options.cols, options.rows)),
            status: Mutex::new(SessionStatus::Created),
            command_counter: AtomicU64::new(0),
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            output: Mutex::new(String::new()),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
            exec_slot: tokio::sync::Mutex::new(()),
        }))
    }

    /// Start the blocking reader task. `on_exit` fires exactly once, after
    /// the PTY stream reaches EOF and the child has been reaped.
    pub(crate) fn start_reader(
        session: Arc<Self>,
        on_exit: impl FnOnce(SessionId, Option<u32>) + Send + 'static,
    ) -> Result<(), EngineError> {
        let mut reader = session
            .master
            .lock()
            .unwrap()
            .try_clone_reader()
            .map_err(|e| EngineError::SpawnFailure(e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
                        session.push_output(&chunk);
                    }
                    // On most platforms a killed PTY surfaces as EIO
                    Err(_) => break,
                }
            }

            let exit_code = session.wait_exit_code();
            session.set_status(SessionStatus::Closed);
            session.observers.lock().unwrap().clear();
            on_exit(session.id.clone(), exit_code);
        });

        Ok(())
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        let mut current = self.status.lock().unwrap();
        // Closed is terminal
        if *current != SessionStatus::Closed {
            *current = status;
        }
    }

    /// Accumulated output since spawn, bounded by the scrollback cap
    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    /// Attach an output observer. The observer sees everything the PTY
    /// emits from this point until detached.
    pub(crate) fn attach_observer(&self) -> (ObserverId, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().unwrap().push(Observer { id, tx });
        (id, rx)
    }

    pub(crate) fn detach_observer(&self, observer_id: ObserverId) {
        self.observers
            .lock()
            .unwrap()
            .retain(|o| o.id != observer_id);
    }

    /// Write raw bytes to the process input
    pub fn write_raw(&self, data: &[u8]) -> Result<(), EngineError> {
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<(), EngineError> {
        self.master
            .lock()
            .unwrap()
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| {
                EngineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;
        *self.size.lock().unwrap() = (cols, rows);
        Ok(())
    }

    pub(crate) fn next_command_number(&self) -> u64 {
        self.command_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Non-blocking exit probe
    pub(crate) fn has_exited(&self) -> bool {
        matches!(self.child.lock().unwrap().try_wait(), Ok(Some(_)))
            || self.status() == SessionStatus::Closed
    }

    pub(crate) fn kill(&self) -> Result<(), EngineError> {
        self.child.lock().unwrap().kill()?;
        Ok(())
    }

    fn wait_exit_code(&self) -> Option<u32> {
        self.child
            .lock()
            .unwrap()
            .wait()
            .ok()
            .map(|status| status.exit_code())
    }

    fn push_output(&self, chunk: &str) {
        {
            let mut out = self.output.lock().unwrap();
            out.push_str(chunk);
            if out.len() > DEFAULT_SCROLLBACK_BYTES {
                let mut cut = out.len() - DEFAULT_SCROLLBACK_BYTES;
                while cut < out.len() && !out.is_char_boundary(cut) {
                    cut += 1;
                }
                out.drain(..cut);
            }
        }

        // Fan out in registration order; disconnected observers drop out
        let mut observers = self.observers.lock().unwrap();
        observers.retain(|o| o.tx.send(chunk.to_string()).is_ok());
    }

    pub fn summary(&self) -> SessionSummary {
        let (cols, rows) = *self.size.lock().unwrap();
        SessionSummary {
            id: self.id.clone(),
            pid: self.pid,
            shell: self.shell.display().to_string(),
            working_dir: self.working_dir.display().to_string(),
            created_at: self.created_at,
            cols,
            rows,
            status: self.status(),
            commands_executed: self.command_counter.load(Ordering::Relaxed),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // The reader task exits on its own once the killed PTY hits EOF
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
        }
    }
}

fn is_powershell(shell: &Path) -> bool {
    shell
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| {
            let s = s.to_ascii_lowercase();
            s == "pwsh" || s == "powershell"
        })
        .unwrap_or(false)
}
