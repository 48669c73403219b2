//! Shell executable resolution
//!
//! Tries candidate shells in priority order: PowerShell Core (`pwsh`) on
//! every platform, then the native `powershell.exe` on Windows. The first
//! usable candidate is cached for the process lifetime.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use shellmux_types::EngineError;
use tracing::{debug, info};

/// Upper bound on the no-op probe invocation
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

static RESOLVED_SHELL: OnceLock<PathBuf> = OnceLock::new();

/// Locate a usable shell binary. Resolution runs once; later calls return
/// the cached path.
pub fn resolve_shell() -> Result<PathBuf, EngineError> {
    if let Some(path) = RESOLVED_SHELL.get() {
        return Ok(path.clone());
    }

    let found =
        first_usable(&candidates(), probe_no_op).ok_or(EngineError::ExecutableNotFound)?;
    info!(shell = %found.display(), "resolved shell executable");

    // A concurrent resolver may have won the race; either winner is usable.
    Ok(RESOLVED_SHELL.get_or_init(|| found).clone())
}

#[cfg(windows)]
fn candidates() -> Vec<PathBuf> {
    vec![PathBuf::from("pwsh"), PathBuf::from("powershell.exe")]
}

#[cfg(not(windows))]
fn candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/bin/pwsh"),
        PathBuf::from("/usr/local/bin/pwsh"),
        PathBuf::from("pwsh"),
    ]
}

/// A candidate wins if it exists on disk, or if the PATH lookup implied by a
/// bare name survives a no-op invocation.
fn first_usable(candidates: &[PathBuf], probe: impl Fn(&Path) -> bool) -> Option<PathBuf> {
    for candidate in candidates {
        if candidate.is_absolute() {
            if candidate.exists() {
                return Some(candidate.clone());
            }
            continue;
        }
        if probe(candidate) {
            return Some(candidate.clone());
        }
    }
    None
}

/// Run `<shell> -NoProfile -Command exit` and poll for completion within
/// the probe timeout.
fn probe_no_op(shell: &Path) -> bool {
    let mut child = match Command::new(shell)
        .args(["-NoProfile", "-Command", "exit"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!(shell = %shell.display(), error = %e, "shell probe failed to spawn");
            return false;
        }
    };

    let start = Instant::now();
    while start.elapsed() < PROBE_TIMEOUT {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) => std::thread::sleep(Duration::from_millis(25)),
            Err(_) => return false,
        }
    }

    let _ = child.kill();
    let _ = child.wait();
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_candidate_accepted_when_present() {
        let dir = tempfile::TempDir::new().unwrap();
        let fake_shell = dir.path().join("pwsh");
        std::fs::write(&fake_shell, b"").unwrap();

        let found = first_usable(&[fake_shell.clone()], |_| {
            panic!("existing path must not be probed")
        });
        assert_eq!(found, Some(fake_shell));
    }

    #[test]
    fn bare_names_fall_through_to_probe_in_order() {
        let cands = vec![PathBuf::from("first"), PathBuf::from("second")];
        let found = first_usable(&cands, |p| p == Path::new("second"));
        assert_eq!(found, Some(PathBuf::from("second")));
    }

    #[test]
    fn no_usable_candidate_yields_none() {
        let cands = vec![
            PathBuf::from("/nonexistent/pwsh"),
            PathBuf::from("missing-shell"),
        ];
        assert_eq!(first_usable(&cands, |_| false), None);
    }

    #[test]
    fn probe_rejects_unknown_binary() {
        assert!(!probe_no_op(Path::new("shellmux-no-such-binary")));
    }
}
