//! Bounded, persisted command history
//!
//! Keeps the most recent commands, deduplicating only immediately-repeated
//! entries, and rewrites a fixed per-user plain-text file in full after
//! every accepted append and after clear. Persistence failures are logged
//! and swallowed; they never abort command execution.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use shellmux_types::HISTORY_MAX_ENTRIES;

pub struct HistoryStore {
    entries: Mutex<Vec<String>>,
    file_path: Option<PathBuf>,
    max_entries: usize,
}

impl HistoryStore {
    /// History backed by the default per-user file (`~/.shellmux/history`)
    pub fn new() -> Self {
        Self::with_path(default_history_path())
    }

    /// History backed by an explicit file, or in-memory only when `None`
    pub fn with_path(file_path: Option<PathBuf>) -> Self {
        let entries = file_path
            .as_deref()
            .and_then(|path| fs::read_to_string(path).ok())
            .map(|content| {
                let mut lines: Vec<String> = content
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| l.to_string())
                    .collect();
                if lines.len() > HISTORY_MAX_ENTRIES {
                    lines.drain(..lines.len() - HISTORY_MAX_ENTRIES);
                }
                lines
            })
            .unwrap_or_default();

        Self {
            entries: Mutex::new(entries),
            file_path,
            max_entries: HISTORY_MAX_ENTRIES,
        }
    }

    /// Record a command. Empty input and immediate repeats are skipped;
    /// non-adjacent repeats are kept.
    pub fn append(&self, command: &str) {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return;
        }

        let mut entries = self.entries.lock().unwrap();
        if entries.last().map(|last| last == trimmed).unwrap_or(false) {
            return;
        }

        entries.push(trimmed.to_string());
        if entries.len() > self.max_entries {
            let excess = entries.len() - self.max_entries;
            entries.drain(..excess);
        }

        self.persist(&entries);
    }

    /// Most-recent-first slice of at most `limit` commands
    pub fn list(&self, limit: usize) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
        self.persist(&entries);
    }

    fn persist(&self, entries: &[String]) {
        let Some(path) = &self.file_path else {
            return;
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(path = %path.display(), error = %e, "failed to create history directory");
                return;
            }
        }

        let mut content = entries.join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        if let Err(e) = fs::write(path, content) {
            warn!(path = %path.display(), error = %e, "failed to persist command history");
        }
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn default_history_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".shellmux").join("history"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> HistoryStore {
        HistoryStore::with_path(Some(dir.path().join("history")))
    }

    #[test]
    fn adjacent_repeats_collapse_to_one_entry() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append("ls");
        store.append("ls");
        assert_eq!(store.len(), 1);

        store.append("pwd");
        store.append("ls");
        assert_eq!(store.list(10), vec!["ls", "pwd", "ls"]);
    }

    #[test]
    fn empty_and_whitespace_commands_are_skipped() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.append("");
        store.append("   ");
        assert!(store.is_empty());
    }

    #[test]
    fn cap_drops_oldest_entries() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for i in 0..HISTORY_MAX_ENTRIES + 5 {
            store.append(&format!("cmd-{}", i));
        }

        assert_eq!(store.len(), HISTORY_MAX_ENTRIES);
        let listed = store.list(1);
        assert_eq!(listed[0], format!("cmd-{}", HISTORY_MAX_ENTRIES + 4));
        // Oldest five dropped
        let all = store.list(HISTORY_MAX_ENTRIES);
        assert_eq!(all.last().unwrap(), "cmd-5");
    }

    #[test]
    fn history_survives_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history");

        {
            let store = HistoryStore::with_path(Some(path.clone()));
            store.append("echo one");
            store.append("echo two");
        }

        let reloaded = HistoryStore::with_path(Some(path.clone()));
        assert_eq!(reloaded.list(10), vec!["echo two", "echo one"]);

        let on_disk = fs::read_to_string(&path).unwrap();
        assert_eq!(on_disk, "echo one\necho two\n");
    }

    #[test]
    fn clear_empties_memory_and_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history");

        let store = HistoryStore::with_path(Some(path.clone()));
        store.append("echo one");
        store.clear();

        assert!(store.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn persistence_failure_does_not_panic() {
        // Path under a file, so create_dir_all fails
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"x").unwrap();

        let store = HistoryStore::with_path(Some(blocker.join("sub").join("history")));
        store.append("echo one");
        assert_eq!(store.len(), 1);
    }
}
