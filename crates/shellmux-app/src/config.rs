//! Per-user application configuration
//!
//! Loaded from `~/.shellmux/config.toml` when present; every field has a
//! default so a missing or partial file is fine. CLI flags override file
//! values.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use shellmux_types::{DEFAULT_COLS, DEFAULT_EXEC_TIMEOUT_MS, DEFAULT_ROWS};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cols: u16,
    pub rows: u16,
    pub timeout_ms: u64,
    /// Override for the history file location
    pub history_file: Option<PathBuf>,
    pub bypass_execution_policy: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cols: DEFAULT_COLS,
            rows: DEFAULT_ROWS,
            timeout_ms: DEFAULT_EXEC_TIMEOUT_MS,
            history_file: None,
            bypass_execution_policy: false,
        }
    }
}

impl AppConfig {
    pub fn load(explicit_path: Option<PathBuf>) -> Result<Self> {
        let Some(path) = explicit_path.or_else(default_config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}

fn default_config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".shellmux").join("config.toml"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}
