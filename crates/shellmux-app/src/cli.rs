use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI arguments for shellmux
#[derive(Parser)]
#[command(name = "shellmux")]
#[command(about = "PTY shell sessions with command dispatch, history, and metrics")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Terminal width in columns
    #[arg(long, value_name = "COLS")]
    pub cols: Option<u16>,

    /// Terminal height in rows
    #[arg(long, value_name = "ROWS")]
    pub rows: Option<u16>,

    /// Working directory for the session (default: current)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Shell binary to spawn (default: resolved PowerShell)
    #[arg(long, value_name = "PATH")]
    pub shell: Option<PathBuf>,

    /// Pass -ExecutionPolicy Bypass to PowerShell at spawn time
    #[arg(long)]
    pub bypass_execution_policy: bool,

    /// Path to config file (default: ~/.shellmux/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one command in a fresh session and print its output
    Exec {
        /// Command text to dispatch
        command: String,

        /// Timeout in milliseconds
        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show persisted command history, most recent first
    History {
        /// Maximum entries to print
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Clear the history instead of printing it
        #[arg(long)]
        clear: bool,
    },
}
