use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shellmux_terminal::{HistoryStore, TerminalEngine};
use shellmux_types::SessionOptions;

mod cli;
mod config;
mod repl;

use cli::{Cli, Commands};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so captured command output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.clone())?;

    let options = SessionOptions {
        cols: cli.cols.unwrap_or(config.cols),
        rows: cli.rows.unwrap_or(config.rows),
        cwd: cli.cwd.clone(),
        env: Default::default(),
        bypass_execution_policy: cli.bypass_execution_policy || config.bypass_execution_policy,
        shell: cli.shell.clone(),
    };

    let history = match &config.history_file {
        Some(path) => HistoryStore::with_path(Some(path.clone())),
        None => HistoryStore::new(),
    };
    let engine = TerminalEngine::with_history(history);

    match cli.command {
        Some(Commands::Exec {
            command,
            timeout_ms,
            json,
        }) => {
            let (session_id, _pid) = engine.create_session(&options)?;
            let outcome = engine
                .execute_command(&session_id, &command, timeout_ms.or(Some(config.timeout_ms)))
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.output);
            }
            engine.close_session(&session_id).await;
            Ok(())
        }
        Some(Commands::History { limit, clear }) => {
            if clear {
                engine.clear_history();
                println!("History cleared");
            } else {
                for command in engine.history(limit) {
                    println!("{}", command);
                }
            }
            Ok(())
        }
        None => repl::run(&engine, &options, config.timeout_ms).await,
    }
}
