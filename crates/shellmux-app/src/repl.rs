//! Interactive REPL driving one engine-managed session

use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use shellmux_terminal::TerminalEngine;
use shellmux_types::{EngineError, SessionOptions};

pub async fn run(engine: &TerminalEngine, options: &SessionOptions, timeout_ms: u64) -> Result<()> {
    let (session_id, pid) = engine.create_session(options)?;

    println!("{}", "shellmux - PTY shell session engine".bright_cyan().bold());
    println!(
        "{}",
        format!(
            "Session {} (pid {}). Type ':quit' to exit, ':help' for commands.",
            session_id, pid
        )
        .bright_black()
    );

    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("shellmux> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);

                if let Some(meta) = line.strip_prefix(':') {
                    if !run_meta_command(engine, meta)? {
                        break;
                    }
                    continue;
                }

                match engine
                    .execute_command(&session_id, &line, Some(timeout_ms))
                    .await
                {
                    Ok(outcome) => {
                        if !outcome.output.is_empty() {
                            println!("{}", outcome.output);
                        }
                        println!(
                            "{}",
                            format!(
                                "[#{} in {} ms]",
                                outcome.command_number, outcome.execution_time_ms
                            )
                            .bright_black()
                        );
                    }
                    Err(EngineError::Timeout { timeout_ms }) => {
                        println!(
                            "{}",
                            format!(
                                "Still running after {} ms; later output stays in the session buffer",
                                timeout_ms
                            )
                            .yellow()
                        );
                    }
                    Err(e) => println!("{}", format!("Error: {}", e).red()),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    engine.close_session(&session_id).await;
    Ok(())
}

/// Handle a `:`-prefixed meta command. Returns false to leave the REPL.
fn run_meta_command(engine: &TerminalEngine, meta: &str) -> Result<bool> {
    match meta.split_whitespace().next().unwrap_or("") {
        "quit" | "exit" => return Ok(false),
        "sessions" => {
            for s in engine.list_sessions() {
                println!(
                    "{}  pid {}  {}  {}x{}  {}",
                    s.id, s.pid, s.status, s.cols, s.rows, s.working_dir
                );
            }
        }
        "history" => {
            for (i, cmd) in engine.history(20).iter().enumerate() {
                println!("{:>3}  {}", i + 1, cmd);
            }
        }
        "clear-history" => {
            engine.clear_history();
            println!("History cleared");
        }
        "metrics" => {
            println!("{}", serde_json::to_string_pretty(&engine.metrics())?);
        }
        _ => {
            println!(":sessions  :history  :clear-history  :metrics  :quit");
        }
    }
    Ok(true)
}
