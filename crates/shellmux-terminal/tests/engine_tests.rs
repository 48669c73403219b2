//! End-to-end tests driving real `/bin/sh` sessions through the engine
#![cfg(unix)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use shellmux_terminal::{CommandDispatcher, HistoryStore, MetricsCollector, SessionRegistry, TerminalEngine};
use shellmux_types::{EngineError, SessionOptions, SessionStatus};

fn sh_options() -> SessionOptions {
    SessionOptions {
        shell: Some(PathBuf::from("/bin/sh")),
        ..Default::default()
    }
}

fn test_engine(dir: &TempDir) -> TerminalEngine {
    TerminalEngine::with_history(HistoryStore::with_path(Some(dir.path().join("history"))))
}

#[tokio::test]
async fn create_execute_and_report_metrics() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);

    let (id, pid) = engine.create_session(&sh_options()).unwrap();
    assert!(pid > 0);
    assert_eq!(engine.session_info(&id).unwrap().status, SessionStatus::Running);

    let outcome = engine
        .execute_command(&id, "echo hi", None)
        .await
        .unwrap();
    assert!(outcome.output.contains("hi"), "output: {:?}", outcome.output);
    assert_eq!(outcome.command_number, 1);

    let metrics = engine.metrics();
    assert_eq!(metrics.commands_executed, 1);
    assert_eq!(metrics.active_sessions, 1);
    assert!(metrics.total_execution_time_ms >= metrics.average_execution_time_ms);

    assert!(engine.close_session(&id).await);
}

#[tokio::test]
async fn session_ids_are_unique_and_increasing() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);

    let (a, _) = engine.create_session(&sh_options()).unwrap();
    let (b, _) = engine.create_session(&sh_options()).unwrap();
    assert!(engine.close_session(&a).await);
    let (c, _) = engine.create_session(&sh_options()).unwrap();

    let ordinal = |id: &str| -> u32 { id.rsplit('-').next().unwrap().parse().unwrap() };
    assert!(id_prefix(&a) == "shell" && id_prefix(&b) == "shell");
    assert!(ordinal(&b) > ordinal(&a));
    // Ids are never reused, even after removal
    assert!(ordinal(&c) > ordinal(&b));

    engine.close_session(&b).await;
    engine.close_session(&c).await;
}

fn id_prefix(id: &str) -> &str {
    id.rsplit_once('-').unwrap().0
}

#[tokio::test]
async fn timeout_leaves_session_usable() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let (id, _) = engine.create_session(&sh_options()).unwrap();

    let err = engine
        .execute_command(&id, "sleep 2", Some(100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { timeout_ms: 100 }));

    // The process was not killed; the next dispatch queues and succeeds
    let outcome = engine
        .execute_command(&id, "echo recovered", None)
        .await
        .unwrap();
    assert!(outcome.output.contains("recovered"));
    // The timed-out dispatch's sentinel line is scrubbed from later captures
    assert!(
        !outcome.output.contains("__SHELLMUX_DONE"),
        "output: {:?}",
        outcome.output
    );

    // Both dispatches counted
    assert_eq!(engine.metrics().commands_executed, 2);

    engine.close_session(&id).await;
}

#[tokio::test]
async fn concurrent_executes_are_serialized_per_session() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let (id, _) = engine.create_session(&sh_options()).unwrap();

    let (a, b) = tokio::join!(
        engine.execute_command(&id, "echo alpha", None),
        engine.execute_command(&id, "echo beta", None),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert!(a.output.contains("alpha"));
    assert!(!a.output.contains("beta"));
    assert!(b.output.contains("beta"));
    assert!(!b.output.contains("alpha"));

    engine.close_session(&id).await;
}

#[tokio::test]
async fn repeated_timeouts_do_not_leak_observers() {
    let dir = TempDir::new().unwrap();
    let history = Arc::new(HistoryStore::with_path(Some(dir.path().join("history"))));
    let metrics = Arc::new(MetricsCollector::new());
    let registry = SessionRegistry::new();
    let dispatcher = CommandDispatcher::new(history, metrics);

    let (id, _) = registry.create(&sh_options()).unwrap();
    let session = registry.get(&id).unwrap();

    for _ in 0..3 {
        let err = dispatcher
            .execute(Arc::clone(&session), "sleep 1", Some(20))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Timeout { .. }));
    }
    assert_eq!(session.observer_count(), 0);
    assert_eq!(session.status(), SessionStatus::Running);

    // Still dispatchable once the backlog drains
    let outcome = dispatcher
        .execute(Arc::clone(&session), "echo ok", None)
        .await
        .unwrap();
    assert!(outcome.output.contains("ok"));
    assert_eq!(session.observer_count(), 0);
}

#[tokio::test]
async fn close_session_reports_unknown_ids() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);

    assert!(!engine.close_session("shell-999").await);

    let (id, _) = engine.create_session(&sh_options()).unwrap();
    assert_eq!(engine.list_sessions().len(), 1);
    assert!(engine.close_session(&id).await);
    assert!(engine.list_sessions().is_empty());
    assert!(engine.session_info(&id).is_none());
}

#[tokio::test]
async fn unknown_session_rejects_all_calls() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);

    let err = engine
        .execute_command("shell-404", "echo hi", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));

    assert!(matches!(
        engine.write_to_session("shell-404", b"x"),
        Err(EngineError::SessionNotFound(_))
    ));
    assert!(matches!(
        engine.resize_terminal("shell-404", 100, 40),
        Err(EngineError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn spontaneous_exit_removes_session_and_notifies() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let mut exits = engine.take_exit_events().unwrap();

    let (id, _) = engine.create_session(&sh_options()).unwrap();
    engine.write_to_session(&id, b"exit\n").unwrap();

    let exit = tokio::time::timeout(Duration::from_secs(5), exits.recv())
        .await
        .expect("exit notification within 5s")
        .expect("channel open");
    assert_eq!(exit.session_id, id);
    assert!(engine.session_info(&id).is_none());
}

#[tokio::test]
async fn commands_land_in_history_before_execution() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let (id, _) = engine.create_session(&sh_options()).unwrap();

    engine.execute_command(&id, "echo hi", None).await.unwrap();
    // Recorded even when execution times out
    let _ = engine.execute_command(&id, "sleep 2", Some(50)).await;
    // Comments and blanks are not recorded (both still queue behind the
    // sleep left running above, hence the generous timeouts)
    engine
        .execute_command(&id, "# just a note", Some(5000))
        .await
        .unwrap();
    engine.execute_command(&id, "   ", Some(5000)).await.unwrap();

    let history = engine.history(10);
    assert_eq!(history, vec!["sleep 2", "echo hi"]);

    engine.clear_history();
    assert!(engine.history(10).is_empty());

    engine.close_session(&id).await;
}

#[tokio::test]
async fn trailing_background_operator_still_executes() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let (id, _) = engine.create_session(&sh_options()).unwrap();

    let marker = dir.path().join("marker");
    let outcome = engine
        .execute_command(&id, &format!("touch {} &", marker.display()), Some(2000))
        .await
        .unwrap();
    assert_eq!(outcome.command_number, 1);

    // The backgrounded touch may land just after the completion marker
    for _ in 0..50 {
        if marker.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(marker.exists(), "backgrounded command never ran");

    engine.close_session(&id).await;
}

#[tokio::test]
async fn comment_only_commands_complete_promptly() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let (id, _) = engine.create_session(&sh_options()).unwrap();

    let started = std::time::Instant::now();
    let outcome = engine
        .execute_command(&id, "# nothing to run", Some(5000))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(
        !outcome.output.contains("__SHELLMUX_DONE"),
        "output: {:?}",
        outcome.output
    );

    engine.close_session(&id).await;
}

#[tokio::test]
async fn resize_and_raw_write_reach_the_pty() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let (id, _) = engine.create_session(&sh_options()).unwrap();

    engine.resize_terminal(&id, 120, 40).unwrap();
    let info = engine.session_info(&id).unwrap();
    assert_eq!((info.cols, info.rows), (120, 40));

    engine.write_to_session(&id, b"echo raw-write\n").unwrap();
    let outcome = engine.execute_command(&id, "echo done", None).await.unwrap();
    assert!(outcome.output.contains("done"));

    engine.close_session(&id).await;
}

#[tokio::test]
async fn different_sessions_execute_in_parallel() {
    let dir = TempDir::new().unwrap();
    let engine = test_engine(&dir);
    let (a, _) = engine.create_session(&sh_options()).unwrap();
    let (b, _) = engine.create_session(&sh_options()).unwrap();

    let started = std::time::Instant::now();
    let (ra, rb) = tokio::join!(
        engine.execute_command(&a, "sleep 1; echo a-done", None),
        engine.execute_command(&b, "sleep 1; echo b-done", None),
    );
    assert!(ra.unwrap().output.contains("a-done"));
    assert!(rb.unwrap().output.contains("b-done"));
    // Serialized execution would need at least two seconds
    assert!(started.elapsed() < Duration::from_millis(1900));

    engine.close_session(&a).await;
    engine.close_session(&b).await;
}
