//! Worker process lifecycle against real `sh` subprocesses.

use std::time::Duration;

use lanefarm::command::TemplateCommand;
use lanefarm::config::CommandConfig;
use lanefarm::orchestrator::worker::{WorkerOutput, WorkerProcess};
use lanefarm::AppError;

use super::test_helpers::{batch, command_for, test_config, RENDER_ALL};

async fn wait_for_exit(worker: &mut WorkerProcess) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while worker.is_running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("worker should exit");
    worker.drain_output().await;
}

#[tokio::test]
async fn counts_markers_written_to_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), RENDER_ALL, 1, 100);
    let command = command_for(&config);
    let log = temp.path().join("log_00.txt");

    let mut worker = WorkerProcess::new(
        batch(0, 0, 5),
        "RENDERED:",
        WorkerOutput::open_log(&log).expect("log"),
    );
    assert_eq!(worker.completed_count(), 0, "nothing counted before start");
    assert!(!worker.is_running());

    worker.start(command.as_ref(), temp.path()).expect("start");
    wait_for_exit(&mut worker).await;

    assert_eq!(worker.completed_count(), 5);
    assert!(worker.is_successful());
    assert!(worker.exit_status().is_some_and(|s| s.success()));
    let contents = std::fs::read_to_string(&log).expect("read log");
    assert!(contents.contains("RENDERED: job-4"));
}

#[tokio::test]
async fn early_exit_is_not_success() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), r#"echo "RENDERED: $1"; exit 0"#, 1, 100);
    let command = command_for(&config);

    let mut worker = WorkerProcess::new(
        batch(0, 0, 3),
        "RENDERED:",
        WorkerOutput::open_log(&temp.path().join("log_00.txt")).expect("log"),
    );
    worker.start(command.as_ref(), temp.path()).expect("start");
    wait_for_exit(&mut worker).await;

    assert_eq!(worker.completed_count(), 1);
    assert!(!worker.is_successful(), "clean exit with partial output is a crash");
}

#[tokio::test]
async fn later_process_ignores_earlier_markers() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), RENDER_ALL, 1, 100);
    let command = command_for(&config);
    let output = WorkerOutput::open_log(&temp.path().join("log_00.txt")).expect("log");

    let mut first = WorkerProcess::new(batch(0, 0, 4), "RENDERED:", output.try_clone().expect("clone"));
    first.start(command.as_ref(), temp.path()).expect("start");
    wait_for_exit(&mut first).await;

    let mut second = WorkerProcess::new(batch(0, 1, 2), "RENDERED:", output);
    second.start(command.as_ref(), temp.path()).expect("start");
    wait_for_exit(&mut second).await;

    assert_eq!(first.completed_count(), 6, "first reads the whole shared log");
    assert_eq!(second.completed_count(), 2);
    assert!(second.is_successful());
}

#[tokio::test]
async fn terminate_kills_and_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), "exec sleep 30", 1, 100);
    let command = command_for(&config);

    let mut worker = WorkerProcess::new(
        batch(0, 0, 1),
        "RENDERED:",
        WorkerOutput::open_log(&temp.path().join("log_00.txt")).expect("log"),
    );
    worker.start(command.as_ref(), temp.path()).expect("start");
    assert!(worker.is_running());

    worker.terminate().await;
    assert!(!worker.is_running());
    assert!(worker.exit_status().is_some_and(|s| !s.success()));

    worker.terminate().await;
    assert!(!worker.is_running());
}

#[tokio::test]
async fn terminate_takes_down_background_helpers() {
    let temp = tempfile::tempdir().expect("tempdir");
    let script = r#"(sleep 0.4; echo "RENDERED: late") & wait"#;
    let config = test_config(temp.path(), script, 1, 100);
    let command = command_for(&config);
    let log = temp.path().join("log_00.txt");

    let mut worker = WorkerProcess::new(
        batch(0, 0, 1),
        "RENDERED:",
        WorkerOutput::open_log(&log).expect("log"),
    );
    worker.start(command.as_ref(), temp.path()).expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;

    worker.terminate().await;
    tokio::time::sleep(Duration::from_millis(800)).await;

    let contents = std::fs::read_to_string(&log).expect("read log");
    assert!(!contents.contains("RENDERED: late"), "helper outlived its worker");
    assert_eq!(worker.completed_count(), 0);
}

#[tokio::test]
async fn shutdown_sends_sigterm_first() {
    let temp = tempfile::tempdir().expect("tempdir");
    let script = r#"trap 'echo "RENDERED: on-term"; exit 0' TERM; while true; do sleep 0.05; done"#;
    let config = test_config(temp.path(), script, 1, 100);
    let command = command_for(&config);

    let mut worker = WorkerProcess::new(
        batch(0, 0, 1),
        "RENDERED:",
        WorkerOutput::open_log(&temp.path().join("log_00.txt")).expect("log"),
    );
    worker.start(command.as_ref(), temp.path()).expect("start");
    tokio::time::sleep(Duration::from_millis(200)).await;

    worker.shutdown(Duration::from_secs(5)).await;

    assert!(!worker.is_running());
    assert_eq!(worker.completed_count(), 1, "trap handler ran before exit");
}

#[tokio::test]
async fn console_mode_counts_tailed_output() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = test_config(temp.path(), RENDER_ALL, 1, 100);
    let command = command_for(&config);

    let mut worker = WorkerProcess::new(batch(0, 0, 3), "RENDERED:", WorkerOutput::Console);
    worker.start(command.as_ref(), temp.path()).expect("start");
    wait_for_exit(&mut worker).await;

    assert_eq!(worker.completed_count(), 3);
    assert!(worker.is_successful());
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let command = TemplateCommand::new(CommandConfig {
        program: "/nonexistent/lanefarm-renderer".into(),
        args: Vec::new(),
        env: std::collections::HashMap::new(),
        working_dir: None,
    });

    let mut worker = WorkerProcess::new(
        batch(0, 0, 1),
        "RENDERED:",
        WorkerOutput::open_log(&temp.path().join("log_00.txt")).expect("log"),
    );
    let err = worker.start(&command, temp.path()).expect_err("spawn must fail");

    assert!(matches!(err, AppError::Spawn(_)));
    assert!(!worker.has_started());
    assert_eq!(worker.completed_count(), 0);
}
