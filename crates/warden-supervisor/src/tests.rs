//! Lifecycle tests driving real child processes through `/bin/sh`.

use crate::spec::{LogSpec, ProcessSpec};
use crate::supervisor::Supervisor;
use std::time::Duration;
use tokio::time::Instant;
use warden_common::SupervisorError;
use warden_state::ProcessState;

const STOP_WAIT: Duration = Duration::from_secs(5);

/// Spec running a shell script with fast probation for tests.
fn shell_spec(name: &str, script: &str) -> ProcessSpec {
    let mut spec = ProcessSpec::new(name, "/bin/sh");
    spec.args = vec!["-c".to_string(), script.to_string()];
    spec.start_seconds = Duration::from_millis(100);
    spec.start_retries = 3;
    spec.stop_wait = STOP_WAIT;
    spec
}

async fn wait_for_state(
    supervisor: &Supervisor,
    instance_id: &str,
    expected: ProcessState,
    timeout: Duration,
) {
    let deadline = Instant::now() + timeout;
    loop {
        let current = supervisor
            .status(instance_id)
            .expect("instance should exist")
            .state;
        if current == expected {
            return;
        }
        if Instant::now() >= deadline {
            panic!(
                "instance {} did not reach {} within {:?} (currently {})",
                instance_id, expected, timeout, current
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_instance_reaches_running() {
    let mut supervisor = Supervisor::new();
    let ids = supervisor
        .start(shell_spec("runner", "sleep 30"))
        .unwrap();
    assert_eq!(ids, vec!["runner-0"]);

    wait_for_state(&supervisor, "runner-0", ProcessState::Running, Duration::from_secs(2)).await;

    let status = supervisor.status("runner-0").unwrap();
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.pid.is_some());
    assert!(status.started_at.is_some());

    supervisor.shutdown(STOP_WAIT).await;
}

#[tokio::test]
async fn test_fatal_after_exhausting_start_retries() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("crasher", "exit 1");
    spec.start_seconds = Duration::from_millis(500);
    spec.start_retries = 3;
    supervisor.start(spec).unwrap();

    wait_for_state(&supervisor, "crasher-0", ProcessState::Fatal, Duration::from_secs(5)).await;

    let status = supervisor.status("crasher-0").unwrap();
    assert_eq!(status.consecutive_failures, 3);
    assert_eq!(status.pid, None);
    assert_eq!(status.started_at, None);
    assert_eq!(status.last_exit_code, Some(1));
}

#[tokio::test]
async fn test_early_exit_without_autorestart_is_fatal_at_once() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("brittle", "exit 1");
    spec.start_seconds = Duration::from_millis(500);
    spec.start_retries = 3;
    spec.autorestart = false;
    supervisor.start(spec).unwrap();

    wait_for_state(&supervisor, "brittle-0", ProcessState::Fatal, Duration::from_secs(5)).await;

    // No retries without autorestart: the first early exit is final
    let status = supervisor.status("brittle-0").unwrap();
    assert_eq!(status.consecutive_failures, 1);
    assert_eq!(status.pid, None);
    assert_eq!(status.started_at, None);
}

#[tokio::test]
async fn test_launch_failure_counts_toward_fatal() {
    let mut supervisor = Supervisor::new();
    // Passes submission validation (relative name), fails at spawn
    let mut spec = ProcessSpec::new("ghost", "definitely-not-a-real-binary-xyz");
    spec.start_retries = 2;
    supervisor.start(spec).unwrap();

    wait_for_state(&supervisor, "ghost-0", ProcessState::Fatal, Duration::from_secs(5)).await;
    assert_eq!(
        supervisor.status("ghost-0").unwrap().consecutive_failures,
        2
    );
}

#[tokio::test]
async fn test_graceful_stop_reports_unforced() {
    let mut supervisor = Supervisor::new();
    supervisor
        .start(shell_spec("stopper", "sleep 30"))
        .unwrap();
    wait_for_state(&supervisor, "stopper-0", ProcessState::Running, Duration::from_secs(2)).await;

    let report = supervisor.stop("stopper-0", STOP_WAIT).await.unwrap();
    assert!(!report.forced);

    let status = supervisor.status("stopper-0").unwrap();
    assert_eq!(status.state, ProcessState::Exited);
    assert_eq!(status.pid, None);
}

#[tokio::test]
async fn test_force_kill_after_graceful_window() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("stubborn", "trap '' TERM; sleep 30");
    spec.stop_wait = Duration::from_millis(300);
    supervisor.start(spec).unwrap();
    wait_for_state(&supervisor, "stubborn-0", ProcessState::Running, Duration::from_secs(2)).await;

    let report = supervisor.stop("stubborn-0", STOP_WAIT).await.unwrap();
    assert!(report.forced);
    assert_eq!(
        supervisor.status("stubborn-0").unwrap().state,
        ProcessState::Exited
    );
}

#[tokio::test]
async fn test_caller_timeout_leaves_shutdown_running() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("slowstop", "trap '' TERM; sleep 30");
    spec.stop_wait = Duration::from_secs(1);
    supervisor.start(spec).unwrap();
    wait_for_state(&supervisor, "slowstop-0", ProcessState::Running, Duration::from_secs(2)).await;

    // Caller gives up after 50ms; the watcher keeps stopping on its own
    let result = supervisor.stop("slowstop-0", Duration::from_millis(50)).await;
    assert!(matches!(result, Err(SupervisorError::Timeout { .. })));

    wait_for_state(&supervisor, "slowstop-0", ProcessState::Exited, Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_explicit_stop_does_not_restart() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("oneshot", "sleep 30");
    spec.autorestart = true;
    supervisor.start(spec).unwrap();
    wait_for_state(&supervisor, "oneshot-0", ProcessState::Running, Duration::from_secs(2)).await;

    supervisor.stop("oneshot-0", STOP_WAIT).await.unwrap();
    assert_eq!(
        supervisor.status("oneshot-0").unwrap().state,
        ProcessState::Exited
    );

    // Despite autorestart, an explicit stop stays stopped
    tokio::time::sleep(Duration::from_millis(500)).await;
    let status = supervisor.status("oneshot-0").unwrap();
    assert_eq!(status.state, ProcessState::Exited);
    assert_eq!(status.pid, None);
}

#[tokio::test]
async fn test_autorestart_after_unexpected_exit() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("flaky", "sleep 0.3");
    spec.start_seconds = Duration::from_millis(50);
    spec.autorestart = true;
    supervisor.start(spec).unwrap();
    wait_for_state(&supervisor, "flaky-0", ProcessState::Running, Duration::from_secs(2)).await;

    let first_start = supervisor.status("flaky-0").unwrap().started_at;

    // After the child exits at ~300ms, a fresh launch must reach Running
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = supervisor.status("flaky-0").unwrap();
        if status.state == ProcessState::Running && status.started_at != first_start {
            break;
        }
        if Instant::now() >= deadline {
            panic!("instance was not relaunched after unexpected exit");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    supervisor.shutdown(STOP_WAIT).await;
}

#[tokio::test]
async fn test_no_restart_when_autorestart_disabled() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("fleeting", "sleep 0.3");
    spec.start_seconds = Duration::from_millis(50);
    spec.autorestart = false;
    supervisor.start(spec).unwrap();

    wait_for_state(&supervisor, "fleeting-0", ProcessState::Running, Duration::from_secs(2)).await;
    wait_for_state(&supervisor, "fleeting-0", ProcessState::Exited, Duration::from_secs(2)).await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        supervisor.status("fleeting-0").unwrap().state,
        ProcessState::Exited
    );
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let mut supervisor = Supervisor::new();
    let spec = shell_spec("steady", "sleep 30");
    let first = supervisor.start(spec.clone()).unwrap();
    wait_for_state(&supervisor, "steady-0", ProcessState::Running, Duration::from_secs(2)).await;

    let second = supervisor.start(spec).unwrap();
    assert_eq!(first, second);
    assert_eq!(supervisor.instance_ids().len(), 1);

    supervisor.shutdown(STOP_WAIT).await;
}

#[tokio::test]
async fn test_numprocs_launches_each_instance() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("pool", "sleep 30");
    spec.num_procs = 2;
    let ids = supervisor.start(spec).unwrap();
    assert_eq!(ids, vec!["pool-0", "pool-1"]);

    for id in &ids {
        wait_for_state(&supervisor, id, ProcessState::Running, Duration::from_secs(2)).await;
    }

    supervisor.shutdown(STOP_WAIT).await;
}

#[tokio::test]
async fn test_stop_unknown_instance() {
    let supervisor = Supervisor::new();
    let result = supervisor.stop("nobody-0", STOP_WAIT).await;
    assert!(matches!(result, Err(SupervisorError::NotFound { .. })));
}

#[tokio::test]
async fn test_stop_terminal_instance_is_noop() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("done", "sleep 0.2");
    spec.start_seconds = Duration::from_millis(50);
    spec.autorestart = false;
    supervisor.start(spec).unwrap();
    wait_for_state(&supervisor, "done-0", ProcessState::Exited, Duration::from_secs(2)).await;

    let report = supervisor.stop("done-0", STOP_WAIT).await.unwrap();
    assert!(!report.forced);
}

#[tokio::test]
async fn test_invalid_spec_rejected_at_submission() {
    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("broken", "sleep 30");
    spec.num_procs = 0;
    let result = supervisor.start(spec);
    assert!(matches!(result, Err(SupervisorError::Config { .. })));
    assert!(supervisor.instance_ids().is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_everything() {
    let mut supervisor = Supervisor::new();
    supervisor.start(shell_spec("alpha", "sleep 30")).unwrap();
    supervisor.start(shell_spec("beta", "sleep 30")).unwrap();
    wait_for_state(&supervisor, "alpha-0", ProcessState::Running, Duration::from_secs(2)).await;
    wait_for_state(&supervisor, "beta-0", ProcessState::Running, Duration::from_secs(2)).await;

    supervisor.shutdown(STOP_WAIT).await;
    assert!(supervisor.instance_ids().is_empty());
}

#[tokio::test]
async fn test_stdout_captured_to_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("echoer.log");

    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("echoer", "echo hello; sleep 30");
    spec.stdout_log = Some(LogSpec::new(&log_path));
    supervisor.start(spec).unwrap();
    wait_for_state(&supervisor, "echoer-0", ProcessState::Running, Duration::from_secs(2)).await;

    supervisor.stop("echoer-0", STOP_WAIT).await.unwrap();

    // The pump flushes once the child's pipe reaches EOF
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let content = std::fs::read(&log_path).unwrap_or_default();
        if content == b"hello\n" {
            break;
        }
        if Instant::now() >= deadline {
            panic!(
                "captured log never contained expected output (got {:?})",
                String::from_utf8_lossy(&content)
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_numprocs_instances_log_to_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("pool.log");

    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("pool", "echo hello; sleep 30");
    spec.num_procs = 2;
    spec.stdout_log = Some(LogSpec::new(&log_path));
    supervisor.start(spec).unwrap();
    for id in ["pool-0", "pool-1"] {
        wait_for_state(&supervisor, id, ProcessState::Running, Duration::from_secs(2)).await;
    }

    supervisor.shutdown(STOP_WAIT).await;

    // Each instance owns its own file; nothing writes the shared path
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let first = std::fs::read(dir.path().join("pool-0.log")).unwrap_or_default();
        let second = std::fs::read(dir.path().join("pool-1.log")).unwrap_or_default();
        if first == b"hello\n" && second == b"hello\n" {
            break;
        }
        if Instant::now() >= deadline {
            panic!("per-instance logs never contained expected output");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!log_path.exists());
}

#[tokio::test]
async fn test_status_reflects_failure_accounting_before_success() {
    // First two launches die instantly, the third (via a marker file)
    // survives probation; failures must reset to zero.
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("attempts");
    let script = format!(
        "echo x >> {m}; if [ $(wc -l < {m}) -ge 3 ]; then sleep 30; else exit 1; fi",
        m = marker.display()
    );

    let mut supervisor = Supervisor::new();
    let mut spec = shell_spec("wobbly", &script);
    spec.start_seconds = Duration::from_millis(150);
    spec.start_retries = 5;
    supervisor.start(spec).unwrap();

    wait_for_state(&supervisor, "wobbly-0", ProcessState::Running, Duration::from_secs(5)).await;
    assert_eq!(
        supervisor.status("wobbly-0").unwrap().consecutive_failures,
        0
    );

    supervisor.shutdown(STOP_WAIT).await;
}
