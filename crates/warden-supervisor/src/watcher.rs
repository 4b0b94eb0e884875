//! Per-instance watcher tasks.
//!
//! Every instance is owned by exactly one watcher task. The watcher holds the
//! `Child`, the state machine, and the failure counter; nothing else mutates
//! them. Status flows out through a `watch` channel so reads never block, and
//! stop requests flow in through a bounded command channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_common::{SupervisorError, SupervisorResult};
use warden_logsink::{spawn_pump, RotatingLogSink, StreamType};
use warden_process::{force_kill, send_signal};
use warden_state::{ProcessState, ProcessStateMachine};

use crate::spec::{LogSpec, ProcessSpec};

const COMMAND_QUEUE_LIMIT: usize = 8;

/// Point-in-time view of one instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatus {
    pub instance_id: String,
    pub program: String,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_exit_code: Option<i32>,
}

/// Outcome of a stop request.
#[derive(Debug, Clone, Copy)]
pub struct StopReport {
    /// True when the graceful window elapsed and SIGKILL was used
    pub forced: bool,
}

pub(crate) enum WatcherCommand {
    Stop { resp: oneshot::Sender<StopReport> },
}

pub(crate) struct InstanceHandle {
    pub(crate) program: String,
    pub(crate) cmd_tx: mpsc::Sender<WatcherCommand>,
    pub(crate) status_rx: watch::Receiver<InstanceStatus>,
    #[allow(dead_code)]
    pub(crate) task: JoinHandle<()>,
}

/// Spawn the watcher task for the instance at `index`.
pub(crate) fn spawn_watcher(
    instance_id: String,
    index: u32,
    spec: Arc<ProcessSpec>,
) -> InstanceHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_LIMIT);
    let initial = InstanceStatus {
        instance_id: instance_id.clone(),
        program: spec.program.clone(),
        state: ProcessState::Stopped,
        pid: None,
        started_at: None,
        consecutive_failures: 0,
        last_exit_code: None,
    };
    let (status_tx, status_rx) = watch::channel(initial);
    let program = spec.program.clone();

    // Per-instance log paths keep each sink the sole owner of its file and
    // backup chain when numprocs > 1.
    let stdout_log = spec
        .stdout_log
        .as_ref()
        .map(|l| l.for_instance(index, spec.num_procs));
    let stderr_log = spec
        .stderr_log
        .as_ref()
        .map(|l| l.for_instance(index, spec.num_procs));

    let watcher = Watcher {
        machine: ProcessStateMachine::new(&instance_id),
        instance_id,
        spec,
        stdout_log,
        stderr_log,
        status_tx,
        cmd_rx,
        pump_cancel: CancellationToken::new(),
    };
    let task = tokio::spawn(watcher.run());

    InstanceHandle {
        program,
        cmd_tx,
        status_rx,
        task,
    }
}

struct Watcher {
    instance_id: String,
    spec: Arc<ProcessSpec>,
    stdout_log: Option<LogSpec>,
    stderr_log: Option<LogSpec>,
    machine: ProcessStateMachine,
    status_tx: watch::Sender<InstanceStatus>,
    cmd_rx: mpsc::Receiver<WatcherCommand>,
    pump_cancel: CancellationToken,
}

impl Watcher {
    async fn run(mut self) {
        self.supervise().await;

        // Terminal: keep answering stop requests as no-ops until the
        // supervisor drops our handle.
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                WatcherCommand::Stop { resp } => {
                    let _ = resp.send(StopReport { forced: false });
                }
            }
        }
        self.pump_cancel.cancel();
    }

    /// Lifecycle loop: Starting -> Running -> (restart | Exited | Fatal).
    async fn supervise(&mut self) {
        let mut consecutive_failures: u32 = 0;

        loop {
            let reason = if consecutive_failures == 0 {
                "launch requested".to_string()
            } else {
                format!(
                    "retry {} of {}",
                    consecutive_failures, self.spec.start_retries
                )
            };
            self.transition(|m| m.transition_to_starting(reason));

            let mut child = match self.launch() {
                Ok(child) => child,
                Err(e) => {
                    warn!(instance = %self.instance_id, error = %e, "launch failed");
                    consecutive_failures += 1;
                    self.status_tx
                        .send_modify(|s| s.consecutive_failures = consecutive_failures);
                    if consecutive_failures >= self.spec.start_retries || !self.spec.autorestart {
                        self.enter_fatal(consecutive_failures);
                        return;
                    }
                    continue;
                }
            };

            let pid = child.id();
            let started_at = Utc::now();
            self.status_tx.send_modify(|s| {
                s.pid = pid;
                s.started_at = Some(started_at);
            });
            info!(instance = %self.instance_id, pid = ?pid, "child launched");

            // Startup probation: the launch only counts once the child has
            // stayed up for start_seconds.
            let probation = tokio::time::sleep(self.spec.start_seconds);
            tokio::pin!(probation);

            tokio::select! {
                _ = &mut probation => {}
                status = child.wait() => {
                    let exit_code = exit_code_of(&status);
                    warn!(
                        instance = %self.instance_id,
                        exit_code = ?exit_code,
                        "child exited during startup probation"
                    );
                    consecutive_failures += 1;
                    self.status_tx.send_modify(|s| {
                        s.pid = None;
                        s.started_at = None;
                        s.last_exit_code = exit_code;
                        s.consecutive_failures = consecutive_failures;
                    });
                    // Relaunching only makes sense when restarts are wanted
                    // at all; without autorestart the first failed launch
                    // is final.
                    if consecutive_failures >= self.spec.start_retries || !self.spec.autorestart {
                        self.enter_fatal(consecutive_failures);
                        return;
                    }
                    continue;
                }
                cmd = self.cmd_rx.recv() => {
                    // Stop during startup cancels it
                    self.handle_stop(cmd, &mut child).await;
                    return;
                }
            }

            // Survived probation
            consecutive_failures = 0;
            self.transition(|m| m.transition_to_running());
            self.status_tx.send_modify(|s| s.consecutive_failures = 0);
            info!(instance = %self.instance_id, "running");

            tokio::select! {
                status = child.wait() => {
                    let exit_code = exit_code_of(&status);
                    warn!(
                        instance = %self.instance_id,
                        exit_code = ?exit_code,
                        error = %SupervisorError::unexpected_exit(&self.instance_id, exit_code),
                        "unexpected exit"
                    );
                    self.transition(|m| {
                        m.transition_to_exited(format!("unexpected exit (code {:?})", exit_code))
                    });
                    self.status_tx.send_modify(|s| {
                        s.pid = None;
                        s.last_exit_code = exit_code;
                    });
                    if self.spec.autorestart {
                        continue;
                    }
                    return;
                }
                cmd = self.cmd_rx.recv() => {
                    self.handle_stop(cmd, &mut child).await;
                    return;
                }
            }
        }
    }

    /// Open sinks, spawn the child with piped streams, wire the pumps.
    fn launch(&self) -> SupervisorResult<Child> {
        // Sinks are opened before spawning so a bad log path fails the
        // launch instead of leaking a running child.
        let stdout_sink = self.open_sink(self.stdout_log.as_ref())?;
        let stderr_sink = self.open_sink(self.stderr_log.as_ref())?;

        let mut command = Command::new(&self.spec.command);
        command.args(&self.spec.args);
        if let Some(dir) = &self.spec.working_directory {
            command.current_dir(dir);
        }
        command.stdin(Stdio::null());
        command.stdout(if stdout_sink.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stderr(if stderr_sink.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::launch(&self.instance_id, e.to_string()))?;

        if let Some(sink) = stdout_sink {
            if let Some(stdout) = child.stdout.take() {
                spawn_pump(
                    stdout,
                    sink,
                    self.instance_id.clone(),
                    StreamType::Stdout,
                    self.pump_cancel.child_token(),
                );
            }
        }
        if let Some(sink) = stderr_sink {
            if let Some(stderr) = child.stderr.take() {
                spawn_pump(
                    stderr,
                    sink,
                    self.instance_id.clone(),
                    StreamType::Stderr,
                    self.pump_cancel.child_token(),
                );
            }
        }

        Ok(child)
    }

    fn open_sink(&self, log_spec: Option<&LogSpec>) -> SupervisorResult<Option<RotatingLogSink>> {
        match log_spec {
            Some(spec) => Ok(Some(RotatingLogSink::open(
                &spec.path,
                spec.max_bytes,
                spec.backups,
            )?)),
            None => Ok(None),
        }
    }

    async fn handle_stop(&mut self, cmd: Option<WatcherCommand>, child: &mut Child) {
        let resp = match cmd {
            Some(WatcherCommand::Stop { resp }) => Some(resp),
            None => {
                debug!(instance = %self.instance_id, "command channel closed, shutting down child");
                None
            }
        };

        let report = self.shutdown_child(child).await;
        if let Some(resp) = resp {
            let _ = resp.send(report);
        }
    }

    /// Stop sequence: stop signal, bounded graceful wait, SIGKILL, reap.
    async fn shutdown_child(&mut self, child: &mut Child) -> StopReport {
        self.transition(|m| m.transition_to_stopping());

        let mut forced = false;
        let mut exit_code = None;

        if let Some(pid) = child.id() {
            if let Err(e) = send_signal(pid, self.spec.stop_signal) {
                // Child may have exited just before the signal
                debug!(instance = %self.instance_id, error = %e, "stop signal delivery failed");
            }

            match tokio::time::timeout(self.spec.stop_wait, child.wait()).await {
                Ok(status) => {
                    exit_code = exit_code_of(&status);
                }
                Err(_) => {
                    warn!(
                        instance = %self.instance_id,
                        error = %SupervisorError::shutdown_timeout(&self.instance_id, self.spec.stop_wait),
                        "graceful window elapsed, force-killing"
                    );
                    if let Err(e) = force_kill(pid) {
                        warn!(instance = %self.instance_id, error = %e, "force kill failed");
                    }
                    forced = true;
                    let status = child.wait().await;
                    exit_code = exit_code_of(&status);
                }
            }
        } else {
            // Already exited, just reap
            let status = child.wait().await;
            exit_code = exit_code_of(&status);
        }

        self.transition(|m| {
            m.transition_to_exited(if forced {
                "force-killed after graceful window"
            } else {
                "stopped gracefully"
            })
        });
        self.status_tx.send_modify(|s| {
            s.pid = None;
            s.last_exit_code = exit_code;
        });
        info!(instance = %self.instance_id, forced, "instance stopped");

        StopReport { forced }
    }

    fn enter_fatal(&mut self, failures: u32) {
        self.transition(|m| m.transition_to_fatal(format!("startup failed {} times", failures)));
        self.status_tx.send_modify(|s| {
            s.pid = None;
            s.started_at = None;
        });
        error!(
            instance = %self.instance_id,
            failures,
            "startup retry budget exhausted, giving up"
        );
    }

    /// Apply a state machine transition and publish the resulting state.
    /// Transition rejections indicate a watcher bug; they are logged, never
    /// propagated, so the supervisor itself cannot crash on them.
    fn transition<F>(&mut self, f: F)
    where
        F: FnOnce(&mut ProcessStateMachine) -> SupervisorResult<()>,
    {
        if let Err(e) = f(&mut self.machine) {
            error!(instance = %self.instance_id, error = %e, "state transition rejected");
        }
        let state = self.machine.current_state();
        self.status_tx.send_modify(|s| s.state = state);
    }
}

fn exit_code_of(status: &std::io::Result<std::process::ExitStatus>) -> Option<i32> {
    match status {
        Ok(s) => s.code(),
        Err(_) => None,
    }
}
