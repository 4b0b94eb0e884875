//! The supervisor: owns one handle per instance and routes requests to the
//! watcher tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use warden_common::{SupervisorError, SupervisorResult};

use crate::config::SupervisorConfig;
use crate::spec::ProcessSpec;
use crate::watcher::{spawn_watcher, InstanceHandle, InstanceStatus, StopReport, WatcherCommand};

/// Owns the full set of supervised instances.
///
/// All per-instance state lives in the watcher tasks; the supervisor only
/// holds command senders and status receivers, so `status` never blocks and
/// a stuck instance cannot stall requests aimed at another.
pub struct Supervisor {
    instances: HashMap<String, InstanceHandle>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Launch `num_procs` instances of the program described by `spec`.
    ///
    /// Idempotent: if any instance of the same program is still active this
    /// is a no-op returning the existing instance ids. A program whose
    /// instances have all reached a terminal state is relaunched fresh.
    pub fn start(&mut self, spec: ProcessSpec) -> SupervisorResult<Vec<String>> {
        spec.validate()?;

        let existing: Vec<String> = self
            .instances
            .iter()
            .filter(|(_, handle)| handle.program == spec.program)
            .map(|(id, _)| id.clone())
            .collect();
        if !existing.is_empty() {
            let any_active = existing
                .iter()
                .any(|id| self.instances[id].status_rx.borrow().state.is_active());
            if any_active {
                debug!(program = %spec.program, "start ignored, program already running");
                let mut ids = existing;
                ids.sort();
                return Ok(ids);
            }
            // All terminal: drop the old handles and relaunch
            for id in &existing {
                self.instances.remove(id);
            }
        }

        let program = spec.program.clone();
        let spec = Arc::new(spec);
        let mut ids = Vec::with_capacity(spec.num_procs as usize);
        for index in 0..spec.num_procs {
            let instance_id = spec.instance_id(index);
            let handle = spawn_watcher(instance_id.clone(), index, Arc::clone(&spec));
            self.instances.insert(instance_id.clone(), handle);
            ids.push(instance_id);
        }

        info!(program = %program, instances = ids.len(), "program started");
        Ok(ids)
    }

    /// Stop one instance, blocking the caller for at most `wait`.
    ///
    /// The graceful window itself is the spec's `stop_wait`; `wait` only
    /// bounds how long this caller blocks. If `wait` elapses first the
    /// shutdown keeps going in the watcher and `Timeout` is returned.
    pub async fn stop(&self, instance_id: &str, wait: Duration) -> SupervisorResult<StopReport> {
        let handle = self
            .instances
            .get(instance_id)
            .ok_or_else(|| SupervisorError::not_found(instance_id))?;

        let (tx, rx) = oneshot::channel();
        handle
            .cmd_tx
            .send(WatcherCommand::Stop { resp: tx })
            .await
            .map_err(|_| SupervisorError::channel_closed(instance_id, "stop"))?;

        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(_)) => Err(SupervisorError::channel_closed(instance_id, "stop")),
            Err(_) => Err(SupervisorError::timeout(instance_id, "stop")),
        }
    }

    /// Non-blocking status snapshot for one instance.
    pub fn status(&self, instance_id: &str) -> SupervisorResult<InstanceStatus> {
        let handle = self
            .instances
            .get(instance_id)
            .ok_or_else(|| SupervisorError::not_found(instance_id))?;
        Ok(handle.status_rx.borrow().clone())
    }

    /// Snapshots for every instance, ordered by instance id.
    pub fn statuses(&self) -> Vec<InstanceStatus> {
        let mut all: Vec<InstanceStatus> = self
            .instances
            .values()
            .map(|handle| handle.status_rx.borrow().clone())
            .collect();
        all.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
        all
    }

    pub fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Launch every autostart program from the config, in ascending priority
    /// order. Non-autostart programs can be submitted later via [`start`].
    ///
    /// [`start`]: Supervisor::start
    pub fn start_from_config(&mut self, config: &SupervisorConfig) -> SupervisorResult<Vec<String>> {
        config.validate()?;

        let mut started = Vec::new();
        for program in config.programs_by_priority() {
            let spec = program.to_spec()?;
            if !spec.autostart {
                debug!(program = %spec.program, "autostart disabled, skipping");
                continue;
            }
            started.extend(self.start(spec)?);
        }
        Ok(started)
    }

    /// Stop every active instance, bounding the total wait. Stops run
    /// concurrently inside the watchers; this only collects the reports.
    pub async fn shutdown(&mut self, wait: Duration) {
        let deadline = tokio::time::Instant::now() + wait;

        let mut pending = Vec::new();
        for (id, handle) in &self.instances {
            if !handle.status_rx.borrow().state.is_active() {
                continue;
            }
            let (tx, rx) = oneshot::channel();
            if handle
                .cmd_tx
                .send(WatcherCommand::Stop { resp: tx })
                .await
                .is_ok()
            {
                pending.push((id.clone(), rx));
            }
        }

        for (id, rx) in pending {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, rx).await {
                Ok(Ok(report)) => {
                    info!(instance = %id, forced = report.forced, "instance stopped")
                }
                Ok(Err(_)) => warn!(instance = %id, "watcher went away during shutdown"),
                Err(_) => warn!(instance = %id, "shutdown wait elapsed before instance stopped"),
            }
        }

        self.instances.clear();
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
