//! Declarative launch specification for a supervised program.

use std::path::PathBuf;
use std::time::Duration;
use warden_common::{SupervisorError, SupervisorResult};
use warden_process::{validate_program, validate_program_name, StopSignal};

pub const DEFAULT_START_SECONDS: Duration = Duration::from_secs(1);
pub const DEFAULT_START_RETRIES: u32 = 3;
pub const DEFAULT_STOP_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_PRIORITY: i32 = 999;
pub const DEFAULT_LOG_MAX_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_LOG_BACKUPS: u32 = 10;

/// Rotation settings for one captured stream.
#[derive(Debug, Clone)]
pub struct LogSpec {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub backups: u32,
}

impl LogSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_bytes: DEFAULT_LOG_MAX_BYTES,
            backups: DEFAULT_LOG_BACKUPS,
        }
    }

    /// Settings for the instance at `index`. With more than one instance per
    /// program the file name gets the instance index, so each sink keeps
    /// sole ownership of its current file and backup chain.
    pub fn for_instance(&self, index: u32, num_procs: u32) -> LogSpec {
        if num_procs <= 1 {
            return self.clone();
        }
        let mut per_instance = self.clone();
        per_instance.path = indexed_path(&self.path, index);
        per_instance
    }
}

/// `worker.log` -> `worker-2.log`; extension-less paths get a plain suffix.
fn indexed_path(path: &std::path::Path, index: u32) -> PathBuf {
    let mut name = path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    name.push(format!("-{}", index));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Immutable description of how to launch and supervise N identical
/// instances of one program.
///
/// `umask` and `run_as_user` are carried for config fidelity but are not
/// applied at spawn; privilege dropping is out of scope.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub command: String,
    pub args: Vec<String>,
    pub num_procs: u32,
    pub working_directory: Option<PathBuf>,
    pub umask: Option<u32>,
    pub run_as_user: Option<String>,
    pub priority: i32,
    pub autostart: bool,
    pub autorestart: bool,
    /// Uptime required before a launch counts as RUNNING
    pub start_seconds: Duration,
    /// Consecutive failed launches tolerated before FATAL
    pub start_retries: u32,
    pub stop_signal: StopSignal,
    /// Graceful window between the stop signal and SIGKILL
    pub stop_wait: Duration,
    pub stdout_log: Option<LogSpec>,
    pub stderr_log: Option<LogSpec>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            command: command.into(),
            args: Vec::new(),
            num_procs: 1,
            working_directory: None,
            umask: None,
            run_as_user: None,
            priority: DEFAULT_PRIORITY,
            autostart: true,
            autorestart: true,
            start_seconds: DEFAULT_START_SECONDS,
            start_retries: DEFAULT_START_RETRIES,
            stop_signal: StopSignal::default(),
            stop_wait: DEFAULT_STOP_WAIT,
            stdout_log: None,
            stderr_log: None,
        }
    }

    /// Instance id for the given zero-based index.
    pub fn instance_id(&self, index: u32) -> String {
        format!("{}-{}", self.program, index)
    }

    pub fn validate(&self) -> SupervisorResult<()> {
        validate_program_name(&self.program)?;
        validate_program(&self.command)?;

        if self.num_procs == 0 {
            return Err(SupervisorError::config(format!(
                "numprocs must be at least 1 for program '{}'",
                self.program
            )));
        }

        Ok(())
    }
}
