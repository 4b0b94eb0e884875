//! Signal delivery and process liveness checks.

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;
use warden_common::{SupervisorError, SupervisorResult};

/// Signal used to request a graceful stop, by conventional name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StopSignal {
    #[default]
    Term,
    Int,
    Quit,
    Hup,
    Usr1,
    Usr2,
    Kill,
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopSignal::Term => write!(f, "TERM"),
            StopSignal::Int => write!(f, "INT"),
            StopSignal::Quit => write!(f, "QUIT"),
            StopSignal::Hup => write!(f, "HUP"),
            StopSignal::Usr1 => write!(f, "USR1"),
            StopSignal::Usr2 => write!(f, "USR2"),
            StopSignal::Kill => write!(f, "KILL"),
        }
    }
}

impl StopSignal {
    fn to_nix(self) -> Signal {
        match self {
            StopSignal::Term => Signal::SIGTERM,
            StopSignal::Int => Signal::SIGINT,
            StopSignal::Quit => Signal::SIGQUIT,
            StopSignal::Hup => Signal::SIGHUP,
            StopSignal::Usr1 => Signal::SIGUSR1,
            StopSignal::Usr2 => Signal::SIGUSR2,
            StopSignal::Kill => Signal::SIGKILL,
        }
    }
}

/// Deliver the configured stop signal to a process.
pub fn send_signal(pid: u32, signal: StopSignal) -> SupervisorResult<()> {
    let nix_pid = Pid::from_raw(pid as i32);
    kill(nix_pid, signal.to_nix())
        .map_err(|e| SupervisorError::signal(pid.to_string(), format!("{}: {}", signal, e)))
}

/// Force kill a process with SIGKILL.
pub fn force_kill(pid: u32) -> SupervisorResult<()> {
    let nix_pid = Pid::from_raw(pid as i32);
    kill(nix_pid, Signal::SIGKILL)
        .map_err(|e| SupervisorError::signal(pid.to_string(), format!("KILL: {}", e)))
}

/// Check if a process with the given PID exists and is running.
///
/// Uses `kill(pid, 0)`, which sends no signal but checks if the process
/// exists.
///
/// # Returns
///
/// * `Ok(true)` - Process exists and is running
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - Error occurred while checking
pub fn process_exists(pid: u32) -> SupervisorResult<bool> {
    let nix_pid = Pid::from_raw(pid as i32);

    match kill(nix_pid, None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false), // No such process
        Err(nix::errno::Errno::EPERM) => Ok(true), // Process exists but we don't have permission
        Err(e) => Err(SupervisorError::signal(
            pid.to_string(),
            format!("Failed to check process: {}", e),
        )),
    }
}
