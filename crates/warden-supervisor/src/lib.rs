//! # Warden Supervisor
//!
//! Supervision core: a declarative [`ProcessSpec`] describes how to launch N
//! identical instances of a program; the [`Supervisor`] owns their lifecycle
//! through per-instance watcher tasks, including startup probation, bounded
//! restart with failure accounting, graceful stop with force-kill escalation,
//! and rotating capture of child output.

pub mod config;
pub mod spec;
pub mod supervisor;
pub mod watcher;

pub use config::{ProgramConfig, SupervisorConfig, SupervisorOptions};
pub use spec::{LogSpec, ProcessSpec};
pub use supervisor::Supervisor;
pub use watcher::{InstanceStatus, StopReport};

#[cfg(test)]
mod tests;
