//! # Warden Process
//!
//! OS-level process primitives used by the supervisor:
//! - signal delivery (configurable stop signal, force kill)
//! - non-destructive liveness checks
//! - validation of program paths and names

pub mod signal;
pub mod validation;

pub use signal::{force_kill, process_exists, send_signal, StopSignal};
pub use validation::{validate_program, validate_program_name};
