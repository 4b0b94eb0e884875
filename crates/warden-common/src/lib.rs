//! # Warden Common
//!
//! Shared error taxonomy for the warden supervisor.
//!
//! Every library crate in the workspace returns [`SupervisorError`]; the
//! binary wraps these with `anyhow` context at the edge.

pub mod errors;

pub use errors::{SupervisorError, SupervisorResult};
