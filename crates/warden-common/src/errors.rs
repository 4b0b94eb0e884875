//! Error types for the warden supervisor.

use std::time::Duration;
use thiserror::Error;

/// Supervision error taxonomy.
///
/// Errors are observable outcomes, never crashes: an instance that exhausts
/// its retry budget lands in a FATAL state that callers can inspect, and the
/// supervisor itself keeps running.
#[derive(Error, Debug, Clone)]
pub enum SupervisorError {
    #[error("Instance not found: {id}")]
    NotFound { id: String },

    #[error("Program already registered: {id}")]
    AlreadyExists { id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Launch failed for {id}: {reason}")]
    Launch { id: String, reason: String },

    #[error("Unexpected exit for {id} (exit code {exit_code:?})")]
    UnexpectedExit { id: String, exit_code: Option<i32> },

    #[error("Shutdown of {id} exceeded graceful window of {wait:?}, force-killed")]
    ShutdownTimeout { id: String, wait: Duration },

    #[error("Operation {operation} not allowed for {id} in state {state}")]
    InvalidState {
        id: String,
        operation: String,
        state: String,
    },

    #[error("Timed out waiting for {operation} on {id}")]
    Timeout { id: String, operation: String },

    #[error("Log capture error for {id}: {reason}")]
    Logging { id: String, reason: String },

    #[error("Signal delivery failed for {id}: {reason}")]
    Signal { id: String, reason: String },

    #[error("Watcher channel closed for {id} during {operation}")]
    ChannelClosed { id: String, operation: String },
}

impl SupervisorError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists { id: id.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn launch(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Launch {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn unexpected_exit(id: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::UnexpectedExit {
            id: id.into(),
            exit_code,
        }
    }

    pub fn shutdown_timeout(id: impl Into<String>, wait: Duration) -> Self {
        Self::ShutdownTimeout {
            id: id.into(),
            wait,
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        operation: impl Into<String>,
        state: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            operation: operation.into(),
            state: state.into(),
        }
    }

    pub fn timeout(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            id: id.into(),
            operation: operation.into(),
        }
    }

    pub fn logging(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Logging {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn signal(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Signal {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn channel_closed(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::ChannelClosed {
            id: id.into(),
            operation: operation.into(),
        }
    }
}

/// Result type for supervision operations.
pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
