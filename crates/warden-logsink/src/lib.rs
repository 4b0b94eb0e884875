//! # Warden Logsink
//!
//! Size-bounded rotating log files for captured child process output.
//!
//! A [`RotatingLogSink`] owns one current file plus numbered backups
//! (`worker.log`, `worker.log.1` ... `worker.log.N`, `.1` newest). Each
//! captured stream gets its own pump task owning its own sink, so writes are
//! serialized by ownership rather than locking.

pub mod pump;
pub mod sink;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use pump::spawn_pump;
pub use sink::RotatingLogSink;

/// Stream type (stdout or stderr)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}
