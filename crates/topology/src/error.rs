//! Error types for the topology crate.

use thiserror::Error;

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Topology error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The replica status could not be read.
    #[error("replica status unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// The replica status is internally inconsistent.
    #[error("malformed replica status ({desired}/{actual}/{ready}): {reason}")]
    MalformedSnapshot {
        desired: u32,
        actual: u32,
        ready: u32,
        reason: String,
    },

    /// A topology listener rejected a change.
    #[error("topology listener failed: {reason}")]
    ListenerFailed { reason: String },

    /// Scheduling a task failed.
    #[error("scheduler unavailable: {reason}")]
    SchedulerUnavailable { reason: String },

    /// Loop was stopped.
    #[error("topology watch loop stopped")]
    LoopStopped,

    /// Too many consecutive failures.
    #[error("max consecutive errors ({count}) reached")]
    MaxErrors { count: usize },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a source unavailable error.
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a listener failed error.
    pub fn listener_failed(reason: impl Into<String>) -> Self {
        Self::ListenerFailed {
            reason: reason.into(),
        }
    }

    /// Create a scheduler unavailable error.
    pub fn scheduler_unavailable(reason: impl Into<String>) -> Self {
        Self::SchedulerUnavailable {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

impl From<shardwell_core::Error> for Error {
    fn from(err: shardwell_core::Error) -> Self {
        Self::invalid_config(err.to_string())
    }
}
