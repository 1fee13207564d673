//! Error types for the routing crate.

use thiserror::Error;

/// Result type alias for routing operations.
pub type Result<T> = std::result::Result<T, RoutingError>;

/// Routing error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// A message was built without receivers.
    #[error("message has no receivers")]
    EmptyReceivers,

    /// Splitting requires at least one bucket.
    #[error("invalid bucket count {count}: must be positive")]
    InvalidBucketCount { count: u32 },

    /// The ring has no node for the key.
    #[error("no owner for key '{key}': ring is empty")]
    NoOwner { key: String },

    /// Wire encoding failed.
    #[error("failed to encode message: {reason}")]
    Encode { reason: String },

    /// Wire decoding failed.
    #[error("failed to decode message: {reason}")]
    Decode { reason: String },
}

impl RoutingError {
    /// Create a no-owner error.
    pub fn no_owner(key: impl Into<String>) -> Self {
        Self::NoOwner { key: key.into() }
    }

    /// Create an encode error.
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}
