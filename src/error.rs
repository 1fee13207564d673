//! Error types for the cluster service.

use thiserror::Error;

/// Result type alias for cluster service operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors surfaced by [`ClusterService`](crate::ClusterService).
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] shardwell_core::Error),

    /// Topology tracking failed.
    #[error(transparent)]
    Topology(#[from] shardwell_topology::Error),

    /// Routing or splitting failed.
    #[error(transparent)]
    Routing(#[from] shardwell_routing::RoutingError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_error_is_transparent() {
        let err: ClusterError = shardwell_routing::RoutingError::no_owner("actor-1").into();
        assert_eq!(err.to_string(), "no owner for key 'actor-1': ring is empty");
    }

    #[test]
    fn test_topology_error_converts() {
        let err: ClusterError = shardwell_topology::Error::LoopStopped.into();
        assert!(matches!(err, ClusterError::Topology(_)));
    }
}
