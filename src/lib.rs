//! # shardwell
//!
//! Shard placement and cluster-topology reconciliation for a distributed
//! actor runtime.
//!
//! This library wires the workspace crates together:
//!
//! - [`ClusterService`] - routing backed by a ring rebuilt on confirmed topology changes
//! - [`FileReplicaStatusSource`] - replica status read from a JSON document
//!
//! and re-exports them for convenience.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod cluster;
pub mod error;
pub mod status_file;

pub use cluster::{ClusterService, node_name};
pub use error::{ClusterError, Result};
pub use status_file::{FileReplicaStatusSource, StatusDocument};

// Re-export all crates
pub use shardwell_core;
pub use shardwell_routing;
pub use shardwell_topology;
