//! Cluster topology reconciliation.
//!
//! Observes the orchestration platform's `{desired, actual, ready}` replica
//! counts and turns them into debounced topology-change notifications.
//!
//! # States
//!
//! - `Stable` - membership matches the last confirmed size
//! - `ScalingUp` - replicas are being added
//! - `ScalingDown` - replicas are being removed
//!
//! Routing keeps using the last stable size while scaling, so shard ownership
//! never moves until the platform reports the new size settled.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use shardwell_topology::{
//!     ChannelTopologyListener, InMemoryReplicaStatusSource, LoopConfig,
//!     ReplicaStatusSnapshot, TokioScheduler, TopologyStateMachine, TopologyWatchLoop,
//! };
//!
//! #[tokio::main]
//! async fn main() -> shardwell_topology::Result<()> {
//!     let source = Arc::new(InMemoryReplicaStatusSource::new(ReplicaStatusSnapshot::settled(3)));
//!     let listener = Arc::new(ChannelTopologyListener::new());
//!     let machine = TopologyStateMachine::new(
//!         source,
//!         Arc::new(TokioScheduler::current()?),
//!         listener,
//!         Duration::from_secs(60),
//!     );
//!
//!     let mut watch_loop = TopologyWatchLoop::new(machine, LoopConfig::default());
//!     watch_loop.run().await
//! }
//! ```

#![forbid(unsafe_code)]

pub mod data;
pub mod error;
pub mod listener;
pub mod r#loop;
pub mod machine;
pub mod processor;
pub mod scheduler;
pub mod source;
pub mod types;

// Re-export main types
pub use data::{StateMachineData, TopologyView};
pub use error::{Error, Result};
pub use listener::{ChannelTopologyListener, TopologyListener};
pub use r#loop::{LoopConfig, LoopStopper, TopologyWatchLoop};
pub use machine::{TopologyStateMachine, TransitionReport};
pub use processor::{Decision, Effect};
pub use scheduler::{ManualScheduler, Scheduler, TaskHandle, TaskId, TokioScheduler};
pub use source::{InMemoryReplicaStatusSource, ReplicaStatusSource};
pub use types::{ReplicaStatusSnapshot, TopologyState};
