//! Shard placement and message routing.
//!
//! - [`HashRing`]: consistent hash ring mapping keys to nodes
//! - [`RingHandle`]: publishes ring snapshots across topology changes
//! - [`InternalMessage`]: the routed message envelope
//! - [`MessageSplitter`]: per-bucket fragmentation of multi-receiver messages

#![forbid(unsafe_code)]

pub mod error;
pub mod handle;
pub mod hash;
pub mod message;
pub mod ring;
pub mod splitter;

pub use error::{Result, RoutingError};
pub use handle::RingHandle;
pub use hash::{BucketHasher, HashFunction, Sha256Hash, bucket_of};
pub use message::{ActorRef, CreationContext, InternalMessage, MessageId, MessageTimeout, TraceContext};
pub use ring::{HashRing, NodeId};
pub use splitter::{MessageSplitter, split_in_buckets};
