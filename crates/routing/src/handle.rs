//! Rebuild-and-swap holder for the current ring snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::info;

use crate::ring::{HashRing, NodeId};

/// Shared handle to the ring currently used for routing.
///
/// Rings are never mutated once published. A topology change builds a new
/// ring and swaps the `Arc`; readers that already took a snapshot keep
/// routing against the old one until they finish.
#[derive(Debug)]
pub struct RingHandle {
    current: RwLock<Arc<HashRing>>,
    generation: AtomicU64,
}

impl RingHandle {
    /// Create a handle publishing `ring` as generation 0.
    #[must_use]
    pub fn new(ring: HashRing) -> Self {
        Self {
            current: RwLock::new(Arc::new(ring)),
            generation: AtomicU64::new(0),
        }
    }

    /// The ring to use for one routing decision.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashRing> {
        Arc::clone(&self.current.read())
    }

    /// Publish a new ring, returning the one it replaced.
    pub fn replace(&self, ring: HashRing) -> Arc<HashRing> {
        let next = Arc::new(ring);
        let previous = std::mem::replace(&mut *self.current.write(), next);
        self.generation.fetch_add(1, Ordering::AcqRel);
        previous
    }

    /// Build a ring from `nodes` with the current parameters and publish it.
    pub fn rebuild<I, N>(&self, nodes: I) -> Arc<HashRing>
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        let mut ring = self.snapshot().empty_like();
        for node in nodes {
            ring.add(node);
        }
        let node_count = ring.node_count();
        let points = ring.point_count();
        self.replace(ring);
        info!(
            nodes = node_count,
            points,
            generation = self.generation(),
            "Hash ring rebuilt"
        );
        self.snapshot()
    }

    /// Number of swaps since creation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}
