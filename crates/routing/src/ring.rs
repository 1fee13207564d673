//! Consistent hash ring with virtual points.
//!
//! Each node is placed on the ring `replicas_per_node` times, at
//! `hash(node_id + i)` for `i in 0..replicas_per_node`. A key belongs to the
//! first point clockwise from `hash(key)`, wrapping to the smallest point.
//!
//! The ring is a function of the node *set*: two processes that add the same
//! nodes in different orders build identical rings, including when two nodes
//! land on the same point (the smaller node id wins, the other is kept as a
//! contender and takes over if the winner is removed).

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hash::{BucketHasher, HashFunction, Sha256Hash, bucket_of};

/// Identifier of a physical node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the node ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Consistent hash ring.
#[derive(Debug, Clone)]
pub struct HashRing {
    hash_fn: Arc<dyn HashFunction>,
    replicas_per_node: usize,
    /// Point -> owning node
    ring: BTreeMap<u64, NodeId>,
    /// Point -> nodes that also hash there but lost the tie
    contenders: BTreeMap<u64, BTreeSet<NodeId>>,
    nodes: BTreeSet<NodeId>,
}

impl HashRing {
    /// Create an empty ring.
    #[must_use]
    pub fn new(hash_fn: Arc<dyn HashFunction>, replicas_per_node: usize) -> Self {
        Self {
            hash_fn,
            replicas_per_node,
            ring: BTreeMap::new(),
            contenders: BTreeMap::new(),
            nodes: BTreeSet::new(),
        }
    }

    /// Create an empty ring using SHA-256.
    #[must_use]
    pub fn sha256(replicas_per_node: usize) -> Self {
        Self::new(Arc::new(Sha256Hash), replicas_per_node)
    }

    /// Create a ring populated with `nodes`.
    #[must_use]
    pub fn with_nodes<I, N>(hash_fn: Arc<dyn HashFunction>, replicas_per_node: usize, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        let mut ring = Self::new(hash_fn, replicas_per_node);
        for node in nodes {
            ring.add(node);
        }
        ring
    }

    /// Build an empty ring sharing this ring's hash function and replica count.
    #[must_use]
    pub fn empty_like(&self) -> Self {
        Self::new(Arc::clone(&self.hash_fn), self.replicas_per_node)
    }

    /// Add a node. Re-adding a present node changes nothing.
    pub fn add(&mut self, node: impl Into<NodeId>) {
        let node = node.into();
        if self.nodes.contains(&node) {
            return;
        }

        for point in self.points_for(&node) {
            match self.ring.entry(point) {
                Entry::Vacant(slot) => {
                    slot.insert(node.clone());
                }
                Entry::Occupied(mut slot) => {
                    if *slot.get() == node {
                        continue;
                    }
                    let loser = if node < *slot.get() {
                        slot.insert(node.clone())
                    } else {
                        node.clone()
                    };
                    self.contenders.entry(point).or_default().insert(loser);
                }
            }
        }

        self.nodes.insert(node);
    }

    /// Remove a node. No-op if the node is absent.
    pub fn remove(&mut self, node: &NodeId) {
        if !self.nodes.remove(node) {
            return;
        }

        for point in self.points_for(node) {
            if self.ring.get(&point) == Some(node) {
                self.ring.remove(&point);
                if let Some(successor) = self.pop_contender(point) {
                    self.ring.insert(point, successor);
                }
            } else if let Some(waiting) = self.contenders.get_mut(&point) {
                waiting.remove(node);
                if waiting.is_empty() {
                    self.contenders.remove(&point);
                }
            }
        }
    }

    /// Owner of `key`, or `None` when the ring is empty.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&NodeId> {
        let hash = self.hash_key(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, node)| node)
    }

    /// Check whether `node` owns `key`.
    #[must_use]
    pub fn owner_is(&self, key: &str, node: &NodeId) -> bool {
        self.get(key) == Some(node)
    }

    /// Hash a key with the ring's hash function.
    #[must_use]
    pub fn hash_key(&self, key: &str) -> u64 {
        self.hash_fn.hash_str(key)
    }

    /// Nodes on the ring, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// Check whether a node is on the ring.
    #[must_use]
    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.contains(node)
    }

    /// Number of physical nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct points on the ring.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.ring.len()
    }

    /// Check if the ring has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Virtual points per node.
    #[must_use]
    pub fn replicas_per_node(&self) -> usize {
        self.replicas_per_node
    }

    /// Name of the hash function in use.
    #[must_use]
    pub fn hash_name(&self) -> &'static str {
        self.hash_fn.name()
    }

    fn points_for(&self, node: &NodeId) -> Vec<u64> {
        (0..self.replicas_per_node)
            .map(|replica| self.hash_fn.hash_str(&format!("{}{replica}", node.as_str())))
            .collect()
    }

    fn pop_contender(&mut self, point: u64) -> Option<NodeId> {
        let waiting = self.contenders.get_mut(&point)?;
        let next = waiting.pop_first();
        if waiting.is_empty() {
            self.contenders.remove(&point);
        }
        next
    }
}

/// Buckets are derived from the same hash the ring places keys with.
impl BucketHasher for HashRing {
    fn bucket_for(&self, key: &str, bucket_count: u32) -> u32 {
        bucket_of(self.hash_key(key), bucket_count)
    }
}
