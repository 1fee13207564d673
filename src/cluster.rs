//! Cluster service: ties topology tracking to routing.
//!
//! The service owns the ring handle and the state machine. Its listener
//! rebuilds the ring from the confirmed size, naming nodes the way the
//! replica set names its pods (`{statefulset_name}-{ordinal}`), and swaps
//! it in. Routing and splitting always read one ring snapshot per call.

use std::collections::BTreeMap;
use std::sync::Arc;

use shardwell_core::ClusterConfig;
use shardwell_routing::{
    HashRing, InternalMessage, MessageSplitter, NodeId, RingHandle, RoutingError,
};
use shardwell_topology::{
    ChannelTopologyListener, LoopConfig, ReplicaStatusSource, Scheduler, TopologyListener,
    TopologyStateMachine, TopologyWatchLoop,
};
use tokio::sync::watch;
use tracing::info;

use crate::error::Result;

/// Node id of the replica at `ordinal`.
#[must_use]
pub fn node_name(statefulset_name: &str, ordinal: u32) -> NodeId {
    NodeId::new(format!("{statefulset_name}-{ordinal}"))
}

/// Rebuilds the ring on every confirmed topology size.
struct RingRebuildListener {
    ring: Arc<RingHandle>,
    statefulset_name: String,
    published: ChannelTopologyListener,
}

impl TopologyListener for RingRebuildListener {
    fn on_topology_change(&self, new_size: u32) -> shardwell_topology::Result<()> {
        let ring = self
            .ring
            .rebuild((0..new_size).map(|ordinal| node_name(&self.statefulset_name, ordinal)));
        info!(
            statefulset = %self.statefulset_name,
            nodes = ring.node_count(),
            "Routing table updated"
        );
        self.published.on_topology_change(new_size)
    }
}

/// Shard placement for one member of the cluster.
pub struct ClusterService {
    config: ClusterConfig,
    local: NodeId,
    ring: Arc<RingHandle>,
    listener: Arc<RingRebuildListener>,
    machine: TopologyStateMachine,
    splitter: MessageSplitter,
}

impl ClusterService {
    /// Create a service. Routing is unavailable until the first converged
    /// replica status is processed.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Config` if `config` fails validation.
    pub fn new(
        config: ClusterConfig,
        source: Arc<dyn ReplicaStatusSource>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self> {
        config.validate()?;

        let ring = Arc::new(RingHandle::new(HashRing::sha256(config.replicas_per_node)));
        let listener = Arc::new(RingRebuildListener {
            ring: Arc::clone(&ring),
            statefulset_name: config.statefulset_name.clone(),
            published: ChannelTopologyListener::new(),
        });
        let machine = TopologyStateMachine::new(
            source,
            scheduler,
            listener.clone(),
            config.recheck_delay(),
        );
        let splitter = MessageSplitter::new(config.bucket_count)?;

        info!(
            namespace = %config.namespace,
            statefulset = %config.statefulset_name,
            node_id = %config.node_id,
            "Cluster service created"
        );

        Ok(Self {
            local: NodeId::new(config.node_id.clone()),
            config,
            ring,
            listener,
            machine,
            splitter,
        })
    }

    /// Service configuration.
    #[must_use]
    pub const fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// This process's node id.
    #[must_use]
    pub const fn local_node(&self) -> &NodeId {
        &self.local
    }

    /// The topology state machine.
    #[must_use]
    pub const fn machine(&self) -> &TopologyStateMachine {
        &self.machine
    }

    /// Current ring snapshot.
    #[must_use]
    pub fn ring(&self) -> Arc<HashRing> {
        self.ring.snapshot()
    }

    /// Subscribe to confirmed topology sizes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<u32>> {
        self.listener.published.subscribe()
    }

    /// Node that owns `key`.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::NoOwner` while the ring is empty.
    pub fn route(&self, key: &str) -> Result<NodeId> {
        self.ring
            .snapshot()
            .get(key)
            .cloned()
            .ok_or_else(|| RoutingError::no_owner(key).into())
    }

    /// Check whether this node owns `key`.
    #[must_use]
    pub fn is_local(&self, key: &str) -> bool {
        self.ring.snapshot().owner_is(key, &self.local)
    }

    /// Split `message` into per-bucket copies against the current ring.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Routing` if splitting fails.
    pub fn split(&self, message: &InternalMessage) -> Result<BTreeMap<u32, InternalMessage>> {
        let ring = self.ring.snapshot();
        Ok(self.splitter.split(message, ring.as_ref())?)
    }

    /// Polling loop feeding this service's state machine.
    #[must_use]
    pub fn watch_loop(&self) -> TopologyWatchLoop {
        TopologyWatchLoop::new(self.machine.clone(), LoopConfig::from_cluster(&self.config))
    }
}

impl std::fmt::Debug for ClusterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterService")
            .field("local", &self.local)
            .field("machine", &self.machine)
            .field("ring_generation", &self.ring.generation())
            .finish_non_exhaustive()
    }
}
