//! Topology change listeners.

use tokio::sync::watch;

use crate::error::Result;

/// Receives confirmed topology sizes.
///
/// Called after the new state is committed. An error is logged by the
/// machine and does not undo the transition.
pub trait TopologyListener: Send + Sync {
    /// The cluster settled on `new_size` nodes.
    ///
    /// # Errors
    ///
    /// Implementations return an error when they could not apply the change.
    fn on_topology_change(&self, new_size: u32) -> Result<()>;
}

impl<F> TopologyListener for F
where
    F: Fn(u32) -> Result<()> + Send + Sync,
{
    fn on_topology_change(&self, new_size: u32) -> Result<()> {
        self(new_size)
    }
}

/// Publishes topology sizes on a watch channel.
///
/// Receivers see `None` until the first confirmed size.
#[derive(Debug)]
pub struct ChannelTopologyListener {
    tx: watch::Sender<Option<u32>>,
}

impl ChannelTopologyListener {
    /// Create a listener with no subscribers yet.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Subscribe to topology changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<u32>> {
        self.tx.subscribe()
    }

    /// Last published size.
    #[must_use]
    pub fn latest(&self) -> Option<u32> {
        *self.tx.borrow()
    }
}

impl Default for ChannelTopologyListener {
    fn default() -> Self {
        Self::new()
    }
}

impl TopologyListener for ChannelTopologyListener {
    fn on_topology_change(&self, new_size: u32) -> Result<()> {
        self.tx.send_replace(Some(new_size));
        Ok(())
    }
}
