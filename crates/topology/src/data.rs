//! Published state of the topology state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::{ReplicaStatusSnapshot, TopologyState};

/// One consistent view of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopologyView {
    /// Current state.
    pub state: TopologyState,
    /// Number of nodes routing currently assumes. Only moves on a return to `Stable`.
    pub topology: u32,
    /// Last snapshot accepted as stable. `None` until the first converged snapshot.
    pub latest_stable: Option<ReplicaStatusSnapshot>,
}

impl TopologyView {
    /// View before any converged snapshot was seen.
    #[must_use]
    pub const fn uninitialized() -> Self {
        Self {
            state: TopologyState::Stable,
            topology: 0,
            latest_stable: None,
        }
    }

    /// Stable view committed from `snapshot`.
    #[must_use]
    pub const fn stable(snapshot: ReplicaStatusSnapshot) -> Self {
        Self {
            state: TopologyState::Stable,
            topology: snapshot.desired_replicas,
            latest_stable: Some(snapshot),
        }
    }

    /// Same stable commit, different state.
    #[must_use]
    pub const fn with_state(self, state: TopologyState) -> Self {
        Self { state, ..self }
    }

    /// Check whether a stable size has been established.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.latest_stable.is_some()
    }

    /// Desired replica count of the last stable snapshot.
    #[must_use]
    pub fn stable_size(&self) -> Option<u32> {
        self.latest_stable.map(|s| s.desired_replicas)
    }
}

/// Shared machine data with whole-view reads.
///
/// Writers replace the `Arc` under the lock; readers either clone the `Arc`
/// or read the atomic mirrors, which are updated inside the same commit.
#[derive(Debug)]
pub struct StateMachineData {
    view: RwLock<Arc<TopologyView>>,
    state: AtomicU8,
    topology: AtomicU32,
    initialized: AtomicBool,
}

impl StateMachineData {
    /// Create uninitialized data.
    #[must_use]
    pub fn new() -> Self {
        Self::from_view(TopologyView::uninitialized())
    }

    /// Create data seeded with `view`.
    #[must_use]
    pub fn from_view(view: TopologyView) -> Self {
        Self {
            state: AtomicU8::new(view.state.as_u8()),
            topology: AtomicU32::new(view.topology),
            initialized: AtomicBool::new(view.is_initialized()),
            view: RwLock::new(Arc::new(view)),
        }
    }

    /// Whole current view.
    #[must_use]
    pub fn view(&self) -> Arc<TopologyView> {
        Arc::clone(&self.view.read())
    }

    /// Current state, without locking.
    ///
    /// Reads `Stable` before initialization; check [`Self::is_initialized`].
    #[must_use]
    pub fn current_state(&self) -> TopologyState {
        TopologyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Current topology size, without locking.
    ///
    /// Reads 0 before initialization; check [`Self::is_initialized`].
    #[must_use]
    pub fn current_topology(&self) -> u32 {
        self.topology.load(Ordering::Acquire)
    }

    /// Check whether a stable size has been established, without locking.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Last snapshot accepted as stable.
    #[must_use]
    pub fn latest_stable_state(&self) -> Option<ReplicaStatusSnapshot> {
        self.view.read().latest_stable
    }

    /// Publish `next`. Only the machine's processing step calls this.
    pub(crate) fn commit(&self, next: TopologyView) {
        let mut guard = self.view.write();
        *guard = Arc::new(next);
        self.state.store(next.state.as_u8(), Ordering::Release);
        self.topology.store(next.topology, Ordering::Release);
        self.initialized.store(next.is_initialized(), Ordering::Release);
    }
}

impl Default for StateMachineData {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_uninitialized() {
        let data = StateMachineData::new();
        assert!(!data.view().is_initialized());
        assert!(!data.is_initialized());
        assert_eq!(data.current_state(), TopologyState::Stable);
        assert_eq!(data.current_topology(), 0);
        assert!(data.latest_stable_state().is_none());
    }

    #[test]
    fn test_commit_updates_mirrors() {
        let data = StateMachineData::new();
        let next = TopologyView::stable(ReplicaStatusSnapshot::settled(5))
            .with_state(TopologyState::ScalingDown);

        data.commit(next);

        assert_eq!(data.current_state(), TopologyState::ScalingDown);
        assert_eq!(data.current_topology(), 5);
        assert!(data.is_initialized());
        assert_eq!(*data.view(), next);
    }

    #[test]
    fn test_old_view_is_not_torn() {
        let data = StateMachineData::from_view(TopologyView::stable(ReplicaStatusSnapshot::settled(5)));
        let before = data.view();

        data.commit(TopologyView::stable(ReplicaStatusSnapshot::settled(3)));

        assert_eq!(before.topology, 5);
        assert_eq!(before.stable_size(), Some(5));
        assert_eq!(data.view().topology, 3);
    }
}
