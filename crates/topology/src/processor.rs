//! Per-state transition rules.
//!
//! Every function here is pure: it takes the current view and a validated
//! snapshot and returns what the machine should commit and do. Nothing is
//! mutated and no collaborator is called.
//!
//! Scale-up settles once `desired == actual`; scale-down additionally waits
//! for every remaining replica to be ready.

use tracing::debug;

use crate::data::TopologyView;
use crate::types::{ReplicaStatusSnapshot, TopologyState};

/// Side effect requested by a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Nothing to do.
    None,
    /// Arm the delayed re-check.
    ScheduleRecheck,
    /// Disarm any pending re-check and announce the new size.
    CancelRecheckAndNotify(u32),
}

/// Outcome of processing one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// View to commit.
    pub next: TopologyView,
    /// Effect to perform after committing.
    pub effect: Effect,
}

impl Decision {
    const fn stay(view: &TopologyView) -> Self {
        Self {
            next: *view,
            effect: Effect::None,
        }
    }

    const fn settle(snapshot: ReplicaStatusSnapshot) -> Self {
        Self {
            next: TopologyView::stable(snapshot),
            effect: Effect::CancelRecheckAndNotify(snapshot.desired_replicas),
        }
    }

    const fn move_to(view: &TopologyView, state: TopologyState, effect: Effect) -> Self {
        Self {
            next: view.with_state(state),
            effect,
        }
    }
}

/// Decide the next view for `snapshot`.
#[must_use]
pub fn process(view: &TopologyView, snapshot: &ReplicaStatusSnapshot) -> Decision {
    let Some(stable) = view.stable_size() else {
        return process_uninitialized(view, snapshot);
    };

    match view.state {
        TopologyState::Stable => process_stable(view, stable, snapshot),
        TopologyState::ScalingUp => process_scaling_up(view, stable, snapshot),
        TopologyState::ScalingDown => process_scaling_down(view, stable, snapshot),
    }
}

fn process_uninitialized(view: &TopologyView, snapshot: &ReplicaStatusSnapshot) -> Decision {
    if snapshot.is_converged() {
        Decision::settle(*snapshot)
    } else {
        debug!(%snapshot, "Waiting for a converged snapshot to initialize topology");
        Decision::stay(view)
    }
}

fn process_stable(view: &TopologyView, stable: u32, snapshot: &ReplicaStatusSnapshot) -> Decision {
    let desired = snapshot.desired_replicas;

    if desired < stable {
        Decision::move_to(view, TopologyState::ScalingDown, Effect::ScheduleRecheck)
    } else if desired > stable || desired > snapshot.actual_replicas {
        Decision::move_to(view, TopologyState::ScalingUp, Effect::ScheduleRecheck)
    } else {
        Decision::stay(view)
    }
}

fn process_scaling_down(view: &TopologyView, stable: u32, snapshot: &ReplicaStatusSnapshot) -> Decision {
    if snapshot.is_converged() {
        Decision::settle(*snapshot)
    } else if snapshot.desired_replicas > stable {
        // Scale-down reversed before it finished.
        Decision::move_to(view, TopologyState::ScalingUp, Effect::None)
    } else {
        Decision::stay(view)
    }
}

fn process_scaling_up(view: &TopologyView, stable: u32, snapshot: &ReplicaStatusSnapshot) -> Decision {
    if snapshot.desired_replicas == snapshot.actual_replicas {
        Decision::settle(*snapshot)
    } else if snapshot.desired_replicas < stable {
        Decision::move_to(view, TopologyState::ScalingDown, Effect::None)
    } else {
        Decision::stay(view)
    }
}
