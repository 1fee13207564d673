//! Core types for topology tracking.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Replica counts reported by the orchestration platform.
///
/// Field names follow the platform's status document on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaStatusSnapshot {
    /// Replicas the operator asked for.
    pub desired_replicas: u32,
    /// Replicas that exist.
    pub actual_replicas: u32,
    /// Replicas that passed readiness.
    pub ready_replicas: u32,
}

impl ReplicaStatusSnapshot {
    /// Create a snapshot.
    #[must_use]
    pub const fn new(desired_replicas: u32, actual_replicas: u32, ready_replicas: u32) -> Self {
        Self {
            desired_replicas,
            actual_replicas,
            ready_replicas,
        }
    }

    /// A snapshot where all three counts equal `replicas`.
    #[must_use]
    pub const fn settled(replicas: u32) -> Self {
        Self::new(replicas, replicas, replicas)
    }

    /// Check whether desired, actual and ready all agree.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        self.desired_replicas == self.actual_replicas
            && self.actual_replicas == self.ready_replicas
    }

    /// Reject snapshots that cannot describe a real replica set.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedSnapshot` if more replicas are ready than exist.
    pub fn validate(self) -> Result<Self> {
        if self.ready_replicas > self.actual_replicas {
            return Err(Error::MalformedSnapshot {
                desired: self.desired_replicas,
                actual: self.actual_replicas,
                ready: self.ready_replicas,
                reason: "ready replicas exceed actual replicas".to_string(),
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for ReplicaStatusSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "desired={} actual={} ready={}",
            self.desired_replicas, self.actual_replicas, self.ready_replicas
        )
    }
}

/// Cluster topology state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyState {
    /// Membership matches the last confirmed size.
    #[default]
    Stable,
    /// Replicas are being added.
    ScalingUp,
    /// Replicas are being removed.
    ScalingDown,
}

impl TopologyState {
    /// Check if a scale operation is in progress.
    #[must_use]
    pub const fn is_scaling(&self) -> bool {
        matches!(self, Self::ScalingUp | Self::ScalingDown)
    }

    /// Compact encoding used by lock-free readers.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Stable => 0,
            Self::ScalingUp => 1,
            Self::ScalingDown => 2,
        }
    }

    /// Decode the compact encoding. Unknown values read as `Stable`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::ScalingUp,
            2 => Self::ScalingDown,
            _ => Self::Stable,
        }
    }
}

impl std::fmt::Display for TopologyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stable => "STABLE",
            Self::ScalingUp => "SCALING_UP",
            Self::ScalingDown => "SCALING_DOWN",
        };
        write!(f, "{name}")
    }
}
