//! Replica status sources.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};
use crate::types::ReplicaStatusSnapshot;

/// Provides the orchestration platform's current replica counts.
#[async_trait::async_trait]
pub trait ReplicaStatusSource: Send + Sync {
    /// Read the current status.
    async fn poll(&self) -> Result<ReplicaStatusSnapshot>;
}

/// Simple in-memory replica status source.
#[derive(Debug)]
pub struct InMemoryReplicaStatusSource {
    status: tokio::sync::RwLock<Option<ReplicaStatusSnapshot>>,
    polls: AtomicUsize,
}

impl InMemoryReplicaStatusSource {
    /// Create a source reporting `snapshot`.
    #[must_use]
    pub fn new(snapshot: ReplicaStatusSnapshot) -> Self {
        Self {
            status: tokio::sync::RwLock::new(Some(snapshot)),
            polls: AtomicUsize::new(0),
        }
    }

    /// Create a source that fails every poll until [`set`](Self::set) is called.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            status: tokio::sync::RwLock::new(None),
            polls: AtomicUsize::new(0),
        }
    }

    /// Report `snapshot` from now on.
    pub async fn set(&self, snapshot: ReplicaStatusSnapshot) {
        *self.status.write().await = Some(snapshot);
    }

    /// Fail every poll from now on.
    pub async fn make_unavailable(&self) {
        *self.status.write().await = None;
    }

    /// Number of polls served, failed ones included.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl ReplicaStatusSource for InMemoryReplicaStatusSource {
    async fn poll(&self) -> Result<ReplicaStatusSnapshot> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.status
            .read()
            .await
            .ok_or_else(|| Error::source_unavailable("no replica status reported"))
    }
}
