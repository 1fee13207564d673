//! Replica status read from a JSON document on disk.
//!
//! An external agent (typically a sidecar mirroring the replica set's status
//! subresource) keeps the file current:
//!
//! ```json
//! { "desiredReplicas": 3, "actualReplicas": 3, "readyReplicas": 2,
//!   "observedAt": "2026-01-01T12:00:00Z" }
//! ```
//!
//! `observedAt` is optional. When a maximum age is configured, documents
//! older than that are reported as unavailable rather than trusted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use shardwell_topology::{Error, ReplicaStatusSnapshot, ReplicaStatusSource, Result};
use tracing::debug;

/// On-disk status document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDocument {
    /// Replica counts.
    #[serde(flatten)]
    pub replicas: ReplicaStatusSnapshot,
    /// When the agent last observed the platform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl StatusDocument {
    /// Parse a document.
    ///
    /// # Errors
    ///
    /// Returns `Error::SourceUnavailable` if the JSON is not a status document.
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::source_unavailable(format!("invalid status document: {e}")))
    }

    /// Check whether the document is older than `max_age` at `now`.
    ///
    /// Documents without a timestamp never count as stale.
    #[must_use]
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let Some(observed_at) = self.observed_at else {
            return false;
        };
        TimeDelta::from_std(max_age)
            .map(|limit| now.signed_duration_since(observed_at) > limit)
            .unwrap_or(false)
    }
}

/// Reads replica status from a file on every poll.
#[derive(Debug, Clone)]
pub struct FileReplicaStatusSource {
    path: PathBuf,
    max_age: Option<Duration>,
}

impl FileReplicaStatusSource {
    /// Create a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: None,
        }
    }

    /// Reject documents whose `observedAt` is older than `max_age`.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Path being read.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl ReplicaStatusSource for FileReplicaStatusSource {
    async fn poll(&self) -> Result<ReplicaStatusSnapshot> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::source_unavailable(format!("failed to read {}: {e}", self.path.display()))
        })?;
        let document = StatusDocument::parse(&content)?;

        if let Some(max_age) = self.max_age {
            if document.is_stale(max_age, Utc::now()) {
                return Err(Error::source_unavailable(format!(
                    "status in {} is older than {}s",
                    self.path.display(),
                    max_age.as_secs()
                )));
            }
        }

        debug!(path = %self.path.display(), replicas = %document.replicas, "Replica status read");
        Ok(document.replicas)
    }
}
