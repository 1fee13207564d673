//! Cluster configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Configuration for one cluster-membership watcher.
///
/// Every process in the cluster must agree on `replicas_per_node` and
/// `bucket_count`, otherwise they compute different routing tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    /// Orchestration namespace the replica set lives in.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Name of the replica set. Node ids are derived as `{name}-{ordinal}`.
    pub statefulset_name: String,

    /// Identifier of this process.
    pub node_id: String,

    /// Delay before a stalled scaling state is re-evaluated.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Cadence of replica status polling.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Virtual points per node on the hash ring.
    #[serde(default = "default_replicas_per_node")]
    pub replicas_per_node: usize,

    /// Number of buckets multi-receiver messages are split into.
    #[serde(default = "default_bucket_count")]
    pub bucket_count: u32,

    /// Consecutive poll failures tolerated before the watch loop gives up.
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: usize,
}

impl ClusterConfig {
    /// Create a config with defaults for everything but the required fields.
    pub fn new(statefulset_name: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            namespace: default_namespace(),
            statefulset_name: statefulset_name.into(),
            node_id: node_id.into(),
            timeout_seconds: default_timeout_seconds(),
            poll_interval_ms: default_poll_interval_ms(),
            replicas_per_node: default_replicas_per_node(),
            bucket_count: default_bucket_count(),
            max_poll_errors: default_max_poll_errors(),
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the re-check timeout.
    #[must_use]
    pub const fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    /// Set the number of virtual points per node.
    #[must_use]
    pub const fn replicas_per_node(mut self, replicas: usize) -> Self {
        self.replicas_per_node = replicas;
        self
    }

    /// Set the bucket count.
    #[must_use]
    pub const fn bucket_count(mut self, buckets: u32) -> Self {
        self.bucket_count = buckets;
        self
    }

    /// Re-check delay as a `Duration`.
    #[must_use]
    pub const fn recheck_delay(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Poll interval as a `Duration`.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::toml_parse_failed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Apply `SHARDWELL_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(node_id) = std::env::var("SHARDWELL_NODE_ID") {
            self.node_id = node_id;
        }
        if let Ok(namespace) = std::env::var("SHARDWELL_NAMESPACE") {
            self.namespace = namespace;
        }
        if let Ok(name) = std::env::var("SHARDWELL_STATEFULSET_NAME") {
            self.statefulset_name = name;
        }
        if let Some(secs) = std::env::var("SHARDWELL_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.timeout_seconds = secs;
        }
        self
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.statefulset_name.trim().is_empty() {
            return Err(Error::invalid_config("statefulset_name", "must not be empty"));
        }
        if self.node_id.trim().is_empty() {
            return Err(Error::invalid_config("node_id", "must not be empty"));
        }
        if self.replicas_per_node == 0 {
            return Err(Error::invalid_config("replicas_per_node", "must be positive"));
        }
        if self.bucket_count == 0 {
            return Err(Error::invalid_config("bucket_count", "must be positive"));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::invalid_config("timeout_seconds", "must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::invalid_config("poll_interval_ms", "must be positive"));
        }
        if self.max_poll_errors == 0 {
            return Err(Error::invalid_config("max_poll_errors", "must be positive"));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

const fn default_timeout_seconds() -> u64 {
    60
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_replicas_per_node() -> usize {
    100
}

const fn default_bucket_count() -> u32 {
    16
}

const fn default_max_poll_errors() -> usize {
    10
}
