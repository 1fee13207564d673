//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// shardwell - shard placement for a distributed actor runtime
#[derive(Parser, Debug)]
#[command(name = "shardwell")]
#[command(version)]
#[command(about = "Consistent-hash shard placement and cluster topology tracking")]
#[command(
    long_about = "shardwell answers which node owns an actor, splits multi-receiver messages into per-bucket copies, and follows replica set scaling to keep the routing table current."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the node owning a key
    Lookup {
        /// Comma-separated node ids
        #[arg(short, long, value_delimiter = ',', required = true)]
        nodes: Vec<String>,

        /// Key to place (usually an actor id)
        #[arg(short, long)]
        key: String,

        /// Virtual points per node
        #[arg(long, default_value_t = 100)]
        replicas_per_node: usize,
    },

    /// Split a message to several receivers into bucket groups, printed as JSON
    Split {
        /// Comma-separated node ids
        #[arg(short, long, value_delimiter = ',', required = true)]
        nodes: Vec<String>,

        /// Comma-separated receiver actor ids
        #[arg(short, long, value_delimiter = ',', required = true)]
        receivers: Vec<String>,

        /// Number of buckets
        #[arg(short, long, default_value_t = 16)]
        buckets: u32,

        /// Actor system the receivers belong to
        #[arg(long, default_value = "default")]
        actor_system: String,

        /// Virtual points per node
        #[arg(long, default_value_t = 100)]
        replicas_per_node: usize,
    },

    /// Follow a replica status file and log topology changes until Ctrl+C
    Watch {
        /// Cluster configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Replica status document (JSON)
        #[arg(short, long)]
        status_file: PathBuf,

        /// Treat status documents older than this many seconds as unavailable
        #[arg(long)]
        max_status_age_secs: Option<u64>,
    },
}
