//! # shardwell - command line entry point
//!
//! - `lookup` - which node owns a key
//! - `split` - how a multi-receiver message is fragmented into buckets
//! - `watch` - follow a replica status file and keep a routing table current
//!
//! Logging goes through `tracing`; set `RUST_LOG` to adjust (default `info`).

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    commands::execute_command(cli.command).await
}

/// Initialize tracing subscriber with environment filter.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
