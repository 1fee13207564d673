//! CLI command handlers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use shardwell::shardwell_core::ClusterConfig;
use shardwell::shardwell_routing::{ActorRef, HashRing, InternalMessage, MessageSplitter, Sha256Hash};
use shardwell::shardwell_topology::TokioScheduler;
use shardwell::{ClusterService, FileReplicaStatusSource};
use tokio::signal;
use tracing::{error, info};

use crate::cli::Commands;

/// Execute a CLI command.
pub async fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Lookup {
            nodes,
            key,
            replicas_per_node,
        } => cmd_lookup(&nodes, &key, replicas_per_node),

        Commands::Split {
            nodes,
            receivers,
            buckets,
            actor_system,
            replicas_per_node,
        } => cmd_split(&nodes, &receivers, buckets, &actor_system, replicas_per_node),

        Commands::Watch {
            config,
            status_file,
            max_status_age_secs,
        } => cmd_watch(config, status_file, max_status_age_secs).await,
    }
}

fn build_ring(nodes: &[String], replicas_per_node: usize) -> HashRing {
    HashRing::with_nodes(Arc::new(Sha256Hash), replicas_per_node, nodes.iter().cloned())
}

/// Print the owner of `key`.
fn cmd_lookup(nodes: &[String], key: &str, replicas_per_node: usize) -> Result<()> {
    let ring = build_ring(nodes, replicas_per_node);
    let owner = ring
        .get(key)
        .with_context(|| format!("No owner for '{key}': no nodes given"))?;

    println!("{owner}");
    Ok(())
}

/// Print the bucket groups of a message to `receivers`.
fn cmd_split(
    nodes: &[String],
    receivers: &[String],
    buckets: u32,
    actor_system: &str,
    replicas_per_node: usize,
) -> Result<()> {
    let ring = build_ring(nodes, replicas_per_node);
    let splitter = MessageSplitter::new(buckets).context("Invalid bucket count")?;

    let receivers = receivers
        .iter()
        .map(|id| ActorRef::new(actor_system, id.as_str()))
        .collect();
    let message = InternalMessage::new(None, receivers, Vec::new(), "cli", false)
        .context("Message needs at least one receiver")?;

    let splits = splitter
        .split(&message, &ring)
        .context("Failed to split message")?;

    let groups: serde_json::Map<String, serde_json::Value> = splits
        .iter()
        .map(|(bucket, copy)| {
            let members: Vec<_> = copy
                .receivers()
                .iter()
                .map(|receiver| {
                    json!({
                        "actor": receiver.to_string(),
                        "owner": ring.get(receiver.key()).map(ToString::to_string),
                    })
                })
                .collect();
            (
                bucket.to_string(),
                json!({ "message_id": copy.id().to_string(), "receivers": members }),
            )
        })
        .collect();

    let rendered = serde_json::to_string_pretty(&groups).context("Failed to render JSON")?;
    println!("{rendered}");
    Ok(())
}

/// Follow the status file until Ctrl+C.
async fn cmd_watch(config: PathBuf, status_file: PathBuf, max_status_age_secs: Option<u64>) -> Result<()> {
    let config = ClusterConfig::from_file(&config)
        .with_context(|| format!("Failed to load cluster config from {}", config.display()))?
        .with_env_overrides();
    config.validate().context("Invalid cluster config after environment overrides")?;

    let mut source = FileReplicaStatusSource::new(status_file);
    if let Some(secs) = max_status_age_secs {
        source = source.with_max_age(Duration::from_secs(secs));
    }

    let scheduler = TokioScheduler::current().context("Failed to create scheduler")?;
    let service = ClusterService::new(config, Arc::new(source), Arc::new(scheduler))
        .context("Failed to create cluster service")?;

    let mut topology = service.subscribe();
    let local = service.local_node().clone();

    let mut watch_loop = service.watch_loop();
    let stopper = watch_loop.stopper();
    let mut loop_handle = tokio::spawn(async move { watch_loop.run().await });

    info!(node_id = %local, "Watching replica status. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            changed = topology.changed() => {
                if changed.is_err() {
                    break;
                }
                let size = *topology.borrow_and_update();
                if let Some(size) = size {
                    let ring = service.ring();
                    info!(
                        size,
                        points = ring.point_count(),
                        local_is_member = ring.contains(&local),
                        "Routing table in effect"
                    );
                }
            }
            finished = &mut loop_handle => {
                return finished
                    .context("Watch loop task panicked")?
                    .context("Watch loop failed");
            }
            signal = signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received Ctrl+C, shutting down"),
                    Err(err) => error!("Failed to listen for shutdown signal: {}", err),
                }
                break;
            }
        }
    }

    stopper.stop();
    loop_handle
        .await
        .context("Watch loop task panicked")?
        .context("Watch loop failed")?;

    info!("Stopped");
    Ok(())
}
