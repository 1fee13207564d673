//! End-to-end behavior of the cluster service: status in, routing out.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::collections::BTreeSet;
use std::sync::Arc;

use shardwell::shardwell_core::ClusterConfig;
use shardwell::shardwell_routing::{ActorRef, InternalMessage, NodeId};
use shardwell::shardwell_topology::{
    InMemoryReplicaStatusSource, ManualScheduler, ReplicaStatusSnapshot, TopologyState,
};
use shardwell::{ClusterService, node_name};

struct Cluster {
    service: ClusterService,
    source: Arc<InMemoryReplicaStatusSource>,
    scheduler: Arc<ManualScheduler>,
}

fn cluster(node_id: &str, replicas: u32) -> Option<Cluster> {
    let source = Arc::new(InMemoryReplicaStatusSource::new(ReplicaStatusSnapshot::settled(replicas)));
    let scheduler = Arc::new(ManualScheduler::new());
    let config = ClusterConfig::new("actors", node_id)
        .replicas_per_node(32)
        .bucket_count(8);
    let service = ClusterService::new(config, source.clone(), scheduler.clone()).ok()?;
    Some(Cluster {
        service,
        source,
        scheduler,
    })
}

fn owners(service: &ClusterService, keys: &[String]) -> Vec<Option<NodeId>> {
    keys.iter().map(|k| service.route(k).ok()).collect()
}

fn keys() -> Vec<String> {
    (0..200).map(|i| format!("actor-{i}")).collect()
}

#[tokio::test]
async fn given_settled_cluster_when_first_polled_then_every_key_routes_to_a_member() {
    let Some(c) = cluster("actors-1", 3) else { return };
    assert!(c.service.machine().tick().await.is_ok());

    let members: BTreeSet<NodeId> = (0..3).map(|i| node_name("actors", i)).collect();
    for key in keys() {
        let owner = c.service.route(&key).ok();
        assert!(owner.is_some_and(|node| members.contains(&node)), "{key} unrouted");
    }
}

#[tokio::test]
async fn given_two_members_when_routing_then_they_agree_on_ownership() {
    let (Some(a), Some(b)) = (cluster("actors-0", 4), cluster("actors-3", 4)) else {
        return;
    };
    assert!(a.service.machine().tick().await.is_ok());
    assert!(b.service.machine().tick().await.is_ok());

    let keys = keys();
    assert_eq!(owners(&a.service, &keys), owners(&b.service, &keys));

    for key in &keys {
        let owned_by_a = b.service.route(key).ok() == Some(node_name("actors", 0));
        assert_eq!(a.service.is_local(key), owned_by_a);
    }
}

#[tokio::test]
async fn given_scale_down_in_progress_when_routing_then_old_table_stays_in_effect() {
    let Some(c) = cluster("actors-0", 5) else { return };
    assert!(c.service.machine().tick().await.is_ok());
    let keys = keys();
    let before = owners(&c.service, &keys);

    c.source.set(ReplicaStatusSnapshot::new(3, 5, 5)).await;
    assert!(c.service.machine().tick().await.is_ok());
    c.source.set(ReplicaStatusSnapshot::new(3, 4, 3)).await;
    assert!(c.service.machine().tick().await.is_ok());

    assert_eq!(c.service.machine().current_state(), TopologyState::ScalingDown);
    assert_eq!(owners(&c.service, &keys), before);
    assert_eq!(c.service.ring().node_count(), 5);
}

#[tokio::test]
async fn given_scale_down_when_settled_then_only_removed_nodes_keys_move() {
    let Some(c) = cluster("actors-0", 5) else { return };
    assert!(c.service.machine().tick().await.is_ok());
    let keys = keys();
    let before = owners(&c.service, &keys);

    c.source.set(ReplicaStatusSnapshot::settled(3)).await;
    assert!(c.service.machine().tick().await.is_ok());
    assert!(c.service.machine().tick().await.is_ok());

    assert_eq!(c.service.machine().current_topology(), 3);
    assert_eq!(*c.service.subscribe().borrow(), Some(3));
    assert_eq!(c.scheduler.pending_count(), 0);

    let removed: BTreeSet<NodeId> = (3..5).map(|i| node_name("actors", i)).collect();
    let after = owners(&c.service, &keys);
    for (old, new) in before.iter().zip(&after) {
        match old {
            Some(owner) if removed.contains(owner) => {
                assert!(new.as_ref().is_some_and(|n| !removed.contains(n)));
            }
            _ => assert_eq!(old, new),
        }
    }
}

#[tokio::test]
async fn given_multi_receiver_message_when_split_then_buckets_partition_receivers() {
    let Some(c) = cluster("actors-0", 3) else { return };
    assert!(c.service.machine().tick().await.is_ok());

    let receivers: Vec<ActorRef> = (0..25).map(|i| ActorRef::new("game", format!("player-{i}"))).collect();
    let Ok(message) = InternalMessage::new(None, receivers.clone(), b"tick".to_vec(), "Tick", false) else {
        return;
    };

    let splits = c.service.split(&message);
    assert!(splits.is_ok());
    let Ok(splits) = splits else { return };

    assert!(splits.len() <= 8);
    let total: usize = splits.values().map(|m| m.receivers().len()).sum();
    assert_eq!(total, receivers.len());
    assert!(splits.values().all(|m| m.id() != message.id()));
}
