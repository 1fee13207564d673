//! File-backed replica status source.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use shardwell::FileReplicaStatusSource;
use shardwell::shardwell_topology::{
    ChannelTopologyListener, Error, ManualScheduler, ReplicaStatusSnapshot, ReplicaStatusSource,
    TopologyStateMachine,
};

fn write(path: &Path, content: &str) -> bool {
    std::fs::write(path, content).is_ok()
}

#[tokio::test]
async fn given_status_file_when_polled_then_counts_are_read() {
    let Ok(dir) = tempfile::tempdir() else { return };
    let path = dir.path().join("status.json");
    assert!(write(
        &path,
        r#"{"desiredReplicas": 4, "actualReplicas": 3, "readyReplicas": 2}"#
    ));

    let source = FileReplicaStatusSource::new(&path);
    assert_eq!(source.poll().await.ok(), Some(ReplicaStatusSnapshot::new(4, 3, 2)));
}

#[tokio::test]
async fn given_missing_file_when_polled_then_source_unavailable() {
    let Ok(dir) = tempfile::tempdir() else { return };
    let source = FileReplicaStatusSource::new(dir.path().join("absent.json"));

    assert!(matches!(source.poll().await, Err(Error::SourceUnavailable { .. })));
}

#[tokio::test]
async fn given_garbage_file_when_polled_then_source_unavailable() {
    let Ok(dir) = tempfile::tempdir() else { return };
    let path = dir.path().join("status.json");
    assert!(write(&path, "replicas: three"));

    let source = FileReplicaStatusSource::new(&path);
    assert!(matches!(source.poll().await, Err(Error::SourceUnavailable { .. })));
}

#[tokio::test]
async fn given_stale_document_when_max_age_set_then_rejected() {
    let Ok(dir) = tempfile::tempdir() else { return };
    let path = dir.path().join("status.json");
    let observed = Utc::now()
        .checked_sub_signed(TimeDelta::minutes(10))
        .map(|t| t.to_rfc3339())
        .unwrap_or_default();
    assert!(write(
        &path,
        &format!(
            r#"{{"desiredReplicas": 2, "actualReplicas": 2, "readyReplicas": 2, "observedAt": "{observed}"}}"#
        )
    ));

    let strict = FileReplicaStatusSource::new(&path).with_max_age(Duration::from_secs(60));
    assert!(matches!(strict.poll().await, Err(Error::SourceUnavailable { .. })));

    let lenient = FileReplicaStatusSource::new(&path).with_max_age(Duration::from_secs(3600));
    assert_eq!(lenient.poll().await.ok(), Some(ReplicaStatusSnapshot::settled(2)));
}

#[tokio::test]
async fn given_file_updates_when_machine_ticks_then_topology_follows() {
    let Ok(dir) = tempfile::tempdir() else { return };
    let path = dir.path().join("status.json");
    assert!(write(
        &path,
        r#"{"desiredReplicas": 2, "actualReplicas": 2, "readyReplicas": 2}"#
    ));

    let listener = Arc::new(ChannelTopologyListener::new());
    let machine = TopologyStateMachine::new(
        Arc::new(FileReplicaStatusSource::new(&path)),
        Arc::new(ManualScheduler::new()),
        listener.clone(),
        Duration::from_secs(60),
    );

    assert!(machine.tick().await.is_ok());
    assert_eq!(listener.latest(), Some(2));

    assert!(write(
        &path,
        r#"{"desiredReplicas": 3, "actualReplicas": 3, "readyReplicas": 1}"#
    ));
    assert!(machine.tick().await.is_ok());
    assert!(machine.tick().await.is_ok());

    assert_eq!(listener.latest(), Some(3));
    assert_eq!(machine.current_topology(), 3);
}
