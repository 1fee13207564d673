//! Continuous replica status polling loop.

use std::time::Duration;

use shardwell_core::ClusterConfig;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::machine::TopologyStateMachine;

/// Configuration for the watch loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Interval between polls.
    pub interval: Duration,
    /// Maximum consecutive errors before stopping.
    pub max_errors: usize,
    /// Whether to stop on first error.
    pub stop_on_error: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_errors: 10,
            stop_on_error: false,
        }
    }
}

impl LoopConfig {
    /// Loop settings taken from a cluster config.
    #[must_use]
    pub const fn from_cluster(config: &ClusterConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_errors: config.max_poll_errors,
            stop_on_error: false,
        }
    }
}

/// Polls the machine's source on a fixed cadence.
pub struct TopologyWatchLoop {
    /// The machine fed by this loop.
    machine: TopologyStateMachine,
    /// Loop configuration.
    config: LoopConfig,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl TopologyWatchLoop {
    /// Create a new watch loop.
    #[must_use]
    pub fn new(machine: TopologyStateMachine, config: LoopConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            machine,
            config,
            stop_rx,
            stop_tx,
        }
    }

    /// The machine fed by this loop.
    #[must_use]
    pub const fn machine(&self) -> &TopologyStateMachine {
        &self.machine
    }

    /// Run the loop.
    ///
    /// This runs until stopped or max errors reached.
    ///
    /// # Errors
    ///
    /// Returns the first error when `stop_on_error` is set, otherwise
    /// `Error::MaxErrors` after `max_errors` consecutive failures.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            interval_ms = self.config.interval.as_millis(),
            max_errors = self.config.max_errors,
            "Starting topology watch loop"
        );

        let mut consecutive_errors = 0usize;
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.machine.tick().await {
                        Ok(report) => {
                            consecutive_errors = 0;
                            if !report.changed() {
                                debug!(state = %report.next, "No topology change");
                            }
                        }
                        Err(e) => {
                            consecutive_errors = consecutive_errors.saturating_add(1);
                            error!(
                                error = %e,
                                consecutive = consecutive_errors,
                                "Topology poll error"
                            );

                            if self.config.stop_on_error {
                                return Err(e);
                            }

                            if consecutive_errors >= self.config.max_errors {
                                error!("Max errors reached, stopping loop");
                                return Err(Error::MaxErrors { count: self.config.max_errors });
                            }
                        }
                    }
                }
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        info!("Topology watch loop stopped");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Stop the loop.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Get a stopper handle.
    #[must_use]
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

/// Handle to stop a watch loop.
#[derive(Clone, Debug)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::listener::ChannelTopologyListener;
    use crate::scheduler::ManualScheduler;
    use crate::source::InMemoryReplicaStatusSource;
    use crate::types::{ReplicaStatusSnapshot, TopologyState};

    fn setup(
        source: Arc<InMemoryReplicaStatusSource>,
    ) -> (TopologyStateMachine, Arc<ChannelTopologyListener>) {
        let listener = Arc::new(ChannelTopologyListener::new());
        let machine = TopologyStateMachine::new(
            source,
            Arc::new(ManualScheduler::new()),
            listener.clone(),
            Duration::from_secs(60),
        );
        (machine, listener)
    }

    /// Given a source reporting a settled cluster
    /// When the loop runs
    /// Then the listener sees the initial size
    #[tokio::test(start_paused = true)]
    async fn settled_cluster_is_published() {
        let source = Arc::new(InMemoryReplicaStatusSource::new(ReplicaStatusSnapshot::settled(3)));
        let (machine, listener) = setup(source);
        let mut rx = listener.subscribe();

        let mut watch_loop = TopologyWatchLoop::new(
            machine,
            LoopConfig {
                interval: Duration::from_millis(10),
                ..Default::default()
            },
        );
        let stopper = watch_loop.stopper();
        let handle = tokio::spawn(async move { watch_loop.run().await });

        let seen = tokio::time::timeout(Duration::from_secs(1), rx.changed()).await;
        assert!(matches!(seen, Ok(Ok(()))));
        assert_eq!(*rx.borrow(), Some(3));

        stopper.stop();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    /// Given a source that keeps failing
    /// When the loop runs
    /// Then it stops after max_errors consecutive failures
    #[tokio::test(start_paused = true)]
    async fn repeated_failures_stop_loop() {
        let source = Arc::new(InMemoryReplicaStatusSource::unavailable());
        let (machine, _listener) = setup(source.clone());

        let mut watch_loop = TopologyWatchLoop::new(
            machine,
            LoopConfig {
                interval: Duration::from_millis(10),
                max_errors: 3,
                stop_on_error: false,
            },
        );

        let result = tokio::time::timeout(Duration::from_secs(5), watch_loop.run()).await;

        assert!(matches!(result, Ok(Err(Error::MaxErrors { count: 3 }))));
        assert_eq!(source.poll_count(), 3);
    }

    /// Given a loop configured with stop_on_error=true
    /// When the first poll fails
    /// Then the loop returns that error
    #[tokio::test(start_paused = true)]
    async fn stop_on_error_terminates_on_first_failure() {
        let source = Arc::new(InMemoryReplicaStatusSource::unavailable());
        let (machine, _listener) = setup(source);

        let mut watch_loop = TopologyWatchLoop::new(
            machine,
            LoopConfig {
                interval: Duration::from_millis(10),
                max_errors: 10,
                stop_on_error: true,
            },
        );

        let result = tokio::time::timeout(Duration::from_secs(1), watch_loop.run()).await;
        assert!(matches!(result, Ok(Err(Error::SourceUnavailable { .. }))));
    }

    /// Given a running loop
    /// When the source recovers after failures
    /// Then the error count resets and the machine keeps tracking
    #[tokio::test(start_paused = true)]
    async fn recovery_resets_error_count() {
        let source = Arc::new(InMemoryReplicaStatusSource::unavailable());
        let (machine, _listener) = setup(source.clone());
        let observer = machine.clone();

        let mut watch_loop = TopologyWatchLoop::new(
            machine,
            LoopConfig {
                interval: Duration::from_millis(10),
                max_errors: 3,
                stop_on_error: false,
            },
        );
        let stopper = watch_loop.stopper();
        let handle = tokio::spawn(async move { watch_loop.run().await });

        tokio::time::sleep(Duration::from_millis(15)).await;
        source.set(ReplicaStatusSnapshot::settled(2)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(observer.current_state(), TopologyState::Stable);
        assert_eq!(observer.current_topology(), 2);

        stopper.stop();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[test]
    fn test_loop_config_from_cluster() {
        let cluster = ClusterConfig::new("actors", "actors-0");
        let config = LoopConfig::from_cluster(&cluster);
        assert_eq!(config.interval, Duration::from_millis(1000));
        assert_eq!(config.max_errors, 10);
        assert!(!config.stop_on_error);
    }
}
