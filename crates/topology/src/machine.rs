//! The topology state machine.
//!
//! Turns a stream of replica snapshots into confirmed topology sizes. Each
//! step validates the snapshot, asks [`processor::process`] what to do,
//! commits the resulting view, arms or disarms the delayed re-check, and
//! finally notifies the listener with the step lock released. Listener
//! calls happen in commit order; a stale size is never delivered after a
//! newer one.
//!
//! The delayed re-check exists because the platform may stop reporting
//! changes once a scale operation stalls. When it fires, the machine polls
//! again (falling back to the last snapshot it saw) and keeps re-arming
//! until the state is `Stable`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shardwell_core::{OptionExt, ResultExt};
use tracing::{debug, info, warn};

use crate::data::{StateMachineData, TopologyView};
use crate::error::Result;
use crate::listener::TopologyListener;
use crate::processor::{self, Effect};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::source::ReplicaStatusSource;
use crate::types::{ReplicaStatusSnapshot, TopologyState};

/// What one processing step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionReport {
    /// State before the step.
    pub previous: TopologyState,
    /// State after the step.
    pub next: TopologyState,
    /// Topology size after the step.
    pub topology: u32,
    /// Size announced to the listener, if any.
    pub notified: Option<u32>,
}

impl TransitionReport {
    /// Check whether the state changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.next
    }
}

/// Serialized part of the machine.
#[derive(Debug, Default)]
struct StepState {
    last_observed: Option<ReplicaStatusSnapshot>,
    recheck: Option<TaskHandle>,
    /// Bumped on every commit that announces a size.
    generation: u64,
}

struct Inner {
    data: StateMachineData,
    source: Arc<dyn ReplicaStatusSource>,
    scheduler: Arc<dyn Scheduler>,
    listener: Arc<dyn TopologyListener>,
    recheck_delay: Duration,
    step: Mutex<StepState>,
    /// Generation of the last size handed to the listener.
    delivered: Mutex<u64>,
}

/// Cluster topology state machine.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TopologyStateMachine {
    inner: Arc<Inner>,
}

impl TopologyStateMachine {
    /// Create an uninitialized machine.
    #[must_use]
    pub fn new(
        source: Arc<dyn ReplicaStatusSource>,
        scheduler: Arc<dyn Scheduler>,
        listener: Arc<dyn TopologyListener>,
        recheck_delay: Duration,
    ) -> Self {
        Self::from_data(StateMachineData::new(), source, scheduler, listener, recheck_delay)
    }

    /// Create a machine resuming from existing data.
    #[must_use]
    pub fn from_data(
        data: StateMachineData,
        source: Arc<dyn ReplicaStatusSource>,
        scheduler: Arc<dyn Scheduler>,
        listener: Arc<dyn TopologyListener>,
        recheck_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                data,
                source,
                scheduler,
                listener,
                recheck_delay,
                step: Mutex::new(StepState::default()),
                delivered: Mutex::new(0),
            }),
        }
    }

    /// Shared machine data.
    #[must_use]
    pub fn data(&self) -> &StateMachineData {
        &self.inner.data
    }

    /// Whole current view.
    #[must_use]
    pub fn view(&self) -> Arc<TopologyView> {
        self.inner.data.view()
    }

    /// Current state.
    #[must_use]
    pub fn current_state(&self) -> TopologyState {
        self.inner.data.current_state()
    }

    /// Current topology size. 0 until [`Self::is_initialized`].
    #[must_use]
    pub fn current_topology(&self) -> u32 {
        self.inner.data.current_topology()
    }

    /// Check whether a stable size has been established.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.data.is_initialized()
    }

    /// Check whether a delayed re-check is armed.
    #[must_use]
    pub fn recheck_pending(&self) -> bool {
        self.inner.step.lock().recheck.is_some()
    }

    /// Delay used for the re-check.
    #[must_use]
    pub fn recheck_delay(&self) -> Duration {
        self.inner.recheck_delay
    }

    /// Poll the source once and process the result.
    ///
    /// # Errors
    ///
    /// Returns the source error, or `Error::MalformedSnapshot`. Neither
    /// changes state.
    pub async fn tick(&self) -> Result<TransitionReport> {
        let snapshot = self.inner.source.poll().await.warn_on_err("poll replica status")?;
        self.process(snapshot)
    }

    /// Process one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedSnapshot` if the snapshot is inconsistent.
    pub fn process(&self, snapshot: ReplicaStatusSnapshot) -> Result<TransitionReport> {
        let snapshot = snapshot.validate().map_err(|e| {
            warn!(%snapshot, error = %e, "Ignoring malformed replica status");
            e
        })?;
        Ok(Inner::step(&self.inner, snapshot, false))
    }

    /// Run the delayed re-check now.
    ///
    /// Normally called by the scheduler; exposed for embedding.
    pub async fn recheck(&self) -> Option<TransitionReport> {
        Inner::recheck(&self.inner, None).await
    }
}

impl std::fmt::Debug for TopologyStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyStateMachine")
            .field("view", &self.inner.data.view())
            .field("recheck_delay", &self.inner.recheck_delay)
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Decide, commit, schedule, then notify outside the lock.
    ///
    /// `rearm` is set by the re-check task: it re-arms the timer when the
    /// machine is still scaling after the step.
    fn step(this: &Arc<Self>, snapshot: ReplicaStatusSnapshot, rearm: bool) -> TransitionReport {
        let (report, notify) = {
            let mut step = this.step.lock();
            step.last_observed = Some(snapshot);

            let view = this.data.view();
            let decision = processor::process(&view, &snapshot);
            this.data.commit(decision.next);

            let notify = match decision.effect {
                Effect::None => None,
                Effect::ScheduleRecheck => {
                    Self::arm_recheck(this, &mut step);
                    None
                }
                Effect::CancelRecheckAndNotify(size) => {
                    if let Some(handle) = step.recheck.take() {
                        this.scheduler.cancel(&handle);
                    }
                    step.generation = step.generation.saturating_add(1);
                    Some((size, step.generation))
                }
            };

            if rearm && decision.next.state.is_scaling() && step.recheck.is_none() {
                Self::arm_recheck(this, &mut step);
            }

            let report = TransitionReport {
                previous: view.state,
                next: decision.next.state,
                topology: decision.next.topology,
                notified: notify.map(|(size, _)| size),
            };
            (report, notify)
        };

        if report.changed() {
            info!(
                from = %report.previous,
                to = %report.next,
                topology = report.topology,
                %snapshot,
                "Topology state changed"
            );
        } else {
            debug!(state = %report.next, %snapshot, "Topology unchanged");
        }

        if let Some((size, generation)) = notify {
            Self::deliver(this, size, generation);
        }

        report
    }

    /// Hand `size` to the listener unless a later commit already did.
    ///
    /// Deliveries are serialized on their own lock, separate from the step
    /// lock. A size older than the last delivered one is dropped. The
    /// listener must not feed snapshots back into the machine.
    fn deliver(this: &Arc<Self>, size: u32, generation: u64) {
        let mut delivered = this.delivered.lock();
        if *delivered > generation {
            debug!(new_size = size, generation, "Superseded topology notification dropped");
            return;
        }
        *delivered = generation;

        info!(new_size = size, generation, "Topology confirmed");
        this.listener
            .on_topology_change(size)
            .ok_or_log("notify topology listener");
    }

    fn arm_recheck(this: &Arc<Self>, step: &mut StepState) {
        if let Some(previous) = step.recheck.take() {
            this.scheduler.cancel(&previous);
        }

        // Filled in below, while the step lock is still held; the task reads
        // it only after taking the same lock.
        let slot: Arc<Mutex<Option<TaskHandle>>> = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(this);
        let task_slot = Arc::clone(&slot);
        let handle = this.scheduler.schedule_once(
            this.recheck_delay,
            Box::pin(async move {
                if let Some(this) = weak.upgrade() {
                    Self::recheck(&this, Some(task_slot)).await;
                }
            }),
        );
        *slot.lock() = Some(handle);
        step.recheck = Some(handle);

        debug!(
            task_id = %handle.id(),
            delay_secs = this.recheck_delay.as_secs(),
            "Re-check armed"
        );
    }

    async fn recheck(
        this: &Arc<Self>,
        fired: Option<Arc<Mutex<Option<TaskHandle>>>>,
    ) -> Option<TransitionReport> {
        {
            let mut step = this.step.lock();
            let fired = fired.map(|slot| *slot.lock());
            match (fired, step.recheck) {
                // Fired by the timer we armed: it is spent now.
                (Some(Some(f)), Some(armed)) if f.id() == armed.id() => step.recheck = None,
                // A stale timer that lost a race with cancel.
                (Some(_), _) => return None,
                // Manual re-check: leave the armed timer alone.
                (None, _) => {}
            }
        }

        let snapshot = this
            .source
            .poll()
            .await
            .and_then(ReplicaStatusSnapshot::validate)
            .warn_on_err("re-check poll")
            .ok()
            .or_else(|| this.step.lock().last_observed)
            .tap_none(|| warn!("No replica status observed yet, re-check stays armed"));

        match snapshot {
            Some(snapshot) => Some(Self::step(this, snapshot, true)),
            None => {
                let mut step = this.step.lock();
                if step.recheck.is_none() {
                    Self::arm_recheck(this, &mut step);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::scheduler::ManualScheduler;
    use crate::source::InMemoryReplicaStatusSource;

    #[derive(Default)]
    struct Recorder {
        sizes: Mutex<Vec<u32>>,
    }

    impl TopologyListener for Recorder {
        fn on_topology_change(&self, new_size: u32) -> Result<()> {
            self.sizes.lock().push(new_size);
            Ok(())
        }
    }

    struct Fixture {
        machine: TopologyStateMachine,
        source: Arc<InMemoryReplicaStatusSource>,
        scheduler: Arc<ManualScheduler>,
        listener: Arc<Recorder>,
    }

    fn fixture(initial: ReplicaStatusSnapshot) -> Fixture {
        let source = Arc::new(InMemoryReplicaStatusSource::new(initial));
        let scheduler = Arc::new(ManualScheduler::new());
        let listener = Arc::new(Recorder::default());
        let machine = TopologyStateMachine::new(
            source.clone(),
            scheduler.clone(),
            listener.clone(),
            Duration::from_secs(60),
        );
        Fixture {
            machine,
            source,
            scheduler,
            listener,
        }
    }

    fn snap(desired: u32, actual: u32, ready: u32) -> ReplicaStatusSnapshot {
        ReplicaStatusSnapshot::new(desired, actual, ready)
    }

    #[tokio::test]
    async fn test_first_converged_snapshot_initializes() {
        let f = fixture(snap(3, 3, 3));
        let report = f.machine.tick().await;

        assert_eq!(report.ok().and_then(|r| r.notified), Some(3));
        assert_eq!(f.machine.current_topology(), 3);
        assert!(f.machine.is_initialized());
        assert_eq!(*f.listener.sizes.lock(), vec![3]);
        assert_eq!(f.scheduler.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_unconverged_start_stays_uninitialized() {
        let f = fixture(snap(3, 2, 2));
        assert!(f.machine.tick().await.is_ok());
        assert!(!f.machine.view().is_initialized());
        assert!(!f.machine.is_initialized());
        assert!(f.listener.sizes.lock().is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_keeps_state() {
        let f = fixture(snap(5, 5, 5));
        assert!(f.machine.tick().await.is_ok());

        f.source.make_unavailable().await;
        let result = f.machine.tick().await;

        assert!(matches!(result, Err(Error::SourceUnavailable { .. })));
        assert_eq!(f.machine.current_state(), TopologyState::Stable);
        assert_eq!(f.machine.current_topology(), 5);
    }

    #[test]
    fn test_malformed_snapshot_ignored() {
        let f = fixture(snap(5, 5, 5));
        assert!(f.machine.process(snap(5, 5, 5)).is_ok());

        let result = f.machine.process(snap(3, 2, 4));

        assert!(matches!(result, Err(Error::MalformedSnapshot { .. })));
        assert_eq!(f.machine.current_state(), TopologyState::Stable);
        assert_eq!(f.scheduler.scheduled_count(), 0);
    }

    #[test]
    fn test_entering_scaling_arms_recheck_once() {
        let f = fixture(snap(5, 5, 5));
        assert!(f.machine.process(snap(5, 5, 5)).is_ok());

        assert!(f.machine.process(snap(7, 5, 5)).is_ok());
        assert!(f.machine.process(snap(7, 6, 5)).is_ok());

        assert_eq!(f.machine.current_state(), TopologyState::ScalingUp);
        assert_eq!(f.scheduler.scheduled_count(), 1);
        assert_eq!(f.scheduler.pending_delays(), vec![Duration::from_secs(60)]);
        assert!(f.machine.recheck_pending());
    }

    #[tokio::test]
    async fn test_recheck_settles_stalled_scale_up() {
        let f = fixture(snap(5, 5, 5));
        assert!(f.machine.tick().await.is_ok());
        assert!(f.machine.process(snap(7, 5, 5)).is_ok());

        // Platform finished but no tick observed it.
        f.source.set(snap(7, 7, 7)).await;
        assert_eq!(f.scheduler.fire_all().await, 1);

        assert_eq!(f.machine.current_state(), TopologyState::Stable);
        assert_eq!(f.machine.current_topology(), 7);
        assert_eq!(*f.listener.sizes.lock(), vec![5, 7]);
        assert!(!f.machine.recheck_pending());
        assert_eq!(f.scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_recheck_rearms_while_scaling() {
        let f = fixture(snap(5, 5, 5));
        assert!(f.machine.tick().await.is_ok());
        assert!(f.machine.process(snap(3, 5, 5)).is_ok());

        f.source.set(snap(3, 4, 4)).await;
        assert_eq!(f.scheduler.fire_all().await, 1);

        assert_eq!(f.machine.current_state(), TopologyState::ScalingDown);
        assert_eq!(f.scheduler.pending_count(), 1);
        assert_eq!(f.scheduler.scheduled_count(), 2);
    }

    #[tokio::test]
    async fn test_recheck_falls_back_to_last_observed() {
        let f = fixture(snap(5, 5, 5));
        assert!(f.machine.tick().await.is_ok());
        assert!(f.machine.process(snap(3, 5, 5)).is_ok());
        assert!(f.machine.process(snap(3, 3, 3)).is_ok());
        assert_eq!(f.machine.current_state(), TopologyState::Stable);

        // Stable again: re-check was cancelled.
        assert_eq!(f.scheduler.cancelled_count(), 1);

        assert!(f.machine.process(snap(6, 3, 3)).is_ok());
        f.source.make_unavailable().await;
        assert_eq!(f.scheduler.fire_all().await, 1);

        assert_eq!(f.machine.current_state(), TopologyState::ScalingUp);
        assert_eq!(f.scheduler.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_manual_recheck_keeps_armed_timer() {
        let f = fixture(snap(5, 5, 5));
        assert!(f.machine.tick().await.is_ok());
        assert!(f.machine.process(snap(7, 5, 5)).is_ok());

        f.source.set(snap(7, 6, 6)).await;
        let report = f.machine.recheck().await;

        assert_eq!(report.map(|r| r.next), Some(TopologyState::ScalingUp));
        assert_eq!(f.scheduler.scheduled_count(), 1);
        assert!(f.machine.recheck_pending());
    }

    #[test]
    fn test_listener_failure_does_not_roll_back() {
        let source = Arc::new(InMemoryReplicaStatusSource::new(snap(4, 4, 4)));
        let failing = |_size: u32| -> Result<()> { Err(Error::listener_failed("ring rebuild failed")) };
        let machine = TopologyStateMachine::new(
            source,
            Arc::new(ManualScheduler::new()),
            Arc::new(failing),
            Duration::from_secs(1),
        );

        let report = machine.process(snap(4, 4, 4));

        assert_eq!(report.ok().and_then(|r| r.notified), Some(4));
        assert_eq!(machine.current_topology(), 4);
        assert_eq!(machine.current_state(), TopologyState::Stable);
    }

    #[test]
    fn test_dropped_machine_recheck_is_noop() {
        let scheduler = Arc::new(ManualScheduler::new());
        {
            let machine = TopologyStateMachine::new(
                Arc::new(InMemoryReplicaStatusSource::new(snap(2, 2, 2))),
                scheduler.clone(),
                Arc::new(ChannelStub),
                Duration::from_secs(1),
            );
            assert!(machine.process(snap(2, 2, 2)).is_ok());
            assert!(machine.process(snap(4, 2, 2)).is_ok());
        }
        assert_eq!(scheduler.pending_count(), 1);
        let rt = tokio::runtime::Builder::new_current_thread().build();
        assert!(rt.is_ok());
        if let Ok(rt) = rt {
            assert_eq!(rt.block_on(scheduler.fire_all()), 1);
        }
    }

    struct ChannelStub;

    impl TopologyListener for ChannelStub {
        fn on_topology_change(&self, _new_size: u32) -> Result<()> {
            Ok(())
        }
    }
}
