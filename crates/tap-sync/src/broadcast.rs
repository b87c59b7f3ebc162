//! Sequenced broadcaster
//!
//! Follower firmware applies settings one characteristic at a time and needs
//! a short settle period between writes. A full state snapshot is therefore
//! sent as a *cascade*: an explicit, ordered list of [`CascadeStep`]s driven
//! by one sequential loop.
//!
//! ```text
//! startStop → tapperOnOff → buzz{flag,intensity,duration}
//!           → light{…} → sound{…} → pressure{…} → speed
//! ```
//!
//! Each step is attempted, retried a bounded number of times on transient
//! failure, and dropped if it never succeeds. A dropped step never blocks the
//! rest of the cascade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tap_protocol::Channel;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::state::LinkId;
use crate::store::StateStore;
use crate::transport::Transport;

/// Channel order required by the follower firmware
pub const CASCADE_ORDER: [Channel; 15] = [
    Channel::StartStop,
    Channel::TapperOnOff,
    Channel::BuzzFlag,
    Channel::BuzzIntensity,
    Channel::BuzzDuration,
    Channel::LightFlag,
    Channel::LightIntensity,
    Channel::LightDuration,
    Channel::SoundFlag,
    Channel::SoundIntensity,
    Channel::SoundDuration,
    Channel::PressureFlag,
    Channel::PressureIntensity,
    Channel::PressureDuration,
    Channel::Speed,
];

/// Who a push or cascade is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CascadeTarget {
    /// Every subscribed link
    All,
    /// One link (used by reconnection replay)
    Link(LinkId),
}

impl CascadeTarget {
    /// Link for unicast targets
    pub fn link(&self) -> Option<LinkId> {
        match self {
            CascadeTarget::All => None,
            CascadeTarget::Link(link) => Some(*link),
        }
    }
}

impl std::fmt::Display for CascadeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CascadeTarget::All => f.write_str("all links"),
            CascadeTarget::Link(link) => write!(f, "{}", link),
        }
    }
}

/// One `(channel, value)` push within a cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    /// Channel to push
    pub channel: Channel,
    /// Value to push
    pub value: u8,
}

/// Ordered list of steps, values captured when the plan is built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadePlan {
    steps: Vec<CascadeStep>,
}

impl CascadePlan {
    /// Full snapshot of the store in firmware order
    pub fn full(store: &StateStore) -> Self {
        Self::channels(store, &CASCADE_ORDER)
    }

    /// Selected channels, in the order given, with their current values
    pub fn channels(store: &StateStore, channels: &[Channel]) -> Self {
        Self {
            steps: channels
                .iter()
                .map(|&channel| CascadeStep {
                    channel,
                    value: store.get(channel),
                })
                .collect(),
        }
    }

    /// Plan from explicit steps
    pub fn from_steps(steps: Vec<CascadeStep>) -> Self {
        Self { steps }
    }

    /// Steps in push order
    pub fn steps(&self) -> &[CascadeStep] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Bounded retry for a single push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first failure
    pub retries: u8,
    /// Wait between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Retry policy for cascade steps
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            retries: config.push_retries,
            delay: config.settle_delay(),
        }
    }

    /// Total attempts before a push is abandoned
    pub fn max_attempts(&self) -> u32 {
        u32::from(self.retries) + 1
    }
}

/// How a single step ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The transport queued the value
    Delivered {
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// Every attempt failed
    Dropped {
        /// Attempts used
        attempts: u32,
        /// Error from the last attempt
        error: TransportError,
    },
}

impl StepOutcome {
    /// Attempts used
    pub fn attempts(&self) -> u32 {
        match self {
            StepOutcome::Delivered { attempts } | StepOutcome::Dropped { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Whether the step was delivered
    pub fn is_delivered(&self) -> bool {
        matches!(self, StepOutcome::Delivered { .. })
    }
}

/// Result of one step within a cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// The step
    pub step: CascadeStep,
    /// How it ended
    pub outcome: StepOutcome,
}

/// Summary of a finished cascade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeReport {
    /// Who the cascade was addressed to
    pub target: CascadeTarget,
    /// Per-step results in push order
    pub results: Vec<StepResult>,
}

impl CascadeReport {
    /// Steps delivered
    pub fn delivered(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome.is_delivered())
            .count()
    }

    /// Steps dropped with their final error
    pub fn dropped(&self) -> impl Iterator<Item = (&CascadeStep, &TransportError)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            StepOutcome::Dropped { error, .. } => Some((&r.step, error)),
            StepOutcome::Delivered { .. } => None,
        })
    }

    /// Number of steps dropped
    pub fn dropped_count(&self) -> usize {
        self.results.len() - self.delivered()
    }

    /// Push attempts across all steps
    pub fn total_attempts(&self) -> u32 {
        self.results.iter().map(|r| r.outcome.attempts()).sum()
    }
}

/// Push one value, retrying on failure
pub async fn push_with_retry(
    transport: &dyn Transport,
    step: CascadeStep,
    target: CascadeTarget,
    policy: RetryPolicy,
) -> StepOutcome {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match transport.push(step.channel, step.value, target.link()) {
            Ok(()) => {
                debug!(
                    "Pushed {}={} to {} (attempt {})",
                    step.channel, step.value, target, attempts
                );
                return StepOutcome::Delivered { attempts };
            }
            Err(error) if attempts >= policy.max_attempts() => {
                warn!(
                    "Dropping {}={} for {} after {} attempts: {}",
                    step.channel, step.value, target, attempts, error
                );
                return StepOutcome::Dropped { attempts, error };
            }
            Err(error) => {
                debug!(
                    "Push {}={} to {} failed (attempt {}): {}",
                    step.channel, step.value, target, attempts, error
                );
                sleep(policy.delay).await;
            }
        }
    }
}

/// Drives cascades against a transport
#[derive(Clone)]
pub struct SequencedBroadcaster {
    transport: Arc<dyn Transport>,
    settle: Duration,
    policy: RetryPolicy,
}

impl SequencedBroadcaster {
    /// Create a broadcaster with explicit timing
    pub fn new(transport: Arc<dyn Transport>, settle: Duration, policy: RetryPolicy) -> Self {
        Self {
            transport,
            settle,
            policy,
        }
    }

    /// Create a broadcaster from engine configuration
    pub fn from_config(transport: Arc<dyn Transport>, config: &SyncConfig) -> Self {
        Self::new(
            transport,
            config.settle_delay(),
            RetryPolicy::from_config(config),
        )
    }

    /// Push a single step with retry
    pub async fn push(&self, step: CascadeStep, target: CascadeTarget) -> StepOutcome {
        push_with_retry(self.transport.as_ref(), step, target, self.policy).await
    }

    /// Run every step of `plan` in order, one settle delay apart
    pub async fn run(&self, plan: &CascadePlan, target: CascadeTarget) -> CascadeReport {
        debug!("Starting {}-step cascade to {}", plan.len(), target);
        let mut results = Vec::with_capacity(plan.len());

        for (index, &step) in plan.steps().iter().enumerate() {
            if index > 0 {
                sleep(self.settle).await;
            }
            let outcome = self.push(step, target).await;
            results.push(StepResult { step, outcome });
        }

        CascadeReport { target, results }
    }
}

impl std::fmt::Debug for SequencedBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequencedBroadcaster")
            .field("transport", &"<transport>")
            .field("settle", &self.settle)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Running cascades, at most one per target
///
/// Each cascade gets a generation number so a completion report from a
/// superseded cascade is not mistaken for the current one.
#[derive(Debug, Default)]
pub(crate) struct CascadeRegistry {
    running: HashMap<CascadeTarget, (u64, JoinHandle<()>)>,
    next_generation: u64,
}

impl CascadeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start a cascade for `target`, aborting any cascade already running for it
    pub(crate) fn start<F>(&mut self, target: CascadeTarget, spawn: F) -> u64
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        self.next_generation += 1;
        let generation = self.next_generation;

        if let Some((previous, handle)) = self.running.remove(&target) {
            if !handle.is_finished() {
                debug!(
                    "Cascade #{} to {} superseded by #{}",
                    previous, target, generation
                );
            }
            handle.abort();
        }

        self.running.insert(target, (generation, spawn(generation)));
        generation
    }

    /// Forget a finished cascade; returns `false` for superseded generations
    pub(crate) fn finish(&mut self, target: CascadeTarget, generation: u64) -> bool {
        match self.running.get(&target) {
            Some((current, _)) if *current == generation => {
                self.running.remove(&target);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    fn is_running(&self, target: CascadeTarget) -> bool {
        self.running.contains_key(&target)
    }

    pub(crate) fn abort_all(&mut self) {
        for (_, (_, handle)) in self.running.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use tap_protocol::ChannelGroup;
    use tokio::time::Instant;

    fn broadcaster(transport: &Arc<RecordingTransport>) -> SequencedBroadcaster {
        SequencedBroadcaster::new(
            transport.clone(),
            Duration::from_millis(10),
            RetryPolicy {
                retries: 3,
                delay: Duration::from_millis(10),
            },
        )
    }

    #[test]
    fn test_order_follows_modalities() {
        let mut expected = vec![Channel::StartStop, Channel::TapperOnOff];
        for group in ChannelGroup::ALL {
            expected.extend(group.channels());
        }
        expected.push(Channel::Speed);
        assert_eq!(CASCADE_ORDER.to_vec(), expected);
    }

    #[test]
    fn test_full_plan_captures_store_values() {
        let store = StateStore::new();
        store.set(Channel::BuzzFlag, 1);
        store.set(Channel::Speed, 33);

        let plan = CascadePlan::full(&store);
        assert_eq!(plan.len(), 15);
        assert_eq!(
            plan.steps()[2],
            CascadeStep {
                channel: Channel::BuzzFlag,
                value: 1
            }
        );
        assert_eq!(plan.steps()[14].value, 33);

        // Later writes don't change an existing plan
        store.set(Channel::Speed, 1);
        assert_eq!(plan.steps()[14].value, 33);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cascade_order_and_spacing() {
        let transport = Arc::new(RecordingTransport::new());
        let store = StateStore::new();
        // Distinct marker per channel
        for (i, channel) in CASCADE_ORDER.iter().enumerate() {
            store.set(*channel, 100 + i as u8);
        }

        let report = broadcaster(&transport)
            .run(&CascadePlan::full(&store), CascadeTarget::All)
            .await;

        assert_eq!(report.delivered(), 15);
        let attempts = transport.attempts();
        let channels: Vec<_> = attempts.iter().map(|a| a.channel).collect();
        assert_eq!(channels, CASCADE_ORDER.to_vec());
        for (i, attempt) in attempts.iter().enumerate() {
            assert_eq!(attempt.value, 100 + i as u8);
        }
        for pair in attempts.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_push_attempted_four_times() {
        let transport = Arc::new(RecordingTransport::new());
        transport.set_failing(Some(TransportError::BufferFull));

        let step = CascadeStep {
            channel: Channel::LightFlag,
            value: 1,
        };
        let outcome = broadcaster(&transport).push(step, CascadeTarget::All).await;

        assert_eq!(
            outcome,
            StepOutcome::Dropped {
                attempts: 4,
                error: TransportError::BufferFull
            }
        );
        assert_eq!(transport.attempts().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_second_attempt_stops_retrying() {
        let transport = Arc::new(RecordingTransport::new());
        transport.fail_next(1);

        let step = CascadeStep {
            channel: Channel::Speed,
            value: 20,
        };
        let start = Instant::now();
        let outcome = broadcaster(&transport).push(step, CascadeTarget::All).await;

        assert_eq!(outcome, StepOutcome::Delivered { attempts: 2 });
        let attempts = transport.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(!attempts[0].ok);
        assert!(attempts[1].ok);
        assert!(attempts[1].at - start >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_step_does_not_block_cascade() {
        let transport = Arc::new(RecordingTransport::new());
        // First step fails all four attempts, the rest succeed
        transport.fail_next(4);

        let store = StateStore::new();
        let report = broadcaster(&transport)
            .run(&CascadePlan::full(&store), CascadeTarget::Link(LinkId(3)))
            .await;

        assert_eq!(report.dropped_count(), 1);
        assert_eq!(report.delivered(), 14);
        assert_eq!(report.total_attempts(), 4 + 14);
        let (step, _) = report.dropped().next().unwrap();
        assert_eq!(step.channel, Channel::StartStop);
        assert!(transport
            .attempts()
            .iter()
            .all(|a| a.target == Some(LinkId(3))));
    }

    #[tokio::test]
    async fn test_registry_supersedes_same_target() {
        let mut registry = CascadeRegistry::new();
        let first = registry.start(CascadeTarget::All, |_| {
            tokio::spawn(async { sleep(Duration::from_secs(60)).await })
        });
        let second = registry.start(CascadeTarget::All, |_| tokio::spawn(async {}));
        let other = registry.start(CascadeTarget::Link(LinkId(1)), |_| tokio::spawn(async {}));

        assert!(second > first);
        assert!(!registry.finish(CascadeTarget::All, first));
        assert!(registry.is_running(CascadeTarget::All));
        assert!(registry.finish(CascadeTarget::All, second));
        assert!(!registry.is_running(CascadeTarget::All));
        assert!(registry.is_running(CascadeTarget::Link(LinkId(1))));
        assert!(registry.finish(CascadeTarget::Link(LinkId(1)), other));
    }
}
