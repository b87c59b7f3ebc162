//! Speed-to-alternation scheduler
//!
//! The followers take turns: a repeating toggle writes the side that should
//! fire next to `sideSelect`. Speed sets the toggle period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tap_protocol::{Channel, Side};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::events::SyncEvent;
use crate::store::StateStore;
use crate::transport::Transport;

/// Toggle period for a speed in `0..=50`
///
/// `(1200 - speed * 1000 / 50)` milliseconds in integer arithmetic: 1.2 s at
/// speed 0 down to 200 ms at speed 50.
pub fn toggle_interval(speed: u8) -> Duration {
    let speed = u64::from(speed.min(50));
    Duration::from_millis(1200 - speed * 1000 / 50)
}

/// Owns the repeating side-toggle task
pub struct AlternationScheduler {
    transport: Arc<dyn Transport>,
    store: StateStore,
    events: broadcast::Sender<SyncEvent>,
    retry_delay: Duration,
    /// `true` while the right side is selected
    right: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    interval: Option<Duration>,
}

impl AlternationScheduler {
    /// Create an idle scheduler; the left side is selected initially
    pub fn new(
        transport: Arc<dyn Transport>,
        store: StateStore,
        events: broadcast::Sender<SyncEvent>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            transport,
            store,
            events,
            retry_delay,
            right: Arc::new(AtomicBool::new(false)),
            task: None,
            interval: None,
        }
    }

    /// Apply a new speed and restart the toggle at the matching period
    ///
    /// The previous toggle task is fully stopped before the new one starts,
    /// so two toggles never run concurrently.
    pub async fn set_speed(&mut self, speed: i32) -> Duration {
        let speed = Channel::Speed.clamp_value(speed);
        self.store.set(Channel::Speed, speed);
        if let Err(e) = self.transport.push(Channel::Speed, speed, None) {
            debug!("Speed push failed: {}", e);
        }

        self.stop().await;

        let period = toggle_interval(speed);
        debug!("Speed {} -> toggling every {:?}", speed, period);
        self.interval = Some(period);
        self.task = Some(tokio::spawn(run_toggle(
            self.transport.clone(),
            self.store.clone(),
            self.events.clone(),
            self.right.clone(),
            period,
            self.retry_delay,
        )));
        period
    }

    /// Stop toggling
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        self.interval = None;
    }

    /// Abort the toggle without waiting for it to wind down
    pub fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.interval = None;
    }

    /// Side currently selected
    pub fn current_side(&self) -> Side {
        if self.right.load(Ordering::SeqCst) {
            Side::Right
        } else {
            Side::Left
        }
    }

    /// Current toggle period, if toggling
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Check if a toggle task is running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for AlternationScheduler {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn run_toggle(
    transport: Arc<dyn Transport>,
    store: StateStore,
    events: broadcast::Sender<SyncEvent>,
    right: Arc<AtomicBool>,
    period: Duration,
    retry_delay: Duration,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let now_right = !right.fetch_xor(true, Ordering::SeqCst);
        let side = if now_right { Side::Right } else { Side::Left };
        let value = side.select_byte();
        store.set(Channel::SideSelect, value);

        if transport.push(Channel::SideSelect, value, None).is_err() {
            sleep(retry_delay).await;
            if let Err(e) = transport.push(Channel::SideSelect, value, None) {
                warn!("Side toggle to {} not delivered: {}", side, e);
            }
        }

        let _ = events.send(SyncEvent::SideChanged { side });
    }
}
