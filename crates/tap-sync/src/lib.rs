//! Tapper Link Sync Engine
//!
//! This crate keeps two wearable followers consistent with the controller's
//! canonical state and watches over their links:
//!
//! - **StateStore**: canonical `channel → byte` mapping shared with the API
//! - **SequencedBroadcaster**: ordered, paced cascades with bounded retry
//! - **HeartbeatMonitor**: per-role liveness from periodic heartbeat writes
//! - **ReconnectionCoordinator**: link table, replay on resubscribe, capped recovery
//! - **AlternationScheduler**: speed-driven left/right toggle
//! - **BatteryWatchdog**: battery levels, low-battery alerts and freshness
//!
//! # Architecture
//!
//! A single actor task owns all link state. The transport delivers inbound
//! writes and subscription changes through a [`TransportSink`]; the
//! application drives the engine through a [`SyncContext`] and listens to
//! [`SyncEvent`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tap_protocol::Channel;
//! use tap_sync::{SyncConfig, SyncContext};
//!
//! let ctx = SyncContext::start(SyncConfig::default(), transport, settings)?;
//! let sink = ctx.transport_sink(); // hand to the GATT peripheral
//! let mut events = ctx.subscribe();
//!
//! ctx.set_channel(Channel::BuzzFlag, 1).await?;
//! ctx.set_running(true).await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if event.is_alert() {
//!         println!("{:?}", event);
//!     }
//! }
//! ```

mod actor;
pub mod alternation;
pub mod battery;
pub mod broadcast;
pub mod config;
mod context;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod reconnect;
pub mod settings;
pub mod state;
pub mod store;
pub mod transport;

pub use actor::SyncStatus;
pub use alternation::{toggle_interval, AlternationScheduler};
pub use battery::{BatteryReading, BatteryUpdate, BatteryWatchdog};
pub use broadcast::{
    push_with_retry, CascadePlan, CascadeReport, CascadeStep, CascadeTarget, RetryPolicy,
    SequencedBroadcaster, StepOutcome, StepResult, CASCADE_ORDER,
};
pub use config::SyncConfig;
pub use context::SyncContext;
pub use error::{SyncError, TransportError};
pub use events::SyncEvent;
pub use heartbeat::{HeartbeatMonitor, HeartbeatState};
pub use reconnect::{HeartbeatOutcome, ReconnectDecision, ReconnectionCoordinator, SubscribeOutcome};
pub use settings::{CachedSettings, SettingsProvider};
pub use state::{Link, LinkId};
pub use store::StateStore;
pub use transport::{Transport, TransportEvent, TransportSink};

#[cfg(test)]
pub(crate) mod testing {
    //! In-crate test doubles

    use std::sync::Mutex;

    use tap_protocol::{Channel, ServiceDefinition};
    use tokio::time::Instant;

    use crate::error::{SyncError, TransportError};
    use crate::settings::{CachedSettings, SettingsProvider};
    use crate::state::LinkId;
    use crate::transport::Transport;

    /// One push attempt seen by [`RecordingTransport`]
    #[derive(Debug, Clone)]
    pub struct Attempt {
        pub at: Instant,
        pub channel: Channel,
        pub value: u8,
        pub target: Option<LinkId>,
        pub ok: bool,
    }

    #[derive(Debug, Default)]
    struct Inner {
        attempts: Vec<Attempt>,
        fail_next: u32,
        failing: Option<TransportError>,
        reject_registration: bool,
        registered: usize,
    }

    /// Transport that records every push and fails on request
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        inner: Mutex<Inner>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail the next `n` pushes with `BufferFull`
        pub fn fail_next(&self, n: u32) {
            self.inner.lock().unwrap().fail_next = n;
        }

        /// Fail every push with `error` until cleared
        pub fn set_failing(&self, error: Option<TransportError>) {
            self.inner.lock().unwrap().failing = error;
        }

        pub fn reject_registration(&self) {
            self.inner.lock().unwrap().reject_registration = true;
        }

        pub fn registered_characteristics(&self) -> usize {
            self.inner.lock().unwrap().registered
        }

        pub fn attempts(&self) -> Vec<Attempt> {
            self.inner.lock().unwrap().attempts.clone()
        }

        pub fn delivered(&self) -> Vec<Attempt> {
            self.attempts().into_iter().filter(|a| a.ok).collect()
        }
    }

    impl Transport for RecordingTransport {
        fn register_service(&self, service: &ServiceDefinition) -> Result<(), TransportError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.reject_registration {
                return Err(TransportError::Registration("rejected".to_string()));
            }
            inner.registered = service.characteristics.len();
            Ok(())
        }

        fn push(
            &self,
            channel: Channel,
            value: u8,
            target: Option<LinkId>,
        ) -> Result<(), TransportError> {
            let mut inner = self.inner.lock().unwrap();
            let result = if let Some(error) = inner.failing.clone() {
                Err(error)
            } else if inner.fail_next > 0 {
                inner.fail_next -= 1;
                Err(TransportError::BufferFull)
            } else {
                Ok(())
            };
            inner.attempts.push(Attempt {
                at: Instant::now(),
                channel,
                value,
                target,
                ok: result.is_ok(),
            });
            result
        }
    }

    /// Settings held in memory
    #[derive(Debug, Default)]
    pub struct TestSettings {
        stored: Mutex<Option<CachedSettings>>,
    }

    impl TestSettings {
        pub fn put(&self, settings: CachedSettings) {
            *self.stored.lock().unwrap() = Some(settings);
        }

        pub fn stored(&self) -> Option<CachedSettings> {
            *self.stored.lock().unwrap()
        }
    }

    impl SettingsProvider for TestSettings {
        fn load(&self) -> Option<CachedSettings> {
            self.stored()
        }

        fn save(&self, settings: &CachedSettings) -> Result<(), SyncError> {
            self.put(*settings);
            Ok(())
        }
    }
}
