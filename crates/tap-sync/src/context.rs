//! Engine façade
//!
//! [`SyncContext`] is the one object an application holds. It owns the
//! command channel to the sync actor, the shared [`StateStore`] and the event
//! broadcast. Tearing the engine down is explicit: [`SyncContext::shutdown`].

use std::sync::Arc;
use std::time::Duration;

use tap_protocol::{Channel, ServiceDefinition};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::actor::{run_sync_actor, SyncCommand, SyncStatus};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::SyncEvent;
use crate::settings::{CachedSettings, SettingsProvider};
use crate::state::{Link, LinkId};
use crate::store::StateStore;
use crate::transport::{Transport, TransportSink};

/// Command queue depth
const COMMAND_CAPACITY: usize = 256;

/// Event broadcast depth; slow listeners lag rather than block the engine
const EVENT_CAPACITY: usize = 256;

/// Handle to a running sync engine
pub struct SyncContext {
    cmd_tx: mpsc::Sender<SyncCommand>,
    store: StateStore,
    events: broadcast::Sender<SyncEvent>,
    settings: Arc<dyn SettingsProvider>,
    config: SyncConfig,
    actor: Option<JoinHandle<()>>,
}

impl SyncContext {
    /// Publish the tapper service on `transport` and start the sync actor
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Result<Self, SyncError> {
        let service = ServiceDefinition::tapper();
        transport.register_service(&service)?;
        info!(
            "Registered service {} with {} characteristics",
            service.service_id,
            service.characteristics.len()
        );

        let store = StateStore::new();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);

        let actor = tokio::spawn(run_sync_actor(
            config.clone(),
            transport,
            store.clone(),
            events.clone(),
            cmd_tx.downgrade(),
            cmd_rx,
        ));

        Ok(Self {
            cmd_tx,
            store,
            events,
            settings,
            config,
            actor: Some(actor),
        })
    }

    /// Sink the transport uses to deliver inbound events
    pub fn transport_sink(&self) -> TransportSink {
        TransportSink::new(self.cmd_tx.clone())
    }

    /// Register an event listener
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Shared state store
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Engine configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Check if the actor still accepts commands
    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    async fn send(&self, cmd: SyncCommand) -> Result<(), SyncError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SyncError::ActorClosed)
    }

    /// Set one channel and push it to every link
    ///
    /// The value is clamped to the channel's range; the stored value is
    /// returned. Speed goes through the alternation scheduler.
    pub async fn set_channel(&self, channel: Channel, value: i32) -> Result<u8, SyncError> {
        if channel == Channel::Speed {
            self.set_speed(value).await?;
            return Ok(self.store.get(Channel::Speed));
        }

        let value = channel.clamp_value(value);
        self.store.set(channel, value);
        debug!("Set {}={}", channel, value);
        self.send(SyncCommand::PushChannels {
            channels: vec![channel],
        })
        .await?;
        Ok(value)
    }

    /// Set speed, push it, and restart the side toggle; returns the toggle period
    pub async fn set_speed(&self, speed: i32) -> Result<Duration, SyncError> {
        let (response, rx) = oneshot::channel();
        self.send(SyncCommand::SetSpeed { speed, response }).await?;
        rx.await.map_err(|_| SyncError::ActorClosed)
    }

    /// Start or stop a session and broadcast the full state
    pub async fn set_running(&self, running: bool) -> Result<(), SyncError> {
        let flag = u8::from(running);
        self.store
            .set_many(&[(Channel::StartStop, flag), (Channel::TapperOnOff, flag)]);
        info!("Session {}", if running { "started" } else { "stopped" });
        self.broadcast_all().await
    }

    /// Enter or leave pressure mode
    pub async fn set_pressure_mode(&self, enabled: bool) -> Result<(), SyncError> {
        self.send(SyncCommand::SetPressureMode { enabled }).await
    }

    /// Broadcast the full cascade to every link
    pub async fn broadcast_all(&self) -> Result<(), SyncError> {
        self.send(SyncCommand::BroadcastAll).await
    }

    /// Apply cached settings, stop any session, and broadcast the result
    ///
    /// Returns the settings applied, if usable ones were found.
    pub async fn send_initial_state(&self) -> Result<Option<CachedSettings>, SyncError> {
        let cached = self.cached_settings();
        if let Some(settings) = &cached {
            settings.apply_to(&self.store);
            debug!("Applied cached settings: {:?}", settings);
        }
        self.store
            .set_many(&[(Channel::StartStop, 0), (Channel::TapperOnOff, 0)]);
        self.broadcast_all().await?;
        Ok(cached)
    }

    /// Store and broadcast the fixed hardware test pattern
    pub async fn send_test_pattern(&self) -> Result<(), SyncError> {
        self.store.set_many(&[
            (Channel::StartStop, 1),
            (Channel::TapperOnOff, 1),
            (Channel::BuzzFlag, 1),
            (Channel::BuzzIntensity, 127),
            (Channel::BuzzDuration, 2),
            (Channel::LightFlag, 1),
            (Channel::LightIntensity, 127),
            (Channel::LightDuration, 2),
            (Channel::SoundFlag, 1),
            (Channel::SoundIntensity, 127),
            (Channel::SoundDuration, 2),
            (Channel::PressureFlag, 0),
            (Channel::PressureIntensity, 2),
            (Channel::PressureDuration, 2),
            (Channel::Speed, 25),
        ]);
        info!("Sending test pattern");
        self.broadcast_all().await
    }

    /// Ask for a reconnection attempt for `link`
    pub async fn request_reconnect(&self, link: LinkId) -> Result<(), SyncError> {
        self.send(SyncCommand::RequestReconnect { link }).await
    }

    /// Saved settings, if usable ones exist
    pub fn cached_settings(&self) -> Option<CachedSettings> {
        self.settings.load().filter(CachedSettings::is_usable)
    }

    /// Save speed and intensities from the store
    pub fn persist_settings(&self) -> Result<CachedSettings, SyncError> {
        let settings = CachedSettings::from_store(&self.store);
        self.settings.save(&settings)?;
        debug!("Saved settings: {:?}", settings);
        Ok(settings)
    }

    /// Snapshot of links, liveness and batteries
    pub async fn status(&self) -> Result<SyncStatus, SyncError> {
        let (response, rx) = oneshot::channel();
        self.send(SyncCommand::QueryStatus { response }).await?;
        rx.await.map_err(|_| SyncError::ActorClosed)
    }

    /// Snapshot of the link table
    pub async fn links(&self) -> Result<Vec<Link>, SyncError> {
        Ok(self.status().await?.links)
    }

    /// Stop the actor and every task it started
    pub async fn shutdown(mut self) {
        let _ = self.cmd_tx.send(SyncCommand::Shutdown).await;
        if let Some(actor) = self.actor.take() {
            let _ = actor.await;
        }
    }
}

impl Drop for SyncContext {
    fn drop(&mut self) {
        if self.actor.is_some() {
            let _ = self.cmd_tx.try_send(SyncCommand::Shutdown);
        }
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish()
    }
}
