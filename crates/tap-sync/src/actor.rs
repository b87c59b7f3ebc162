//! Sync Actor
//!
//! One task owns all mutable engine state: the link table, heartbeat monitor,
//! battery watchdog, running cascades and the alternation scheduler. Transport
//! events and API calls reach it as [`SyncCommand`]s over one channel, so
//! there is exactly one writer for each piece of link state.
//!
//! # Architecture
//!
//! ```text
//! TransportSink ─┐                       ┌─> Transport::push (cascades, toggles)
//!                ├─> SyncCommand ─> actor ┤
//! SyncContext  ──┘                       └─> broadcast::Sender<SyncEvent>
//! ```
//!
//! Delays never block the actor: cascades, replay timers and reconnection
//! attempts run as spawned tasks that post back through a weak sender.

use std::sync::Arc;

use tap_protocol::payload::battery_channel;
use tap_protocol::{Channel, ChannelRegistry, InboundWrite, Side, WireId};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alternation::AlternationScheduler;
use crate::battery::BatteryWatchdog;
use crate::broadcast::{
    CascadePlan, CascadeRegistry, CascadeReport, CascadeTarget, SequencedBroadcaster,
};
use crate::config::SyncConfig;
use crate::events::SyncEvent;
use crate::heartbeat::{HeartbeatMonitor, HeartbeatState};
use crate::reconnect::{HeartbeatOutcome, ReconnectDecision, ReconnectionCoordinator};
use crate::state::{Link, LinkId};
use crate::store::StateStore;
use crate::transport::{Transport, TransportEvent};

/// Flags cleared while pressure mode is on
const MODALITY_FLAGS: [Channel; 3] = [Channel::BuzzFlag, Channel::LightFlag, Channel::SoundFlag];

/// Snapshot of engine state for presentation
#[derive(Debug, Clone)]
pub struct SyncStatus {
    /// Every known link, ordered by identity
    pub links: Vec<Link>,
    /// Subscribed link count
    pub connected: usize,
    /// Heartbeat state per side, indexed by [`Side::index`]
    pub heartbeat: [HeartbeatState; 2],
    /// Last battery level per side
    pub battery: [Option<u8>; 2],
    /// Battery reading older than the stale window per side
    pub battery_stale: [bool; 2],
    /// Side currently selected by the alternation toggle
    pub side: Side,
    /// Toggle period, if toggling
    pub toggle_interval: Option<Duration>,
    /// Pressure mode active
    pub pressure_mode: bool,
}

impl SyncStatus {
    /// Heartbeat state of `side`
    pub fn heartbeat(&self, side: Side) -> HeartbeatState {
        self.heartbeat[side.index()]
    }

    /// Last battery level of `side`
    pub fn battery(&self, side: Side) -> Option<u8> {
        self.battery[side.index()]
    }

    /// Check if the battery reading for `side` is stale
    pub fn is_battery_stale(&self, side: Side) -> bool {
        self.battery_stale[side.index()]
    }
}

/// Commands sent to the sync actor
#[derive(Debug)]
pub(crate) enum SyncCommand {
    /// Inbound transport event
    Transport(TransportEvent),

    /// Push the current values of `channels` to every link, in order
    PushChannels { channels: Vec<Channel> },

    /// Apply a speed and restart the alternation toggle
    SetSpeed {
        speed: i32,
        response: oneshot::Sender<Duration>,
    },

    /// Enter or leave pressure mode
    SetPressureMode { enabled: bool },

    /// Broadcast the full cascade to every link
    BroadcastAll,

    /// Ask for a reconnection attempt for a link
    RequestReconnect { link: LinkId },

    /// Replay timer fired (internal)
    StartReplay { link: LinkId },

    /// Reconnection delay elapsed (internal)
    ReconnectAttempt { link: LinkId },

    /// A push task finished; `generation` is set for registered cascades (internal)
    CascadeFinished {
        generation: Option<u64>,
        report: CascadeReport,
    },

    /// Query a status snapshot
    QueryStatus {
        response: oneshot::Sender<SyncStatus>,
    },

    /// Shutdown the actor
    Shutdown,
}

/// Internal state for the sync actor
struct SyncActorState {
    config: SyncConfig,
    store: StateStore,
    events: broadcast::Sender<SyncEvent>,
    /// Weak handle to our own queue for timer tasks
    cmd_tx: mpsc::WeakSender<SyncCommand>,
    registry: ChannelRegistry,
    broadcaster: SequencedBroadcaster,
    coordinator: ReconnectionCoordinator,
    heartbeats: HeartbeatMonitor,
    batteries: BatteryWatchdog,
    cascades: CascadeRegistry,
    alternation: AlternationScheduler,
    /// Timers and ad-hoc pushes
    tasks: JoinSet<()>,
    /// Modality flags saved when pressure mode was entered
    pressure_memory: Option<[u8; 3]>,
    /// Last link count reported
    link_count: usize,
}

impl SyncActorState {
    fn new(
        config: SyncConfig,
        transport: Arc<dyn Transport>,
        store: StateStore,
        events: broadcast::Sender<SyncEvent>,
        cmd_tx: mpsc::WeakSender<SyncCommand>,
    ) -> Self {
        Self {
            registry: ChannelRegistry::new(),
            broadcaster: SequencedBroadcaster::from_config(transport.clone(), &config),
            coordinator: ReconnectionCoordinator::new(
                config.max_reconnect_attempts,
                config.replay_on_role_learned,
            ),
            heartbeats: HeartbeatMonitor::new(config.heartbeat_timeout()),
            batteries: BatteryWatchdog::new(
                config.low_battery_threshold,
                config.battery_stale_after(),
                Instant::now(),
            ),
            cascades: CascadeRegistry::new(),
            alternation: AlternationScheduler::new(
                transport,
                store.clone(),
                events.clone(),
                config.toggle_retry_delay(),
            ),
            tasks: JoinSet::new(),
            pressure_memory: None,
            link_count: 0,
            config,
            store,
            events,
            cmd_tx,
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    // -------------------------------------------------------------------------
    // Transport events
    // -------------------------------------------------------------------------

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Write {
                link,
                wire_id,
                payload,
            } => self.handle_write(link, wire_id, &payload),

            TransportEvent::Subscribed { link } => {
                let outcome = self.coordinator.on_subscribe(link);
                if outcome.newly_connected {
                    info!(
                        "{} connected ({})",
                        link,
                        outcome.role.map_or("role unknown", |r| r.name())
                    );
                    self.emit(SyncEvent::LinkConnected {
                        link,
                        role: outcome.role,
                    });
                    self.update_link_count();
                }
                if outcome.replay {
                    self.schedule_replay(link);
                }
            }

            TransportEvent::Unsubscribed { link } => {
                if self.coordinator.on_unsubscribe(link) {
                    info!("{} disconnected", link);
                    self.emit(SyncEvent::LinkDisconnected { link });
                    self.update_link_count();
                }
            }
        }
    }

    fn handle_write(&mut self, link: LinkId, wire_id: WireId, payload: &[u8]) {
        let channel = match self.registry.resolve(wire_id) {
            Ok(channel) => channel,
            Err(e) => {
                debug!("Ignoring write from {}: {}", link, e);
                return;
            }
        };

        match InboundWrite::decode(channel, payload) {
            InboundWrite::Heartbeat { role } => {
                let now = Instant::now();
                match self.coordinator.on_heartbeat(link, role, now) {
                    HeartbeatOutcome::RoleLearned { role, replay } => {
                        self.heartbeats.record(role, now);
                        self.emit(SyncEvent::RoleLearned { link, role });
                        if replay {
                            self.schedule_replay(link);
                        }
                    }
                    HeartbeatOutcome::Refreshed => self.heartbeats.record(role, now),
                    HeartbeatOutcome::RoleConflict { .. } => return,
                }
                self.evaluate_heartbeats(now);
            }

            InboundWrite::UnknownHeartbeat { value } => {
                debug!("Ignoring heartbeat byte {} from {}", value, link);
            }

            InboundWrite::Battery { side, level } => {
                let update = self.batteries.record(side, level, Instant::now());
                self.store.set(battery_channel(side), level);
                debug!("{} battery at {}%", side, level);
                self.emit(SyncEvent::BatteryUpdated { side, level });
                if update.low {
                    warn!("{} battery low: {}%", side, level);
                    self.emit(SyncEvent::LowBattery { side, level });
                }
            }

            InboundWrite::Control { channel, value } => {
                debug!(
                    "Ignoring follower write {}={} from {}",
                    channel, value, link
                );
            }

            InboundWrite::Empty { channel } => {
                debug!("Ignoring empty write to {} from {}", channel, link);
            }
        }
    }

    fn update_link_count(&mut self) {
        let count = self.coordinator.connected_count();
        if count != self.link_count {
            self.link_count = count;
            self.emit(SyncEvent::LinkCountChanged { count });
        }
    }

    // -------------------------------------------------------------------------
    // Liveness
    // -------------------------------------------------------------------------

    fn evaluate_heartbeats(&mut self, now: Instant) {
        for (role, state) in self.heartbeats.evaluate(now) {
            let missing = state.is_missing();
            if missing {
                warn!("{} heartbeat missing", role);
            } else {
                info!("{} heartbeat restored", role);
            }
            self.emit(SyncEvent::HeartbeatMissing { role, missing });
        }
    }

    fn reap_tasks(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    warn!("Sync task panicked: {}", e);
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Replay and reconnection
    // -------------------------------------------------------------------------

    fn schedule_replay(&mut self, link: LinkId) {
        debug!("Replaying state to {} in {:?}", link, self.config.replay_delay());
        self.emit(SyncEvent::ReplayScheduled { link });
        self.post_after(self.config.replay_delay(), SyncCommand::StartReplay { link });
    }

    fn request_reconnect(&mut self, link: LinkId) {
        match self.coordinator.request_reconnect(link) {
            ReconnectDecision::Scheduled { attempt } => {
                info!(
                    "Reconnection attempt {} for {} in {:?}",
                    attempt,
                    link,
                    self.config.reconnect_delay()
                );
                self.emit(SyncEvent::ReconnectionScheduled { link, attempt });
                self.post_after(
                    self.config.reconnect_delay(),
                    SyncCommand::ReconnectAttempt { link },
                );
            }
            ReconnectDecision::Exhausted => {
                self.emit(SyncEvent::ReconnectionExhausted { link });
            }
            ReconnectDecision::UnknownRole => {
                debug!("Not reconnecting {}: role unknown", link);
            }
            ReconnectDecision::UnknownLink => {
                debug!("Not reconnecting {}: no such link", link);
            }
        }
    }

    /// Send `cmd` back to the actor after `delay`
    fn post_after(&mut self, delay: Duration, cmd: SyncCommand) {
        let tx = self.cmd_tx.clone();
        self.tasks.spawn(async move {
            sleep(delay).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(cmd).await;
            }
        });
    }

    // -------------------------------------------------------------------------
    // Outbound pushes
    // -------------------------------------------------------------------------

    /// Start a full-state cascade, superseding any running one for `target`
    fn start_cascade(&mut self, target: CascadeTarget) {
        let plan = CascadePlan::full(&self.store);
        let broadcaster = self.broadcaster.clone();
        let tx = self.cmd_tx.clone();
        self.cascades.start(target, move |generation| {
            tokio::spawn(async move {
                let report = broadcaster.run(&plan, target).await;
                if let Some(tx) = tx.upgrade() {
                    let _ = tx
                        .send(SyncCommand::CascadeFinished {
                            generation: Some(generation),
                            report,
                        })
                        .await;
                }
            })
        });
    }

    /// Push selected channels to every link without touching running cascades
    fn push_channels(&mut self, channels: &[Channel]) {
        let plan = CascadePlan::channels(&self.store, channels);
        if plan.is_empty() {
            return;
        }
        let broadcaster = self.broadcaster.clone();
        let tx = self.cmd_tx.clone();
        self.tasks.spawn(async move {
            let report = broadcaster.run(&plan, CascadeTarget::All).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx
                    .send(SyncCommand::CascadeFinished {
                        generation: None,
                        report,
                    })
                    .await;
            }
        });
    }

    fn finish_cascade(&mut self, generation: Option<u64>, report: CascadeReport) {
        let target = report.target;
        if let Some(generation) = generation {
            if !self.cascades.finish(target, generation) {
                debug!("Discarding report of superseded cascade #{}", generation);
                return;
            }
        }

        for (step, error) in report.dropped() {
            self.emit(SyncEvent::StepDropped {
                target,
                channel: step.channel,
                value: step.value,
                error: error.clone(),
            });
        }

        if generation.is_none() {
            return;
        }

        let delivered = report.delivered();
        let dropped = report.dropped_count();
        info!(
            "Cascade to {} finished: {} delivered, {} dropped",
            target, delivered, dropped
        );
        self.emit(SyncEvent::CascadeCompleted {
            target,
            delivered,
            dropped,
        });

        if let CascadeTarget::Link(link) = target {
            if dropped > 0 {
                self.request_reconnect(link);
            }
        }
    }

    fn set_pressure_mode(&mut self, enabled: bool) {
        if enabled {
            if self.pressure_memory.is_none() {
                self.pressure_memory = Some(MODALITY_FLAGS.map(|c| self.store.get(c)));
            }
            let mut entries: Vec<_> = MODALITY_FLAGS.iter().map(|&c| (c, 0)).collect();
            entries.push((Channel::PressureFlag, 1));
            self.store.set_many(&entries);
            info!("Pressure mode on");
            self.push_channels(&[
                Channel::BuzzFlag,
                Channel::LightFlag,
                Channel::SoundFlag,
                Channel::PressureFlag,
            ]);
        } else {
            let mut entries = vec![(Channel::PressureFlag, 0)];
            if let Some(saved) = self.pressure_memory.take() {
                entries.extend(MODALITY_FLAGS.into_iter().zip(saved));
            }
            self.store.set_many(&entries);
            info!("Pressure mode off");
            self.push_channels(&[
                Channel::PressureFlag,
                Channel::BuzzFlag,
                Channel::LightFlag,
                Channel::SoundFlag,
            ]);
        }
    }

    fn status(&self) -> SyncStatus {
        let now = Instant::now();
        SyncStatus {
            links: self.coordinator.links(),
            connected: self.coordinator.connected_count(),
            heartbeat: Side::BOTH.map(|side| self.heartbeats.state(side, now)),
            battery: Side::BOTH.map(|side| self.batteries.level(side)),
            battery_stale: Side::BOTH.map(|side| self.batteries.is_stale(side, now)),
            side: self.alternation.current_side(),
            toggle_interval: self.alternation.interval(),
            pressure_mode: self.pressure_memory.is_some(),
        }
    }

    fn shutdown(&mut self) {
        self.cascades.abort_all();
        self.tasks.abort_all();
        self.alternation.abort();
    }
}

/// Run the sync actor until shutdown or until every command sender is gone
pub(crate) async fn run_sync_actor(
    config: SyncConfig,
    transport: Arc<dyn Transport>,
    store: StateStore,
    events: broadcast::Sender<SyncEvent>,
    cmd_tx: mpsc::WeakSender<SyncCommand>,
    mut cmd_rx: mpsc::Receiver<SyncCommand>,
) {
    let mut heartbeat_timer = interval(config.heartbeat_tick());
    heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut state = SyncActorState::new(config, transport, store, events, cmd_tx);
    info!("Sync actor started");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break; };
                match cmd {
                    SyncCommand::Transport(event) => state.handle_transport(event),

                    SyncCommand::PushChannels { channels } => state.push_channels(&channels),

                    SyncCommand::SetSpeed { speed, response } => {
                        let period = state.alternation.set_speed(speed).await;
                        let _ = response.send(period);
                    }

                    SyncCommand::SetPressureMode { enabled } => state.set_pressure_mode(enabled),

                    SyncCommand::BroadcastAll => state.start_cascade(CascadeTarget::All),

                    SyncCommand::RequestReconnect { link } => state.request_reconnect(link),

                    SyncCommand::StartReplay { link } => {
                        if state.coordinator.is_connected(link) {
                            state.start_cascade(CascadeTarget::Link(link));
                        } else {
                            debug!("Skipping replay to {}: no longer connected", link);
                        }
                    }

                    SyncCommand::ReconnectAttempt { link } => {
                        state.start_cascade(CascadeTarget::Link(link));
                    }

                    SyncCommand::CascadeFinished { generation, report } => {
                        state.finish_cascade(generation, report);
                    }

                    SyncCommand::QueryStatus { response } => {
                        let _ = response.send(state.status());
                    }

                    SyncCommand::Shutdown => {
                        info!("Sync actor shutting down");
                        break;
                    }
                }
            }

            _ = heartbeat_timer.tick() => {
                state.evaluate_heartbeats(Instant::now());
                state.reap_tasks();
            }
        }
    }

    state.shutdown();
    info!("Sync actor stopped");
}
