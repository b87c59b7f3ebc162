//! Virtual follower
//!
//! A simulated wearable: it keeps the values notified to it, announces its
//! role with periodic heartbeats and reports battery charge. The
//! [`VirtualFollower`] itself is plain state; [`spawn_follower`] wraps it in
//! a task that talks to a [`SimTransport`] and the engine's
//! [`TransportSink`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tap_protocol::payload::battery_channel;
use tap_protocol::{Channel, Side};
use tap_sync::{LinkId, TransportEvent, TransportSink};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::SimError;
use crate::transport::{Notification, SimTransport};

/// Behaviour of a simulated follower
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Period between heartbeats (ms)
    pub heartbeat_interval_ms: u64,
    /// Period between battery reports (ms)
    pub battery_interval_ms: u64,
    /// Initial battery level
    pub battery_level: u8,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            battery_interval_ms: 30_000,
            battery_level: 100,
        }
    }
}

/// Simulated wearable state
#[derive(Debug, Clone)]
pub struct VirtualFollower {
    link: LinkId,
    role: Side,
    battery: u8,
    applied: BTreeMap<Channel, u8>,
}

impl VirtualFollower {
    /// Create a follower with a full battery and nothing applied
    pub fn new(link: LinkId, role: Side) -> Self {
        Self {
            link,
            role,
            battery: 100,
            applied: BTreeMap::new(),
        }
    }

    /// Transport identity
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Role announced in heartbeats
    pub fn role(&self) -> Side {
        self.role
    }

    /// Current battery level
    pub fn battery(&self) -> u8 {
        self.battery
    }

    /// Change the battery level reported next
    pub fn set_battery(&mut self, level: u8) {
        self.battery = level.min(100);
    }

    /// Apply a notification; returns `false` if it was for another link
    pub fn apply(&mut self, notification: &Notification) -> bool {
        if notification.link != self.link {
            return false;
        }
        self.applied.insert(notification.channel, notification.value);
        true
    }

    /// Last value applied for `channel`
    pub fn value(&self, channel: Channel) -> Option<u8> {
        self.applied.get(&channel).copied()
    }

    /// Every value applied so far
    pub fn applied(&self) -> &BTreeMap<Channel, u8> {
        &self.applied
    }

    /// Heartbeat write announcing this follower's role
    pub fn heartbeat_write(&self) -> TransportEvent {
        TransportEvent::Write {
            link: self.link,
            wire_id: Channel::Heartbeat.wire_id(),
            payload: vec![self.role.heartbeat_byte()],
        }
    }

    /// Battery write on this follower's battery channel
    pub fn battery_write(&self) -> TransportEvent {
        TransportEvent::Write {
            link: self.link,
            wire_id: battery_channel(self.role).wire_id(),
            payload: vec![self.battery],
        }
    }
}

/// Commands that can be sent to a follower task
#[derive(Debug)]
pub enum FollowerCommand {
    /// Subscribe to every characteristic
    Connect,
    /// Drop the connection
    Disconnect,
    /// Stop or resume heartbeats
    SetHeartbeat(bool),
    /// Send a heartbeat now
    Heartbeat,
    /// Change the battery level and report it now
    SetBattery(u8),
    /// Query the applied values
    QueryApplied {
        /// Channel to send back the values
        response: oneshot::Sender<BTreeMap<Channel, u8>>,
    },
    /// Shutdown the follower task
    Shutdown,
}

/// Event emitted when a follower applies a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerStateEvent {
    /// Follower link
    pub link: LinkId,
    /// Channel applied
    pub channel: Channel,
    /// Value applied
    pub value: u8,
}

/// Run a follower task until shutdown
///
/// The task owns the [`VirtualFollower`] and processes:
/// 1. Notifications delivered by the transport
/// 2. Commands from the command channel
/// 3. Heartbeat and battery timers while connected
pub async fn run_follower_task(
    mut follower: VirtualFollower,
    transport: Arc<SimTransport>,
    sink: TransportSink,
    config: FollowerConfig,
    mut cmd_rx: mpsc::Receiver<FollowerCommand>,
    state_tx: broadcast::Sender<FollowerStateEvent>,
) {
    let link = follower.link();
    let mut notifications = transport.notifications();
    let mut connected = false;
    let mut heartbeats = true;

    let heartbeat_period = Duration::from_millis(config.heartbeat_interval_ms.max(1));
    let battery_period = Duration::from_millis(config.battery_interval_ms.max(1));
    let mut heartbeat_timer = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
    heartbeat_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut battery_timer = interval_at(Instant::now() + battery_period, battery_period);
    battery_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Starting virtual {} follower on {}", follower.role(), link);

    loop {
        tokio::select! {
            notification = notifications.recv() => {
                match notification {
                    Ok(notification) => {
                        if follower.apply(&notification) {
                            let _ = state_tx.send(FollowerStateEvent {
                                link,
                                channel: notification.channel,
                                value: notification.value,
                            });
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Virtual follower {} missed {} notifications", link, missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("Command channel closed for virtual follower {}", link);
                    break;
                };
                let result = match cmd {
                    FollowerCommand::Connect => {
                        connected = true;
                        transport.subscribe_link(link);
                        connect(&sink, link).await
                    }
                    FollowerCommand::Disconnect => {
                        connected = false;
                        transport.unsubscribe_link(link);
                        sink.on_unsubscribe(link).await
                    }
                    FollowerCommand::SetHeartbeat(enabled) => {
                        heartbeats = enabled;
                        Ok(())
                    }
                    FollowerCommand::Heartbeat => sink.deliver(follower.heartbeat_write()).await,
                    FollowerCommand::SetBattery(level) => {
                        follower.set_battery(level);
                        sink.deliver(follower.battery_write()).await
                    }
                    FollowerCommand::QueryApplied { response } => {
                        let _ = response.send(follower.applied().clone());
                        Ok(())
                    }
                    FollowerCommand::Shutdown => {
                        info!("Shutdown requested for virtual follower {}", link);
                        break;
                    }
                };
                if let Err(e) = result {
                    warn!("Virtual follower {} lost the engine: {}", link, e);
                    break;
                }
            }

            _ = heartbeat_timer.tick(), if connected && heartbeats => {
                if sink.deliver(follower.heartbeat_write()).await.is_err() {
                    break;
                }
            }

            _ = battery_timer.tick(), if connected => {
                if sink.deliver(follower.battery_write()).await.is_err() {
                    break;
                }
            }
        }
    }

    info!("Virtual follower task ended for {}", link);
}

/// Subscriptions arrive once per characteristic
async fn connect(sink: &TransportSink, link: LinkId) -> Result<(), tap_sync::SyncError> {
    for _ in Channel::ALL {
        sink.on_subscribe(link).await?;
    }
    Ok(())
}

/// Handle to a running follower task
#[derive(Debug)]
pub struct FollowerHandle {
    link: LinkId,
    role: Side,
    cmd_tx: mpsc::Sender<FollowerCommand>,
    state_tx: broadcast::Sender<FollowerStateEvent>,
    task: JoinHandle<()>,
}

/// Spawn a follower task
pub fn spawn_follower(
    follower: VirtualFollower,
    transport: Arc<SimTransport>,
    sink: TransportSink,
    config: FollowerConfig,
) -> FollowerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (state_tx, _) = broadcast::channel(256);
    let link = follower.link();
    let role = follower.role();
    let mut follower = follower;
    follower.set_battery(config.battery_level);

    let task = tokio::spawn(run_follower_task(
        follower,
        transport,
        sink,
        config,
        cmd_rx,
        state_tx.clone(),
    ));

    FollowerHandle {
        link,
        role,
        cmd_tx,
        state_tx,
        task,
    }
}

impl FollowerHandle {
    /// Transport identity
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Role announced in heartbeats
    pub fn role(&self) -> Side {
        self.role
    }

    /// Listen for applied values
    pub fn subscribe(&self) -> broadcast::Receiver<FollowerStateEvent> {
        self.state_tx.subscribe()
    }

    async fn send(&self, cmd: FollowerCommand) -> Result<(), SimError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SimError::FollowerStopped(self.link))
    }

    /// Subscribe to every characteristic
    pub async fn connect(&self) -> Result<(), SimError> {
        self.send(FollowerCommand::Connect).await
    }

    /// Drop the connection
    pub async fn disconnect(&self) -> Result<(), SimError> {
        self.send(FollowerCommand::Disconnect).await
    }

    /// Stop or resume periodic heartbeats
    pub async fn set_heartbeat(&self, enabled: bool) -> Result<(), SimError> {
        self.send(FollowerCommand::SetHeartbeat(enabled)).await
    }

    /// Send a heartbeat now
    pub async fn heartbeat(&self) -> Result<(), SimError> {
        self.send(FollowerCommand::Heartbeat).await
    }

    /// Report a battery level now
    pub async fn set_battery(&self, level: u8) -> Result<(), SimError> {
        self.send(FollowerCommand::SetBattery(level)).await
    }

    /// Values applied so far
    pub async fn applied(&self) -> Result<BTreeMap<Channel, u8>, SimError> {
        let (response, rx) = oneshot::channel();
        self.send(FollowerCommand::QueryApplied { response }).await?;
        rx.await.map_err(|_| SimError::FollowerStopped(self.link))
    }

    /// Stop the task and wait for it
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(FollowerCommand::Shutdown).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_write_carries_role_byte() {
        let follower = VirtualFollower::new(LinkId(1), Side::Right);
        match follower.heartbeat_write() {
            TransportEvent::Write {
                link,
                wire_id,
                payload,
            } => {
                assert_eq!(link, LinkId(1));
                assert_eq!(wire_id, Channel::Heartbeat.wire_id());
                assert_eq!(payload, vec![2]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_battery_write_uses_role_channel() {
        let mut follower = VirtualFollower::new(LinkId(1), Side::Left);
        follower.set_battery(150);
        assert_eq!(follower.battery(), 100);
        follower.set_battery(42);
        match follower.battery_write() {
            TransportEvent::Write {
                wire_id, payload, ..
            } => {
                assert_eq!(wire_id, Channel::Battery1.wire_id());
                assert_eq!(payload, vec![42]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_apply_ignores_other_links() {
        let mut follower = VirtualFollower::new(LinkId(1), Side::Left);
        assert!(!follower.apply(&Notification {
            link: LinkId(2),
            channel: Channel::Speed,
            value: 10
        }));
        assert!(follower.apply(&Notification {
            link: LinkId(1),
            channel: Channel::Speed,
            value: 10
        }));
        assert_eq!(follower.value(Channel::Speed), Some(10));
        assert_eq!(follower.value(Channel::BuzzFlag), None);
    }
}
