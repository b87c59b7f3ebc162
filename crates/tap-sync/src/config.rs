//! Engine configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and threshold configuration for the sync engine
///
/// All durations are stored in milliseconds so the struct serializes to the
/// same shape as the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pause between cascade steps and between retries of one step (ms)
    pub settle_delay_ms: u64,
    /// Additional attempts after a failed push
    pub push_retries: u8,
    /// Heartbeat silence after which a role is reported missing (ms)
    pub heartbeat_timeout_ms: u64,
    /// Period of the heartbeat evaluation tick (ms)
    pub heartbeat_tick_ms: u64,
    /// Wait between a known link subscribing and its replay (ms)
    pub replay_delay_ms: u64,
    /// Wait before a reconnection attempt re-sends state (ms)
    pub reconnect_delay_ms: u64,
    /// Reconnection attempts before a link is abandoned
    pub max_reconnect_attempts: u8,
    /// Wait before the single retry of a failed side toggle (ms)
    pub toggle_retry_delay_ms: u64,
    /// Battery level at or below which a low-battery event is raised
    pub low_battery_threshold: u8,
    /// Battery silence after which a reading counts as stale (ms)
    pub battery_stale_ms: u64,
    /// Replay state to a connected link as soon as a heartbeat reveals its role
    pub replay_on_role_learned: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 10,
            push_retries: 3,
            heartbeat_timeout_ms: 12_000,
            heartbeat_tick_ms: 1_000,
            replay_delay_ms: 100,
            reconnect_delay_ms: 1_000,
            max_reconnect_attempts: 3,
            toggle_retry_delay_ms: 3,
            low_battery_threshold: 10,
            battery_stale_ms: 10_000,
            replay_on_role_learned: true,
        }
    }
}

impl SyncConfig {
    /// Settle delay between cascade steps
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Heartbeat timeout
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Heartbeat evaluation period
    pub fn heartbeat_tick(&self) -> Duration {
        Duration::from_millis(self.heartbeat_tick_ms.max(1))
    }

    /// Delay before replaying state to a resubscribed link
    pub fn replay_delay(&self) -> Duration {
        Duration::from_millis(self.replay_delay_ms)
    }

    /// Delay before a reconnection attempt
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Delay before retrying a failed side toggle
    pub fn toggle_retry_delay(&self) -> Duration {
        Duration::from_millis(self.toggle_retry_delay_ms)
    }

    /// Battery freshness window
    pub fn battery_stale_after(&self) -> Duration {
        Duration::from_millis(self.battery_stale_ms)
    }
}
