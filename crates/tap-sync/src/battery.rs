//! Battery watchdog

use std::time::Duration;

use tap_protocol::Side;
use tokio::time::Instant;

/// Latest reading from one follower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryReading {
    /// Charge percentage
    pub level: u8,
    /// When it arrived
    pub last_update: Instant,
}

/// Outcome of recording a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryUpdate {
    /// Follower reporting
    pub side: Side,
    /// Charge percentage
    pub level: u8,
    /// Level at or below the low-battery threshold
    pub low: bool,
}

/// Tracks battery levels and their freshness per side
#[derive(Debug, Clone)]
pub struct BatteryWatchdog {
    threshold: u8,
    stale_after: Duration,
    started: Instant,
    readings: [Option<BatteryReading>; 2],
}

impl BatteryWatchdog {
    /// Create a watchdog; staleness before any reading counts from `started`
    pub fn new(threshold: u8, stale_after: Duration, started: Instant) -> Self {
        Self {
            threshold,
            stale_after,
            started,
            readings: [None; 2],
        }
    }

    /// Record a reading
    ///
    /// Every reading at or below the threshold is flagged low, so repeated
    /// low readings alert repeatedly.
    pub fn record(&mut self, side: Side, level: u8, now: Instant) -> BatteryUpdate {
        self.readings[side.index()] = Some(BatteryReading {
            level,
            last_update: now,
        });
        BatteryUpdate {
            side,
            level,
            low: level <= self.threshold,
        }
    }

    /// Latest reading for `side`
    pub fn reading(&self, side: Side) -> Option<BatteryReading> {
        self.readings[side.index()]
    }

    /// Latest level for `side`
    pub fn level(&self, side: Side) -> Option<u8> {
        self.reading(side).map(|r| r.level)
    }

    /// No reading for `side` within the stale window
    pub fn is_stale(&self, side: Side, now: Instant) -> bool {
        let since = self
            .reading(side)
            .map_or(self.started, |reading| reading.last_update);
        now.saturating_duration_since(since) > self.stale_after
    }
}
