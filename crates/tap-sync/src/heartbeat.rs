//! Heartbeat liveness monitor
//!
//! Each follower writes its role byte to the heartbeat channel periodically.
//! A role whose last heartbeat is older than the timeout is *missing*; a
//! role that has never sent one is not reported at all.

use std::time::Duration;

use tap_protocol::Side;
use tokio::time::Instant;

/// Liveness of one role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartbeatState {
    /// Heartbeats arriving within the timeout (or none ever seen)
    #[default]
    Alive,
    /// Last heartbeat older than the timeout
    Missing,
}

impl HeartbeatState {
    /// Check if heartbeats are missing
    pub fn is_missing(&self) -> bool {
        matches!(self, HeartbeatState::Missing)
    }
}

/// Per-role heartbeat bookkeeping
///
/// [`evaluate`](Self::evaluate) reports only transitions, so a role that
/// stays silent is flagged once rather than on every tick.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    timeout: Duration,
    last: [Option<Instant>; 2],
    reported: [HeartbeatState; 2],
}

impl HeartbeatMonitor {
    /// Create a monitor with the given timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last: [None; 2],
            reported: [HeartbeatState::Alive; 2],
        }
    }

    /// Record a heartbeat from `role`
    pub fn record(&mut self, role: Side, now: Instant) {
        self.last[role.index()] = Some(now);
    }

    /// Time the last heartbeat from `role` arrived
    pub fn last_heartbeat(&self, role: Side) -> Option<Instant> {
        self.last[role.index()]
    }

    /// Liveness of `role` at `now`
    pub fn state(&self, role: Side, now: Instant) -> HeartbeatState {
        match self.last[role.index()] {
            Some(last) if now.saturating_duration_since(last) > self.timeout => {
                HeartbeatState::Missing
            }
            _ => HeartbeatState::Alive,
        }
    }

    /// Re-evaluate both roles, returning those whose state changed
    pub fn evaluate(&mut self, now: Instant) -> Vec<(Side, HeartbeatState)> {
        let mut changes = Vec::new();
        for side in Side::BOTH {
            let current = self.state(side, now);
            if current != self.reported[side.index()] {
                self.reported[side.index()] = current;
                changes.push((side, current));
            }
        }
        changes
    }

    /// Last state reported for `role`
    pub fn reported(&self, role: Side) -> HeartbeatState {
        self.reported[role.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(12);

    #[test]
    fn test_never_seen_is_not_missing() {
        let mut monitor = HeartbeatMonitor::new(TIMEOUT);
        let later = Instant::now() + Duration::from_secs(3600);
        assert_eq!(monitor.state(Side::Left, later), HeartbeatState::Alive);
        assert!(monitor.evaluate(later).is_empty());
    }

    #[test]
    fn test_boundary_is_strict() {
        let mut monitor = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();
        monitor.record(Side::Left, t0);

        assert_eq!(
            monitor.state(Side::Left, t0 + Duration::from_secs(12)),
            HeartbeatState::Alive
        );
        assert_eq!(
            monitor.state(Side::Left, t0 + Duration::from_millis(12_010)),
            HeartbeatState::Missing
        );
    }

    #[test]
    fn test_transitions_reported_once() {
        let mut monitor = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();
        monitor.record(Side::Right, t0);

        let late = t0 + Duration::from_secs(13);
        assert_eq!(
            monitor.evaluate(late),
            vec![(Side::Right, HeartbeatState::Missing)]
        );
        assert!(monitor.evaluate(late + Duration::from_secs(1)).is_empty());
        assert!(monitor.reported(Side::Right).is_missing());

        // Recovery
        let back = late + Duration::from_secs(2);
        monitor.record(Side::Right, back);
        assert_eq!(
            monitor.evaluate(back),
            vec![(Side::Right, HeartbeatState::Alive)]
        );
        assert_eq!(monitor.evaluate(back), vec![]);
    }

    #[test]
    fn test_roles_tracked_independently() {
        let mut monitor = HeartbeatMonitor::new(TIMEOUT);
        let t0 = Instant::now();
        monitor.record(Side::Left, t0);
        monitor.record(Side::Right, t0 + Duration::from_secs(10));

        let t = t0 + Duration::from_secs(15);
        assert_eq!(
            monitor.evaluate(t),
            vec![(Side::Left, HeartbeatState::Missing)]
        );
        assert_eq!(monitor.state(Side::Right, t), HeartbeatState::Alive);
        assert_eq!(monitor.last_heartbeat(Side::Right), Some(t0 + Duration::from_secs(10)));
    }
}
