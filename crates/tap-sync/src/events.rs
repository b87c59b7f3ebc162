//! Event stream for presentation and persistence layers
//!
//! Everything the engine wants the outside world to know about is emitted as
//! a [`SyncEvent`] on one broadcast channel. Listeners register through
//! [`SyncContext::subscribe`](crate::SyncContext::subscribe).

use tap_protocol::{Channel, Side};

use crate::broadcast::CascadeTarget;
use crate::error::TransportError;
use crate::state::LinkId;

/// Unified event enum for all engine activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    // -------------------------------------------------------------------------
    // Link lifecycle events
    // -------------------------------------------------------------------------
    /// Number of subscribed links changed
    LinkCountChanged {
        /// Links currently subscribed
        count: usize,
    },

    /// A link subscribed
    LinkConnected {
        /// Link identity
        link: LinkId,
        /// Role, if already known for this identity
        role: Option<Side>,
    },

    /// A link unsubscribed
    LinkDisconnected {
        /// Link identity
        link: LinkId,
    },

    /// A heartbeat revealed a link's role for the first time
    RoleLearned {
        /// Link identity
        link: LinkId,
        /// Learned role
        role: Side,
    },

    // -------------------------------------------------------------------------
    // Liveness events
    // -------------------------------------------------------------------------
    /// A role's heartbeat went missing or came back
    HeartbeatMissing {
        /// Role concerned
        role: Side,
        /// `true` when heartbeats stopped, `false` when they resumed
        missing: bool,
    },

    /// A battery reading arrived
    BatteryUpdated {
        /// Follower reporting
        side: Side,
        /// Charge percentage
        level: u8,
    },

    /// A battery reading was at or below the low-battery threshold
    LowBattery {
        /// Follower reporting
        side: Side,
        /// Charge percentage
        level: u8,
    },

    // -------------------------------------------------------------------------
    // Synchronization events
    // -------------------------------------------------------------------------
    /// A state replay to a link has been scheduled
    ReplayScheduled {
        /// Link to replay to
        link: LinkId,
    },

    /// A reconnection attempt has been scheduled
    ReconnectionScheduled {
        /// Link being recovered
        link: LinkId,
        /// Attempt number, starting at 1
        attempt: u8,
    },

    /// A link ran out of reconnection attempts
    ReconnectionExhausted {
        /// Abandoned link
        link: LinkId,
    },

    /// A cascade finished (possibly with dropped steps)
    CascadeCompleted {
        /// Cascade target
        target: CascadeTarget,
        /// Steps delivered
        delivered: usize,
        /// Steps dropped after exhausting retries
        dropped: usize,
    },

    /// A push was abandoned after exhausting its retries
    StepDropped {
        /// Push target
        target: CascadeTarget,
        /// Channel that was not delivered
        channel: Channel,
        /// Value that was not delivered
        value: u8,
        /// Last transport error
        error: TransportError,
    },

    /// The alternation scheduler flipped sides
    SideChanged {
        /// Side that fires next
        side: Side,
    },
}

impl SyncEvent {
    /// Check if this is a link lifecycle event
    pub fn is_link_lifecycle(&self) -> bool {
        matches!(
            self,
            SyncEvent::LinkCountChanged { .. }
                | SyncEvent::LinkConnected { .. }
                | SyncEvent::LinkDisconnected { .. }
                | SyncEvent::RoleLearned { .. }
        )
    }

    /// Check if this event should be surfaced to the user as a warning
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            SyncEvent::LowBattery { .. }
                | SyncEvent::HeartbeatMissing { missing: true, .. }
                | SyncEvent::ReconnectionExhausted { .. }
        )
    }

    /// Get the link if this event is associated with a specific link
    pub fn link(&self) -> Option<LinkId> {
        match self {
            SyncEvent::LinkConnected { link, .. }
            | SyncEvent::LinkDisconnected { link }
            | SyncEvent::RoleLearned { link, .. }
            | SyncEvent::ReplayScheduled { link }
            | SyncEvent::ReconnectionScheduled { link, .. }
            | SyncEvent::ReconnectionExhausted { link } => Some(*link),
            SyncEvent::CascadeCompleted { target, .. } | SyncEvent::StepDropped { target, .. } => {
                target.link()
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_classification() {
        assert!(SyncEvent::LowBattery {
            side: Side::Left,
            level: 5
        }
        .is_alert());
        assert!(SyncEvent::HeartbeatMissing {
            role: Side::Right,
            missing: true
        }
        .is_alert());
        assert!(!SyncEvent::HeartbeatMissing {
            role: Side::Right,
            missing: false
        }
        .is_alert());
        assert!(!SyncEvent::LinkCountChanged { count: 2 }.is_alert());
        assert!(SyncEvent::LinkCountChanged { count: 2 }.is_link_lifecycle());
    }

    #[test]
    fn test_link_extraction() {
        let event = SyncEvent::StepDropped {
            target: CascadeTarget::Link(LinkId(4)),
            channel: Channel::Speed,
            value: 25,
            error: TransportError::BufferFull,
        };
        assert_eq!(event.link(), Some(LinkId(4)));

        let event = SyncEvent::CascadeCompleted {
            target: CascadeTarget::All,
            delivered: 15,
            dropped: 0,
        };
        assert_eq!(event.link(), None);
        assert_eq!(
            SyncEvent::ReconnectionExhausted { link: LinkId(9) }.link(),
            Some(LinkId(9))
        );
    }
}
