//! Link registry and reconnection bookkeeping
//!
//! The coordinator owns every [`Link`] record. It decides when a
//! (re)subscribed link needs a state replay and how many recovery attempts a
//! failing link gets. It never sleeps: it returns decisions and the actor
//! schedules the timers.

use std::collections::HashMap;

use tap_protocol::Side;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::state::{Link, LinkId};

/// Result of a subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOutcome {
    /// The link was not connected before
    pub newly_connected: bool,
    /// Role already known for this identity
    pub role: Option<Side>,
    /// A replay should be scheduled
    pub replay: bool,
}

/// Result of a heartbeat from a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// First heartbeat from this identity; the role is now fixed
    RoleLearned {
        /// Learned role
        role: Side,
        /// A replay should be scheduled
        replay: bool,
    },
    /// Heartbeat matched the known role
    Refreshed,
    /// Heartbeat claimed a different role than the one already learned
    RoleConflict {
        /// Role kept for this link
        existing: Side,
    },
}

/// Result of a reconnection request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule attempt number `attempt`
    Scheduled {
        /// Attempt number, starting at 1
        attempt: u8,
    },
    /// Attempts used up; the counter was reset
    Exhausted,
    /// The link has no learned role, nothing to recover to
    UnknownRole,
    /// No record of this link
    UnknownLink,
}

/// Owner of all link records
#[derive(Debug)]
pub struct ReconnectionCoordinator {
    links: HashMap<LinkId, Link>,
    max_attempts: u8,
    replay_on_role_learned: bool,
}

impl ReconnectionCoordinator {
    /// Create a coordinator
    pub fn new(max_attempts: u8, replay_on_role_learned: bool) -> Self {
        Self {
            links: HashMap::new(),
            max_attempts,
            replay_on_role_learned,
        }
    }

    /// A link subscribed
    ///
    /// Subscriptions arrive once per characteristic; only the first one after
    /// a disconnect counts as a (re)connection. Every subscribe clears the
    /// reconnection counter.
    pub fn on_subscribe(&mut self, id: LinkId) -> SubscribeOutcome {
        let link = self.links.entry(id).or_insert_with(|| Link::new(id));
        link.reconnect_attempts = 0;
        if link.connected {
            return SubscribeOutcome {
                newly_connected: false,
                role: link.role,
                replay: false,
            };
        }

        link.connected = true;
        link.replayed = false;

        let replay = link.role.is_some();
        if replay {
            link.replayed = true;
        }

        debug!(
            "{} subscribed (role {}, replay {})",
            id,
            link.role_display(),
            replay
        );

        SubscribeOutcome {
            newly_connected: true,
            role: link.role,
            replay,
        }
    }

    /// A link unsubscribed; returns `true` if it was connected
    ///
    /// The record (and its role) is kept for a later resubscribe.
    pub fn on_unsubscribe(&mut self, id: LinkId) -> bool {
        match self.links.get_mut(&id) {
            Some(link) if link.connected => {
                link.connected = false;
                debug!("{} unsubscribed", id);
                true
            }
            _ => false,
        }
    }

    /// A link wrote a valid heartbeat claiming `role`
    pub fn on_heartbeat(&mut self, id: LinkId, role: Side, now: Instant) -> HeartbeatOutcome {
        let link = self.links.entry(id).or_insert_with(|| Link::new(id));

        match link.role {
            None => {
                link.role = Some(role);
                link.last_heartbeat = Some(now);
                let replay = self.replay_on_role_learned && link.connected && !link.replayed;
                if replay {
                    link.replayed = true;
                }
                info!("{} identified as {}", id, role);
                HeartbeatOutcome::RoleLearned { role, replay }
            }
            Some(existing) if existing == role => {
                link.last_heartbeat = Some(now);
                HeartbeatOutcome::Refreshed
            }
            Some(existing) => {
                warn!(
                    "{} sent {} heartbeat but is registered as {}",
                    id, role, existing
                );
                HeartbeatOutcome::RoleConflict { existing }
            }
        }
    }

    /// Ask for a recovery attempt for `id`
    pub fn request_reconnect(&mut self, id: LinkId) -> ReconnectDecision {
        let Some(link) = self.links.get_mut(&id) else {
            return ReconnectDecision::UnknownLink;
        };
        if link.role.is_none() {
            return ReconnectDecision::UnknownRole;
        }

        if link.reconnect_attempts < self.max_attempts {
            link.reconnect_attempts += 1;
            debug!(
                "Reconnection attempt {}/{} for {}",
                link.reconnect_attempts, self.max_attempts, id
            );
            ReconnectDecision::Scheduled {
                attempt: link.reconnect_attempts,
            }
        } else {
            warn!(
                "Giving up on {} after {} reconnection attempts",
                id, self.max_attempts
            );
            link.reconnect_attempts = 0;
            ReconnectDecision::Exhausted
        }
    }

    /// Role learned for `id`
    pub fn role_of(&self, id: LinkId) -> Option<Side> {
        self.links.get(&id).and_then(|link| link.role)
    }

    /// Check if `id` is currently subscribed
    pub fn is_connected(&self, id: LinkId) -> bool {
        self.links.get(&id).is_some_and(|link| link.connected)
    }

    /// Number of subscribed links
    pub fn connected_count(&self) -> usize {
        self.links.values().filter(|link| link.connected).count()
    }

    /// Record for `id`
    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(&id)
    }

    /// Copy of every record, ordered by identity
    pub fn links(&self) -> Vec<Link> {
        let mut links: Vec<_> = self.links.values().cloned().collect();
        links.sort_by_key(|link| link.id);
        links
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn coordinator() -> ReconnectionCoordinator {
        ReconnectionCoordinator::new(3, true)
    }

    #[test]
    fn test_unknown_subscriber_does_not_replay() {
        let mut coord = coordinator();
        let outcome = coord.on_subscribe(LinkId(1));
        assert!(outcome.newly_connected);
        assert!(!outcome.replay);
        assert_eq!(outcome.role, None);
        assert_eq!(coord.connected_count(), 1);

        // Resubscribe without unsubscribe is not a new connection
        assert!(!coord.on_subscribe(LinkId(1)).newly_connected);
        assert_eq!(coord.connected_count(), 1);
    }

    #[test]
    fn test_per_characteristic_subscribes_replay_once() {
        let mut coord = coordinator();
        coord.on_heartbeat(LinkId(2), Side::Right, Instant::now());
        assert!(coord.on_subscribe(LinkId(2)).replay);
        for _ in 0..20 {
            assert!(!coord.on_subscribe(LinkId(2)).replay);
        }
    }

    #[test]
    fn test_known_role_replays_on_resubscribe() {
        let mut coord = coordinator();
        let now = Instant::now();
        coord.on_heartbeat(LinkId(2), Side::Left, now);
        let outcome = coord.on_subscribe(LinkId(2));
        assert!(outcome.replay);
        assert_eq!(outcome.role, Some(Side::Left));

        assert!(coord.on_unsubscribe(LinkId(2)));
        assert!(!coord.on_unsubscribe(LinkId(2)));
        assert_eq!(coord.role_of(LinkId(2)), Some(Side::Left));
        assert!(coord.on_subscribe(LinkId(2)).replay);
    }

    #[test]
    fn test_role_learned_replays_once_while_connected() {
        let mut coord = coordinator();
        let now = Instant::now();
        coord.on_subscribe(LinkId(3));

        assert_eq!(
            coord.on_heartbeat(LinkId(3), Side::Right, now),
            HeartbeatOutcome::RoleLearned {
                role: Side::Right,
                replay: true
            }
        );
        assert_eq!(
            coord.on_heartbeat(LinkId(3), Side::Right, now),
            HeartbeatOutcome::Refreshed
        );
    }

    #[test]
    fn test_role_never_reassigned() {
        let mut coord = coordinator();
        let now = Instant::now();
        coord.on_heartbeat(LinkId(4), Side::Left, now);
        assert_eq!(
            coord.on_heartbeat(LinkId(4), Side::Right, now),
            HeartbeatOutcome::RoleConflict {
                existing: Side::Left
            }
        );
        assert_eq!(coord.role_of(LinkId(4)), Some(Side::Left));
    }

    #[test]
    fn test_role_learned_without_subscription_does_not_replay() {
        let mut coord = ReconnectionCoordinator::new(3, true);
        assert_eq!(
            coord.on_heartbeat(LinkId(5), Side::Left, Instant::now()),
            HeartbeatOutcome::RoleLearned {
                role: Side::Left,
                replay: false
            }
        );
        assert!(!coord.is_connected(LinkId(5)));
    }

    #[test]
    fn test_replay_on_role_learned_can_be_disabled() {
        let mut coord = ReconnectionCoordinator::new(3, false);
        coord.on_subscribe(LinkId(6));
        assert_eq!(
            coord.on_heartbeat(LinkId(6), Side::Left, Instant::now()),
            HeartbeatOutcome::RoleLearned {
                role: Side::Left,
                replay: false
            }
        );
    }

    #[test]
    fn test_reconnect_attempts_capped_then_reset() {
        let mut coord = coordinator();
        coord.on_heartbeat(LinkId(7), Side::Right, Instant::now());

        assert_eq!(
            coord.request_reconnect(LinkId(7)),
            ReconnectDecision::Scheduled { attempt: 1 }
        );
        assert_eq!(
            coord.request_reconnect(LinkId(7)),
            ReconnectDecision::Scheduled { attempt: 2 }
        );
        assert_eq!(
            coord.request_reconnect(LinkId(7)),
            ReconnectDecision::Scheduled { attempt: 3 }
        );
        assert_eq!(
            coord.request_reconnect(LinkId(7)),
            ReconnectDecision::Exhausted
        );
        assert_eq!(coord.link(LinkId(7)).unwrap().reconnect_attempts, 0);
        assert_eq!(
            coord.request_reconnect(LinkId(7)),
            ReconnectDecision::Scheduled { attempt: 1 }
        );
    }

    #[test]
    fn test_subscribe_resets_attempts() {
        let mut coord = coordinator();
        coord.on_heartbeat(LinkId(8), Side::Left, Instant::now());
        coord.request_reconnect(LinkId(8));
        coord.request_reconnect(LinkId(8));
        coord.on_subscribe(LinkId(8));
        assert_eq!(coord.link(LinkId(8)).unwrap().reconnect_attempts, 0);
    }

    #[test]
    fn test_subscribe_while_connected_resets_attempts() {
        let mut coord = coordinator();
        coord.on_heartbeat(LinkId(10), Side::Left, Instant::now());
        assert!(coord.on_subscribe(LinkId(10)).replay);
        coord.request_reconnect(LinkId(10));
        coord.request_reconnect(LinkId(10));
        assert_eq!(coord.link(LinkId(10)).unwrap().reconnect_attempts, 2);

        let outcome = coord.on_subscribe(LinkId(10));
        assert!(!outcome.newly_connected);
        assert!(!outcome.replay);
        assert_eq!(coord.link(LinkId(10)).unwrap().reconnect_attempts, 0);
    }

    #[test]
    fn test_conflicting_heartbeat_leaves_last_heartbeat() {
        let mut coord = coordinator();
        let start = Instant::now();
        coord.on_heartbeat(LinkId(11), Side::Right, start);

        let later = start + Duration::from_secs(5);
        assert_eq!(
            coord.on_heartbeat(LinkId(11), Side::Left, later),
            HeartbeatOutcome::RoleConflict {
                existing: Side::Right
            }
        );
        assert_eq!(coord.link(LinkId(11)).unwrap().last_heartbeat, Some(start));

        coord.on_heartbeat(LinkId(11), Side::Right, later);
        assert_eq!(coord.link(LinkId(11)).unwrap().last_heartbeat, Some(later));
    }

    #[test]
    fn test_reconnect_requires_role() {
        let mut coord = coordinator();
        assert_eq!(
            coord.request_reconnect(LinkId(9)),
            ReconnectDecision::UnknownLink
        );
        coord.on_subscribe(LinkId(9));
        assert_eq!(
            coord.request_reconnect(LinkId(9)),
            ReconnectDecision::UnknownRole
        );
    }

    #[test]
    fn test_links_sorted() {
        let mut coord = coordinator();
        coord.on_subscribe(LinkId(3));
        coord.on_subscribe(LinkId(1));
        let ids: Vec<_> = coord.links().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![LinkId(1), LinkId(3)]);
    }
}
