//! Link state tracking

use tap_protocol::Side;
use tokio::time::Instant;

/// Transport-assigned identity of one follower connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl LinkId {
    /// Get the raw identity value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Current state of one follower connection
///
/// Records outlive disconnection: the learned role is what lets a later
/// subscribe under the same identity be recognized before any heartbeat.
#[derive(Debug, Clone)]
pub struct Link {
    /// Transport identity
    pub id: LinkId,
    /// Role learned from the first valid heartbeat, never reassigned
    pub role: Option<Side>,
    /// Currently subscribed
    pub connected: bool,
    /// Last heartbeat received from this identity
    pub last_heartbeat: Option<Instant>,
    /// Reconnection attempts since the last successful subscribe
    pub reconnect_attempts: u8,
    /// A replay has been scheduled since the last subscribe
    pub replayed: bool,
}

impl Link {
    /// Create a new, disconnected link with no role
    pub fn new(id: LinkId) -> Self {
        Self {
            id,
            role: None,
            connected: false,
            last_heartbeat: None,
            reconnect_attempts: 0,
            replayed: false,
        }
    }

    /// Format the role for display
    pub fn role_display(&self) -> &'static str {
        match self.role {
            Some(side) => side.name(),
            None => "Unknown",
        }
    }
}
