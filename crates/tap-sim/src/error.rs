//! Error types for the simulation layer

use tap_sync::LinkId;
use thiserror::Error;

/// Errors reported by simulated devices
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SimError {
    /// The follower task has stopped
    #[error("virtual follower {0} is not running")]
    FollowerStopped(LinkId),
}
