//! Error types for the sync engine

use thiserror::Error;

use crate::state::LinkId;
use crate::transport::TransportEvent;

/// Errors reported by a [`Transport`](crate::Transport)
///
/// Push failures are transient: the broadcaster retries them and drops the
/// step once the retry budget is spent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No central is subscribed to the characteristic
    #[error("no subscribed link")]
    NoSubscribers,

    /// The outgoing notification queue is full
    #[error("outgoing buffer full")]
    BufferFull,

    /// The targeted link is not currently subscribed
    #[error("link {0} is not subscribed")]
    LinkNotSubscribed(LinkId),

    /// The radio is not powered on or the service is not published
    #[error("transport not ready")]
    NotReady,

    /// Service registration was rejected
    #[error("service registration failed: {0}")]
    Registration(String),
}

/// Errors that can occur in the sync engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// The actor task has stopped and no longer accepts commands
    #[error("sync actor is not running")]
    ActorClosed,

    /// The command queue is full; the undelivered event is handed back
    #[error("sync command queue full")]
    Busy(TransportEvent),

    /// Transport error
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Settings could not be loaded or stored
    #[error("settings error: {0}")]
    Settings(String),
}
