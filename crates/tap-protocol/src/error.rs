//! Error types for channel lookup and payload decoding

use thiserror::Error;

use crate::wire::WireId;

/// Errors raised while mapping wire data onto the channel table
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Wire identifier is not part of the service
    #[error("unknown channel: {0}")]
    UnknownChannel(WireId),

    /// Logical channel name is not part of the table
    #[error("unknown channel name: {0}")]
    UnknownChannelName(String),

    /// Text could not be parsed as a UUID
    #[error("invalid wire identifier: {0}")]
    InvalidWireId(String),
}
