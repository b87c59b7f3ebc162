//! Tapper Protocol Library
//!
//! This crate describes the GATT service shared between the phone-side
//! controller (peripheral role) and the two wearable followers (central role):
//!
//! - **Channels**: 21 single-byte characteristics, one closed [`Channel`] enum
//! - **Wire identifiers**: the 128-bit characteristic UUIDs, see [`WireId`]
//! - **Registry**: bidirectional lookup between channels and wire identifiers
//! - **Payloads**: decoding of inbound heartbeat and battery writes
//!
//! # Architecture
//!
//! Every channel carries exactly one byte. The same characteristic can be
//! written by either side:
//!
//! - `speed = 25` TO a follower = apply a new cadence
//! - `heartbeat = 1` FROM a follower = "I am the left device and alive"
//! - `battery2 = 73` FROM a follower = right device at 73% charge
//!
//! # Example
//!
//! ```rust
//! use tap_protocol::{Channel, ChannelRegistry, InboundWrite, Side};
//!
//! let registry = ChannelRegistry::new();
//! let wire = registry.wire_id_for(Channel::Heartbeat);
//!
//! let channel = registry.resolve(wire).unwrap();
//! assert_eq!(channel, Channel::Heartbeat);
//!
//! let write = InboundWrite::decode(channel, &[1]);
//! assert_eq!(write, InboundWrite::Heartbeat { role: Side::Left });
//! ```

pub mod channel;
pub mod error;
pub mod payload;
pub mod registry;
pub mod wire;

pub use channel::{Channel, ChannelGroup, ValueRange};
pub use error::ProtocolError;
pub use payload::InboundWrite;
pub use registry::ChannelRegistry;
pub use wire::{Access, CharacteristicDef, ServiceDefinition, WireId, SERVICE_ID};

/// Which physical follower a link or reading belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Side {
    /// Follower worn on the left
    Left,
    /// Follower worn on the right
    Right,
}

impl Side {
    /// Both sides, left first
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// Returns a human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Side::Left => "Left",
            Side::Right => "Right",
        }
    }

    /// The other follower
    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Index for per-side arrays (left = 0, right = 1)
    pub fn index(&self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// Byte carried on the `sideSelect` channel for this side
    pub fn select_byte(&self) -> u8 {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    /// Role announced by a heartbeat byte (1 = left, 2 = right)
    pub fn from_heartbeat(byte: u8) -> Option<Side> {
        match byte {
            1 => Some(Side::Left),
            2 => Some(Side::Right),
            _ => None,
        }
    }

    /// Byte a follower of this role writes as its heartbeat
    pub fn heartbeat_byte(&self) -> u8 {
        match self {
            Side::Left => 1,
            Side::Right => 2,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
