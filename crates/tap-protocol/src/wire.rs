//! Wire identifiers and service layout
//!
//! Characteristics are addressed by 128-bit UUIDs. [`WireId`] keeps them as a
//! plain `u128` so they are `Copy`, hashable and cheap to compare.

use std::str::FromStr;

use crate::channel::Channel;
use crate::error::ProtocolError;

/// Base layout shared by every characteristic UUID
const CHARACTERISTIC_BASE: u128 = 0xe322_0000_246e_459b_ae10_5dbe_a099_f9f0;

/// Primary service identifier (`e3223000-9445-4e96-a4a1-85358c4046a2`)
pub const SERVICE_ID: WireId = WireId(0xe322_3000_9445_4e96_a4a1_8535_8c40_46a2);

/// A 128-bit characteristic or service UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WireId(pub u128);

impl WireId {
    /// Build a characteristic UUID from its 16-bit distinguishing field
    pub const fn characteristic(short: u16) -> Self {
        WireId(CHARACTERISTIC_BASE | ((short as u128) << 96))
    }

    /// Get the raw value
    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl std::fmt::Display for WireId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & 0xffff_ffff_ffff
        )
    }
}

impl FromStr for WireId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex: String = s.chars().filter(|c| *c != '-').collect();
        if hex.len() != 32 {
            return Err(ProtocolError::InvalidWireId(s.to_string()));
        }
        u128::from_str_radix(&hex, 16)
            .map(WireId)
            .map_err(|_| ProtocolError::InvalidWireId(s.to_string()))
    }
}

/// GATT access properties of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    /// Centrals may read the current value
    pub read: bool,
    /// Centrals may write a value
    pub write: bool,
    /// Centrals may subscribe to notifications
    pub notify: bool,
}

impl Access {
    /// Read, write and notify
    pub const ALL: Access = Access {
        read: true,
        write: true,
        notify: true,
    };
}

/// One characteristic in the service definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicDef {
    /// Logical channel
    pub channel: Channel,
    /// Characteristic UUID
    pub wire_id: WireId,
    /// Access properties
    pub access: Access,
}

/// Everything a transport needs to publish the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Service UUID
    pub service_id: WireId,
    /// Characteristics in registration order
    pub characteristics: Vec<CharacteristicDef>,
}

impl ServiceDefinition {
    /// The tapper service: all 21 channels, each read/write/notify
    pub fn tapper() -> Self {
        Self {
            service_id: SERVICE_ID,
            characteristics: Channel::ALL
                .iter()
                .map(|&channel| CharacteristicDef {
                    channel,
                    wire_id: channel.wire_id(),
                    access: Access::ALL,
                })
                .collect(),
        }
    }
}
