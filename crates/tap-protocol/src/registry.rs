//! Channel registry
//!
//! Static bidirectional map between channels and wire identifiers, built once
//! from [`Channel::ALL`].

use std::collections::HashMap;

use crate::channel::Channel;
use crate::error::ProtocolError;
use crate::wire::{ServiceDefinition, WireId};

/// Lookup table between [`Channel`] and [`WireId`]
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    by_wire: HashMap<WireId, Channel>,
}

impl ChannelRegistry {
    /// Build the registry from the fixed channel table
    pub fn new() -> Self {
        let by_wire = Channel::ALL.iter().map(|&c| (c.wire_id(), c)).collect();
        Self { by_wire }
    }

    /// Resolve an inbound wire identifier
    pub fn resolve(&self, wire_id: WireId) -> Result<Channel, ProtocolError> {
        self.by_wire
            .get(&wire_id)
            .copied()
            .ok_or(ProtocolError::UnknownChannel(wire_id))
    }

    /// Wire identifier for a channel
    pub fn wire_id_for(&self, channel: Channel) -> WireId {
        channel.wire_id()
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.by_wire.len()
    }

    /// Whether the registry is empty (never true for the built-in table)
    pub fn is_empty(&self) -> bool {
        self.by_wire.is_empty()
    }

    /// Service definition to hand to the transport
    pub fn service(&self) -> ServiceDefinition {
        ServiceDefinition::tapper()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_every_channel() {
        let registry = ChannelRegistry::new();
        assert_eq!(registry.len(), 21);
        for channel in Channel::ALL {
            let wire = registry.wire_id_for(channel);
            assert_eq!(registry.resolve(wire), Ok(channel));
        }
    }

    #[test]
    fn test_unknown_wire_id() {
        let registry = ChannelRegistry::new();
        let stray = WireId::characteristic(0x3042);
        assert_eq!(
            registry.resolve(stray),
            Err(ProtocolError::UnknownChannel(stray))
        );
        assert!(registry.resolve(WireId(0)).is_err());
    }
}
