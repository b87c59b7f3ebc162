//! Inbound write decoding
//!
//! Followers write to three channels: `heartbeat` to announce their role and
//! liveness, and `battery1`/`battery2` to report charge. Writes to any other
//! channel are carried through as [`InboundWrite::Control`] and have no effect
//! on the controller.

use crate::channel::Channel;
use crate::Side;

/// Meaning of a single inbound characteristic write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundWrite {
    /// Heartbeat identifying the writer's role
    Heartbeat {
        /// Role announced by the follower
        role: Side,
    },
    /// Heartbeat byte that identifies no role
    UnknownHeartbeat {
        /// Raw byte received
        value: u8,
    },
    /// Battery telemetry
    Battery {
        /// Follower the reading belongs to
        side: Side,
        /// Remaining charge, clamped to `0..=100`
        level: u8,
    },
    /// Write to a control channel
    Control {
        /// Target channel
        channel: Channel,
        /// Raw byte received
        value: u8,
    },
    /// Write without any payload
    Empty {
        /// Target channel
        channel: Channel,
    },
}

impl InboundWrite {
    /// Decode a write to `channel`; only the first byte is significant
    pub fn decode(channel: Channel, payload: &[u8]) -> Self {
        let Some(&value) = payload.first() else {
            return InboundWrite::Empty { channel };
        };

        match channel {
            Channel::Heartbeat => match Side::from_heartbeat(value) {
                Some(role) => InboundWrite::Heartbeat { role },
                None => InboundWrite::UnknownHeartbeat { value },
            },
            Channel::Battery1 => InboundWrite::Battery {
                side: Side::Left,
                level: Channel::Battery1.clamp_value(i32::from(value)),
            },
            Channel::Battery2 => InboundWrite::Battery {
                side: Side::Right,
                level: Channel::Battery2.clamp_value(i32::from(value)),
            },
            _ => InboundWrite::Control { channel, value },
        }
    }
}

/// Battery channel a follower reports on
pub fn battery_channel(side: Side) -> Channel {
    match side {
        Side::Left => Channel::Battery1,
        Side::Right => Channel::Battery2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_decoding() {
        assert_eq!(
            InboundWrite::decode(Channel::Heartbeat, &[2]),
            InboundWrite::Heartbeat { role: Side::Right }
        );
        assert_eq!(
            InboundWrite::decode(Channel::Heartbeat, &[9]),
            InboundWrite::UnknownHeartbeat { value: 9 }
        );
    }

    #[test]
    fn test_battery_decoding() {
        assert_eq!(
            InboundWrite::decode(Channel::Battery1, &[42]),
            InboundWrite::Battery {
                side: Side::Left,
                level: 42
            }
        );
        assert_eq!(
            InboundWrite::decode(Channel::Battery2, &[200]),
            InboundWrite::Battery {
                side: Side::Right,
                level: 100
            }
        );
        assert_eq!(battery_channel(Side::Right), Channel::Battery2);
    }

    #[test]
    fn test_only_first_byte_counts() {
        assert_eq!(
            InboundWrite::decode(Channel::Heartbeat, &[1, 2, 3]),
            InboundWrite::Heartbeat { role: Side::Left }
        );
    }

    #[test]
    fn test_other_channels() {
        assert_eq!(
            InboundWrite::decode(Channel::Speed, &[30]),
            InboundWrite::Control {
                channel: Channel::Speed,
                value: 30
            }
        );
        assert_eq!(
            InboundWrite::decode(Channel::Battery1, &[]),
            InboundWrite::Empty {
                channel: Channel::Battery1
            }
        );
    }
}
