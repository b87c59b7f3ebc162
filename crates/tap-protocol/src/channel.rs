//! Logical channel table
//!
//! This module provides the closed [`Channel`] enum. Each variant maps to one
//! single-byte GATT characteristic.

use std::str::FromStr;

use crate::error::ProtocolError;
use crate::wire::WireId;

/// One single-byte control or telemetry value exchanged with the followers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum Channel {
    /// Alternation speed, `0..=50`
    Speed,
    /// Master power flag
    OnOff,
    /// Session running flag
    StartStop,
    /// Tapper output enable
    TapperOnOff,
    /// Haptic (buzz) output enable
    BuzzFlag,
    /// Haptic intensity
    BuzzIntensity,
    /// Haptic pulse duration, `1..=10`
    BuzzDuration,
    /// Light output enable
    LightFlag,
    /// Light intensity
    LightIntensity,
    /// Light pulse duration, `1..=10`
    LightDuration,
    /// Sound output enable
    SoundFlag,
    /// Sound intensity
    SoundIntensity,
    /// Sound pulse duration, `1..=10`
    SoundDuration,
    /// Pressure output enable
    PressureFlag,
    /// Pressure intensity
    PressureIntensity,
    /// Pressure pulse duration, `1..=10`
    PressureDuration,
    /// Light-string pattern selector
    StringLightFunction,
    /// Which follower fires next (0 = left, 1 = right)
    SideSelect,
    /// Liveness writes from followers (1 = left, 2 = right)
    Heartbeat,
    /// Left follower charge percentage
    Battery1,
    /// Right follower charge percentage
    Battery2,
}

/// Inclusive application-level range for a channel value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRange {
    /// Smallest accepted value
    pub min: u8,
    /// Largest accepted value
    pub max: u8,
}

impl ValueRange {
    /// Full byte range
    pub const BYTE: ValueRange = ValueRange { min: 0, max: 255 };
    /// Boolean flag
    pub const FLAG: ValueRange = ValueRange { min: 0, max: 1 };
    /// Pulse duration
    pub const DURATION: ValueRange = ValueRange { min: 1, max: 10 };
    /// Alternation speed
    pub const SPEED: ValueRange = ValueRange { min: 0, max: 50 };
    /// Battery percentage
    pub const PERCENT: ValueRange = ValueRange { min: 0, max: 100 };

    /// Clamp an arbitrary integer into this range
    pub fn clamp(&self, value: i32) -> u8 {
        value.clamp(i32::from(self.min), i32::from(self.max)) as u8
    }

    /// Check whether a byte already lies in this range
    pub fn contains(&self, value: u8) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Output modality a flag/intensity/duration triple belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelGroup {
    /// Haptic motor
    Buzz,
    /// LED
    Light,
    /// Speaker
    Sound,
    /// Pressure actuator
    Pressure,
}

impl ChannelGroup {
    /// Modalities in the order the follower firmware applies them
    pub const ALL: [ChannelGroup; 4] = [
        ChannelGroup::Buzz,
        ChannelGroup::Light,
        ChannelGroup::Sound,
        ChannelGroup::Pressure,
    ];

    /// Enable flag channel
    pub fn flag(&self) -> Channel {
        match self {
            Self::Buzz => Channel::BuzzFlag,
            Self::Light => Channel::LightFlag,
            Self::Sound => Channel::SoundFlag,
            Self::Pressure => Channel::PressureFlag,
        }
    }

    /// Intensity channel
    pub fn intensity(&self) -> Channel {
        match self {
            Self::Buzz => Channel::BuzzIntensity,
            Self::Light => Channel::LightIntensity,
            Self::Sound => Channel::SoundIntensity,
            Self::Pressure => Channel::PressureIntensity,
        }
    }

    /// Duration channel
    pub fn duration(&self) -> Channel {
        match self {
            Self::Buzz => Channel::BuzzDuration,
            Self::Light => Channel::LightDuration,
            Self::Sound => Channel::SoundDuration,
            Self::Pressure => Channel::PressureDuration,
        }
    }

    /// Flag, intensity and duration, in application order
    pub fn channels(&self) -> [Channel; 3] {
        [self.flag(), self.intensity(), self.duration()]
    }
}

impl Channel {
    /// Every channel, in service registration order
    pub const ALL: [Channel; 21] = [
        Channel::Speed,
        Channel::OnOff,
        Channel::StartStop,
        Channel::TapperOnOff,
        Channel::BuzzFlag,
        Channel::BuzzIntensity,
        Channel::BuzzDuration,
        Channel::LightFlag,
        Channel::LightIntensity,
        Channel::LightDuration,
        Channel::SoundFlag,
        Channel::SoundIntensity,
        Channel::SoundDuration,
        Channel::PressureFlag,
        Channel::PressureIntensity,
        Channel::PressureDuration,
        Channel::StringLightFunction,
        Channel::SideSelect,
        Channel::Heartbeat,
        Channel::Battery1,
        Channel::Battery2,
    ];

    /// Logical channel name as used in settings and logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Speed => "speed",
            Self::OnOff => "onOff",
            Self::StartStop => "startStop",
            Self::TapperOnOff => "tapperOnOff",
            Self::BuzzFlag => "buzzFlag",
            Self::BuzzIntensity => "buzzIntensity",
            Self::BuzzDuration => "buzzDuration",
            Self::LightFlag => "lightFlag",
            Self::LightIntensity => "lightIntensity",
            Self::LightDuration => "lightDuration",
            Self::SoundFlag => "soundFlag",
            Self::SoundIntensity => "soundIntensity",
            Self::SoundDuration => "soundDuration",
            Self::PressureFlag => "pressureFlag",
            Self::PressureIntensity => "pressureIntensity",
            Self::PressureDuration => "pressureDuration",
            Self::StringLightFunction => "stringLightFunction",
            Self::SideSelect => "sideSelect",
            Self::Heartbeat => "heartbeat",
            Self::Battery1 => "battery1",
            Self::Battery2 => "battery2",
        }
    }

    /// Characteristic UUID for this channel
    pub fn wire_id(&self) -> WireId {
        // All characteristics share the e322xxxx-246e-459b-ae10-5dbea099f9f0 layout
        let short: u16 = match self {
            Self::Speed => 0x3006,
            Self::OnOff => 0x3007,
            Self::StartStop => 0x3025,
            Self::TapperOnOff => 0x3026,
            Self::BuzzFlag => 0x3027,
            Self::BuzzIntensity => 0x3028,
            Self::BuzzDuration => 0x3029,
            Self::LightFlag => 0x3030,
            Self::LightIntensity => 0x3031,
            Self::LightDuration => 0x3032,
            Self::SoundFlag => 0x3033,
            Self::SoundIntensity => 0x3034,
            Self::SoundDuration => 0x3035,
            Self::PressureFlag => 0x3036,
            Self::PressureIntensity => 0x3037,
            Self::PressureDuration => 0x3038,
            Self::StringLightFunction => 0x3039,
            Self::SideSelect => 0x3040,
            Self::Heartbeat => 0x3041,
            Self::Battery1 => 0x3046,
            Self::Battery2 => 0x3047,
        };
        WireId::characteristic(short)
    }

    /// Application-level value range
    pub fn range(&self) -> ValueRange {
        match self {
            Self::Speed => ValueRange::SPEED,
            Self::OnOff
            | Self::StartStop
            | Self::TapperOnOff
            | Self::BuzzFlag
            | Self::LightFlag
            | Self::SoundFlag
            | Self::PressureFlag
            | Self::SideSelect => ValueRange::FLAG,
            Self::BuzzDuration
            | Self::LightDuration
            | Self::SoundDuration
            | Self::PressureDuration => ValueRange::DURATION,
            Self::Battery1 | Self::Battery2 => ValueRange::PERCENT,
            Self::BuzzIntensity
            | Self::LightIntensity
            | Self::SoundIntensity
            | Self::PressureIntensity
            | Self::StringLightFunction
            | Self::Heartbeat => ValueRange::BYTE,
        }
    }

    /// Value a channel holds before anything has been written
    pub fn default_value(&self) -> u8 {
        match self {
            Self::BuzzIntensity | Self::LightIntensity | Self::SoundIntensity => 127,
            Self::PressureIntensity => 2,
            Self::BuzzDuration
            | Self::LightDuration
            | Self::SoundDuration
            | Self::PressureDuration => 2,
            Self::Speed => 25,
            _ => 0,
        }
    }

    /// Clamp an arbitrary integer into this channel's range
    pub fn clamp_value(&self, value: i32) -> u8 {
        self.range().clamp(value)
    }

    /// Modality this channel configures, if any
    pub fn group(&self) -> Option<ChannelGroup> {
        ChannelGroup::ALL
            .into_iter()
            .find(|group| group.channels().contains(self))
    }

    /// Whether followers write this channel (telemetry) rather than read it
    pub fn is_inbound(&self) -> bool {
        matches!(self, Self::Heartbeat | Self::Battery1 | Self::Battery2)
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| ProtocolError::UnknownChannelName(s.to_string()))
    }
}
