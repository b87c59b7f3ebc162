//! Cached user settings
//!
//! Speed and the four intensities survive restarts. Where they are stored is
//! up to the embedding application; the engine only needs a
//! [`SettingsProvider`].

use serde::{Deserialize, Serialize};
use tap_protocol::Channel;

use crate::error::SyncError;
use crate::store::StateStore;

/// User settings restored on startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSettings {
    /// Alternation speed `0..=50`
    pub speed: u8,
    /// Buzz strength
    pub buzz_intensity: u8,
    /// Light brightness
    pub light_intensity: u8,
    /// Sound volume
    pub sound_intensity: u8,
    /// Pressure strength
    pub pressure_intensity: u8,
}

impl CachedSettings {
    const CHANNELS: [Channel; 5] = [
        Channel::Speed,
        Channel::BuzzIntensity,
        Channel::LightIntensity,
        Channel::SoundIntensity,
        Channel::PressureIntensity,
    ];

    /// Capture the current values from a store
    pub fn from_store(store: &StateStore) -> Self {
        Self {
            speed: store.get(Channel::Speed),
            buzz_intensity: store.get(Channel::BuzzIntensity),
            light_intensity: store.get(Channel::LightIntensity),
            sound_intensity: store.get(Channel::SoundIntensity),
            pressure_intensity: store.get(Channel::PressureIntensity),
        }
    }

    /// `(channel, value)` pairs, clamped to each channel's range
    pub fn entries(&self) -> [(Channel, u8); 5] {
        let values = [
            self.speed,
            self.buzz_intensity,
            self.light_intensity,
            self.sound_intensity,
            self.pressure_intensity,
        ];
        let mut entries = [(Channel::Speed, 0); 5];
        for (slot, (channel, value)) in entries
            .iter_mut()
            .zip(Self::CHANNELS.into_iter().zip(values))
        {
            *slot = (channel, channel.clamp_value(i32::from(value)));
        }
        entries
    }

    /// Write these values into a store
    pub fn apply_to(&self, store: &StateStore) {
        store.set_many(&self.entries());
    }

    /// A zero speed marks settings that were never saved
    pub fn is_usable(&self) -> bool {
        self.speed > 0
    }
}

impl Default for CachedSettings {
    fn default() -> Self {
        Self {
            speed: Channel::Speed.default_value(),
            buzz_intensity: Channel::BuzzIntensity.default_value(),
            light_intensity: Channel::LightIntensity.default_value(),
            sound_intensity: Channel::SoundIntensity.default_value(),
            pressure_intensity: Channel::PressureIntensity.default_value(),
        }
    }
}

/// Storage for [`CachedSettings`]
pub trait SettingsProvider: Send + Sync + 'static {
    /// Saved settings, if any
    fn load(&self) -> Option<CachedSettings>;

    /// Persist settings
    fn save(&self, settings: &CachedSettings) -> Result<(), SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_store_defaults() {
        let store = StateStore::new();
        assert_eq!(CachedSettings::from_store(&store), CachedSettings::default());
    }

    #[test]
    fn test_apply_clamps() {
        let store = StateStore::new();
        let settings = CachedSettings {
            speed: 80,
            buzz_intensity: 10,
            light_intensity: 20,
            sound_intensity: 30,
            pressure_intensity: 4,
        };
        settings.apply_to(&store);
        assert_eq!(store.get(Channel::Speed), 50);
        assert_eq!(store.get(Channel::BuzzIntensity), 10);
        assert_eq!(store.get(Channel::PressureIntensity), 4);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_string(&CachedSettings::default()).unwrap();
        assert!(json.contains("\"buzzIntensity\":127"));
        assert!(json.contains("\"pressureIntensity\":2"));
        assert!(!CachedSettings {
            speed: 0,
            ..CachedSettings::default()
        }
        .is_usable());
    }
}
