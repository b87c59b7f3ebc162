//! Canonical channel state
//!
//! The [`StateStore`] is the single source of truth for what the followers
//! should currently show. It is shared between the API side and the sync
//! actor, so every access goes through one lock.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tap_protocol::Channel;

/// Shared mapping from channel to its current byte value
///
/// Cloning a `StateStore` yields another handle to the same mapping. Every
/// channel holds a value from construction onward (seeded with
/// [`Channel::default_value`]), so [`get`](Self::get) never comes back empty.
#[derive(Debug, Clone)]
pub struct StateStore {
    values: Arc<RwLock<BTreeMap<Channel, u8>>>,
}

impl StateStore {
    /// Create a store seeded with every channel's default value
    pub fn new() -> Self {
        let values = Channel::ALL
            .iter()
            .map(|&c| (c, c.default_value()))
            .collect();
        Self {
            values: Arc::new(RwLock::new(values)),
        }
    }

    /// Record a new value for a channel
    ///
    /// Callers clamp to the channel's sub-range first; the store keeps any byte.
    pub fn set(&self, channel: Channel, value: u8) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(channel, value);
    }

    /// Record several values under one lock
    pub fn set_many(&self, entries: &[(Channel, u8)]) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        for &(channel, value) in entries {
            values.insert(channel, value);
        }
    }

    /// Current value of a channel
    pub fn get(&self, channel: Channel) -> u8 {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values
            .get(&channel)
            .copied()
            .unwrap_or_else(|| channel.default_value())
    }

    /// Read a flag channel as a boolean
    pub fn flag(&self, channel: Channel) -> bool {
        self.get(channel) != 0
    }

    /// Copy of every channel value
    pub fn snapshot(&self) -> BTreeMap<Channel, u8> {
        self.values
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_seeded_with_defaults() {
        let store = StateStore::new();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), Channel::ALL.len());
        assert_eq!(store.get(Channel::Speed), 25);
        assert_eq!(store.get(Channel::LightIntensity), 127);
        assert_eq!(store.get(Channel::StartStop), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let store = StateStore::new();
        let other = store.clone();
        other.set(Channel::BuzzFlag, 1);
        assert!(store.flag(Channel::BuzzFlag));
    }

    #[test]
    fn test_set_many_last_write_wins() {
        let store = StateStore::new();
        store.set_many(&[(Channel::Speed, 10), (Channel::Speed, 40)]);
        assert_eq!(store.get(Channel::Speed), 40);
    }

    #[test]
    fn test_concurrent_writers() {
        let store = StateStore::new();
        let handles: Vec<_> = (0..4u8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for v in 0..=255u8 {
                        store.set(Channel::ALL[i as usize], v);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for i in 0..4 {
            assert_eq!(store.get(Channel::ALL[i]), 255);
        }
    }

    proptest! {
        #[test]
        fn set_then_get_round_trips(index in 0usize..21, value in any::<u8>()) {
            let store = StateStore::new();
            let channel = Channel::ALL[index];
            store.set(channel, value);
            prop_assert_eq!(store.get(channel), value);
        }
    }
}
