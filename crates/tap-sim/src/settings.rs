//! In-memory settings storage

use std::sync::Mutex;

use tap_sync::{CachedSettings, SettingsProvider, SyncError};

/// [`SettingsProvider`] that keeps settings in memory
#[derive(Debug, Default)]
pub struct MemorySettings {
    stored: Mutex<Option<CachedSettings>>,
    saves: Mutex<usize>,
}

impl MemorySettings {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage holding `settings`
    pub fn with_settings(settings: CachedSettings) -> Self {
        Self {
            stored: Mutex::new(Some(settings)),
            saves: Mutex::new(0),
        }
    }

    /// Number of saves so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SettingsProvider for MemorySettings {
    fn load(&self) -> Option<CachedSettings> {
        *self.stored.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, settings: &CachedSettings) -> Result<(), SyncError> {
        *self.stored.lock().unwrap_or_else(|e| e.into_inner()) = Some(*settings);
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_then_load() {
        let settings = MemorySettings::new();
        assert_eq!(settings.load(), None);
        let value = CachedSettings {
            speed: 12,
            ..CachedSettings::default()
        };
        settings.save(&value).unwrap();
        assert_eq!(settings.load(), Some(value));
        assert_eq!(settings.save_count(), 1);
    }
}
