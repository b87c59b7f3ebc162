//! Daemon settings file

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tap_protocol::Side;
use tap_sim::FollowerConfig;
use tap_sync::{CachedSettings, LinkId, SettingsProvider, SyncConfig, SyncError};

/// A simulated follower to start with the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulatedFollower {
    /// Transport identity
    pub link: u64,
    /// Role announced in heartbeats
    pub role: Side,
    /// Timing and battery behaviour
    #[serde(default)]
    pub config: FollowerConfig,
}

impl SimulatedFollower {
    pub fn link_id(&self) -> LinkId {
        LinkId(self.link)
    }
}

/// Everything stored in `settings.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Engine timing and thresholds
    #[serde(default)]
    pub sync: SyncConfig,
    /// Speed and intensities restored on startup
    #[serde(default)]
    pub cached: Option<CachedSettings>,
    /// Followers to simulate
    #[serde(default = "default_followers")]
    pub followers: Vec<SimulatedFollower>,
}

fn default_followers() -> Vec<SimulatedFollower> {
    vec![
        SimulatedFollower {
            link: 1,
            role: Side::Left,
            config: FollowerConfig::default(),
        },
        SimulatedFollower {
            link: 2,
            role: Side::Right,
            config: FollowerConfig::default(),
        },
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            cached: None,
            followers: default_followers(),
        }
    }
}

impl Settings {
    /// Get the XDG config directory for tapsync
    /// Uses $XDG_CONFIG_HOME/tapsync, falls back to ~/.config/tapsync
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("tapsync"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("tapsync"))
    }

    /// Get the default settings file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from `path`, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save settings to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create settings directory: {}", e))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        Ok(())
    }
}

/// [`SettingsProvider`] backed by the settings file
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    settings: Mutex<Settings>,
}

impl FileSettings {
    /// Wrap already-loaded settings stored at `path`
    pub fn new(path: PathBuf, settings: Settings) -> Self {
        Self {
            path,
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsProvider for FileSettings {
    fn load(&self) -> Option<CachedSettings> {
        self.settings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cached
    }

    fn save(&self, cached: &CachedSettings) -> Result<(), SyncError> {
        let mut settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        settings.cached = Some(*cached);
        settings.save_to(&self.path).map_err(SyncError::Settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("tapsync-test-{}-{}", name, std::process::id()))
            .join("settings.json")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = Settings::load_from(&scratch_path("missing"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.followers.len(), 2);
        assert_eq!(settings.followers[1].role, Side::Right);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"sync": {"heartbeat_timeout_ms": 5000}}"#).unwrap();
        assert_eq!(settings.sync.heartbeat_timeout_ms, 5000);
        assert_eq!(settings.sync.settle_delay_ms, 10);
        assert_eq!(settings.cached, None);
        assert_eq!(settings.followers, default_followers());
    }

    #[test]
    fn test_file_provider_persists_cached_settings() {
        let path = scratch_path("persist");
        let provider = FileSettings::new(path.clone(), Settings::default());
        assert_eq!(provider.load(), None);

        let cached = CachedSettings {
            speed: 33,
            ..CachedSettings::default()
        };
        provider.save(&cached).unwrap();
        assert_eq!(provider.load(), Some(cached));

        let reloaded = Settings::load_from(&path);
        assert_eq!(reloaded.cached, Some(cached));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
