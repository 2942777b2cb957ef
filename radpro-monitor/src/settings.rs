//! Monitor settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use radpro_poll::{
    PollerConfig, PortSetting, SerialSettings, DEFAULT_AVERAGING_WINDOW_S,
    DEFAULT_DEVICEINFO_INTERVAL_S, DEFAULT_SCAN_INTERVAL_S, DEFAULT_SENSITIVITY_INTERVAL_S,
    DEFAULT_TIMEOUT_MS, MAX_AVERAGING_WINDOW_S,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading, validating or saving settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine settings path")]
    NoConfigDir,

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// Persistent monitor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Serial port path, or "auto" to probe for the device
    pub port: String,
    pub baud_rate: u32,
    pub scan_interval_s: u64,
    pub sensitivity_interval_s: u64,
    pub deviceinfo_interval_s: u64,
    pub timeout_ms: u64,
    /// Rate smoothing window; 0 reports instantaneous rates
    pub averaging_window_s: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: "auto".to_string(),
            baud_rate: SerialSettings::default().baud_rate,
            scan_interval_s: DEFAULT_SCAN_INTERVAL_S,
            sensitivity_interval_s: DEFAULT_SENSITIVITY_INTERVAL_S,
            deviceinfo_interval_s: DEFAULT_DEVICEINFO_INTERVAL_S,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            averaging_window_s: DEFAULT_AVERAGING_WINDOW_S,
        }
    }
}

impl Settings {
    /// Get the XDG config directory for radpro
    /// Uses $XDG_CONFIG_HOME/radpro, falls back to ~/.config/radpro
    fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_config);
            if path.is_absolute() {
                return Some(path.join("radpro"));
            }
        }

        dirs::home_dir().map(|h| h.join(".config").join("radpro"))
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.json"))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`; a missing or unreadable file gives defaults
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| match serde_json::from_str(&s) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<PathBuf, SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let positive = [
            ("baud_rate", u64::from(self.baud_rate)),
            ("scan_interval_s", self.scan_interval_s),
            ("sensitivity_interval_s", self.sensitivity_interval_s),
            ("deviceinfo_interval_s", self.deviceinfo_interval_s),
            ("timeout_ms", self.timeout_ms),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(SettingsError::Invalid(format!("{name} must be positive")));
        }
        if self.averaging_window_s > MAX_AVERAGING_WINDOW_S {
            return Err(SettingsError::Invalid(format!(
                "averaging_window_s must be at most {MAX_AVERAGING_WINDOW_S}"
            )));
        }
        Ok(())
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            port: PortSetting::parse(&self.port),
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            scan_interval: Duration::from_secs(self.scan_interval_s),
            sensitivity_interval: Duration::from_secs(self.sensitivity_interval_s),
            device_info_interval: Duration::from_secs(self.deviceinfo_interval_s),
            averaging_window: Duration::from_secs(self.averaging_window_s),
            ..Default::default()
        }
    }
}
