//! # Configuration Management Module
//!
//! Persistent settings stored in platform-appropriate locations.
//! Handles loading, saving, and providing defaults for configuration options.
//!
//! ## Settings
//! - `relay_url`: WebSocket endpoint of the serial relay
//! - `auto_connect`: Connect to the relay on startup
//! - `start_with_mock`: Start the mock generator on startup instead
//! - `mock_interval_ms`: Mock sample period
//! - `raw_log_capacity`: Size of the raw message log (clamped to 50-100)
//! - `[detection]`: Punch/block force threshold and motion threshold
//! - `[profile]`: Age, weight, gender and optional max heart rate
//!
//! ## Storage Location
//! - macOS: ~/Library/Application Support/glove-signal/config.toml
//! - Linux: ~/.config/glove-signal/config.toml
//! - Windows: %APPDATA%\glove-signal\config.toml
//!
//! Keys missing from the file take their default values.

use crate::error::ConfigError;
use crate::physiology::UserProfile;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Thresholds for the event detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum FSR rise between samples, in raw units
    pub force_threshold: f64,
    /// Motion is active above `1 + accel_threshold` g
    pub accel_threshold: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            force_threshold: 200.0,
            accel_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub relay_url: String,
    pub auto_connect: bool,
    pub start_with_mock: bool,
    pub mock_interval_ms: u64,
    pub raw_log_capacity: usize,
    pub detection: DetectionConfig,
    pub profile: UserProfile,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:3001".to_string(),
            auto_connect: false,
            start_with_mock: false,
            mock_interval_ms: 1000,
            raw_log_capacity: 100,
            detection: DetectionConfig::default(),
            profile: UserProfile::default(),
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glove-signal")
            .join("config.toml")
    }

    /// Load config from the default location, or create default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Load config from `path`, writing defaults there if the file is missing
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config = toml::from_str(&contents)
                    .map_err(ConfigError::ParseFailed)?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(ConfigError::ReadFailed(e)),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(ConfigError::WriteFailed)?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(ConfigError::SerializeFailed)?;
        fs::write(path, toml_string)
            .map_err(ConfigError::WriteFailed)?;

        Ok(())
    }
}
