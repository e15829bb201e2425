//! Configuration file support.
//!
//! Settings are stored as versioned JSON under the user config directory and
//! turned into a [`SessionConfig`] when a session is created.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    COMMIT_DEBOUNCE, JUMP_STEP, METADATA_PREFETCH_RADIUS, PLOT_CACHE_CAPACITY,
    PREFETCH_MAX_IN_FLIGHT,
};
use crate::session::SessionConfig;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Navigation and prefetch tuning
    #[serde(default)]
    pub navigation: NavigationPreferences,

    /// Camera recorded on new plots when the directory names none
    #[serde(default = "default_camera_id")]
    pub default_camera_id: String,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_camera_id() -> String {
    "default".to_string()
}

/// Navigation section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationPreferences {
    /// Delay before the cursor position drives lookups, in milliseconds
    pub debounce_ms: u64,

    /// Images skipped by a jump
    pub jump_step: usize,

    /// Background prefetch jobs allowed in flight
    pub prefetch_max_in_flight: usize,

    /// Images on each side whose metadata is warmed
    pub metadata_prefetch_radius: usize,

    /// Plot-membership entries kept per directory
    pub cache_capacity: usize,
}

impl Default for NavigationPreferences {
    fn default() -> Self {
        Self {
            debounce_ms: COMMIT_DEBOUNCE.as_millis() as u64,
            jump_step: JUMP_STEP,
            prefetch_max_in_flight: PREFETCH_MAX_IN_FLIGHT,
            metadata_prefetch_radius: METADATA_PREFETCH_RADIUS,
            cache_capacity: PLOT_CACHE_CAPACITY,
        }
    }
}

impl AppConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            navigation: NavigationPreferences::default(),
            default_camera_id: default_camera_id(),
            log_level: LogLevel::default(),
        }
    }

    /// Settings a [`Session`](crate::session::Session) is built from.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            debounce: Duration::from_millis(self.navigation.debounce_ms),
            jump_step: self.navigation.jump_step.max(1),
            prefetch_max_in_flight: self.navigation.prefetch_max_in_flight,
            metadata_prefetch_radius: self.navigation.metadata_prefetch_radius,
            cache_capacity: self.navigation.cache_capacity,
            default_camera_id: self.default_camera_id.clone(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    pub fn default_filename() -> &'static str {
        "plot-marker.json"
    }

    /// Get the default config file path for auto-load/save.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("plot-marker").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home| {
                home.join(".config")
                    .join("plot-marker")
                    .join(Self::default_filename())
            })
        }
    }

    /// Read and parse a config file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Write the config, creating parent directories as needed.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = self.to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load_from_path(&path) {
            Ok(config) => {
                log::info!("Loaded configuration from {:?}", path);
                Some(config)
            }
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        self.save_to_path(&path)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let session = AppConfig::default().to_session_config();
        assert_eq!(session.debounce, COMMIT_DEBOUNCE);
        assert_eq!(session.jump_step, JUMP_STEP);
        assert_eq!(session.cache_capacity, PLOT_CACHE_CAPACITY);
        assert_eq!(session.prefetch_max_in_flight, PREFETCH_MAX_IN_FLIGHT);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = AppConfig::from_json(r#"{ "version": 1, "log_level": "debug" }"#).unwrap();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.navigation, NavigationPreferences::default());
        assert_eq!(config.default_camera_id, "default");
    }

    #[test]
    fn test_partial_navigation_section() {
        let config =
            AppConfig::from_json(r#"{ "version": 1, "navigation": { "jump_step": 25 } }"#).unwrap();
        assert_eq!(config.navigation.jump_step, 25);
        assert_eq!(config.navigation.debounce_ms, 50);
    }

    #[test]
    fn test_newer_version_rejected() {
        let json = format!(r#"{{ "version": {} }}"#, CONFIG_VERSION + 1);
        assert!(matches!(
            AppConfig::from_json(&json),
            Err(ConfigError::VersionTooNew { .. })
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("plot-marker.json");

        let mut config = AppConfig::new();
        config.navigation.debounce_ms = 120;
        config.default_camera_id = "cam-left".to_string();
        config.save_to_path(&path).unwrap();

        let loaded = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            loaded.to_session_config().debounce,
            Duration::from_millis(120)
        );
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_from_path(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
