//! Configuration module for wirecanvas
//!
//! This module handles:
//! - Application configuration (`config.toml`): serial defaults, timing, logging
//! - The persisted document (`document.json`): theme plus every object
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.hxyulin.wirecanvas/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.wirecanvas/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.wirecanvas\`
//!
//! # Example
//!
//! ```ignore
//! use wirecanvas::config::{AppConfig, Document};
//!
//! let config = AppConfig::load_or_default();
//! let path = config.document_path().expect("no data directory");
//! let document = Document::open(&path)?;
//! document.save(&path)?;
//! ```

pub mod document;
pub mod settings;

pub use document::Document;
pub use settings::*;

use crate::error::{Result, WireCanvasError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.wirecanvas";

/// Configuration filename
pub const CONFIG_FILE: &str = "config.toml";

/// Default document filename
pub const DOCUMENT_FILE: &str = "document.json";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        WireCanvasError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            WireCanvasError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial transport defaults
    pub serial: SerialConfig,

    /// Propagation limits
    pub propagation: PropagationConfig,

    /// Sequenced block timing
    pub sequencer: SequencerConfig,

    /// Bridge connection behaviour
    pub bridge: BridgeConfig,

    /// Logging output
    pub logging: LoggingConfig,

    /// Document to open; defaults to `document.json` in the app data directory
    pub document_path: Option<PathBuf>,
}

impl AppConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| WireCanvasError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Serialize this configuration as TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| WireCanvasError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Load configuration from a file. A missing file yields defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            WireCanvasError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let path = config_path().ok_or_else(|| {
            WireCanvasError::Config("Could not determine config path".to_string())
        })?;
        Self::load_from(path)
    }

    /// Load configuration, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration to a file
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WireCanvasError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| {
            WireCanvasError::Config(format!("Failed to write config {:?}: {}", path, e))
        })
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        self.save_to(dir.join(CONFIG_FILE))
    }

    /// Document location: the configured path, else the app data default
    pub fn document_path(&self) -> Option<PathBuf> {
        self.document_path
            .clone()
            .or_else(|| app_data_dir().map(|p| p.join(DOCUMENT_FILE)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baud_rate, 57_600);
        assert!(config.serial.port.is_none());
        assert_eq!(config.logging.filter, "info,wirecanvas=debug");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = AppConfig::from_toml(
            r#"
            document_path = "/tmp/board.json"

            [serial]
            port = "/dev/ttyACM0"

            [bridge]
            output_refresh_ms = 20
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.serial.baud_rate, 57_600);
        assert_eq!(config.bridge.output_refresh_ms, 20);
        assert_eq!(config.bridge.error_revert_ms, 3000);
        assert_eq!(config.propagation.max_steps, 10_000);
        assert_eq!(config.document_path(), Some(PathBuf::from("/tmp/board.json")));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml("[serial\nport = 3").unwrap_err();
        assert!(matches!(err, WireCanvasError::Config(_)));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.serial.port = Some("COM5".to_string());
        config.sequencer.cooldown_ms = 250;
        config.logging.directory = Some(dir.path().join("logs"));
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, AppConfig::default());
    }
}
