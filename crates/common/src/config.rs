//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory containing OSD font folders.
    pub fonts_dir: PathBuf,

    /// Default encoding settings.
    pub encoding: EncodingDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default encoding parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingDefaults {
    /// Constant rate factor for software encoders.
    pub crf: u8,

    /// x264/x265 preset name.
    pub preset: String,

    /// Prefer a hardware encoder when one probes successfully.
    pub prefer_hardware: bool,

    /// Prefer HD font sheets over SD when both exist.
    pub prefer_hd_fonts: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "hudburn=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fonts_dir: default_fonts_dir(),
            encoding: EncodingDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for EncodingDefaults {
    fn default() -> Self {
        Self {
            crf: 23,
            preset: "medium".to_string(),
            prefer_hardware: true,
            prefer_hd_fonts: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("hudburn").join("config.json")
}

/// Default fonts directory.
fn default_fonts_dir() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("hudburn").join("fonts")
}
