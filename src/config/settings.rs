//! Application settings and configuration management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Application settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Home Assistant base URL
    pub server_url: String,
    /// Long-lived access token for the Home Assistant API
    pub access_token: Option<String>,
    /// Transcoder executable
    pub ffmpeg_path: String,
    /// Scratch directory for intermediate audio files
    pub temp_dir: PathBuf,
    /// Directory rendered audio is written to when no output path is given
    pub media_dir: PathBuf,
    /// Directory searched for chimes given as a bare file name
    pub chimes_dir: Option<PathBuf>,
    /// Interval between volume fade steps, in milliseconds
    pub fade_step_ms: u64,
    /// Interval between device state polls, in milliseconds
    pub poll_interval_ms: u64,
    /// Default offset between chimes and speech, in milliseconds
    pub offset_ms: f64,
    /// TTS platform or `tts.*` engine used when a segment names none
    pub tts_platform: Option<String>,
    /// Entity id to integration name (e.g. `media_player.echo` = `alexa_media`)
    pub platforms: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            server_url: "http://localhost:8123".to_string(),
            access_token: None,
            ffmpeg_path: "ffmpeg".to_string(),
            temp_dir: std::env::temp_dir().join("chime_tts"),
            media_dir: PathBuf::from("/media/chime_tts"),
            chimes_dir: None,
            fade_step_ms: 500,
            poll_interval_ms: 200,
            offset_ms: 450.0,
            tts_platform: None,
            platforms: BTreeMap::new(),
        }
    }
}

/// Error types for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl Settings {
    /// Load settings from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(&self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("chimetts").join("config.json")
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("Server URL cannot be empty".to_string()));
        }
        if url::Url::parse(&self.server_url).is_err() {
            return Err(ConfigError::ValidationError(format!(
                "Server URL is not a valid URL: {}",
                self.server_url
            )));
        }
        if self.ffmpeg_path.trim().is_empty() {
            return Err(ConfigError::ValidationError("FFmpeg path cannot be empty".to_string()));
        }
        if self.fade_step_ms == 0 {
            return Err(ConfigError::ValidationError("Fade step interval must be positive".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError("Poll interval must be positive".to_string()));
        }
        Ok(())
    }

    pub fn fade_step(&self) -> Duration {
        Duration::from_millis(self.fade_step_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
