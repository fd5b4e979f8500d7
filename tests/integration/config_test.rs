//! Integration tests for configuration management
//!
//! These tests verify that file settings and command-line overrides
//! combine correctly.

use clap::Parser;
use r_chimetts::config::{ConfigError, Settings};
use r_chimetts::ui::Args;
use std::error::Error;
use tempfile::tempdir;

#[cfg(test)]
mod config_integration_tests {
    use super::*;

    /// Test complete configuration workflow
    #[test]
    fn test_config_lifecycle() -> Result<(), Box<dyn Error>> {
        let dir = tempdir()?;
        let config_path = dir.path().join("config.json");

        let mut settings = Settings::default();
        settings.server_url = "http://homeassistant.local:8123".to_string();
        settings.access_token = Some("integration-test-token".to_string());
        settings.tts_platform = Some("tts.google_en_com".to_string());
        settings.media_dir = dir.path().join("media");
        settings
            .platforms
            .insert("media_player.kitchen".to_string(), "sonos".to_string());

        settings.validate()?;
        settings.save(&config_path)?;

        let loaded = Settings::load(&config_path)?;
        assert_eq!(loaded, settings);

        // Command-line values win over the file
        let args = Args::try_parse_from([
            "r-chimetts",
            "--config",
            config_path.to_str().ok_or("non-utf8 path")?,
            "--server-url",
            "http://other:8123",
            "--tts-platform",
            "cloud",
        ])?;
        let mut merged = Settings::load(&args.config_path())?;
        args.apply_overrides(&mut merged);
        assert_eq!(merged.server_url, "http://other:8123");
        assert_eq!(merged.tts_platform.as_deref(), Some("cloud"));
        assert_eq!(merged.access_token.as_deref(), Some("integration-test-token"));
        assert_eq!(merged.platforms.get("media_player.kitchen").map(String::as_str), Some("sonos"));

        Ok(())
    }

    /// Test invalid configuration handling
    #[test]
    fn test_invalid_config_validation() {
        let invalid_settings = Settings {
            server_url: "".to_string(),
            ..Settings::default()
        };

        let result = invalid_settings.validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
        if let Err(e) = result {
            assert!(e.to_string().contains("URL cannot be empty"));
        }

        let no_polling = Settings {
            poll_interval_ms: 0,
            ..Settings::default()
        };
        assert!(no_polling.validate().is_err());
    }
}
