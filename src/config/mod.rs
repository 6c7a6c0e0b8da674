//! Configuration file support for waysnap.
//!
//! Settings are read from `~/.config/waysnap/config.toml` (or
//! `$XDG_CONFIG_HOME/waysnap/config.toml`). If no config file exists,
//! defaults are used.

pub mod enums;
pub mod types;

pub use enums::Destination;
pub use types::{CaptureConfig, FeedbackConfig, SelectorConfig};

use anyhow::{Context, Result};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure containing all user settings.
///
/// # Example TOML
/// ```toml
/// [capture]
/// include_cursor = false
/// flash = true
/// destination = "file"
/// save_directory = "~/Pictures/Screenshots"
///
/// [selector]
/// command = "slurp"
/// args = ["-d"]
///
/// [feedback]
/// notifications = true
/// flash_duration_ms = 500
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, JsonSchema)]
pub struct Config {
    /// Capture defaults
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Interactive area picker
    #[serde(default)]
    pub selector: SelectorConfig,

    /// Flash, haptics and notifications
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

impl Config {
    /// Validates and clamps all configuration values to acceptable ranges.
    ///
    /// Validated ranges:
    /// - `flash_duration_ms`: 100 - 2000
    /// - `clipboard_delay_ms`: 200 - 5000
    /// - `selector.command`: must not be empty
    fn validate_and_clamp(&mut self) {
        if !(100..=2000).contains(&self.feedback.flash_duration_ms) {
            log::warn!(
                "Invalid flash_duration_ms {}, clamping to 100-2000 range",
                self.feedback.flash_duration_ms
            );
            self.feedback.flash_duration_ms = self.feedback.flash_duration_ms.clamp(100, 2000);
        }

        if !(200..=5000).contains(&self.feedback.clipboard_delay_ms) {
            log::warn!(
                "Invalid clipboard_delay_ms {}, clamping to 200-5000 range",
                self.feedback.clipboard_delay_ms
            );
            self.feedback.clipboard_delay_ms = self.feedback.clipboard_delay_ms.clamp(200, 5000);
        }

        if self.selector.command.trim().is_empty() {
            log::warn!("Empty selector command, falling back to 'slurp'");
            self.selector.command = SelectorConfig::default().command;
        }
    }

    /// Returns the path to the configuration file.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be determined (e.g., HOME not set).
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not find config directory")?
            .join("waysnap");

        Ok(config_dir.join("config.toml"))
    }

    /// Loads configuration from the default location, or returns defaults if not found.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Loads configuration from `config_path`, or returns defaults if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains invalid TOML.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            info!("Config file not found, using defaults");
            debug!("Expected config at: {}", config_path.display());
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

        config.validate_and_clamp();

        info!("Loaded config from {}", config_path.display());
        debug!("Config: {:?}", config);

        Ok(config)
    }

    /// JSON schema of the configuration file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert!(config.capture.flash);
        assert!(!config.capture.include_cursor);
        assert_eq!(config.capture.destination, Destination::File);
        assert_eq!(config.selector.command, "slurp");
        assert_eq!(config.feedback.flash_duration_ms, 500);
        assert_eq!(config.feedback.clipboard_delay_ms, 1000);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[capture]\ndestination = \"both\"\n\n[selector]\ncommand = \"my-picker\"\nargs = [\"-b\", \"#00000080\"]\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.capture.destination, Destination::Both);
        assert!(config.capture.flash);
        assert_eq!(config.selector.command, "my-picker");
        assert_eq!(config.selector.args, vec!["-b", "#00000080"]);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[feedback]\nflash_duration_ms = 10\nclipboard_delay_ms = 60000\n\n[selector]\ncommand = \"  \"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.feedback.flash_duration_ms, 100);
        assert_eq!(config.feedback.clipboard_delay_ms, 5000);
        assert_eq!(config.selector.command, "slurp");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[capture\nflash = ").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn destination_maps_to_intent() {
        use crate::capture::FileTarget;
        assert_eq!(Destination::File.intent_parts(), (FileTarget::Auto, false));
        assert_eq!(Destination::Clipboard.intent_parts(), (FileTarget::None, true));
        assert_eq!(Destination::Both.intent_parts(), (FileTarget::Auto, true));
    }

    #[test]
    fn schema_mentions_sections() {
        let schema = serde_json::to_string(&Config::json_schema()).unwrap();
        assert!(schema.contains("capture"));
        assert!(schema.contains("clipboard_delay_ms"));
    }
}
