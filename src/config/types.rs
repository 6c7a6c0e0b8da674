//! Configuration type definitions.

use super::enums::Destination;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Capture defaults.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureConfig {
    /// Paint the pointer into screenshots
    #[serde(default)]
    pub include_cursor: bool,

    /// Flash the screen and play the capture cue on success
    #[serde(default = "default_true")]
    pub flash: bool,

    /// Destination for one-shot captures without `--output`/`--clipboard`
    #[serde(default)]
    pub destination: Destination,

    /// Directory for automatically named screenshots.
    /// Empty means `<Pictures>/Screenshots`; `~/` is expanded.
    #[serde(default)]
    pub save_directory: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            include_cursor: false,
            flash: default_true(),
            destination: Destination::default(),
            save_directory: String::new(),
        }
    }
}

/// External area picker.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SelectorConfig {
    /// Program printing `x,y wxh` on stdout (looked up in `PATH`)
    #[serde(default = "default_selector_command")]
    pub command: String,

    /// Extra arguments passed to the picker
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            command: default_selector_command(),
            args: Vec::new(),
        }
    }
}

/// User feedback after a capture.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FeedbackConfig {
    /// Desktop notification after internally requested file saves
    #[serde(default = "default_true")]
    pub notifications: bool,

    /// Trigger the feedbackd `screen-capture` event
    #[serde(default = "default_true")]
    pub haptic: bool,

    /// How long the white flash stays up (valid range: 100 - 2000)
    #[serde(default = "default_flash_duration")]
    pub flash_duration_ms: u64,

    /// Fallback delay before copying when the clipboard overlay never
    /// receives keyboard focus (valid range: 200 - 5000)
    #[serde(default = "default_clipboard_delay")]
    pub clipboard_delay_ms: u64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            notifications: default_true(),
            haptic: default_true(),
            flash_duration_ms: default_flash_duration(),
            clipboard_delay_ms: default_clipboard_delay(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_selector_command() -> String {
    "slurp".to_string()
}

fn default_flash_duration() -> u64 {
    500
}

fn default_clipboard_delay() -> u64 {
    1000
}
