//! Configuration enum types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::capture::FileTarget;

/// Where one-shot screenshots go when the command line does not say.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Destination {
    /// Save a timestamped PNG in the screenshot directory
    #[default]
    File,
    /// Only place the image on the clipboard
    Clipboard,
    /// Save the file and copy it to the clipboard
    Both,
}

impl Destination {
    /// File target and clipboard flag for an internally triggered capture.
    pub fn intent_parts(self) -> (FileTarget, bool) {
        match self {
            Destination::File => (FileTarget::Auto, false),
            Destination::Clipboard => (FileTarget::None, true),
            Destination::Both => (FileTarget::Auto, true),
        }
    }
}
