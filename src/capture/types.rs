//! Data types for screenshot capture functionality.

use std::{fmt, path::PathBuf};

use thiserror::Error;
use tokio::sync::oneshot;

use crate::geometry::Rect;

/// A screenshot request as accepted by the capture controller.
#[derive(Debug)]
pub struct CaptureRequest {
    /// Logical area to crop to; `None` captures every output.
    pub area: Option<Rect>,
    /// Whether the compositor should paint the cursor into the frames.
    pub include_cursor: bool,
    /// Whether to flash the screen and trigger feedback on success.
    pub flash: bool,
    /// Where the composed image should go.
    pub intent: DeliveryIntent,
}

/// Where a file should be written, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileTarget {
    /// Do not write a file.
    None,
    /// Synthesize a timestamped name under the pictures directory.
    Auto,
    /// Write to exactly this path (must not exist yet).
    Path(PathBuf),
}

/// Delivery destinations for a composed screenshot. Any combination is allowed.
#[derive(Debug)]
pub struct DeliveryIntent {
    pub file: FileTarget,
    pub clipboard: bool,
    /// Pending remote call waiting for `(success, path)`.
    pub reply: Option<ReplyHandle>,
}

impl DeliveryIntent {
    /// Intent for requests arriving over D-Bus.
    ///
    /// A caller that gave no usable filename gets the image on the clipboard instead.
    pub fn for_rpc(path: Option<PathBuf>, reply: ReplyHandle) -> Self {
        let clipboard = path.is_none();
        Self {
            file: path.map(FileTarget::Path).unwrap_or(FileTarget::None),
            clipboard,
            reply: Some(reply),
        }
    }

    /// Intent for screenshots triggered from within waysnap (CLI, keybinding helpers).
    pub fn internal(file: FileTarget, clipboard: bool) -> Self {
        Self {
            file,
            clipboard,
            reply: None,
        }
    }

    pub fn is_rpc(&self) -> bool {
        self.reply.is_some()
    }
}

/// Reply sent back to a remote caller once a screenshot is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotReply {
    pub success: bool,
    /// Resulting file path, or empty when nothing was written.
    pub path: String,
}

impl ScreenshotReply {
    pub fn failed(path: Option<&std::path::Path>) -> Self {
        Self {
            success: false,
            path: path.map(|p| p.display().to_string()).unwrap_or_default(),
        }
    }
}

/// One-shot completion handle for a pending remote call.
pub struct ReplyHandle(oneshot::Sender<ScreenshotReply>);

impl ReplyHandle {
    pub fn new() -> (Self, oneshot::Receiver<ScreenshotReply>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Completes the call. A caller that already went away is only logged.
    pub fn complete(self, reply: ScreenshotReply) {
        if self.0.send(reply).is_err() {
            log::debug!("Screenshot caller went away before the reply was sent");
        }
    }
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReplyHandle")
    }
}

/// Result of a delivered screenshot.
#[derive(Debug, Clone, Default)]
pub struct CaptureResult {
    /// Path where the image was saved (if saved).
    pub saved_path: Option<PathBuf>,
    /// Whether the image was copied to clipboard.
    pub copied_to_clipboard: bool,
}

/// Errors that can occur during screenshot capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Compositor does not support wlr-screencopy")]
    ProtocolUnavailable,

    #[error("Screenshot already in progress")]
    Busy,

    #[error("No output intersects the requested area")]
    NoOutputs,

    #[error("Failed to capture output '{output}': {reason}")]
    OutputFailure { output: String, reason: String },

    #[error("Unsupported buffer format 0x{0:08x}")]
    UnsupportedFormat(u32),

    #[error("Output went away during screenshot")]
    MonitorVanished,

    #[error("Failed to save screenshot: {0}")]
    SaveError(#[from] std::io::Error),

    #[error("Clipboard operation failed: {0}")]
    ClipboardError(String),

    #[error("Image processing error: {0}")]
    ImageError(String),

    #[error("Capture cancelled: {0}")]
    Cancelled(String),
}

impl From<image::ImageError> for CaptureError {
    fn from(err: image::ImageError) -> Self {
        CaptureError::ImageError(err.to_string())
    }
}

/// Status of a single output's capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Unknown,
    Success,
    Failure,
}

impl FrameStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, FrameStatus::Unknown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_without_filename_goes_to_clipboard() {
        let (reply, _rx) = ReplyHandle::new();
        let intent = DeliveryIntent::for_rpc(None, reply);
        assert!(intent.clipboard);
        assert_eq!(intent.file, FileTarget::None);
        assert!(intent.is_rpc());
    }

    #[test]
    fn rpc_with_filename_writes_file_only() {
        let (reply, _rx) = ReplyHandle::new();
        let intent = DeliveryIntent::for_rpc(Some(PathBuf::from("/tmp/a.png")), reply);
        assert!(!intent.clipboard);
        assert_eq!(intent.file, FileTarget::Path(PathBuf::from("/tmp/a.png")));
    }

    #[test]
    fn reply_handle_delivers_once() {
        let (reply, mut rx) = ReplyHandle::new();
        reply.complete(ScreenshotReply {
            success: true,
            path: "/tmp/x.png".into(),
        });
        let got = rx.try_recv().expect("reply delivered");
        assert!(got.success);
        assert_eq!(got.path, "/tmp/x.png");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!FrameStatus::Unknown.is_terminal());
        assert!(FrameStatus::Success.is_terminal());
        assert!(FrameStatus::Failure.is_terminal());
    }
}
