//! Places encoded screenshots on the Wayland clipboard.

use super::types::CaptureError;
use std::io::Write;
use std::process::{Command, Stdio};
use wl_clipboard_rs::copy::{MimeType, Options, ServeRequests, Source};

pub const PNG_MIME: &str = "image/png";

/// Which mechanism ended up owning the clipboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardMethod {
    WlCopy,
    Library,
}

/// Copies PNG bytes to the clipboard.
///
/// `wl-copy` forks a process that keeps serving the selection after we
/// return, so it is tried first; `wl-clipboard-rs` serves a single paste.
pub fn copy_png(png: &[u8]) -> Result<ClipboardMethod, CaptureError> {
    log::debug!("Copying screenshot to clipboard ({} bytes)", png.len());

    let cmd_err = match copy_via_command(png) {
        Ok(()) => return Ok(ClipboardMethod::WlCopy),
        Err(err) => err,
    };
    log::warn!("wl-copy failed ({}), falling back to wl-clipboard-rs", cmd_err);

    copy_via_library(png)
        .map(|()| ClipboardMethod::Library)
        .map_err(|lib_err| {
            CaptureError::ClipboardError(format!(
                "wl-copy failed: {} ; wl-clipboard-rs failed: {}",
                cmd_err, lib_err
            ))
        })
}

fn copy_via_library(png: &[u8]) -> Result<(), CaptureError> {
    let mut opts = Options::new();
    opts.serve_requests(ServeRequests::Only(1));
    opts.copy(
        Source::Bytes(png.into()),
        MimeType::Specific(PNG_MIME.to_string()),
    )
    .map_err(|e| CaptureError::ClipboardError(format!("wl-clipboard-rs error: {}", e)))
}

fn copy_via_command(png: &[u8]) -> Result<(), CaptureError> {
    let mut child = Command::new("wl-copy")
        .args(["--type", PNG_MIME])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CaptureError::ClipboardError(format!("cannot spawn wl-copy: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(png)
            .map_err(|e| CaptureError::ClipboardError(format!("wl-copy stdin: {}", e)))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| CaptureError::ClipboardError(format!("wl-copy wait: {}", e)))?;
    if !output.status.success() {
        return Err(CaptureError::ClipboardError(format!(
            "wl-copy exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}
