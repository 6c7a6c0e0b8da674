//! Bridge to an external interactive area picker such as `slurp`.
//!
//! The picker prints the chosen rectangle as `x,y wxh` on stdout and exits.

use std::{io, process::Stdio};

use log::{debug, info, warn};
use thiserror::Error;
use tokio::{io::AsyncReadExt, process::Command};

use super::{cancel::CancelToken, exclusive::ExclusiveSlot};
use crate::geometry::Rect;

const READ_CHUNK: usize = 64;

/// Errors from an area selection.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Area selection already in progress")]
    Busy,

    #[error("Area selection cancelled")]
    Cancelled,

    #[error("Invalid selection '{0}'")]
    Parse(String),

    #[error("Failed to spawn area selector: {0}")]
    Spawn(#[source] io::Error),

    #[error("Area selector I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Runs the configured picker, one selection at a time.
#[derive(Debug, Clone)]
pub struct AreaSelector {
    slot: ExclusiveSlot,
    command: String,
    args: Vec<String>,
}

impl AreaSelector {
    pub fn new(slot: ExclusiveSlot, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            slot,
            command: command.into(),
            args,
        }
    }

    /// Lets the user pick a rectangle. Concurrent calls fail with [`SelectError::Busy`].
    pub async fn select_area(&self, mut cancel: CancelToken) -> Result<Rect, SelectError> {
        let _guard = self.slot.try_acquire().ok_or(SelectError::Busy)?;
        if cancel.is_cancelled() {
            return Err(SelectError::Cancelled);
        }

        debug!("Spawning area selector: {} {:?}", self.command, self.args);
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                warn!("Failed to spawn {}: {}", self.command, err);
                SelectError::Spawn(err)
            })?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| SelectError::Io(io::Error::other("selector has no stdout")))?;

        let mut response = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Area selection cancelled");
                    let _ = child.kill().await;
                    return Err(SelectError::Cancelled);
                }
                read = stdout.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        break;
                    }
                    response.extend_from_slice(&chunk[..n]);
                }
            }
        }
        drop(stdout);

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(SelectError::Cancelled);
            }
            status = child.wait() => status?,
        };

        let text = String::from_utf8_lossy(&response);
        debug!("Selected area: {:?} (exit {})", text, status);
        parse_geometry(&text)
    }
}

/// Parses `<x>,<y> <w>x<h>` with an optional trailing newline.
pub fn parse_geometry(text: &str) -> Result<Rect, SelectError> {
    let parse_err = || SelectError::Parse(text.to_string());
    let body = text.strip_suffix('\n').unwrap_or(text);

    let (position, size) = body.split_once(' ').ok_or_else(parse_err)?;
    let (x, y) = position.split_once(',').ok_or_else(parse_err)?;
    let (width, height) = size.split_once('x').ok_or_else(parse_err)?;

    let number = |s: &str| s.parse::<i32>().map_err(|_| parse_err());
    Rect::new(number(x)?, number(y)?, number(width)?, number(height)?).ok_or_else(parse_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::cancel::cancel_pair;

    #[test]
    fn parses_plain_geometry() {
        assert_eq!(
            parse_geometry("10,20 300x400").unwrap(),
            Rect::new(10, 20, 300, 400).unwrap()
        );
    }

    #[test]
    fn accepts_single_trailing_newline() {
        assert_eq!(
            parse_geometry("10,20 300x400\n").unwrap(),
            Rect::new(10, 20, 300, 400).unwrap()
        );
        assert!(parse_geometry("10,20 300x400\n\n").is_err());
    }

    #[test]
    fn accepts_negative_origins() {
        assert_eq!(
            parse_geometry("-1920,-8 640x480").unwrap(),
            Rect::new(-1920, -8, 640, 480).unwrap()
        );
    }

    #[test]
    fn rejects_garbage() {
        for input in ["abc", "", "10,20", "10,20 300", "10 20 300x400", "10,20 300x400 ", "1,2 0x5"] {
            assert!(
                matches!(parse_geometry(input), Err(SelectError::Parse(_))),
                "accepted {input:?}"
            );
        }
    }

    #[tokio::test]
    async fn reads_selection_from_command() {
        let selector = AreaSelector::new(
            ExclusiveSlot::new(),
            "sh",
            vec!["-c".into(), "printf '5,6 70x80\\n'".into()],
        );
        let area = selector.select_area(CancelToken::never()).await.unwrap();
        assert_eq!(area, Rect::new(5, 6, 70, 80).unwrap());
    }

    #[tokio::test]
    async fn long_output_spans_many_chunks() {
        let selector = AreaSelector::new(
            ExclusiveSlot::new(),
            "sh",
            vec!["-c".into(), "printf '%0100d,1 2x3'".into()],
        );
        // 100 zero-padded digits still parse as zero.
        let area = selector.select_area(CancelToken::never()).await.unwrap();
        assert_eq!(area, Rect::new(0, 1, 2, 3).unwrap());
    }

    #[tokio::test]
    async fn empty_output_is_a_parse_error() {
        let selector = AreaSelector::new(ExclusiveSlot::new(), "true", vec![]);
        let err = selector.select_area(CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, SelectError::Parse(ref s) if s.is_empty()));
    }

    #[tokio::test]
    async fn missing_command_is_a_spawn_error() {
        let selector = AreaSelector::new(
            ExclusiveSlot::new(),
            "/nonexistent/waysnap-selector",
            vec![],
        );
        let err = selector.select_area(CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, SelectError::Spawn(_)));
    }

    #[tokio::test]
    async fn concurrent_selection_is_rejected() {
        let slot = ExclusiveSlot::new();
        let _held = slot.try_acquire().unwrap();
        let selector = AreaSelector::new(slot, "true", vec![]);
        let err = selector.select_area(CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, SelectError::Busy));
    }

    #[tokio::test]
    async fn cancellation_discards_partial_output() {
        let slot = ExclusiveSlot::new();
        let selector = AreaSelector::new(
            slot.clone(),
            "sh",
            vec!["-c".into(), "printf '1,2 '; sleep 30".into()],
        );
        let (handle, token) = cancel_pair();
        let task = tokio::spawn(async move { selector.select_area(token).await });

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        handle.cancel();
        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SelectError::Cancelled));
        assert!(!slot.is_held());
    }
}
