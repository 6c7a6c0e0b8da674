//! Delivery of composed screenshots: file, clipboard and remote reply.

use std::{fs, future::Future, io::Cursor, path::PathBuf, sync::Arc};

use image::{ImageFormat, RgbaImage};
use tokio::task;

use crate::capture::{
    cancel::CancelToken,
    controller::Delivery,
    dependencies::{CaptureDependencies, SaveTarget},
    file::FileSaveConfig,
    types::{CaptureError, CaptureResult, FileTarget, ScreenshotReply},
};

/// Settings that apply to every delivery.
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    pub save_config: FileSaveConfig,
    /// Send a desktop notification for internally requested file saves.
    pub notifications: bool,
    /// Aborts encoding and saving when the daemon shuts down.
    pub cancel: CancelToken,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            save_config: FileSaveConfig::default(),
            notifications: true,
            cancel: CancelToken::never(),
        }
    }
}

/// Delivers `image` according to `delivery`.
///
/// The capture slot stays held until this returns. Remote callers are always
/// answered, including on failure.
pub async fn deliver(
    image: RgbaImage,
    delivery: Delivery,
    options: DeliveryOptions,
    dependencies: Arc<CaptureDependencies>,
) -> Result<CaptureResult, CaptureError> {
    let mut intent = delivery.intent;
    let reply = intent.reply.take();
    let is_rpc = reply.is_some();
    let wants_file = intent.file != FileTarget::None;

    let outcome = run_delivery(
        Arc::new(image),
        &intent.file,
        intent.clipboard,
        is_rpc,
        &options,
        &dependencies,
    )
    .await;

    match &outcome {
        Ok(result) => log::info!(
            "Screenshot delivered (file: {:?}, clipboard: {})",
            result.saved_path,
            result.copied_to_clipboard
        ),
        Err(err) => log::error!("Screenshot delivery failed: {}", err),
    }

    if let Some(reply) = reply {
        reply.complete(match &outcome {
            Ok(result) => ScreenshotReply {
                success: true,
                path: result
                    .saved_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            },
            Err(_) => ScreenshotReply::failed(None),
        });
    } else if wants_file && options.notifications {
        notify_saved(&dependencies, &outcome).await;
    }

    outcome
}

async fn run_delivery(
    image: Arc<RgbaImage>,
    file: &FileTarget,
    clipboard: bool,
    is_rpc: bool,
    options: &DeliveryOptions,
    dependencies: &CaptureDependencies,
) -> Result<CaptureResult, CaptureError> {
    let png = until_cancelled(&options.cancel, encode_png(Arc::clone(&image))).await?;
    log::debug!("Encoded screenshot: {} bytes", png.len());

    let saved_path = match file {
        FileTarget::None => None,
        FileTarget::Auto => Some(
            save_image(
                dependencies,
                Arc::clone(&png),
                SaveTarget::Auto(options.save_config.save_directory.clone()),
                &options.cancel,
            )
            .await?,
        ),
        FileTarget::Path(path) => Some(
            save_image(
                dependencies,
                Arc::clone(&png),
                SaveTarget::Exact(path.clone()),
                &options.cancel,
            )
            .await?,
        ),
    };

    if let Some(path) = &saved_path {
        record_saved_file(dependencies, image, path.clone(), is_rpc).await;
    }

    let copied_to_clipboard = if clipboard {
        match copy_to_clipboard(dependencies, png).await {
            Ok(()) => true,
            Err(err) if saved_path.is_none() => return Err(err),
            Err(err) => {
                log::error!("Failed to copy to clipboard: {}", err);
                false
            }
        }
    } else {
        false
    };

    Ok(CaptureResult {
        saved_path,
        copied_to_clipboard,
    })
}

async fn encode_png(image: Arc<RgbaImage>) -> Result<Arc<Vec<u8>>, CaptureError> {
    task::spawn_blocking(move || -> Result<Arc<Vec<u8>>, CaptureError> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(Arc::new(buffer.into_inner()))
    })
    .await
    .map_err(|e| CaptureError::ImageError(format!("Encode task failed: {}", e)))?
}

fn cancelled() -> CaptureError {
    CaptureError::Cancelled("delivery aborted on shutdown".to_string())
}

async fn until_cancelled<T>(
    cancel: &CancelToken,
    work: impl Future<Output = Result<T, CaptureError>>,
) -> Result<T, CaptureError> {
    let mut cancel = cancel.clone();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(cancelled()),
        result = work => result,
    }
}

/// Runs the blocking save; on cancellation the file it still produces is removed.
async fn save_image(
    dependencies: &CaptureDependencies,
    png: Arc<Vec<u8>>,
    target: SaveTarget,
    cancel: &CancelToken,
) -> Result<PathBuf, CaptureError> {
    let saver = Arc::clone(&dependencies.saver);
    let mut save = task::spawn_blocking(move || saver.save(&png, &target));
    let mut cancel = cancel.clone();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tokio::spawn(async move {
                if let Ok(Ok(path)) = save.await {
                    match fs::remove_file(&path) {
                        Ok(()) => log::info!("Removed {} after cancelled save", path.display()),
                        Err(err) => log::warn!("Failed to remove {}: {}", path.display(), err),
                    }
                }
            });
            Err(cancelled())
        }
        joined = &mut save => joined
            .map_err(|e| CaptureError::ImageError(format!("Save task failed: {}", e)))?,
    }
}

/// Recent-files entry and thumbnail; failures here are only logged.
async fn record_saved_file(
    dependencies: &CaptureDependencies,
    image: Arc<RgbaImage>,
    path: PathBuf,
    is_rpc: bool,
) {
    let recent = Arc::clone(&dependencies.recent);
    let thumbnails = Arc::clone(&dependencies.thumbnails);
    let result = task::spawn_blocking(move || {
        if !is_rpc && let Err(err) = recent.add(&path) {
            log::warn!("Failed to update recent files: {:#}", err);
        }
        match thumbnails.store(&image, &path) {
            Ok(thumb) => log::debug!("Thumbnail written to {}", thumb.display()),
            Err(err) => log::warn!("Failed to save thumbnail: {:#}", err),
        }
    })
    .await;
    if let Err(err) = result {
        log::warn!("Thumbnail task failed: {}", err);
    }
}

async fn copy_to_clipboard(
    dependencies: &CaptureDependencies,
    png: Arc<Vec<u8>>,
) -> Result<(), CaptureError> {
    let clipboard = Arc::clone(&dependencies.clipboard);
    task::spawn_blocking(move || clipboard.copy(&png))
        .await
        .map_err(|e| CaptureError::ClipboardError(format!("Clipboard task failed: {}", e)))?
}

/// Body of the completion notification for internal file saves.
pub fn notification_body(outcome: &Result<CaptureResult, CaptureError>) -> String {
    match outcome {
        Ok(CaptureResult {
            saved_path: Some(path),
            ..
        }) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            format!("Screenshot saved to '{}'", name)
        }
        _ => "Failed to save screenshot".to_string(),
    }
}

async fn notify_saved(
    dependencies: &CaptureDependencies,
    outcome: &Result<CaptureResult, CaptureError>,
) {
    let body = notification_body(outcome);
    if let Err(err) = dependencies.notifier.notify("Screenshot", &body).await {
        log::warn!("Failed to send notification: {}", err);
    }
}
