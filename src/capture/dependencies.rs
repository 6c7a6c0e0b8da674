use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use image::RgbaImage;

use crate::{
    capture::{
        clipboard,
        file::{self, FileSaveConfig},
        recent, thumbnail,
        types::CaptureError,
    },
    notification,
};

/// Where the saver should put the PNG.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    /// Pick a free timestamped name inside the configured directory.
    Auto(PathBuf),
    /// Create exactly this file.
    Exact(PathBuf),
}

/// Abstraction over file saving for captured screenshots.
pub trait CaptureFileSaver: Send + Sync {
    fn save(&self, png: &[u8], target: &SaveTarget) -> Result<PathBuf, CaptureError>;
}

/// Abstraction over copying screenshots to the clipboard.
pub trait CaptureClipboard: Send + Sync {
    fn copy(&self, png: &[u8]) -> Result<(), CaptureError>;
}

/// Writes a cache thumbnail for a saved screenshot.
pub trait ThumbnailStore: Send + Sync {
    fn store(&self, image: &RgbaImage, saved: &Path) -> anyhow::Result<PathBuf>;
}

/// Records saved screenshots in the recently-used index.
pub trait RecentFiles: Send + Sync {
    fn add(&self, saved: &Path) -> anyhow::Result<()>;
}

/// Presents completion messages to the user.
#[async_trait]
pub trait CaptureNotifier: Send + Sync {
    async fn notify(&self, summary: &str, body: &str) -> Result<(), String>;
}

/// Bundle of dependencies used by the delivery pipeline. Each component can be mocked in tests.
#[derive(Clone)]
pub struct CaptureDependencies {
    pub saver: Arc<dyn CaptureFileSaver>,
    pub clipboard: Arc<dyn CaptureClipboard>,
    pub thumbnails: Arc<dyn ThumbnailStore>,
    pub recent: Arc<dyn RecentFiles>,
    pub notifier: Arc<dyn CaptureNotifier>,
}

impl Default for CaptureDependencies {
    fn default() -> Self {
        Self {
            saver: Arc::new(DefaultFileSaver),
            clipboard: Arc::new(DefaultClipboard),
            thumbnails: Arc::new(DefaultThumbnails),
            recent: Arc::new(DefaultRecentFiles),
            notifier: Arc::new(DesktopNotifier),
        }
    }
}

struct DefaultFileSaver;
struct DefaultClipboard;
struct DefaultThumbnails;
struct DefaultRecentFiles;
struct DesktopNotifier;

impl CaptureFileSaver for DefaultFileSaver {
    fn save(&self, png: &[u8], target: &SaveTarget) -> Result<PathBuf, CaptureError> {
        match target {
            SaveTarget::Auto(directory) => file::save_screenshot(
                png,
                &FileSaveConfig {
                    save_directory: directory.clone(),
                },
            ),
            SaveTarget::Exact(path) => file::save_to_path(png, path),
        }
    }
}

impl CaptureClipboard for DefaultClipboard {
    fn copy(&self, png: &[u8]) -> Result<(), CaptureError> {
        let method = clipboard::copy_png(png)?;
        log::info!("Screenshot copied to clipboard via {:?}", method);
        Ok(())
    }
}

impl ThumbnailStore for DefaultThumbnails {
    fn store(&self, image: &RgbaImage, saved: &Path) -> anyhow::Result<PathBuf> {
        let cache = dirs::cache_dir().ok_or_else(|| anyhow::anyhow!("no cache directory"))?;
        thumbnail::write_thumbnail(image, saved, &cache, chrono::Local::now().timestamp())
    }
}

impl RecentFiles for DefaultRecentFiles {
    fn add(&self, saved: &Path) -> anyhow::Result<()> {
        let index = recent::recent_files_path()
            .ok_or_else(|| anyhow::anyhow!("no data directory for recently-used.xbel"))?;
        let uri = thumbnail::file_uri(saved)?;
        recent::add_recent_file(&index, &uri, chrono::Utc::now())
    }
}

#[async_trait]
impl CaptureNotifier for DesktopNotifier {
    async fn notify(&self, summary: &str, body: &str) -> Result<(), String> {
        notification::send_notification(summary, body, Some("screenshot-portrait-symbolic")).await
    }
}
