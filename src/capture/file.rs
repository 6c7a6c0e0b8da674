//! File saving functionality for screenshots.

use super::types::CaptureError;
use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Number of names tried before giving up on an automatic filename.
pub const MAX_NAME_ATTEMPTS: u32 = 100;

/// Configuration for file saving.
#[derive(Debug, Clone)]
pub struct FileSaveConfig {
    /// Directory automatic screenshots are written to.
    pub save_directory: PathBuf,
}

impl Default for FileSaveConfig {
    fn default() -> Self {
        Self {
            save_directory: default_screenshot_directory(),
        }
    }
}

impl FileSaveConfig {
    /// Uses `configured` when non-empty, the default directory otherwise.
    pub fn from_setting(configured: &str) -> Self {
        if configured.trim().is_empty() {
            Self::default()
        } else {
            Self {
                save_directory: expand_tilde(configured.trim()),
            }
        }
    }
}

/// `<Pictures>/Screenshots`, or `~/Screenshots` without a pictures directory.
pub fn default_screenshot_directory() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Screenshots")
}

/// Builds the automatic filename for `attempt` (0 has no suffix).
pub fn generate_filename(now: &DateTime<Local>, attempt: u32) -> String {
    let timestamp = now.format("%Y-%m-%d %H-%M-%S");
    if attempt == 0 {
        format!("Screenshot from {}.png", timestamp)
    } else {
        format!("Screenshot from {}-{}.png", timestamp, attempt)
    }
}

/// Resolves a filename passed by a remote caller.
///
/// Empty names mean "no file". Relative names go below the first existing of
/// the pictures and home directories. A `.png` suffix is appended if missing.
pub fn resolve_rpc_filename(pattern: &str) -> Option<PathBuf> {
    let candidates = [dirs::picture_dir(), dirs::home_dir()];
    resolve_rpc_filename_in(pattern, candidates.iter().flatten().map(PathBuf::as_path))
}

fn resolve_rpc_filename_in<'a, I>(pattern: &str, bases: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = &'a Path>,
{
    if pattern.is_empty() {
        return None;
    }

    let path = Path::new(pattern);
    let resolved = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let base = bases.into_iter().find(|dir| dir.exists())?;
        base.join(path)
    };

    if resolved.to_string_lossy().ends_with(".png") {
        Some(resolved)
    } else {
        let mut name = resolved.into_os_string();
        name.push(".png");
        Some(PathBuf::from(name))
    }
}

/// Ensure the save directory exists, creating it if necessary.
pub fn ensure_directory_exists(directory: &Path) -> Result<PathBuf, CaptureError> {
    if !directory.exists() {
        log::info!("Creating screenshot directory: {}", directory.display());
        fs::create_dir_all(directory)?;
    }
    Ok(directory.to_path_buf())
}

/// Creates `path`, failing if it already exists.
fn create_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

fn write_png(mut file: File, path: &Path, png: &[u8]) -> Result<(), CaptureError> {
    if let Err(err) = file.write_all(png).and_then(|_| file.sync_all()) {
        log::warn!("Failed to write {}: {}", path.display(), err);
        drop(file);
        let _ = fs::remove_file(path);
        return Err(err.into());
    }
    Ok(())
}

/// Writes PNG bytes to exactly `path`; an existing file is never replaced.
pub fn save_to_path(png: &[u8], path: &Path) -> Result<PathBuf, CaptureError> {
    log::info!("Saving screenshot to: {} ({} bytes)", path.display(), png.len());
    let file = create_exclusive(path)?;
    write_png(file, path, png)?;
    Ok(path.to_path_buf())
}

/// Writes PNG bytes under an automatically chosen name in `config.save_directory`.
pub fn save_screenshot(png: &[u8], config: &FileSaveConfig) -> Result<PathBuf, CaptureError> {
    let directory = ensure_directory_exists(&config.save_directory)?;
    let now = Local::now();

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let path = directory.join(generate_filename(&now, attempt));
        match create_exclusive(&path) {
            Ok(file) => {
                log::debug!("Saving screenshot to '{}'", path.display());
                write_png(file, &path, png)?;
                log::info!("Screenshot saved successfully: {}", path.display());
                return Ok(path);
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err.into()),
        }
    }

    log::warn!(
        "Failed to build screenshot filename in '{}'",
        directory.display()
    );
    Err(CaptureError::SaveError(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free screenshot name in {}", directory.display()),
    )))
}

/// Expand tilde (~) in path strings.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 21, 12, 24, 3).unwrap()
    }

    #[test]
    fn test_generate_filename() {
        assert_eq!(
            generate_filename(&fixed_time(), 0),
            "Screenshot from 2024-05-21 12-24-03.png"
        );
        assert_eq!(
            generate_filename(&fixed_time(), 3),
            "Screenshot from 2024-05-21 12-24-03-3.png"
        );
    }

    #[test]
    fn auto_save_skips_taken_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileSaveConfig {
            save_directory: dir.path().join("Screenshots"),
        };
        let first = save_screenshot(b"one", &config).unwrap();
        let second = save_screenshot(b"two", &config).unwrap();

        assert_ne!(first, second);
        assert_eq!(fs::read(&first).unwrap(), b"one");
        assert_eq!(fs::read(&second).unwrap(), b"two");
        assert!(first.starts_with(dir.path().join("Screenshots")));
    }

    #[test]
    fn explicit_path_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        fs::write(&path, b"old").unwrap();

        let err = save_to_path(b"new", &path).unwrap_err();
        assert!(matches!(err, CaptureError::SaveError(ref e) if e.kind() == io::ErrorKind::AlreadyExists));
        assert_eq!(fs::read(&path).unwrap(), b"old");
    }

    #[test]
    fn rpc_filename_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let bases = [missing.as_path(), dir.path()];

        assert_eq!(resolve_rpc_filename_in("", bases), None);
        assert_eq!(
            resolve_rpc_filename_in("/tmp/shot", bases),
            Some(PathBuf::from("/tmp/shot.png"))
        );
        assert_eq!(
            resolve_rpc_filename_in("/tmp/shot.png", bases),
            Some(PathBuf::from("/tmp/shot.png"))
        );
        assert_eq!(
            resolve_rpc_filename_in("shot", bases),
            Some(dir.path().join("shot.png"))
        );
        assert_eq!(resolve_rpc_filename_in("shot", [missing.as_path()]), None);
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/Pictures");
        assert!(!expanded.to_string_lossy().starts_with("~"));

        let no_tilde = expand_tilde("/absolute/path");
        assert_eq!(no_tilde, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_default_config() {
        let config = FileSaveConfig::default();
        assert!(config.save_directory.ends_with("Screenshots"));
        assert_eq!(
            FileSaveConfig::from_setting("/srv/shots").save_directory,
            PathBuf::from("/srv/shots")
        );
    }
}
