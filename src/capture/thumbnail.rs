//! Thumbnails following the freedesktop thumbnail cache layout.

use std::{
    fs::{self, OpenOptions},
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use image::{RgbaImage, imageops};
use md5::{Digest, Md5};

/// Longer edge of a "normal" thumbnail.
pub const THUMBNAIL_SIZE: u32 = 128;

const SOFTWARE: &str = "waysnap";

/// `file://` URI for an absolute path.
pub fn file_uri(path: &Path) -> Result<String> {
    url::Url::from_file_path(path)
        .map(|url| url.to_string())
        .map_err(|_| anyhow!("cannot build a file URI for '{}'", path.display()))
}

/// Cache location for the thumbnail of `uri` below `cache_dir`.
pub fn thumbnail_path(cache_dir: &Path, uri: &str) -> PathBuf {
    let digest = Md5::digest(uri.as_bytes());
    cache_dir
        .join("thumbnails")
        .join("normal")
        .join(format!("{:x}.png", digest))
}

/// Thumbnail dimensions: the longer edge becomes [`THUMBNAIL_SIZE`], rounded to nearest.
pub fn thumbnail_dimensions(width: u32, height: u32) -> (u32, u32) {
    let scale = f64::from(THUMBNAIL_SIZE) / f64::from(width.max(height).max(1));
    let scaled = |v: u32| ((f64::from(v) * scale + 0.5).floor() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Writes a thumbnail of `image` (saved at `source`) into `cache_dir`.
///
/// `mtime` is the unix timestamp recorded in the metadata.
pub fn write_thumbnail(
    image: &RgbaImage,
    source: &Path,
    cache_dir: &Path,
    mtime: i64,
) -> Result<PathBuf> {
    let uri = file_uri(source)?;
    let path = thumbnail_path(cache_dir, &uri);
    if let Some(parent) = path.parent() {
        create_private_dir(parent)
            .with_context(|| format!("failed to create thumbnail folder '{}'", parent.display()))?;
    }

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .with_context(|| format!("failed to create thumbnail file {}", path.display()))?;

    let (width, height) = thumbnail_dimensions(image.width(), image.height());
    let scaled = imageops::resize(image, width, height, imageops::FilterType::Triangle);

    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let chunks = [
        ("Thumb::Image::Width", image.width().to_string()),
        ("Thumb::Image::Height", image.height().to_string()),
        ("Thumb::URI", uri),
        ("Thumb::MTime", mtime.to_string()),
        ("Software", SOFTWARE.to_string()),
    ];
    for (keyword, text) in chunks {
        encoder
            .add_text_chunk(keyword.to_string(), text)
            .context("failed to add thumbnail metadata")?;
    }

    let mut writer = encoder
        .write_header()
        .context("failed to write thumbnail header")?;
    writer
        .write_image_data(scaled.as_raw())
        .context("failed to encode thumbnail")?;
    writer.finish().context("failed to finish thumbnail")?;

    Ok(path)
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}
