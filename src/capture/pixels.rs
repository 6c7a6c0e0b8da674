//! Raw screencopy buffers and their conversion into RGBA images.
//!
//! The compositor fills buffers in one of the `wl_shm` formats. Only the four
//! 32-bit RGB layouts are supported: the ARGB/XRGB variants are normalized in
//! place to ABGR/XBGR (which is plain `R,G,B,A` byte order in memory) before
//! decoding.

use std::fmt;

use image::RgbaImage;

use super::types::CaptureError;

const BYTES_PER_PIXEL: usize = 4;

/// `wl_shm` pixel formats the capture pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Argb8888,
    Xrgb8888,
    Abgr8888,
    Xbgr8888,
    /// Any other `wl_shm` format code; rejected at decode time.
    Other(u32),
}

impl PixelFormat {
    /// Maps a `wl_shm` format code (0/1 for the legacy codes, fourcc otherwise).
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => PixelFormat::Argb8888,
            1 => PixelFormat::Xrgb8888,
            0x3432_4241 => PixelFormat::Abgr8888,
            0x3432_4258 => PixelFormat::Xbgr8888,
            other => PixelFormat::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            PixelFormat::Argb8888 => 0,
            PixelFormat::Xrgb8888 => 1,
            PixelFormat::Abgr8888 => 0x3432_4241,
            PixelFormat::Xbgr8888 => 0x3432_4258,
            PixelFormat::Other(code) => code,
        }
    }

    /// True for layouts without a meaningful alpha channel.
    pub fn ignores_alpha(self) -> bool {
        matches!(self, PixelFormat::Xrgb8888 | PixelFormat::Xbgr8888)
    }

    /// True once the format is in memory-order RGBA.
    pub fn is_normalized(self) -> bool {
        matches!(self, PixelFormat::Abgr8888 | PixelFormat::Xbgr8888)
    }
}

/// Buffer parameters advertised by the compositor for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescription {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl BufferDescription {
    /// Number of bytes the backing storage must provide.
    pub fn byte_len(&self) -> Result<usize, CaptureError> {
        let row = self.width as usize * BYTES_PER_PIXEL;
        if self.width == 0 || self.height == 0 || (self.stride as usize) < row {
            return Err(CaptureError::ImageError(format!(
                "invalid buffer geometry {}x{} stride {}",
                self.width, self.height, self.stride
            )));
        }
        (self.stride as usize)
            .checked_mul(self.height as usize)
            .ok_or_else(|| CaptureError::ImageError("buffer size overflows".into()))
    }
}

/// Memory a [`RawBuffer`] reads from; heap memory or a shared-memory pool.
pub trait BufferStorage {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

impl BufferStorage for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

/// Pixel storage for one captured frame, exclusively owned by its frame state.
pub struct RawBuffer {
    desc: BufferDescription,
    storage: Box<dyn BufferStorage>,
}

impl RawBuffer {
    /// Wraps `storage`, checking that it is large enough for `desc`.
    pub fn new(desc: BufferDescription, storage: Box<dyn BufferStorage>) -> Result<Self, CaptureError> {
        let needed = desc.byte_len()?;
        let available = storage.bytes().len();
        if available < needed {
            return Err(CaptureError::ImageError(format!(
                "buffer storage too small: {} < {} bytes",
                available, needed
            )));
        }
        Ok(Self { desc, storage })
    }

    /// Heap-backed buffer, mainly for tests and headless use.
    pub fn from_vec(desc: BufferDescription, data: Vec<u8>) -> Result<Self, CaptureError> {
        Self::new(desc, Box::new(data))
    }

    pub fn description(&self) -> BufferDescription {
        self.desc
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn bytes(&self) -> &[u8] {
        self.storage.bytes()
    }

    /// Rewrites ARGB/XRGB pixels into ABGR/XBGR order in place.
    ///
    /// Swaps the first and third byte of every visible pixel; stride padding is
    /// left untouched. Already normalized buffers are not modified.
    pub fn normalize(&mut self) -> Result<(), CaptureError> {
        let next = match self.desc.format {
            PixelFormat::Abgr8888 | PixelFormat::Xbgr8888 => return Ok(()),
            PixelFormat::Argb8888 => PixelFormat::Abgr8888,
            PixelFormat::Xrgb8888 => PixelFormat::Xbgr8888,
            PixelFormat::Other(code) => return Err(CaptureError::UnsupportedFormat(code)),
        };

        let stride = self.desc.stride as usize;
        let row_len = self.desc.width as usize * BYTES_PER_PIXEL;
        let height = self.desc.height as usize;
        let bytes = self.storage.bytes_mut();
        for row in bytes.chunks_mut(stride).take(height) {
            for pixel in row[..row_len].chunks_exact_mut(BYTES_PER_PIXEL) {
                pixel.swap(0, 2);
            }
        }

        self.desc.format = next;
        Ok(())
    }

    /// Copies the visible pixels into an RGBA image, optionally flipping vertically.
    ///
    /// The buffer must already be normalized. Formats without alpha decode as
    /// fully opaque.
    pub fn to_image(&self, y_invert: bool) -> Result<RgbaImage, CaptureError> {
        if !self.desc.format.is_normalized() {
            return Err(CaptureError::UnsupportedFormat(self.desc.format.code()));
        }

        let width = self.desc.width as usize;
        let height = self.desc.height as usize;
        let stride = self.desc.stride as usize;
        let row_len = width * BYTES_PER_PIXEL;
        let opaque = self.desc.format.ignores_alpha();

        let mut pixels = Vec::with_capacity(row_len * height);
        for row in self.bytes().chunks(stride).take(height) {
            pixels.extend_from_slice(&row[..row_len]);
        }
        if opaque {
            for pixel in pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
                pixel[3] = u8::MAX;
            }
        }

        let mut image = RgbaImage::from_raw(self.desc.width, self.desc.height, pixels)
            .ok_or_else(|| CaptureError::ImageError("decoded pixel count mismatch".into()))?;
        if y_invert {
            image::imageops::flip_vertical_in_place(&mut image);
        }
        Ok(image)
    }
}

impl fmt::Debug for RawBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBuffer").field("desc", &self.desc).finish()
    }
}
