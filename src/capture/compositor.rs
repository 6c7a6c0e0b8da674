//! Assembles captured outputs into a single image.
//!
//! All outputs are drawn onto one canvas covering the bounding box of their
//! logical rectangles at the canonical (highest) scale. Lower-density outputs
//! are upsampled so nothing is downsampled.

use image::{RgbaImage, imageops};
use log::debug;

use super::{frame::CapturedFrame, types::CaptureError};
use crate::geometry::{Rect, scale_coord};

/// Upper bound for any image the compositor allocates.
const MAX_IMAGE_BYTES: u64 = 1 << 31;

/// Turns a set of successfully captured frames into the final image.
pub trait Compositor {
    fn compose(
        &mut self,
        frames: &[CapturedFrame],
        canonical_scale: f64,
        crop: Option<Rect>,
    ) -> Result<RgbaImage, CaptureError>;
}

/// Default CPU compositor built on the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCompositor;

impl Compositor for ImageCompositor {
    fn compose(
        &mut self,
        frames: &[CapturedFrame],
        canonical_scale: f64,
        crop: Option<Rect>,
    ) -> Result<RgbaImage, CaptureError> {
        compose(frames, canonical_scale, crop)
    }
}

/// Where one output lands on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub monitor_id: u32,
    /// Top-left corner on the canvas in physical pixels.
    pub x: i32,
    pub y: i32,
    /// Clip size on the canvas (the monitor's logical size at canonical scale).
    pub width: u32,
    pub height: u32,
    pub zoom: f64,
    /// Counter-clockwise rotation applied before scaling.
    pub rotation: u32,
}

/// Canvas geometry for one composition.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub bounds: Rect,
    pub canvas_width: u32,
    pub canvas_height: u32,
    /// Placements in ascending monitor id order.
    pub placements: Vec<Placement>,
}

/// Computes the canvas size and per-output placement.
pub fn plan_layout(frames: &[CapturedFrame], canonical_scale: f64) -> Result<Layout, CaptureError> {
    let bounds = Rect::bounding_box(frames.iter().map(|f| &f.monitor.logical))
        .ok_or(CaptureError::NoOutputs)?;
    let canvas_width = scaled_len(bounds.width, canonical_scale)?;
    let canvas_height = scaled_len(bounds.height, canonical_scale)?;

    let mut ordered: Vec<&CapturedFrame> = frames.iter().collect();
    ordered.sort_by_key(|f| f.monitor.id);

    let mut placements = Vec::with_capacity(ordered.len());
    for frame in ordered {
        let monitor = &frame.monitor;
        if monitor.transform.is_flipped() {
            debug!(
                "Ignoring flip of output {} ({:?})",
                monitor.name, monitor.transform
            );
        }
        placements.push(Placement {
            monitor_id: monitor.id,
            x: scale_coord(monitor.logical.x - bounds.x, canonical_scale),
            y: scale_coord(monitor.logical.y - bounds.y, canonical_scale),
            width: scaled_len(monitor.logical.width, canonical_scale)?,
            height: scaled_len(monitor.logical.height, canonical_scale)?,
            zoom: canonical_scale / monitor.scale,
            rotation: monitor.transform.rotation_degrees(),
        });
    }

    Ok(Layout {
        bounds,
        canvas_width,
        canvas_height,
        placements,
    })
}

/// Composes `frames` and optionally crops the result to `crop` (logical coordinates).
pub fn compose(
    frames: &[CapturedFrame],
    canonical_scale: f64,
    crop: Option<Rect>,
) -> Result<RgbaImage, CaptureError> {
    let layout = plan_layout(frames, canonical_scale)?;
    debug!(
        "Composing {} outputs onto {}x{} canvas (bounds {}, scale {})",
        frames.len(),
        layout.canvas_width,
        layout.canvas_height,
        layout.bounds,
        canonical_scale
    );

    let mut canvas = blank_image(layout.canvas_width, layout.canvas_height)?;
    for placement in &layout.placements {
        let Some(frame) = frames.iter().find(|f| f.monitor.id == placement.monitor_id) else {
            continue;
        };
        let upright = rotate(&frame.image, placement.rotation);
        debug!(
            "Output {} zoom {} into {}x{} at {},{}",
            placement.monitor_id, placement.zoom, placement.width, placement.height, placement.x,
            placement.y
        );
        let fitted = fit(upright, placement.width, placement.height);
        imageops::overlay(
            &mut canvas,
            &fitted,
            i64::from(placement.x),
            i64::from(placement.y),
        );
    }

    match crop {
        Some(area) => crop_canvas(&canvas, &layout.bounds, area, canonical_scale),
        None => Ok(canvas),
    }
}

fn rotate(image: &RgbaImage, ccw_degrees: u32) -> RgbaImage {
    match ccw_degrees {
        90 => imageops::rotate270(image),
        180 => imageops::rotate180(image),
        270 => imageops::rotate90(image),
        _ => image.clone(),
    }
}

/// Resamples the upright image to exactly cover its placement.
fn fit(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    imageops::resize(&image, width, height, imageops::FilterType::Triangle)
}

/// Extracts `area` from the canvas; parts outside the canvas stay transparent.
fn crop_canvas(
    canvas: &RgbaImage,
    bounds: &Rect,
    area: Rect,
    scale: f64,
) -> Result<RgbaImage, CaptureError> {
    let scale_wide = |value: i64| (value as f64 * scale) as i64;
    let x = scale_wide(i64::from(area.x) - i64::from(bounds.x));
    let y = scale_wide(i64::from(area.y) - i64::from(bounds.y));
    let width = u32::try_from(scale_wide(i64::from(area.width))).unwrap_or(0);
    let height = u32::try_from(scale_wide(i64::from(area.height))).unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(CaptureError::ImageError(format!(
            "crop {} is empty after scaling",
            area
        )));
    }

    let mut out = blank_image(width, height)?;
    imageops::replace(&mut out, canvas, -x, -y);
    Ok(out)
}

/// Allocates a transparent image, refusing sizes past [`MAX_IMAGE_BYTES`].
fn blank_image(width: u32, height: u32) -> Result<RgbaImage, CaptureError> {
    let bytes = u64::from(width) * u64::from(height) * 4;
    if bytes > MAX_IMAGE_BYTES {
        return Err(CaptureError::ImageError(format!(
            "{}x{} image is too large",
            width, height
        )));
    }
    Ok(RgbaImage::new(width, height))
}

fn scaled_len(value: i32, scale: f64) -> Result<u32, CaptureError> {
    let scaled = scale_coord(value, scale);
    if scaled <= 0 {
        return Err(CaptureError::ImageError(format!(
            "{} at scale {} leaves no pixels",
            value, scale
        )));
    }
    Ok(scaled as u32)
}
