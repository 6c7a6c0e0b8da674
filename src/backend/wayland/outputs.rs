// Converts sctk output descriptions into the monitor records captures work with.
use smithay_client_toolkit::output::OutputInfo;
use wayland_client::protocol::wl_output;

use crate::{
    capture::{Monitor, Transform},
    geometry::Rect,
};

/// Builds a [`Monitor`] once the output has advertised its logical geometry.
pub(super) fn monitor_from_info(info: &OutputInfo) -> Option<Monitor> {
    let (x, y) = info.logical_position?;
    let (width, height) = info.logical_size?;
    let logical = Rect::new(x, y, width, height)?;
    let transform = map_transform(info.transform);
    let mode = info.modes.iter().find(|mode| mode.current).map(|mode| mode.dimensions);

    let name = info
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("{} {}", info.make, info.model));

    Some(Monitor {
        id: info.id,
        name,
        logical,
        scale: fractional_scale(mode, (width, height), transform, info.scale_factor),
        transform,
    })
}

pub(super) fn map_transform(transform: wl_output::Transform) -> Transform {
    match transform {
        wl_output::Transform::_90 => Transform::Rotate90,
        wl_output::Transform::_180 => Transform::Rotate180,
        wl_output::Transform::_270 => Transform::Rotate270,
        wl_output::Transform::Flipped => Transform::Flipped,
        wl_output::Transform::Flipped90 => Transform::Flipped90,
        wl_output::Transform::Flipped180 => Transform::Flipped180,
        wl_output::Transform::Flipped270 => Transform::Flipped270,
        _ => Transform::Normal,
    }
}

/// Physical pixels per logical pixel.
///
/// Derived from the current mode when known, since `wl_output.scale` only
/// carries the rounded-up integer factor.
pub(super) fn fractional_scale(
    mode: Option<(i32, i32)>,
    logical: (i32, i32),
    transform: Transform,
    integer_scale: i32,
) -> f64 {
    let fallback = f64::from(integer_scale.max(1));
    let Some((mode_w, mode_h)) = mode else {
        return fallback;
    };
    // Modes are reported in the panel's native orientation.
    let physical_w = match transform.rotation_degrees() {
        90 | 270 => mode_h,
        _ => mode_w,
    };
    if physical_w <= 0 || logical.0 <= 0 {
        return fallback;
    }
    f64::from(physical_w) / f64::from(logical.0)
}
