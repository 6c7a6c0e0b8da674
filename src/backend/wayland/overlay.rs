//! Full-screen layer surfaces shown around a capture.
//!
//! The flash is a short white surface acknowledging a successful screenshot.
//! The clipboard overlay is an opaque, keyboard-exclusive surface: Wayland only
//! lets focused clients set the selection, so the copy waits for its focus.

use anyhow::{Context, Result};
use log::{debug, info};
use smithay_client_toolkit::{
    compositor::CompositorState,
    shell::{
        WaylandSurface,
        wlr_layer::{Anchor, KeyboardInteractivity, Layer, LayerShell, LayerSurface},
    },
    shm::{Shm, slot::SlotPool},
};
use wayland_client::{
    QueueHandle,
    protocol::{wl_shm, wl_surface},
};

use super::state::WaylandState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum OverlayKind {
    Flash,
    Clipboard,
}

impl OverlayKind {
    fn namespace(self) -> &'static str {
        match self {
            OverlayKind::Flash => "waysnap-flash",
            OverlayKind::Clipboard => "waysnap-clipboard",
        }
    }

    fn color(self) -> (f64, f64, f64, f64) {
        match self {
            OverlayKind::Flash => (1.0, 1.0, 1.0, 0.85),
            OverlayKind::Clipboard => (0.0, 0.0, 0.0, 1.0),
        }
    }

    fn keyboard(self) -> KeyboardInteractivity {
        match self {
            OverlayKind::Flash => KeyboardInteractivity::None,
            OverlayKind::Clipboard => KeyboardInteractivity::Exclusive,
        }
    }
}

struct OverlaySurface {
    kind: OverlayKind,
    layer: LayerSurface,
    pool: Option<SlotPool>,
    width: u32,
    height: u32,
}

impl OverlaySurface {
    fn is(&self, surface: &wl_surface::WlSurface) -> bool {
        self.layer.wl_surface() == surface
    }

    /// Updates the surface dimensions; a size change invalidates the pool.
    fn update_dimensions(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.pool = None;
        }
    }

    fn paint(&mut self, shm: &Shm) -> Result<()> {
        let (width, height) = (self.width, self.height);
        let stride = width * 4;
        if self.pool.is_none() {
            let size = (stride * height) as usize;
            info!(
                "Creating SlotPool for {:?} overlay ({}x{}, {} bytes)",
                self.kind, width, height, size
            );
            self.pool = Some(SlotPool::new(size, shm).context("Failed to create slot pool")?);
        }
        let pool = self
            .pool
            .as_mut()
            .context("Buffer pool not initialized despite previous check")?;

        let (buffer, canvas) = pool
            .create_buffer(
                width as i32,
                height as i32,
                stride as i32,
                wl_shm::Format::Argb8888,
            )
            .context("Failed to create buffer")?;

        // SAFETY: `canvas` is the slot pool's mapping for this buffer, exactly
        // `stride * height` bytes of ARGB32. The Cairo surface and context are
        // dropped before the buffer is attached, so Cairo never touches the
        // memory after the compositor may read it.
        let cairo_surface = unsafe {
            cairo::ImageSurface::create_for_data_unsafe(
                canvas.as_mut_ptr(),
                cairo::Format::ARgb32,
                width as i32,
                height as i32,
                stride as i32,
            )
            .context("Failed to create Cairo surface")?
        };
        let ctx = cairo::Context::new(&cairo_surface).context("Failed to create Cairo context")?;
        paint_solid(&ctx, self.kind.color())?;
        cairo_surface.flush();
        drop(ctx);
        drop(cairo_surface);

        let wl_surface = self.layer.wl_surface();
        wl_surface.attach(Some(buffer.wl_buffer()), 0, 0);
        wl_surface.damage_buffer(0, 0, width as i32, height as i32);
        wl_surface.commit();
        debug!("Painted {:?} overlay {}x{}", self.kind, width, height);
        Ok(())
    }
}

/// Fills the whole target with one color.
fn paint_solid(ctx: &cairo::Context, (r, g, b, a): (f64, f64, f64, f64)) -> Result<()> {
    ctx.set_operator(cairo::Operator::Source);
    ctx.set_source_rgba(r, g, b, a);
    ctx.paint().context("Failed to paint overlay")?;
    Ok(())
}

#[derive(Default)]
pub(super) struct Overlays {
    surfaces: Vec<OverlaySurface>,
}

impl Overlays {
    pub(super) fn new() -> Self {
        Self::default()
    }

    pub(super) fn is_shown(&self, kind: OverlayKind) -> bool {
        self.surfaces.iter().any(|surface| surface.kind == kind)
    }

    pub(super) fn is_idle(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub(super) fn kind_of(&self, surface: &wl_surface::WlSurface) -> Option<OverlayKind> {
        self.surfaces
            .iter()
            .find(|overlay| overlay.is(surface))
            .map(|overlay| overlay.kind)
    }

    /// Maps a full-screen overlay; it is painted on its first configure.
    pub(super) fn show(
        &mut self,
        kind: OverlayKind,
        compositor: &CompositorState,
        layer_shell: &LayerShell,
        qh: &QueueHandle<WaylandState>,
    ) {
        if self.is_shown(kind) {
            debug!("{:?} overlay already shown", kind);
            return;
        }

        let wl_surface = compositor.create_surface(qh);
        let layer = layer_shell.create_layer_surface(
            qh,
            wl_surface,
            Layer::Overlay,
            Some(kind.namespace()),
            None,
        );
        layer.set_anchor(Anchor::all());
        layer.set_keyboard_interactivity(kind.keyboard());
        layer.set_size(0, 0);
        layer.set_exclusive_zone(-1);
        layer.commit();

        info!("Showing {:?} overlay", kind);
        self.surfaces.push(OverlaySurface {
            kind,
            layer,
            pool: None,
            width: 0,
            height: 0,
        });
    }

    /// Destroys the overlay; returns whether one was shown.
    pub(super) fn hide(&mut self, kind: OverlayKind) -> bool {
        let before = self.surfaces.len();
        self.surfaces.retain(|surface| surface.kind != kind);
        let removed = self.surfaces.len() != before;
        if removed {
            info!("Hiding {:?} overlay", kind);
        }
        removed
    }

    /// Handles a layer configure for one of our surfaces.
    pub(super) fn configure(
        &mut self,
        surface: &wl_surface::WlSurface,
        size: (u32, u32),
        shm: &Shm,
    ) -> Result<()> {
        let Some(overlay) = self.surfaces.iter_mut().find(|overlay| overlay.is(surface)) else {
            return Ok(());
        };
        if size.0 == 0 || size.1 == 0 {
            debug!("Ignoring empty configure for {:?} overlay", overlay.kind);
            return Ok(());
        }
        overlay.update_dimensions(size.0, size.1);
        overlay.paint(shm)
    }

    /// Forgets a surface the compositor closed.
    pub(super) fn closed(&mut self, surface: &wl_surface::WlSurface) -> Option<OverlayKind> {
        let kind = self.kind_of(surface)?;
        self.hide(kind);
        Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn painted(kind: OverlayKind) -> Vec<u8> {
        let mut surface = cairo::ImageSurface::create(cairo::Format::ARgb32, 2, 2).unwrap();
        {
            let ctx = cairo::Context::new(&surface).unwrap();
            paint_solid(&ctx, kind.color()).unwrap();
        }
        surface.flush();
        let data = surface.data().unwrap();
        data[..4].to_vec()
    }

    #[test]
    fn clipboard_overlay_is_opaque_black() {
        // Cairo ARGB32 is native-endian premultiplied: B, G, R, A on little endian.
        assert_eq!(painted(OverlayKind::Clipboard)[3], 255);
        assert_eq!(&painted(OverlayKind::Clipboard)[..3], &[0, 0, 0]);
    }

    #[test]
    fn flash_is_translucent_white() {
        let pixel = painted(OverlayKind::Flash);
        assert!(pixel[3] > 200 && pixel[3] < 255);
        assert_eq!(pixel[0], pixel[3]);
    }

    #[test]
    fn only_the_clipboard_overlay_takes_the_keyboard() {
        assert_eq!(
            OverlayKind::Clipboard.keyboard(),
            KeyboardInteractivity::Exclusive
        );
        assert_eq!(OverlayKind::Flash.keyboard(), KeyboardInteractivity::None);
        assert_ne!(
            OverlayKind::Flash.namespace(),
            OverlayKind::Clipboard.namespace()
        );
    }
}
