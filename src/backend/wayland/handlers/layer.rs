// Paints overlays on configure and forgets the ones the compositor closes.
use log::{info, warn};
use smithay_client_toolkit::shell::{
    WaylandSurface,
    wlr_layer::{LayerShellHandler, LayerSurface, LayerSurfaceConfigure},
};
use wayland_client::{Connection, QueueHandle};

use super::super::state::WaylandState;

impl LayerShellHandler for WaylandState {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        if let Some(kind) = self.overlays.closed(layer.wl_surface()) {
            info!("{:?} overlay closed by compositor", kind);
            self.overlay_closed(kind);
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        if let Err(err) = self
            .overlays
            .configure(layer.wl_surface(), configure.new_size, &self.shm)
        {
            warn!("Failed to paint overlay: {:#}", err);
        }
    }
}
