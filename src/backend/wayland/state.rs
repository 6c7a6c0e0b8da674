// Holds the live Wayland protocol state shared by the backend loop and the handler
// submodules; routes screencopy events into the capture controller and drives
// overlays and delivery once a session resolves.
use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use calloop::{
    LoopHandle, RegistrationToken,
    channel::Sender,
    timer::{TimeoutAction, Timer},
};
use image::RgbaImage;
use log::{debug, error, info, warn};
use smithay_client_toolkit::{
    compositor::CompositorState, output::OutputState, registry::RegistryState, seat::SeatState,
    shell::wlr_layer::LayerShell, shm::Shm,
};
use wayland_client::{QueueHandle, protocol::wl_output};

use super::{
    outputs,
    overlay::{OverlayKind, Overlays},
    screencopy::ScreencopyClient,
};
use crate::{
    backend::BackendRequest,
    capture::{
        CaptureController, CaptureError, CaptureResult, Delivery, DeliveryIntent, MonitorTable,
        Rejected, Resolution, ScreenshotReply,
        cancel::{CancelHandle, cancel_pair},
        dependencies::CaptureDependencies,
        frame::{FrameEvent, FrameId},
        pipeline::{self, DeliveryOptions},
    },
    config::Config,
    feedback,
};

/// Outcome of one delivery, reported back from the tokio runtime.
pub(super) type DeliveryReport = Result<CaptureResult, CaptureError>;

/// A composed screenshot waiting for the clipboard overlay to get focus.
struct PendingDelivery {
    image: RgbaImage,
    delivery: Delivery,
}

/// Whether the loop should exit after the first capture finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Lifetime {
    Daemon,
    OneShot,
}

/// Internal Wayland state shared across modules.
pub(super) struct WaylandState {
    // Wayland protocol objects
    pub(super) registry_state: RegistryState,
    pub(super) compositor_state: CompositorState,
    pub(super) layer_shell: LayerShell,
    pub(super) shm: Shm,
    pub(super) output_state: OutputState,
    pub(super) seat_state: SeatState,

    // Capture
    pub(super) monitors: MonitorTable,
    pub(super) screencopy: ScreencopyClient,
    pub(super) controller: CaptureController,
    pub(super) overlays: Overlays,
    pending: Option<PendingDelivery>,
    clipboard_timer: Option<RegistrationToken>,
    flash_timer: Option<RegistrationToken>,
    deliveries_in_flight: usize,

    // Configuration
    pub(super) config: Config,
    dependencies: Arc<CaptureDependencies>,
    delivery_options: DeliveryOptions,
    delivery_cancel: CancelHandle,

    // Event loop plumbing
    pub(super) qh: QueueHandle<Self>,
    loop_handle: LoopHandle<'static, Self>,
    completions: Sender<DeliveryReport>,
    pub(super) tokio_handle: tokio::runtime::Handle,

    lifetime: Lifetime,
    one_shot_done: bool,
    should_exit: bool,
    exit_error: Option<anyhow::Error>,
}

impl WaylandState {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        registry_state: RegistryState,
        compositor_state: CompositorState,
        layer_shell: LayerShell,
        shm: Shm,
        output_state: OutputState,
        seat_state: SeatState,
        screencopy: ScreencopyClient,
        controller: CaptureController,
        config: Config,
        dependencies: Arc<CaptureDependencies>,
        qh: QueueHandle<Self>,
        loop_handle: LoopHandle<'static, Self>,
        completions: Sender<DeliveryReport>,
        tokio_handle: tokio::runtime::Handle,
        lifetime: Lifetime,
    ) -> Self {
        let (delivery_cancel, cancel) = cancel_pair();
        let delivery_options = DeliveryOptions {
            save_config: crate::capture::file::FileSaveConfig::from_setting(
                &config.capture.save_directory,
            ),
            notifications: config.feedback.notifications,
            cancel,
        };
        Self {
            registry_state,
            compositor_state,
            layer_shell,
            shm,
            output_state,
            seat_state,
            monitors: MonitorTable::new(),
            screencopy,
            controller,
            overlays: Overlays::new(),
            pending: None,
            clipboard_timer: None,
            flash_timer: None,
            deliveries_in_flight: 0,
            config,
            dependencies,
            delivery_options,
            delivery_cancel,
            qh,
            loop_handle,
            completions,
            tokio_handle,
            lifetime,
            one_shot_done: false,
            should_exit: false,
            exit_error: None,
        }
    }

    pub(super) fn should_exit(&self) -> bool {
        self.should_exit
    }

    pub(super) fn take_exit_error(&mut self) -> Option<anyhow::Error> {
        self.exit_error.take()
    }

    /// Adds or refreshes the monitor record for `output`.
    pub(super) fn sync_output(&mut self, output: &wl_output::WlOutput) {
        let Some(info) = self.output_state.info(output) else {
            debug!("No info for output yet");
            return;
        };
        let Some(monitor) = outputs::monitor_from_info(&info) else {
            debug!("Output {} has no logical geometry yet", info.id);
            return;
        };

        match self.screencopy.handle_for(output) {
            Some(handle) => {
                debug!(
                    "Output '{}' now at {} scale {} {:?}",
                    monitor.name, monitor.logical, monitor.scale, monitor.transform
                );
                if !self.monitors.update(handle, monitor) {
                    warn!("Output update for a stale monitor handle");
                }
            }
            None => {
                info!(
                    "Output '{}' at {} scale {}",
                    monitor.name, monitor.logical, monitor.scale
                );
                if monitor.transform.is_flipped() {
                    debug!(
                        "Output '{}' is flipped; the flip is ignored when composing",
                        monitor.name
                    );
                }
                let handle = self.monitors.insert(monitor);
                self.screencopy.track_output(handle, output.clone());
            }
        }
    }

    pub(super) fn forget_output(&mut self, output: &wl_output::WlOutput) {
        if let Some(handle) = self.screencopy.forget_output(output)
            && let Some(monitor) = self.monitors.remove(handle)
        {
            info!("Output '{}' removed", monitor.name);
        }
    }

    pub(super) fn handle_request(&mut self, request: BackendRequest) {
        match request {
            BackendRequest::Capture(request) => {
                debug!(
                    "Screenshot request: area {:?}, cursor {}, flash {}",
                    request.area, request.include_cursor, request.flash
                );
                if let Err(Rejected { error, request }) =
                    self.controller
                        .start(request, &self.monitors, &mut self.screencopy)
                {
                    warn!("Screenshot request rejected: {}", error);
                    self.report_failure(error, request.intent);
                }
            }
            BackendRequest::Shutdown => {
                info!("Shutdown requested");
                if let Some(resolution) = self
                    .controller
                    .cancel("shutting down", &mut self.screencopy)
                {
                    self.on_resolution(resolution);
                }
                self.delivery_cancel.cancel();
                self.should_exit = true;
            }
        }
    }

    pub(super) fn handle_frame_event(&mut self, frame: FrameId, event: FrameEvent) {
        if let Some(resolution) = self.controller.handle_frame_event(
            frame,
            event,
            &self.monitors,
            &mut self.screencopy,
        ) {
            self.on_resolution(resolution);
        }
    }

    fn on_resolution(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Composed { image, delivery } => {
                if delivery.flash {
                    self.show_flash();
                    if self.config.feedback.haptic {
                        feedback::trigger_screen_capture_async(&self.tokio_handle);
                    }
                }
                if delivery.intent.clipboard {
                    self.await_clipboard_focus(PendingDelivery { image, delivery });
                } else {
                    self.spawn_delivery(image, delivery);
                }
            }
            Resolution::Failed { error, intent } => self.report_failure(error, intent),
        }
    }

    /// Answers a session that never produced an image.
    fn report_failure(&mut self, error: CaptureError, intent: DeliveryIntent) {
        error!("Screenshot failed: {}", error);
        if let Some(reply) = intent.reply {
            reply.complete(ScreenshotReply::failed(None));
        }
        self.finish_one_shot(Err(error));
    }

    fn show_flash(&mut self) {
        self.overlays.show(
            OverlayKind::Flash,
            &self.compositor_state,
            &self.layer_shell,
            &self.qh,
        );
        if let Some(token) = self.flash_timer.take() {
            self.loop_handle.remove(token);
        }
        let duration = Duration::from_millis(self.config.feedback.flash_duration_ms);
        match self
            .loop_handle
            .insert_source(Timer::from_duration(duration), |_, _, state| {
                state.flash_timer = None;
                state.overlays.hide(OverlayKind::Flash);
                state.maybe_exit();
                TimeoutAction::Drop
            }) {
            Ok(token) => self.flash_timer = Some(token),
            Err(err) => {
                warn!("Failed to schedule flash removal: {}", err.error);
                self.overlays.hide(OverlayKind::Flash);
            }
        }
    }

    fn await_clipboard_focus(&mut self, pending: PendingDelivery) {
        self.pending = Some(pending);
        self.overlays.show(
            OverlayKind::Clipboard,
            &self.compositor_state,
            &self.layer_shell,
            &self.qh,
        );
        let delay = Duration::from_millis(self.config.feedback.clipboard_delay_ms);
        match self
            .loop_handle
            .insert_source(Timer::from_duration(delay), |_, _, state| {
                state.clipboard_timer = None;
                state.release_pending_delivery("fallback delay elapsed");
                TimeoutAction::Drop
            }) {
            Ok(token) => self.clipboard_timer = Some(token),
            Err(err) => {
                warn!("Failed to schedule clipboard fallback: {}", err.error);
                self.release_pending_delivery("no fallback timer");
            }
        }
    }

    /// Starts the delivery that was waiting for clipboard focus, if any.
    pub(super) fn release_pending_delivery(&mut self, reason: &str) {
        if let Some(token) = self.clipboard_timer.take() {
            self.loop_handle.remove(token);
        }
        if let Some(PendingDelivery { image, delivery }) = self.pending.take() {
            debug!("Copying screenshot to clipboard ({})", reason);
            self.spawn_delivery(image, delivery);
        }
    }

    fn spawn_delivery(&mut self, image: RgbaImage, delivery: Delivery) {
        let dependencies = Arc::clone(&self.dependencies);
        let options = self.delivery_options.clone();
        let completions = self.completions.clone();
        self.deliveries_in_flight += 1;
        self.tokio_handle.spawn(async move {
            let report = pipeline::deliver(image, delivery, options, dependencies).await;
            if completions.send(report).is_err() {
                debug!("Wayland loop exited before delivery finished");
            }
        });
    }

    pub(super) fn handle_delivery_report(&mut self, report: DeliveryReport) {
        self.deliveries_in_flight = self.deliveries_in_flight.saturating_sub(1);
        if self.deliveries_in_flight == 0 && self.pending.is_none() {
            self.overlays.hide(OverlayKind::Clipboard);
        }
        self.finish_one_shot(report.map(|_| ()));
    }

    /// Drops an overlay the compositor closed on its own.
    pub(super) fn overlay_closed(&mut self, kind: OverlayKind) {
        match kind {
            OverlayKind::Flash => {
                if let Some(token) = self.flash_timer.take() {
                    self.loop_handle.remove(token);
                }
            }
            OverlayKind::Clipboard => self.release_pending_delivery("overlay closed"),
        }
        self.maybe_exit();
    }

    fn finish_one_shot(&mut self, outcome: Result<(), CaptureError>) {
        if self.lifetime != Lifetime::OneShot {
            return;
        }
        if let Err(err) = outcome {
            self.exit_error = Some(anyhow!(err).context("Screenshot failed"));
        }
        self.one_shot_done = true;
        self.maybe_exit();
    }

    fn maybe_exit(&mut self) {
        if self.one_shot_done
            && self.pending.is_none()
            && self.deliveries_in_flight == 0
            && self.overlays.is_idle()
        {
            info!("Screenshot finished, exiting");
            self.should_exit = true;
        }
    }
}
