//! Capture session controller.
//!
//! Fans a request out to one [`FrameState`] per participating output, feeds
//! protocol events into them and resolves the session once every frame has
//! reached a terminal state. A single failed output fails the whole session.

use std::fmt;

use image::RgbaImage;
use log::{debug, error, info, warn};

use super::{
    compositor::{Compositor, ImageCompositor},
    exclusive::{ExclusiveSlot, SlotGuard},
    frame::{BufferAllocator, CapturedFrame, FrameEvent, FrameId, FrameState},
    monitor::{MonitorHandle, MonitorTable},
    types::{CaptureError, CaptureRequest, DeliveryIntent, FrameStatus},
};
use crate::geometry::Rect;

/// Protocol side of a capture: issues per-output copy requests.
pub trait ScreencopyBackend: BufferAllocator {
    /// Whether the compositor advertised a screencopy manager.
    fn has_screencopy(&self) -> bool;

    /// Requests one frame of `monitor`; events come back tagged with `frame`.
    fn capture_output(
        &mut self,
        frame: FrameId,
        monitor: MonitorHandle,
        include_cursor: bool,
    ) -> Result<(), CaptureError>;

    /// Destroys protocol objects and buffers belonging to `frame`.
    fn release_frame(&mut self, frame: FrameId);
}

/// A request that was not accepted; the request is handed back untouched.
pub struct Rejected {
    pub error: CaptureError,
    pub request: CaptureRequest,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).finish()
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

/// Everything needed to hand a composed image to the output sink.
///
/// Holds the session's slot guard; no new capture can start until this is
/// dropped.
#[derive(Debug)]
pub struct Delivery {
    pub intent: DeliveryIntent,
    pub flash: bool,
    _guard: SlotGuard,
}

impl Delivery {
    pub fn new(intent: DeliveryIntent, flash: bool, guard: SlotGuard) -> Self {
        Self {
            intent,
            flash,
            _guard: guard,
        }
    }
}

/// How a session ended.
#[derive(Debug)]
pub enum Resolution {
    Composed { image: RgbaImage, delivery: Delivery },
    Failed { error: CaptureError, intent: DeliveryIntent },
}

struct CaptureSession {
    frames: Vec<FrameState>,
    crop: Option<Rect>,
    canonical_scale: f64,
    flash: bool,
    intent: DeliveryIntent,
    guard: SlotGuard,
}

impl CaptureSession {
    fn counts(&self) -> (usize, usize) {
        self.frames
            .iter()
            .fold((0, 0), |(ok, failed), frame| match frame.status() {
                FrameStatus::Success => (ok + 1, failed),
                FrameStatus::Failure => (ok, failed + 1),
                FrameStatus::Unknown => (ok, failed),
            })
    }
}

pub struct CaptureController<C: Compositor = ImageCompositor> {
    slot: ExclusiveSlot,
    compositor: C,
    session: Option<CaptureSession>,
    next_frame: u32,
}

impl CaptureController<ImageCompositor> {
    pub fn new(slot: ExclusiveSlot) -> Self {
        Self::with_compositor(slot, ImageCompositor)
    }
}

impl<C: Compositor> CaptureController<C> {
    pub fn with_compositor(slot: ExclusiveSlot, compositor: C) -> Self {
        Self {
            slot,
            compositor,
            session: None,
            next_frame: 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Starts a capture session.
    ///
    /// Fails without side effects if the slot is taken, screencopy is
    /// unavailable, or no output intersects the requested area.
    pub fn start<B: ScreencopyBackend>(
        &mut self,
        request: CaptureRequest,
        monitors: &MonitorTable,
        backend: &mut B,
    ) -> Result<(), Rejected> {
        let Some(guard) = self.slot.try_acquire() else {
            warn!("Screenshot already in progress");
            return Err(Rejected {
                error: CaptureError::Busy,
                request,
            });
        };
        if !backend.has_screencopy() {
            warn!("Compositor lacks wlr-screencopy support");
            return Err(Rejected {
                error: CaptureError::ProtocolUnavailable,
                request,
            });
        }

        let selected: Vec<(MonitorHandle, f64)> = monitors
            .iter()
            .filter(|(_, monitor)| match &request.area {
                Some(area) => monitor.logical.intersects(area),
                None => true,
            })
            .map(|(handle, monitor)| (handle, monitor.scale))
            .collect();
        if selected.is_empty() {
            warn!("No output to capture (area: {:?})", request.area);
            return Err(Rejected {
                error: CaptureError::NoOutputs,
                request,
            });
        }

        let canonical_scale = selected
            .iter()
            .map(|(_, scale)| *scale)
            .fold(f64::MIN, f64::max);

        let mut frames = Vec::with_capacity(selected.len());
        for (handle, _) in &selected {
            let id = FrameId(self.next_frame);
            self.next_frame = self.next_frame.wrapping_add(1);
            if let Err(err) = backend.capture_output(id, *handle, request.include_cursor) {
                error!("Failed to request frame for output: {}", err);
                for frame in &frames {
                    backend.release_frame(FrameState::id(frame));
                }
                backend.release_frame(id);
                return Err(Rejected {
                    error: err,
                    request,
                });
            }
            frames.push(FrameState::new(id, *handle));
        }

        info!(
            "Capturing {} output(s) at scale {}{}",
            frames.len(),
            canonical_scale,
            request
                .area
                .map(|area| format!(", area {}", area))
                .unwrap_or_default()
        );

        let CaptureRequest {
            area, flash, intent, ..
        } = request;
        self.session = Some(CaptureSession {
            frames,
            crop: area,
            canonical_scale,
            flash,
            intent,
            guard,
        });
        Ok(())
    }

    /// Feeds one protocol event to its frame.
    ///
    /// Returns the resolution when this event completed the session.
    pub fn handle_frame_event<B: ScreencopyBackend>(
        &mut self,
        frame: FrameId,
        event: FrameEvent,
        monitors: &MonitorTable,
        backend: &mut B,
    ) -> Option<Resolution> {
        let session = self.session.as_mut()?;
        let Some(state) = session.frames.iter_mut().find(|f| f.id() == frame) else {
            debug!("Ignoring event for unknown frame {:?}", frame);
            return None;
        };

        if !state.handle(event, monitors, backend) {
            return None;
        }

        let (ok, failed) = session.counts();
        let participants = session.frames.len();
        debug!(
            "Frame {:?} finished: {} ok, {} failed of {}",
            frame, ok, failed, participants
        );
        if ok + failed < participants {
            return None;
        }

        let session = self.session.take()?;
        Some(self.resolve(session, backend))
    }

    /// Aborts the active session, if any.
    pub fn cancel<B: ScreencopyBackend>(&mut self, reason: &str, backend: &mut B) -> Option<Resolution> {
        let session = self.session.take()?;
        warn!("Cancelling screenshot: {}", reason);
        for frame in &session.frames {
            backend.release_frame(frame.id());
        }
        Some(Resolution::Failed {
            error: CaptureError::Cancelled(reason.to_string()),
            intent: session.intent,
        })
    }

    fn resolve<B: ScreencopyBackend>(&mut self, mut session: CaptureSession, backend: &mut B) -> Resolution {
        for frame in &session.frames {
            backend.release_frame(frame.id());
        }

        if let Some(failed) = session
            .frames
            .iter_mut()
            .find(|f| f.status() == FrameStatus::Failure)
        {
            let error = failed.take_error().unwrap_or(CaptureError::OutputFailure {
                output: "<unknown>".into(),
                reason: "unknown failure".into(),
            });
            error!("Screenshot failed: {}", error);
            return Resolution::Failed {
                error,
                intent: session.intent,
            };
        }

        let captured: Vec<CapturedFrame> = session
            .frames
            .iter_mut()
            .filter_map(FrameState::take_captured)
            .collect();

        match self
            .compositor
            .compose(&captured, session.canonical_scale, session.crop)
        {
            Ok(image) => {
                info!("Screenshot composed: {}x{}", image.width(), image.height());
                Resolution::Composed {
                    image,
                    delivery: Delivery {
                        intent: session.intent,
                        flash: session.flash,
                        _guard: session.guard,
                    },
                }
            }
            Err(err) => {
                error!("Failed to compose screenshot: {}", err);
                Resolution::Failed {
                    error: err,
                    intent: session.intent,
                }
            }
        }
    }
}
