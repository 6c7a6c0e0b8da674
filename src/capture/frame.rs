//! Per-output capture state machine.
//!
//! Every participating output gets one [`FrameState`]. Protocol events are fed
//! through [`FrameState::handle`]; the first terminal status wins and later
//! events are ignored.

use image::RgbaImage;
use log::{debug, warn};

use super::{
    monitor::{Monitor, MonitorHandle, MonitorTable},
    pixels::{BufferDescription, BufferStorage, RawBuffer},
    types::{CaptureError, FrameStatus},
};

/// Identifies a frame within the controller; also used as protocol user data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

/// Events emitted by the screencopy protocol for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEvent {
    /// The compositor advertised the buffer it wants to copy into.
    Buffer(BufferDescription),
    /// Frame flags; currently only the y-invert bit.
    Flags { y_invert: bool },
    /// The buffer contents are ready.
    Ready,
    /// The compositor could not capture this output.
    Failed,
}

/// Allocates frame storage and requests the copy from the compositor.
pub trait BufferAllocator {
    fn allocate(
        &mut self,
        frame: FrameId,
        desc: &BufferDescription,
    ) -> Result<Box<dyn BufferStorage>, CaptureError>;
}

/// A successfully decoded output together with the geometry it was taken with.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub monitor: Monitor,
    pub image: RgbaImage,
}

#[derive(Debug)]
pub struct FrameState {
    id: FrameId,
    monitor: MonitorHandle,
    buffer: Option<RawBuffer>,
    y_invert: bool,
    status: FrameStatus,
    captured: Option<CapturedFrame>,
    error: Option<CaptureError>,
}

impl FrameState {
    pub fn new(id: FrameId, monitor: MonitorHandle) -> Self {
        Self {
            id,
            monitor,
            buffer: None,
            y_invert: false,
            status: FrameStatus::Unknown,
            captured: None,
            error: None,
        }
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn monitor(&self) -> MonitorHandle {
        self.monitor
    }

    pub fn status(&self) -> FrameStatus {
        self.status
    }

    pub fn error(&self) -> Option<&CaptureError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<CaptureError> {
        self.error.take()
    }

    pub fn captured(&self) -> Option<&CapturedFrame> {
        self.captured.as_ref()
    }

    pub fn take_captured(&mut self) -> Option<CapturedFrame> {
        self.captured.take()
    }

    /// Applies one protocol event.
    ///
    /// Returns `true` when this event moved the frame into a terminal state.
    pub fn handle(
        &mut self,
        event: FrameEvent,
        monitors: &MonitorTable,
        allocator: &mut dyn BufferAllocator,
    ) -> bool {
        if self.status.is_terminal() {
            debug!(
                "Ignoring {:?} for frame {:?} already in {:?}",
                event, self.id, self.status
            );
            return false;
        }

        match event {
            FrameEvent::Buffer(desc) => {
                if self.buffer.is_some() {
                    warn!("Frame {:?} advertised a second buffer; ignoring", self.id);
                    return false;
                }
                debug!(
                    "Handling buffer {}x{} stride {} format 0x{:x} for frame {:?}",
                    desc.width,
                    desc.height,
                    desc.stride,
                    desc.format.code(),
                    self.id
                );
                match allocator
                    .allocate(self.id, &desc)
                    .and_then(|storage| RawBuffer::new(desc, storage))
                {
                    Ok(buffer) => {
                        self.buffer = Some(buffer);
                        false
                    }
                    Err(err) => self.fail(err),
                }
            }
            FrameEvent::Flags { y_invert } => {
                self.y_invert = y_invert;
                false
            }
            FrameEvent::Ready => {
                match self.finish(monitors) {
                    Ok(captured) => {
                        self.captured = Some(captured);
                        self.status = FrameStatus::Success;
                    }
                    Err(err) => {
                        self.fail(err);
                    }
                }
                true
            }
            FrameEvent::Failed => {
                let name = monitors
                    .get(self.monitor)
                    .map(|m| m.name.clone())
                    .unwrap_or_else(|| "<unknown>".into());
                warn!("Failed to copy output '{}'", name);
                self.fail(CaptureError::OutputFailure {
                    output: name,
                    reason: "compositor reported failure".into(),
                })
            }
        }
    }

    fn finish(&mut self, monitors: &MonitorTable) -> Result<CapturedFrame, CaptureError> {
        let Some(monitor) = monitors.get(self.monitor) else {
            warn!("Output went away during screenshot");
            return Err(CaptureError::MonitorVanished);
        };
        let buffer = self.buffer.as_mut().ok_or_else(|| CaptureError::OutputFailure {
            output: monitor.name.clone(),
            reason: "ready without a buffer".into(),
        })?;

        let desc = buffer.description();
        debug!(
            "Frame {:?} {}x{}, stride {}, format 0x{:x} for {} ready",
            self.id,
            desc.width,
            desc.height,
            desc.stride,
            desc.format.code(),
            monitor.name
        );

        if let Err(err) = buffer.normalize() {
            warn!("Unknown buffer format 0x{:x} on {}", desc.format.code(), monitor.name);
            return Err(err);
        }
        let image = buffer.to_image(self.y_invert)?;

        Ok(CapturedFrame {
            monitor: monitor.clone(),
            image,
        })
    }

    fn fail(&mut self, err: CaptureError) -> bool {
        debug!("Frame {:?} failed: {}", self.id, err);
        self.error = Some(err);
        self.status = FrameStatus::Failure;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::{monitor::Transform, pixels::PixelFormat},
        geometry::Rect,
    };

    #[derive(Default)]
    struct HeapAllocator {
        requests: Vec<FrameId>,
        fail: bool,
        /// Store each row's index in its blue byte instead of a uniform fill.
        row_shade: bool,
    }

    impl BufferAllocator for HeapAllocator {
        fn allocate(
            &mut self,
            frame: FrameId,
            desc: &BufferDescription,
        ) -> Result<Box<dyn BufferStorage>, CaptureError> {
            self.requests.push(frame);
            if self.fail {
                return Err(CaptureError::ImageError("no shm".into()));
            }
            // Every pixel stored as B,G,R,A = 1,2,3,255 unless shaded by row.
            let mut data = vec![0u8; desc.byte_len()?];
            for (row, line) in data.chunks_exact_mut(desc.stride as usize).enumerate() {
                let blue = if self.row_shade { row as u8 * 100 } else { 1 };
                for pixel in line.chunks_exact_mut(4) {
                    pixel.copy_from_slice(&[blue, 2, 3, 255]);
                }
            }
            Ok(Box::new(data))
        }
    }

    fn table() -> (MonitorTable, MonitorHandle) {
        let mut table = MonitorTable::new();
        let handle = table.insert(Monitor {
            id: 7,
            name: "DP-1".into(),
            logical: Rect::new(0, 0, 2, 2).unwrap(),
            scale: 1.0,
            transform: Transform::Normal,
        });
        (table, handle)
    }

    fn argb(width: u32, height: u32) -> FrameEvent {
        FrameEvent::Buffer(BufferDescription {
            format: PixelFormat::Argb8888,
            width,
            height,
            stride: width * 4,
        })
    }

    #[test]
    fn buffer_then_ready_succeeds_with_normalized_pixels() {
        let (monitors, handle) = table();
        let mut allocator = HeapAllocator::default();
        let mut frame = FrameState::new(FrameId(1), handle);

        assert!(!frame.handle(argb(2, 2), &monitors, &mut allocator));
        assert_eq!(allocator.requests, vec![FrameId(1)]);
        assert_eq!(frame.status(), FrameStatus::Unknown);

        assert!(frame.handle(FrameEvent::Ready, &monitors, &mut allocator));
        assert_eq!(frame.status(), FrameStatus::Success);
        let captured = frame.captured().unwrap();
        assert_eq!(captured.monitor.id, 7);
        assert_eq!(captured.image.get_pixel(1, 1).0, [3, 2, 1, 255]);
    }

    #[test]
    fn ready_after_monitor_removal_fails() {
        let (mut monitors, handle) = table();
        let mut allocator = HeapAllocator::default();
        let mut frame = FrameState::new(FrameId(1), handle);
        frame.handle(argb(2, 2), &monitors, &mut allocator);

        monitors.remove(handle);
        assert!(frame.handle(FrameEvent::Ready, &monitors, &mut allocator));
        assert_eq!(frame.status(), FrameStatus::Failure);
        assert!(matches!(frame.error(), Some(CaptureError::MonitorVanished)));
    }

    #[test]
    fn unsupported_format_fails_on_ready() {
        let (monitors, handle) = table();
        let mut allocator = HeapAllocator::default();
        let mut frame = FrameState::new(FrameId(1), handle);
        frame.handle(
            FrameEvent::Buffer(BufferDescription {
                format: PixelFormat::Other(0x3631_5258),
                width: 2,
                height: 2,
                stride: 8,
            }),
            &monitors,
            &mut allocator,
        );
        assert!(frame.handle(FrameEvent::Ready, &monitors, &mut allocator));
        assert!(matches!(
            frame.error(),
            Some(CaptureError::UnsupportedFormat(0x3631_5258))
        ));
    }

    #[test]
    fn first_terminal_state_wins() {
        let (monitors, handle) = table();
        let mut allocator = HeapAllocator::default();
        let mut frame = FrameState::new(FrameId(1), handle);

        assert!(frame.handle(FrameEvent::Failed, &monitors, &mut allocator));
        frame.handle(argb(2, 2), &monitors, &mut allocator);
        assert!(!frame.handle(FrameEvent::Ready, &monitors, &mut allocator));
        assert_eq!(frame.status(), FrameStatus::Failure);
        assert!(allocator.requests.is_empty());
    }

    #[test]
    fn ready_without_buffer_fails() {
        let (monitors, handle) = table();
        let mut allocator = HeapAllocator::default();
        let mut frame = FrameState::new(FrameId(1), handle);
        assert!(frame.handle(FrameEvent::Ready, &monitors, &mut allocator));
        assert_eq!(frame.status(), FrameStatus::Failure);
    }

    #[test]
    fn allocation_failure_is_terminal() {
        let (monitors, handle) = table();
        let mut allocator = HeapAllocator {
            fail: true,
            ..Default::default()
        };
        let mut frame = FrameState::new(FrameId(1), handle);
        assert!(frame.handle(argb(2, 2), &monitors, &mut allocator));
        assert_eq!(frame.status(), FrameStatus::Failure);
    }

    fn blue_by_row(frame: &FrameState) -> Vec<u8> {
        let image = &frame.captured().unwrap().image;
        (0..image.height()).map(|y| image.get_pixel(0, y).0[2]).collect()
    }

    #[test]
    fn rows_keep_their_order_without_y_invert() {
        let (monitors, handle) = table();
        let mut allocator = HeapAllocator {
            row_shade: true,
            ..Default::default()
        };
        let mut frame = FrameState::new(FrameId(1), handle);
        frame.handle(argb(2, 3), &monitors, &mut allocator);
        frame.handle(FrameEvent::Ready, &monitors, &mut allocator);
        assert_eq!(blue_by_row(&frame), vec![0, 100, 200]);
    }

    #[test]
    fn y_invert_flag_flips_image() {
        let (monitors, handle) = table();
        let mut allocator = HeapAllocator {
            row_shade: true,
            ..Default::default()
        };
        let mut frame = FrameState::new(FrameId(1), handle);
        frame.handle(argb(2, 3), &monitors, &mut allocator);
        frame.handle(FrameEvent::Flags { y_invert: true }, &monitors, &mut allocator);
        frame.handle(FrameEvent::Ready, &monitors, &mut allocator);
        assert_eq!(frame.status(), FrameStatus::Success);
        assert_eq!(blue_by_row(&frame), vec![200, 100, 0]);
        assert_eq!(frame.captured().unwrap().image.get_pixel(1, 0).0, [3, 2, 200, 255]);
    }
}
