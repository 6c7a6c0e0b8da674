// Owns the zwlr_screencopy_manager_v1 binding and per-frame protocol objects, and
// allocates the shared-memory buffers the compositor copies outputs into.
use std::{collections::HashMap, fs::File, io, os::fd::AsFd};

use log::{debug, warn};
use memmap2::MmapMut;
use nix::sys::memfd::{MFdFlags, memfd_create};
use wayland_client::{
    Connection, Dispatch, QueueHandle, WEnum,
    protocol::{wl_buffer, wl_output, wl_shm, wl_shm_pool},
};
use wayland_protocols_wlr::screencopy::v1::client::{
    zwlr_screencopy_frame_v1::{self, ZwlrScreencopyFrameV1},
    zwlr_screencopy_manager_v1::{self, ZwlrScreencopyManagerV1},
};

use super::state::WaylandState;
use crate::capture::{
    CaptureError, MonitorHandle, ScreencopyBackend,
    frame::{BufferAllocator, FrameEvent, FrameId},
    pixels::{BufferDescription, BufferStorage, PixelFormat},
};

/// Memfd-backed mapping shared with the compositor.
struct ShmStorage {
    map: MmapMut,
}

impl BufferStorage for ShmStorage {
    fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

struct PendingFrame {
    proxy: ZwlrScreencopyFrameV1,
    buffer: Option<wl_buffer::WlBuffer>,
}

pub(super) struct ScreencopyClient {
    manager: Option<ZwlrScreencopyManagerV1>,
    shm: wl_shm::WlShm,
    qh: QueueHandle<WaylandState>,
    outputs: Vec<(MonitorHandle, wl_output::WlOutput)>,
    frames: HashMap<FrameId, PendingFrame>,
}

impl ScreencopyClient {
    pub(super) fn new(
        manager: Option<ZwlrScreencopyManagerV1>,
        shm: wl_shm::WlShm,
        qh: QueueHandle<WaylandState>,
    ) -> Self {
        Self {
            manager,
            shm,
            qh,
            outputs: Vec::new(),
            frames: HashMap::new(),
        }
    }

    pub(super) fn track_output(&mut self, handle: MonitorHandle, output: wl_output::WlOutput) {
        self.outputs.push((handle, output));
    }

    pub(super) fn handle_for(&self, output: &wl_output::WlOutput) -> Option<MonitorHandle> {
        self.outputs
            .iter()
            .find(|(_, known)| known == output)
            .map(|(handle, _)| *handle)
    }

    pub(super) fn forget_output(&mut self, output: &wl_output::WlOutput) -> Option<MonitorHandle> {
        let index = self.outputs.iter().position(|(_, known)| known == output)?;
        Some(self.outputs.swap_remove(index).0)
    }

    fn create_shm_buffer(
        &self,
        desc: &BufferDescription,
    ) -> Result<(ShmStorage, wl_buffer::WlBuffer), CaptureError> {
        let len = desc.byte_len()?;
        let size = i32::try_from(len)
            .map_err(|_| CaptureError::ImageError(format!("buffer of {} bytes is too large", len)))?;
        let format = wl_shm::Format::try_from(desc.format.code())
            .map_err(|_| CaptureError::UnsupportedFormat(desc.format.code()))?;

        let fd = memfd_create(c"waysnap-screencopy", MFdFlags::MFD_CLOEXEC)
            .map_err(|err| shm_error(io::Error::from(err)))?;
        let file = File::from(fd);
        file.set_len(len as u64).map_err(shm_error)?;

        // SAFETY: the memfd is private to this process and the compositor; it is
        // never truncated while mapped, and the compositor only writes into it
        // between `copy` and `ready`, before we read the mapping.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(shm_error)?;

        let pool = self.shm.create_pool(file.as_fd(), size, &self.qh, ());
        let buffer = pool.create_buffer(
            0,
            desc.width as i32,
            desc.height as i32,
            desc.stride as i32,
            format,
            &self.qh,
            (),
        );
        pool.destroy();

        Ok((ShmStorage { map }, buffer))
    }
}

fn shm_error(err: io::Error) -> CaptureError {
    CaptureError::ImageError(format!("shared memory buffer: {}", err))
}

impl BufferAllocator for ScreencopyClient {
    fn allocate(
        &mut self,
        frame: FrameId,
        desc: &BufferDescription,
    ) -> Result<Box<dyn BufferStorage>, CaptureError> {
        let (storage, buffer) = self.create_shm_buffer(desc)?;
        let Some(pending) = self.frames.get_mut(&frame) else {
            buffer.destroy();
            return Err(CaptureError::OutputFailure {
                output: format!("frame {}", frame.0),
                reason: "buffer for an unknown frame".into(),
            });
        };
        pending.proxy.copy(&buffer);
        pending.buffer = Some(buffer);
        Ok(Box::new(storage))
    }
}

impl ScreencopyBackend for ScreencopyClient {
    fn has_screencopy(&self) -> bool {
        self.manager.is_some()
    }

    fn capture_output(
        &mut self,
        frame: FrameId,
        monitor: MonitorHandle,
        include_cursor: bool,
    ) -> Result<(), CaptureError> {
        let manager = self
            .manager
            .as_ref()
            .ok_or(CaptureError::ProtocolUnavailable)?;
        let output = self
            .outputs
            .iter()
            .find(|(handle, _)| *handle == monitor)
            .map(|(_, output)| output)
            .ok_or(CaptureError::MonitorVanished)?;

        let proxy = manager.capture_output(i32::from(include_cursor), output, &self.qh, frame);
        debug!("Requested screencopy frame {:?}", frame);
        self.frames.insert(
            frame,
            PendingFrame {
                proxy,
                buffer: None,
            },
        );
        Ok(())
    }

    fn release_frame(&mut self, frame: FrameId) {
        if let Some(pending) = self.frames.remove(&frame) {
            pending.proxy.destroy();
            if let Some(buffer) = pending.buffer {
                buffer.destroy();
            }
        }
    }
}

impl Dispatch<ZwlrScreencopyManagerV1, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &ZwlrScreencopyManagerV1,
        _event: zwlr_screencopy_manager_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<wl_shm_pool::WlShmPool, ()> for WaylandState {
    fn event(
        _state: &mut Self,
        _proxy: &wl_shm_pool::WlShmPool,
        _event: wl_shm_pool::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<ZwlrScreencopyFrameV1, FrameId> for WaylandState {
    fn event(
        state: &mut Self,
        _proxy: &ZwlrScreencopyFrameV1,
        event: zwlr_screencopy_frame_v1::Event,
        frame: &FrameId,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
        let frame_event = match event {
            zwlr_screencopy_frame_v1::Event::Buffer {
                format,
                width,
                height,
                stride,
            } => {
                let code = match format {
                    WEnum::Value(format) => u32::from(format),
                    WEnum::Unknown(code) => code,
                };
                FrameEvent::Buffer(BufferDescription {
                    format: PixelFormat::from_code(code),
                    width,
                    height,
                    stride,
                })
            }
            zwlr_screencopy_frame_v1::Event::Flags { flags } => FrameEvent::Flags {
                y_invert: flags
                    .into_result()
                    .map(|flags| flags.contains(zwlr_screencopy_frame_v1::Flags::YInvert))
                    .unwrap_or(false),
            },
            zwlr_screencopy_frame_v1::Event::Ready { .. } => FrameEvent::Ready,
            zwlr_screencopy_frame_v1::Event::Failed => {
                warn!("Compositor failed to copy frame {:?}", frame);
                FrameEvent::Failed
            }
            // Only wl_shm buffers are used; dmabuf offers and damage are irrelevant.
            _ => return,
        };
        state.handle_frame_event(*frame, frame_event);
    }
}
