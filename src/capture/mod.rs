//! Screenshot capture for waysnap.
//!
//! This module provides:
//! - Per-output screencopy frame handling and pixel normalization
//! - The capture session controller that joins all outputs
//! - Compositing of mixed-scale, rotated outputs into one image
//! - Delivery to files, the clipboard and remote callers
//! - The interactive area selector bridge

pub mod cancel;
pub mod clipboard;
pub mod compositor;
pub mod controller;
pub mod dependencies;
pub mod exclusive;
pub mod file;
pub mod frame;
pub mod monitor;
pub mod pipeline;
pub mod pixels;
pub mod recent;
pub mod selector;
pub mod thumbnail;
pub mod types;


pub use controller::{CaptureController, Delivery, Rejected, Resolution, ScreencopyBackend};
pub use exclusive::{ExclusiveSlot, SlotGuard};
pub use monitor::{Monitor, MonitorHandle, MonitorTable, Transform};
pub use types::{
    CaptureError, CaptureRequest, CaptureResult, DeliveryIntent, FileTarget,
    ReplyHandle, ScreenshotReply,
};
