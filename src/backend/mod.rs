use anyhow::Result;

use crate::{capture::CaptureRequest, config::Config};

pub mod wayland;

pub use wayland::{AreaChoice, OneShotRequest, RunMode, WaylandBackend};

/// Work handed to the Wayland thread from D-Bus, the CLI or signal handlers.
#[derive(Debug)]
pub enum BackendRequest {
    Capture(CaptureRequest),
    Shutdown,
}

/// Sending half of the backend's request queue.
pub type RequestSender = calloop::channel::Sender<BackendRequest>;

/// Run the Wayland backend until the one-shot capture finished or a daemon is told to stop.
pub fn run_wayland(config: Config, mode: RunMode) -> Result<()> {
    WaylandBackend::new(config)?.run(mode)
}
