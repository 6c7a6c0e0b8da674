//! wlr-screencopy client, output tracking and capture overlays.

mod backend;
mod handlers;
mod outputs;
mod overlay;
mod screencopy;
mod state;

pub use backend::{AreaChoice, OneShotRequest, RunMode, WaylandBackend};
