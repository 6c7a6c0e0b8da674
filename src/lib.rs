//! Library exports for waysnap.
//!
//! Capture, composition and delivery are plain library code so they can be
//! tested without a compositor; the Wayland backend and the D-Bus service sit
//! on top of them and the binary only parses arguments.

pub mod backend;
pub mod capture;
pub mod config;
pub mod dbus;
pub mod feedback;
pub mod geometry;
pub mod notification;

pub use config::Config;
