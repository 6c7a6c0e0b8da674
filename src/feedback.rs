//! Haptic/audio cue through feedbackd.

use std::collections::HashMap;

use zbus::{Connection, proxy};

pub const APP_ID: &str = "io.github.waysnap";
pub const SCREEN_CAPTURE_EVENT: &str = "screen-capture";

#[proxy(
    interface = "org.sigxcpu.Feedback",
    default_service = "org.sigxcpu.Feedback",
    default_path = "/org/sigxcpu/Feedback"
)]
trait Feedback {
    /// Triggers the feedback for `event`; `timeout` of -1 uses the event default.
    fn trigger_feedback(
        &self,
        app_id: &str,
        event: &str,
        hints: HashMap<&str, zbus::zvariant::Value<'_>>,
        timeout: i32,
    ) -> zbus::Result<u32>;
}

/// Plays the screen-capture cue.
pub async fn trigger_screen_capture() -> Result<u32, String> {
    let connection = Connection::session()
        .await
        .map_err(|e| format!("Failed to connect to session bus: {}", e))?;
    let proxy = FeedbackProxy::new(&connection)
        .await
        .map_err(|e| format!("Failed to create feedback proxy: {}", e))?;
    proxy
        .trigger_feedback(APP_ID, SCREEN_CAPTURE_EVENT, HashMap::new(), -1)
        .await
        .map_err(|e| format!("Failed to trigger feedback: {}", e))
}

/// Fire-and-forget variant for the Wayland thread.
pub fn trigger_screen_capture_async(runtime_handle: &tokio::runtime::Handle) {
    runtime_handle.spawn(async {
        match trigger_screen_capture().await {
            Ok(id) => log::debug!("Triggered feedback event {}", id),
            Err(e) => log::debug!("No screen-capture feedback: {}", e),
        }
    });
}
