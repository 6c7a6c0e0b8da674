//! `org.gnome.Shell.Screenshot` service.
//!
//! Calls are forwarded to the Wayland thread as [`BackendRequest`]s and
//! answered once the screenshot is delivered or rejected.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use zbus::{Connection, connection, interface};

use crate::{
    backend::{BackendRequest, RequestSender},
    capture::{
        CaptureRequest, DeliveryIntent, ReplyHandle, cancel::CancelToken,
        file::resolve_rpc_filename, selector::AreaSelector,
    },
    geometry::Rect,
};

pub const BUS_NAME: &str = "org.gnome.Shell.Screenshot";
pub const OBJECT_PATH: &str = "/org/gnome/Shell/Screenshot";

pub struct ScreenshotService {
    requests: RequestSender,
    selector: AreaSelector,
    cancel: CancelToken,
}

impl ScreenshotService {
    /// `cancel` aborts running area selections when the daemon stops.
    pub fn new(requests: RequestSender, selector: AreaSelector, cancel: CancelToken) -> Self {
        Self {
            requests,
            selector,
            cancel,
        }
    }

    async fn capture(
        &self,
        area: Option<Rect>,
        include_cursor: bool,
        flash: bool,
        filename: &str,
    ) -> (bool, String) {
        let (reply, response) = ReplyHandle::new();
        let request = CaptureRequest {
            area,
            include_cursor,
            flash,
            intent: DeliveryIntent::for_rpc(resolve_rpc_filename(filename), reply),
        };

        if self.requests.send(BackendRequest::Capture(request)).is_err() {
            warn!("Wayland backend is gone, cannot take screenshot");
            return (false, String::new());
        }

        match response.await {
            Ok(reply) => (reply.success, reply.path),
            Err(_) => {
                warn!("Screenshot request dropped without a reply");
                (false, String::new())
            }
        }
    }
}

#[interface(name = "org.gnome.Shell.Screenshot")]
impl ScreenshotService {
    #[zbus(out_args("success", "filename_used"))]
    async fn screenshot(&self, include_cursor: bool, flash: bool, filename: &str) -> (bool, String) {
        debug!(
            "D-Bus Screenshot, cursor: {}, flash {}, to '{}'",
            include_cursor, flash, filename
        );
        self.capture(None, include_cursor, flash, filename).await
    }

    #[zbus(out_args("success", "filename_used"))]
    async fn screenshot_area(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        flash: bool,
        filename: &str,
    ) -> (bool, String) {
        debug!(
            "D-Bus ScreenshotArea: @{},{} {}x{}, flash {}, to '{}'",
            x, y, width, height, flash, filename
        );
        let Some(area) = Rect::new(x, y, width, height) else {
            warn!(
                "Rejecting screenshot area @{},{} {}x{}",
                x, y, width, height
            );
            return (false, String::new());
        };
        self.capture(Some(area), false, flash, filename).await
    }

    #[zbus(out_args("x", "y", "width", "height"))]
    async fn select_area(&self) -> zbus::fdo::Result<(i32, i32, i32, i32)> {
        debug!("D-Bus SelectArea");
        match self.selector.select_area(self.cancel.clone()).await {
            Ok(area) => Ok((area.x, area.y, area.width, area.height)),
            Err(err) => {
                warn!("Area selection failed: {}", err);
                Err(zbus::fdo::Error::Failed(format!(
                    "Area selection failed: {}",
                    err
                )))
            }
        }
    }
}

/// Claims the bus name and exports the service; keep the connection alive to keep serving.
pub async fn serve(service: ScreenshotService) -> Result<Connection> {
    let connection = connection::Builder::session()
        .context("Failed to connect to the session bus")?
        .name(BUS_NAME)
        .context("Invalid bus name")?
        .serve_at(OBJECT_PATH, service)
        .context("Failed to export screenshot interface")?
        .build()
        .await
        .with_context(|| format!("Failed to acquire {} on the session bus", BUS_NAME))?;
    info!("Serving {} at {}", BUS_NAME, OBJECT_PATH);
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, time::Duration};

    use calloop::{EventLoop, channel};

    use super::*;
    use crate::capture::{ExclusiveSlot, FileTarget, ScreenshotReply};

    fn service(requests: RequestSender) -> ScreenshotService {
        ScreenshotService::new(
            requests,
            AreaSelector::new(ExclusiveSlot::new(), "slurp", Vec::new()),
            CancelToken::never(),
        )
    }

    #[test]
    fn capture_is_forwarded_and_answered() {
        let (tx, rx) = channel::channel();
        let mut event_loop: EventLoop<Option<CaptureRequest>> = EventLoop::try_new().unwrap();
        event_loop
            .handle()
            .insert_source(rx, |event, _, received| {
                if let channel::Event::Msg(BackendRequest::Capture(request)) = event {
                    *received = Some(request);
                }
            })
            .unwrap();

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let service = service(tx);
        let call =
            runtime.spawn(async move { service.capture(None, true, false, "/tmp/remote.png").await });

        let mut received = None;
        for _ in 0..100 {
            event_loop
                .dispatch(Some(Duration::from_millis(20)), &mut received)
                .unwrap();
            if received.is_some() {
                break;
            }
        }
        let request = received.expect("request reached the backend");
        assert!(request.include_cursor);
        assert!(!request.flash);
        assert!(request.area.is_none());
        assert_eq!(
            request.intent.file,
            FileTarget::Path(PathBuf::from("/tmp/remote.png"))
        );

        request.intent.reply.unwrap().complete(ScreenshotReply {
            success: true,
            path: "/tmp/remote.png".into(),
        });
        assert_eq!(
            runtime.block_on(call).unwrap(),
            (true, "/tmp/remote.png".to_string())
        );
    }

    #[tokio::test]
    async fn capture_fails_when_backend_is_gone() {
        let (tx, rx) = channel::channel();
        drop(rx);
        assert_eq!(
            service(tx).capture(None, false, true, "").await,
            (false, String::new())
        );
    }

    #[tokio::test]
    async fn empty_area_is_rejected_without_a_request() {
        let (tx, _rx) = channel::channel();
        assert_eq!(
            service(tx).screenshot_area(0, 0, 0, 10, true, "").await,
            (false, String::new())
        );
    }

    #[tokio::test]
    async fn overflowing_area_is_rejected_without_a_request() {
        let (tx, rx) = channel::channel();
        let mut event_loop: EventLoop<bool> = EventLoop::try_new().unwrap();
        event_loop
            .handle()
            .insert_source(rx, |event, _, received| {
                if let channel::Event::Msg(BackendRequest::Capture(_)) = event {
                    *received = true;
                }
            })
            .unwrap();

        assert_eq!(
            service(tx)
                .screenshot_area(2_147_483_000, 0, 1000, 1000, false, "")
                .await,
            (false, String::new())
        );
        let mut received = false;
        event_loop
            .dispatch(Some(Duration::ZERO), &mut received)
            .unwrap();
        assert!(!received);
    }
}
