// Coordinates backend startup/shutdown and drives the calloop event loop while
// delegating protocol state to `WaylandState` and its handler modules.
use std::{sync::Arc, thread, time::Duration};

use anyhow::{Context, Result, anyhow};
use calloop::{EventLoop, channel};
use log::{debug, info, warn};
use signal_hook::{
    consts::signal::{SIGINT, SIGTERM},
    iterator::Signals,
};
use smithay_client_toolkit::{
    compositor::CompositorState, output::OutputState,
    reexports::calloop_wayland_source::WaylandSource, registry::RegistryState, seat::SeatState,
    shell::wlr_layer::LayerShell, shm::Shm,
};
use wayland_client::{Connection, Proxy, globals::registry_queue_init};
use wayland_protocols_wlr::screencopy::v1::client::zwlr_screencopy_manager_v1::ZwlrScreencopyManagerV1;

use super::{
    screencopy::ScreencopyClient,
    state::{DeliveryReport, Lifetime, WaylandState},
};
use crate::{
    backend::{BackendRequest, RequestSender},
    capture::{
        CaptureController, CaptureRequest, DeliveryIntent, ExclusiveSlot, FileTarget,
        dependencies::CaptureDependencies,
        cancel::{CancelToken, cancel_pair},
        selector::AreaSelector,
    },
    config::Config,
    dbus::{self, ScreenshotService},
    geometry::Rect,
};

/// How long pending deliveries may finish after the loop stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Which part of the screen a one-shot capture covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaChoice {
    Everything,
    Fixed(Rect),
    /// Ask the configured selector before connecting.
    Select,
}

/// A screenshot requested from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotRequest {
    pub area: AreaChoice,
    pub include_cursor: bool,
    pub flash: bool,
    pub file: FileTarget,
    pub clipboard: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Serve `org.gnome.Shell.Screenshot` until signalled.
    Daemon,
    OneShot(OneShotRequest),
}

/// Wayland backend state
pub struct WaylandBackend {
    config: Config,
    /// Tokio runtime for delivery, selector and D-Bus work
    tokio_runtime: tokio::runtime::Runtime,
}

impl WaylandBackend {
    pub fn new(config: Config) -> Result<Self> {
        let tokio_runtime = tokio::runtime::Runtime::new()
            .context("Failed to create Tokio runtime for capture operations")?;
        Ok(Self {
            config,
            tokio_runtime,
        })
    }

    pub fn run(self, mode: RunMode) -> Result<()> {
        info!("Starting Wayland backend");

        let selector = AreaSelector::new(
            ExclusiveSlot::new(),
            self.config.selector.command.clone(),
            self.config.selector.args.clone(),
        );

        let one_shot = match mode {
            RunMode::Daemon => None,
            RunMode::OneShot(request) => Some(self.one_shot_request(request, &selector)?),
        };

        // Connect to Wayland compositor
        let conn =
            Connection::connect_to_env().context("Failed to connect to Wayland compositor")?;
        debug!("Connected to Wayland display");

        let (globals, mut event_queue) =
            registry_queue_init(&conn).context("Failed to initialize Wayland registry")?;
        let qh = event_queue.handle();

        let compositor_state =
            CompositorState::bind(&globals, &qh).context("wl_compositor not available")?;
        let layer_shell =
            LayerShell::bind(&globals, &qh).context("zwlr_layer_shell_v1 not available")?;
        let shm = Shm::bind(&globals, &qh).context("wl_shm not available")?;
        let output_state = OutputState::new(&globals, &qh);
        let seat_state = SeatState::new(&globals, &qh);
        let registry_state = RegistryState::new(&globals);
        debug!("Bound core globals");

        let screencopy_manager = match globals.bind::<ZwlrScreencopyManagerV1, _, _>(&qh, 1..=3, ())
        {
            Ok(manager) => {
                info!("Bound zwlr_screencopy_manager_v1 v{}", manager.version());
                Some(manager)
            }
            Err(err) => {
                warn!("zwlr_screencopy_manager_v1 not available: {}", err);
                None
            }
        };
        let screencopy = ScreencopyClient::new(screencopy_manager, shm.wl_shm().clone(), qh.clone());

        let mut event_loop: EventLoop<'static, WaylandState> =
            EventLoop::try_new().context("Failed to create event loop")?;
        let loop_handle = event_loop.handle();

        let (request_tx, request_rx) = channel::channel::<BackendRequest>();
        let (report_tx, report_rx) = channel::channel::<DeliveryReport>();

        let lifetime = if one_shot.is_some() {
            Lifetime::OneShot
        } else {
            Lifetime::Daemon
        };

        let mut state = WaylandState::new(
            registry_state,
            compositor_state,
            layer_shell,
            shm,
            output_state,
            seat_state,
            screencopy,
            CaptureController::new(ExclusiveSlot::new()),
            self.config.clone(),
            Arc::new(CaptureDependencies::default()),
            qh.clone(),
            loop_handle.clone(),
            report_tx,
            self.tokio_runtime.handle().clone(),
            lifetime,
        );

        // Two roundtrips: globals, then the output and xdg-output details they trigger.
        for _ in 0..2 {
            event_queue
                .roundtrip(&mut state)
                .context("Initial Wayland roundtrip failed")?;
        }
        info!("{} output(s) known", state.monitors.len());

        WaylandSource::new(conn.clone(), event_queue)
            .insert(loop_handle.clone())
            .map_err(|err| anyhow!("Failed to insert Wayland source: {}", err.error))?;
        loop_handle
            .insert_source(request_rx, |event, _, state| {
                if let channel::Event::Msg(request) = event {
                    state.handle_request(request);
                }
            })
            .map_err(|err| anyhow!("Failed to insert request channel: {}", err.error))?;
        loop_handle
            .insert_source(report_rx, |event, _, state| {
                if let channel::Event::Msg(report) = event {
                    state.handle_delivery_report(report);
                }
            })
            .map_err(|err| anyhow!("Failed to insert delivery channel: {}", err.error))?;

        forward_signals(request_tx.clone())?;

        let (selection_cancel, selection_token) = cancel_pair();
        let dbus_connection = match one_shot {
            Some(request) => {
                state.handle_request(BackendRequest::Capture(request));
                None
            }
            None => Some(self.tokio_runtime.block_on(dbus::serve(ScreenshotService::new(
                request_tx.clone(),
                selector,
                selection_token,
            )))?),
        };

        while !state.should_exit() {
            event_loop
                .dispatch(None, &mut state)
                .context("Wayland event loop failed")?;
        }

        info!("Wayland backend exiting");
        selection_cancel.cancel();
        let exit_error = state.take_exit_error();
        drop(state);
        drop(dbus_connection);
        self.tokio_runtime.shutdown_timeout(SHUTDOWN_GRACE);

        match exit_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Turns a command-line request into a capture request, running the selector if asked.
    fn one_shot_request(
        &self,
        request: OneShotRequest,
        selector: &AreaSelector,
    ) -> Result<CaptureRequest> {
        let area = match request.area {
            AreaChoice::Everything => None,
            AreaChoice::Fixed(area) => Some(area),
            AreaChoice::Select => {
                info!("Waiting for area selection");
                let area = self
                    .tokio_runtime
                    .block_on(selector.select_area(CancelToken::never()))
                    .context("Area selection failed")?;
                info!("Selected area {}", area);
                Some(area)
            }
        };

        Ok(CaptureRequest {
            area,
            include_cursor: request.include_cursor,
            flash: request.flash,
            intent: DeliveryIntent::internal(request.file, request.clipboard),
        })
    }
}

/// Turns SIGINT/SIGTERM into a shutdown request for the loop.
fn forward_signals(requests: RequestSender) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    thread::Builder::new()
        .name("waysnap-signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                info!("Received signal {}, shutting down", signal);
                if requests.send(BackendRequest::Shutdown).is_err() {
                    break;
                }
            }
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}
