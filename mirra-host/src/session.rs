//! Top-level session event loop.
//!
//! Wires the server session, the stream and controller workers, the
//! screen and the input translator; owns the display/no-display and
//! record/no-record modes; drives the shutdown order:
//!
//! 1. interrupt the decoder and cancel the stream worker,
//! 2. signal the controller to stop (it drains and discards its queue,
//!    then shuts its socket down),
//! 3. terminate the agent process and remove any surviving tunnel,
//! 4. join every worker.

use std::sync::Arc;
use std::time::Duration;

use mirra_core::{
    DeviceBridge, FrameSink, H264Recorder, MirraError, PacketSink, ScreenPowerMode, ServerParams,
    ServerSession, StreamWorker, controller, read_device_meta,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clipboard::Clipboard;
use crate::config::HostConfig;
use crate::event::{Clock, UiEvent};
use crate::input::{InputTranslator, KeyOutcome, UiRequest};
use crate::screen::{Display, Screen};

/// Keep-alive ping period.
const PING_INTERVAL: Duration = Duration::from_millis(1500);

/// Minimum delay between two rotation-hint checks.
const ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Why the event loop ended. Both are successful exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user closed the session (quit shortcut or window close).
    UserQuit,
    /// The device stream ended.
    Eos,
}

/// Run one full mirroring session.
///
/// Returns once the session ends; setup failures have already been
/// surfaced through the display's alert by then.
pub async fn run(
    config: &HostConfig,
    bridge: Arc<dyn DeviceBridge>,
    display: Box<dyn Display>,
    clipboard: Box<dyn Clipboard>,
    mut ui_events: mpsc::UnboundedReceiver<UiEvent>,
    clock: Clock,
) -> Result<ExitReason, MirraError> {
    let serial = config.device.serial.as_deref();
    let params: ServerParams = config.server_params();

    let mut server = match ServerSession::start(Arc::clone(&bridge), serial, &params).await {
        Ok(server) => server,
        Err(e) => {
            display.alert("The device agent failed to start");
            return Err(e);
        }
    };

    if config.session.show_touches {
        info!("enable show_touches");
        set_show_touches(&*bridge, serial, true).await;
    }

    let result = run_connected(config, &mut server, display, clipboard, &mut ui_events, clock).await;

    if config.session.show_touches {
        info!("disable show_touches");
        set_show_touches(&*bridge, serial, false).await;
    }

    result
}

async fn run_connected(
    config: &HostConfig,
    server: &mut ServerSession,
    display: Box<dyn Display>,
    clipboard: Box<dyn Clipboard>,
    ui_events: &mut mpsc::UnboundedReceiver<UiEvent>,
    clock: Clock,
) -> Result<ExitReason, MirraError> {
    let (mut video, control_socket) = match server.connect().await {
        Ok(sockets) => sockets,
        Err(e) => {
            display.alert("Could not connect to the device agent");
            server.stop().await;
            return Err(e);
        }
    };

    // The device sends its name and frame size before the stream; the
    // window can be sized before the first frame arrives.
    let meta = match read_device_meta(&mut video).await {
        Ok(meta) => meta,
        Err(e) => {
            display.alert("Could not read the device session header");
            server.stop().await;
            return Err(e);
        }
    };
    info!(
        "device '{}', frame {}x{}",
        meta.name, meta.frame_size.width, meta.frame_size.height
    );

    let title = config
        .session
        .window_title
        .clone()
        .unwrap_or_else(|| meta.name.clone());
    let mut screen = Screen::new(display, meta.frame_size, title);

    // Decoder side: only when displaying.
    let (decoder, mut frame_rx, interrupt) = if config.session.display {
        let (sink, rx) = FrameSink::new();
        let interrupt = sink.interrupt_handle();
        (
            Some(Box::new(sink) as Box<dyn PacketSink>),
            Some(rx),
            Some(interrupt),
        )
    } else {
        (None, None, None)
    };

    // Recorder side: only when a record path was given.
    let recorder = match &config.session.record {
        Some(path) => match H264Recorder::create(path) {
            Ok(recorder) => Some(Box::new(recorder) as Box<dyn PacketSink>),
            Err(e) => {
                screen.alert("Could not open the recording file");
                server.stop().await;
                return Err(e);
            }
        },
        None => None,
    };

    let stream_token = CancellationToken::new();
    let (stream_notice_tx, mut stream_notice_rx) = mpsc::unbounded_channel();
    let stream_handle =
        StreamWorker::new(decoder, recorder).spawn(video, stream_token.clone(), stream_notice_tx);

    let control_token = CancellationToken::new();
    let (control_handle, control_worker) = controller::spawn(control_socket, control_token.clone());

    let mut translator = InputTranslator::new(
        control_handle,
        clipboard,
        config.session.control,
        config.input.use_ime,
    );

    // ── Event loop ──────────────────────────────────────────────

    translator.set_reference(clock.now_ms());

    if config.session.turn_screen_off {
        translator.send_screen_power_mode(clock.now_ms(), ScreenPowerMode::Off);
    }
    if config.session.fullscreen {
        screen.toggle_fullscreen();
    }

    // The first tick fires immediately: the initial keep-alive.
    let mut ping = tokio::time::interval(PING_INTERVAL);
    let mut last_rotation_check: Option<tokio::time::Instant> = None;

    let exit = loop {
        tokio::select! {
            biased;
            _ = ping.tick() => {
                translator.send_ping(clock.now_ms());
            }
            notice = stream_notice_rx.recv() => {
                let _ = notice;
                debug!("video stream stopped");
                break ExitReason::Eos;
            }
            changed = async { frame_rx.as_mut().unwrap().changed().await }, if frame_rx.is_some() => {
                if changed.is_err() {
                    // The sink is gone; the stream notice will follow.
                    frame_rx = None;
                    continue;
                }
                if !screen.has_frame {
                    screen.has_frame = true;
                    // The very first frame: show the window.
                    screen.show();
                }
                screen.render();
                if screen.fullscreen
                    && config.device.tablet
                    && last_rotation_check
                        .is_none_or(|t| t.elapsed() >= ROTATION_CHECK_INTERVAL)
                {
                    last_rotation_check = Some(tokio::time::Instant::now());
                    if screen.aspect_mismatch() {
                        translator.send_rotation(clock.now_ms(), &screen);
                    }
                }
            }
            event = ui_events.recv() => {
                let Some(event) = event else {
                    // The UI backend is gone; treat it as a user quit.
                    break ExitReason::UserQuit;
                };
                if let Some(exit) = handle_ui_event(
                    event,
                    config,
                    &mut screen,
                    &mut translator,
                    clock,
                ) {
                    break exit;
                }
            }
        }
    };

    if exit == ExitReason::UserQuit {
        translator.send_quit(clock.now_ms());
        info!("stopped by user");
    } else {
        info!("stopped by end of stream");
    }

    // ── Shutdown, in dependency order ───────────────────────────

    if let Some(interrupt) = &interrupt {
        interrupt.interrupt();
    }
    stream_token.cancel();

    // Stop signal for the controller: it drains and discards whatever
    // is still queued, shuts its socket down and exits.
    control_token.cancel();

    server.stop().await;

    // Every blocking call has been released; the joins are unbounded.
    let _ = stream_handle.await;
    let _ = control_worker.await;

    Ok(exit)
}

/// Dispatch one UI event. Returns the exit reason when the session
/// must end.
fn handle_ui_event(
    event: UiEvent,
    config: &HostConfig,
    screen: &mut Screen,
    translator: &mut InputTranslator,
    clock: Clock,
) -> Option<ExitReason> {
    let control = config.session.control;
    match event {
        UiEvent::Quit { .. } => {
            debug!("user requested to quit");
            return Some(ExitReason::UserQuit);
        }
        UiEvent::Key(key) => match translator.process_key(&key) {
            KeyOutcome::Continue => {}
            KeyOutcome::Quit => return Some(ExitReason::UserQuit),
            KeyOutcome::Request(request) => apply_ui_request(request, screen),
        },
        UiEvent::TextInput { timestamp, text } => {
            if control {
                translator.process_text_input(timestamp, &text);
            }
        }
        UiEvent::MouseMotion(motion) => {
            if control {
                translator.process_mouse_motion(&motion, screen);
            }
        }
        UiEvent::MouseWheel(wheel) => {
            if control {
                translator.process_mouse_wheel(&wheel, screen);
            }
        }
        UiEvent::MouseButton(button) => {
            // Processed even without control: double-click resizing
            // does not interact with the device.
            if let Some(request) = translator.process_mouse_button(&button, screen) {
                apply_ui_request(request, screen);
            }
        }
        UiEvent::Finger(finger) => {
            if control {
                translator.process_finger(&finger, screen);
            }
        }
        UiEvent::WindowResized { width, height } => {
            screen.set_window_size(width, height);
            screen.render();
            if screen.fullscreen && config.device.tablet {
                translator.send_rotation(clock.now_ms(), screen);
            }
        }
        UiEvent::WindowExposed => {
            screen.render();
            if screen.fullscreen && config.device.tablet {
                translator.send_rotation(clock.now_ms(), screen);
            }
        }
    }
    None
}

fn apply_ui_request(request: UiRequest, screen: &mut Screen) {
    match request {
        UiRequest::ToggleFullscreen => screen.toggle_fullscreen(),
        UiRequest::ResizeToFit => screen.resize_to_fit(),
        UiRequest::ResizePixelPerfect => screen.resize_to_pixel_perfect(),
        UiRequest::ToggleFpsCounter => screen.fps_counter().toggle(),
    }
}

/// Flip the device's `show_touches` system setting.
async fn set_show_touches(bridge: &dyn DeviceBridge, serial: Option<&str>, enabled: bool) {
    let args: Vec<String> = [
        "shell",
        "settings",
        "put",
        "system",
        "show_touches",
        if enabled { "1" } else { "0" },
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();

    match bridge.execute(serial, &args).await {
        Ok(mut process) => process.wait().await,
        Err(e) => warn!("could not toggle show_touches: {e}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────
