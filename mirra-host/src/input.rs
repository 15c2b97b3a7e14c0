//! Host input → control message translation.
//!
//! Runs on the UI thread. Converts [`UiEvent`]s into [`ControlMessage`]s
//! and enqueues them on the controller; window-level effects (fullscreen,
//! resizing, the FPS counter) are returned as [`UiRequest`]s for the
//! session loop to apply.
//!
//! Shortcuts use Cmd on macOS and Ctrl elsewhere. Ctrl+H, Ctrl+M and
//! Ctrl+Q always use literal Ctrl: on macOS, Cmd+H and Cmd+M belong to
//! the system. Events with Alt held (or Meta, outside macOS) are
//! swallowed and never forwarded to the device.
//!
//! Some platforms synthesize mouse events from touches. Every real
//! finger event updates a watermark; mouse events at or within 50 ms of
//! it are dropped as presumed synthetic.

use mirra_core::{
    CLIPBOARD_TEXT_MAX_LENGTH, CommandAction, ControlEvent, ControlMessage, ControllerHandle,
    KeyAction, MotionAction, Position, ScreenPowerMode, TEXT_MAX_LENGTH,
};
use tracing::{debug, warn};

use crate::clipboard::Clipboard;
use crate::event::{
    FingerInput, FingerPhase, Key, KeyInput, Modifiers, MouseButton, MouseButtonInput,
    MouseMotionInput, MouseWheelInput,
};
use crate::keymap;
use crate::screen::Screen;

/// Suppression window after a finger event, in milliseconds.
const SYNTHETIC_MOUSE_WINDOW_MS: u32 = 50;

const ACTION_DOWN: u8 = 1;
const ACTION_UP: u8 = 1 << 1;

/// Window-level effect requested by a shortcut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiRequest {
    ToggleFullscreen,
    ResizeToFit,
    ResizePixelPerfect,
    ToggleFpsCounter,
}

/// Result of processing one key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Event consumed (forwarded or swallowed); keep running.
    Continue,
    /// The quit shortcut was pressed.
    Quit,
    /// Apply a window-level effect.
    Request(UiRequest),
}

/// Translates host UI events into control messages.
pub struct InputTranslator {
    controller: ControllerHandle,
    clipboard: Box<dyn Clipboard>,
    control_enabled: bool,
    use_ime: bool,
    macos: bool,
    /// Millisecond clock reading at event-loop start; all outbound
    /// message timestamps are relative to it.
    reference_timestamp: u32,
    /// Timestamp of the most recent real finger event.
    finger_timestamp: u32,
}

impl InputTranslator {
    pub fn new(
        controller: ControllerHandle,
        clipboard: Box<dyn Clipboard>,
        control_enabled: bool,
        use_ime: bool,
    ) -> Self {
        Self {
            controller,
            clipboard,
            control_enabled,
            use_ime,
            macos: cfg!(target_os = "macos"),
            reference_timestamp: 0,
            finger_timestamp: 0,
        }
    }

    /// Override platform detection (used by tests).
    pub fn with_macos(mut self, macos: bool) -> Self {
        self.macos = macos;
        self
    }

    /// Fix the session reference timestamp. Call once, at event-loop
    /// start.
    pub fn set_reference(&mut self, now_ms: u32) {
        self.reference_timestamp = now_ms;
    }

    fn push(&self, timestamp: u32, event: ControlEvent) {
        let msg = ControlMessage::new(timestamp.wrapping_sub(self.reference_timestamp), event);
        if !self.controller.push(msg) {
            warn!("could not enqueue control message (session stopping)");
        }
    }

    // ── Keyboard ─────────────────────────────────────────────────

    /// Process a key press or release.
    pub fn process_key(&mut self, ev: &KeyInput) -> KeyOutcome {
        let ctrl = ev.mods.contains(Modifiers::CTRL);
        let alt = ev.mods.contains(Modifiers::ALT);
        let meta = ev.mods.contains(Modifiers::META);
        let shift = ev.mods.contains(Modifiers::SHIFT);

        // Cmd on macOS, Ctrl on other platforms.
        let cmd = if self.macos {
            !ctrl && meta
        } else {
            if meta {
                // No shortcut involves Meta here, and it must not be
                // forwarded to the device.
                return KeyOutcome::Continue;
            }
            ctrl
        };

        if alt {
            // No shortcut involves Alt either.
            return KeyOutcome::Continue;
        }

        if ctrl || cmd {
            let control = self.control_enabled;
            let down = ev.down;
            let repeat = ev.repeat;
            let actions = if down { ACTION_DOWN } else { ACTION_UP };
            let ts = ev.timestamp;

            match ev.key {
                // Ctrl+H on all platforms: Cmd+H hides the window on
                // macOS.
                Key::Char('h') => {
                    if control && ctrl && !meta && !shift && !repeat {
                        self.send_keycode(ts, keymap::AKEYCODE_HOME, actions, "HOME");
                    }
                }
                Key::Char('b') | Key::Backspace => {
                    if control && cmd && !shift && !repeat {
                        self.send_keycode(ts, keymap::AKEYCODE_BACK, actions, "BACK");
                    }
                }
                Key::Char('s') => {
                    if control && cmd && !shift && !repeat {
                        self.send_keycode(ts, keymap::AKEYCODE_APP_SWITCH, actions, "APP_SWITCH");
                    }
                }
                // Ctrl+M on all platforms: Cmd+M minimizes on macOS.
                Key::Char('m') => {
                    if control && ctrl && !meta && !shift && !repeat {
                        self.send_keycode(ts, keymap::AKEYCODE_MENU, actions, "MENU");
                    }
                }
                Key::Char('p') => {
                    if control && cmd && !shift && !repeat {
                        self.send_keycode(ts, keymap::AKEYCODE_POWER, actions, "POWER");
                    }
                }
                Key::Char('o') => {
                    if control && cmd && down {
                        let mode = if shift {
                            ScreenPowerMode::Normal
                        } else {
                            ScreenPowerMode::Off
                        };
                        self.send_screen_power_mode(ts, mode);
                    }
                }
                Key::Down => {
                    if control && cmd && !shift {
                        // Forward repeated events.
                        self.send_keycode(ts, keymap::AKEYCODE_VOLUME_DOWN, actions, "VOLUME_DOWN");
                    }
                }
                Key::Up => {
                    if control && cmd && !shift {
                        // Forward repeated events.
                        self.send_keycode(ts, keymap::AKEYCODE_VOLUME_UP, actions, "VOLUME_UP");
                    }
                }
                Key::Char('c') => {
                    if control && cmd && !shift && !repeat && down {
                        self.send_command(ts, CommandAction::GetClipboard, "get clipboard");
                    }
                }
                Key::Char('v') => {
                    if control && cmd && !repeat && down {
                        if shift {
                            self.set_device_clipboard(ts);
                        } else {
                            self.clipboard_paste(ts);
                        }
                    }
                }
                Key::Char('f') => {
                    if !shift && cmd && !repeat && down {
                        return KeyOutcome::Request(UiRequest::ToggleFullscreen);
                    }
                }
                Key::Char('q') => {
                    if ctrl && !meta && !shift && !repeat && down {
                        return KeyOutcome::Quit;
                    }
                }
                Key::Char('x') => {
                    if !shift && cmd && !repeat && down {
                        return KeyOutcome::Request(UiRequest::ResizeToFit);
                    }
                }
                Key::Char('g') => {
                    if !shift && cmd && !repeat && down {
                        return KeyOutcome::Request(UiRequest::ResizePixelPerfect);
                    }
                }
                Key::Char('i') => {
                    if !shift && cmd && !repeat && down {
                        return KeyOutcome::Request(UiRequest::ToggleFpsCounter);
                    }
                }
                Key::Char('n') => {
                    if control && cmd && !repeat && down {
                        if shift {
                            self.send_command(
                                ts,
                                CommandAction::CollapseNotificationPanel,
                                "collapse notification panel",
                            );
                        } else {
                            self.send_command(
                                ts,
                                CommandAction::ExpandNotificationPanel,
                                "expand notification panel",
                            );
                        }
                    }
                }
                _ => {}
            }

            // Every modifier chord is captured, matched or not.
            return KeyOutcome::Continue;
        }

        if !self.control_enabled {
            return KeyOutcome::Continue;
        }

        match keymap::to_android_keycode(ev.key, self.use_ime) {
            Some(keycode) => {
                let action = if ev.down { KeyAction::Down } else { KeyAction::Up };
                self.push(ev.timestamp, ControlEvent::Keycode {
                    action,
                    keycode,
                    metastate: keymap::to_android_metastate(ev.mods),
                });
            }
            None => debug!("no keycode mapping for {:?}", ev.key),
        }
        KeyOutcome::Continue
    }

    /// Process a committed text input event.
    pub fn process_text_input(&mut self, timestamp: u32, text: &str) {
        if !self.use_ime {
            let mut chars = text.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                if c.is_ascii_alphabetic() || c == ' ' {
                    // Letters and space are handled as raw key events.
                    return;
                }
            }
        }
        self.inject_text(timestamp, text.to_owned());
    }

    // ── Mouse ────────────────────────────────────────────────────

    /// Whether a mouse event is presumed synthesized from a touch.
    fn is_synthetic_mouse(&self, timestamp: u32) -> bool {
        timestamp <= self.finger_timestamp
            || timestamp - self.finger_timestamp <= SYNTHETIC_MOUSE_WINDOW_MS
    }

    /// Process a mouse button press or release.
    pub fn process_mouse_button(
        &mut self,
        ev: &MouseButtonInput,
        screen: &mut Screen,
    ) -> Option<UiRequest> {
        // Some platforms also synthesize "right click" for long touch.
        if self.is_synthetic_mouse(ev.timestamp) {
            return None;
        }

        screen.note_mouse(ev.x, ev.y);

        if ev.down {
            if self.control_enabled && ev.button == MouseButton::Right {
                // Turn the screen on if it was off, press BACK otherwise.
                self.send_command(ev.timestamp, CommandAction::BackOrScreenOn, "back or screen on");
                return None;
            }
            if self.control_enabled && ev.button == MouseButton::Middle {
                self.send_keycode(
                    ev.timestamp,
                    keymap::AKEYCODE_HOME,
                    ACTION_DOWN | ACTION_UP,
                    "HOME",
                );
                return None;
            }
            // Double-click on the black borders resizes to fit.
            if ev.button == MouseButton::Left && ev.clicks >= 2 {
                let point = screen.window_to_frame(ev.x, ev.y);
                if screen.is_outside_frame(point) {
                    return Some(UiRequest::ResizeToFit);
                }
            }
        }

        if !self.control_enabled {
            return None;
        }

        let action = if ev.down {
            MotionAction::Down
        } else {
            MotionAction::Up
        };
        self.push(ev.timestamp, ControlEvent::Mouse {
            action,
            buttons: ev.button.android_mask(),
            position: Position {
                point: screen.window_to_frame(ev.x, ev.y),
                screen_size: screen.frame_size,
            },
        });
        None
    }

    /// Process mouse movement. Forwarded only while a button is held.
    pub fn process_mouse_motion(&mut self, ev: &MouseMotionInput, screen: &mut Screen) {
        if self.is_synthetic_mouse(ev.timestamp) {
            return;
        }

        screen.note_mouse(ev.x, ev.y);

        if ev.held.is_empty() {
            // Do not send motion events when no button is pressed.
            return;
        }

        self.push(ev.timestamp, ControlEvent::Mouse {
            action: MotionAction::Move,
            buttons: ev.held.android_mask(),
            position: Position {
                point: screen.window_to_frame(ev.x, ev.y),
                screen_size: screen.frame_size,
            },
        });
    }

    /// Process a mouse wheel event. The position is the current
    /// pointer location in device coordinates.
    pub fn process_mouse_wheel(&mut self, ev: &MouseWheelInput, screen: &Screen) {
        self.push(ev.timestamp, ControlEvent::Scroll {
            position: Position {
                point: screen.mouse_position(),
                screen_size: screen.frame_size,
            },
            hscroll: ev.hscroll,
            vscroll: ev.vscroll,
        });
    }

    /// Process a real touch contact and update the finger watermark.
    pub fn process_finger(&mut self, ev: &FingerInput, screen: &Screen) {
        self.finger_timestamp = ev.timestamp;

        let action = match ev.phase {
            FingerPhase::Down => MotionAction::Down,
            FingerPhase::Up => MotionAction::Up,
            FingerPhase::Motion => MotionAction::Move,
        };
        let x = (ev.x * screen.frame_size.width as f32) as i32;
        let y = (ev.y * screen.frame_size.height as f32) as i32;
        self.push(ev.timestamp, ControlEvent::Touch {
            action,
            touch_id: ev.finger_id as i32,
            position: Position::new(x, y, screen.frame_size),
        });
    }

    // ── Synthesized messages ─────────────────────────────────────

    /// Keep-alive ping, driven by the session timer.
    pub fn send_ping(&self, now_ms: u32) {
        self.send_command(now_ms, CommandAction::Ping, "ping");
    }

    /// Final quit command before the session exits.
    pub fn send_quit(&self, now_ms: u32) {
        self.send_command(now_ms, CommandAction::Quit, "quit");
    }

    /// Ask the device to match the host window orientation.
    pub fn send_rotation(&self, now_ms: u32, screen: &Screen) {
        if !screen.has_frame || !screen.fullscreen {
            return;
        }
        let (w, h) = screen.window_size;
        let action = if w < h {
            CommandAction::Portrait
        } else {
            CommandAction::Landscape
        };
        self.send_command(now_ms, action, "rotation");
    }

    /// Set the device display power mode (also used by the
    /// turn-screen-off startup option).
    pub fn send_screen_power_mode(&self, timestamp: u32, mode: ScreenPowerMode) {
        self.push(timestamp, ControlEvent::SetScreenPowerMode { mode });
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn send_keycode(&self, timestamp: u32, keycode: u32, actions: u8, name: &str) {
        if actions & ACTION_DOWN != 0 {
            self.push(timestamp, ControlEvent::Keycode {
                action: KeyAction::Down,
                keycode,
                metastate: 0,
            });
            debug!("inject {name} (DOWN)");
        }
        if actions & ACTION_UP != 0 {
            self.push(timestamp, ControlEvent::Keycode {
                action: KeyAction::Up,
                keycode,
                metastate: 0,
            });
            debug!("inject {name} (UP)");
        }
    }

    fn send_command(&self, timestamp: u32, action: CommandAction, name: &str) {
        debug!("request '{name}'");
        self.push(timestamp, ControlEvent::Command { action });
    }

    fn inject_text(&self, timestamp: u32, text: String) {
        if text.len() > TEXT_MAX_LENGTH {
            warn!("dropping oversized text input ({} bytes)", text.len());
            return;
        }
        self.push(timestamp, ControlEvent::Text { text });
    }

    /// Paste the host clipboard as injected text.
    fn clipboard_paste(&mut self, timestamp: u32) {
        let Some(text) = self.clipboard.get_text() else {
            warn!("could not read the host clipboard");
            return;
        };
        if text.is_empty() {
            return;
        }
        self.inject_text(timestamp, text);
    }

    /// Store the host clipboard in the device clipboard.
    fn set_device_clipboard(&mut self, timestamp: u32) {
        let Some(text) = self.clipboard.get_text() else {
            warn!("could not read the host clipboard");
            return;
        };
        if text.is_empty() {
            return;
        }
        if text.len() > CLIPBOARD_TEXT_MAX_LENGTH {
            warn!("dropping oversized clipboard text ({} bytes)", text.len());
            return;
        }
        self.push(timestamp, ControlEvent::SetClipboard { text });
    }
}

// ── Tests ────────────────────────────────────────────────────────
