//! Host UI event types consumed by the session event loop.
//!
//! The windowing backend (an external collaborator) produces these; the
//! translator turns them into control messages. Every input event
//! carries a millisecond timestamp on the session clock.

use std::time::Instant;

use bitflags::bitflags;

bitflags! {
    /// Modifier keys held during a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const CTRL  = 1;
        const SHIFT = 1 << 1;
        const ALT   = 1 << 2;
        const META  = 1 << 3;
    }
}

bitflags! {
    /// Mouse buttons held during a motion event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ButtonState: u8 {
        const LEFT   = 1;
        const RIGHT  = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

/// A key on the host keyboard, already layout-resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A printable key, lowercase.
    Char(char),
    Backspace,
    Enter,
    Escape,
    Tab,
    Delete,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
}

/// One mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Android `MotionEvent` button mask for this button.
    pub fn android_mask(self) -> u32 {
        match self {
            Self::Left => 1,    // BUTTON_PRIMARY
            Self::Right => 2,   // BUTTON_SECONDARY
            Self::Middle => 4,  // BUTTON_TERTIARY
        }
    }
}

impl ButtonState {
    /// Android button mask of all held buttons.
    pub fn android_mask(self) -> u32 {
        let mut mask = 0;
        if self.contains(Self::LEFT) {
            mask |= MouseButton::Left.android_mask();
        }
        if self.contains(Self::RIGHT) {
            mask |= MouseButton::Right.android_mask();
        }
        if self.contains(Self::MIDDLE) {
            mask |= MouseButton::Middle.android_mask();
        }
        mask
    }
}

/// Phase of a touch contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerPhase {
    Down,
    Up,
    Motion,
}

/// Key press or release.
#[derive(Debug, Clone, Copy)]
pub struct KeyInput {
    pub timestamp: u32,
    pub down: bool,
    pub repeat: bool,
    pub key: Key,
    pub mods: Modifiers,
}

/// Mouse button press or release, window coordinates.
#[derive(Debug, Clone, Copy)]
pub struct MouseButtonInput {
    pub timestamp: u32,
    pub button: MouseButton,
    pub down: bool,
    /// Click count (2 for a double click).
    pub clicks: u8,
    pub x: i32,
    pub y: i32,
}

/// Mouse movement, window coordinates.
#[derive(Debug, Clone, Copy)]
pub struct MouseMotionInput {
    pub timestamp: u32,
    pub x: i32,
    pub y: i32,
    pub held: ButtonState,
}

/// Mouse wheel movement.
#[derive(Debug, Clone, Copy)]
pub struct MouseWheelInput {
    pub timestamp: u32,
    pub hscroll: i32,
    pub vscroll: i32,
}

/// A real touch contact (not synthesized from the mouse).
#[derive(Debug, Clone, Copy)]
pub struct FingerInput {
    pub timestamp: u32,
    pub phase: FingerPhase,
    pub finger_id: i64,
    /// Normalized position in `0.0..=1.0`.
    pub x: f32,
    pub y: f32,
}

/// Everything the session event loop reacts to.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// The user asked to close the session.
    Quit { timestamp: u32 },
    Key(KeyInput),
    TextInput { timestamp: u32, text: String },
    MouseMotion(MouseMotionInput),
    MouseButton(MouseButtonInput),
    MouseWheel(MouseWheelInput),
    Finger(FingerInput),
    WindowResized { width: u32, height: u32 },
    WindowExposed,
}

// ── Clock ────────────────────────────────────────────────────────

/// Millisecond tick source shared by the UI backend and the session.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    /// Milliseconds since the clock was started.
    pub fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_masks() {
        assert_eq!(MouseButton::Left.android_mask(), 1);
        assert_eq!(MouseButton::Right.android_mask(), 2);
        assert_eq!(MouseButton::Middle.android_mask(), 4);

        let state = ButtonState::LEFT | ButtonState::MIDDLE;
        assert_eq!(state.android_mask(), 5);
    }

    #[test]
    fn clock_is_monotonic() {
        let clock = Clock::start();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
