//! Host key → Android keycode translation.
//!
//! Only keys with a direct Android counterpart are mapped; everything
//! else is dropped by the translator with a debug log. When IME mode is
//! on, letters and space travel as text events instead, so they are
//! excluded from the keycode map.

use crate::event::{Key, Modifiers};

// Android keycodes (android.view.KeyEvent).
pub const AKEYCODE_HOME: u32 = 3;
pub const AKEYCODE_BACK: u32 = 4;
pub const AKEYCODE_0: u32 = 7;
pub const AKEYCODE_A: u32 = 29;
pub const AKEYCODE_COMMA: u32 = 55;
pub const AKEYCODE_PERIOD: u32 = 56;
pub const AKEYCODE_VOLUME_UP: u32 = 24;
pub const AKEYCODE_VOLUME_DOWN: u32 = 25;
pub const AKEYCODE_POWER: u32 = 26;
pub const AKEYCODE_DPAD_UP: u32 = 19;
pub const AKEYCODE_DPAD_DOWN: u32 = 20;
pub const AKEYCODE_DPAD_LEFT: u32 = 21;
pub const AKEYCODE_DPAD_RIGHT: u32 = 22;
pub const AKEYCODE_SPACE: u32 = 62;
pub const AKEYCODE_TAB: u32 = 61;
pub const AKEYCODE_ENTER: u32 = 66;
pub const AKEYCODE_DEL: u32 = 67;
pub const AKEYCODE_MENU: u32 = 82;
pub const AKEYCODE_ESCAPE: u32 = 111;
pub const AKEYCODE_FORWARD_DEL: u32 = 112;
pub const AKEYCODE_MOVE_HOME: u32 = 122;
pub const AKEYCODE_MOVE_END: u32 = 123;
pub const AKEYCODE_PAGE_UP: u32 = 92;
pub const AKEYCODE_PAGE_DOWN: u32 = 93;
pub const AKEYCODE_APP_SWITCH: u32 = 187;

// Android meta states (android.view.KeyEvent).
pub const AMETA_SHIFT_ON: u32 = 0x1;

/// Map a host key to an Android keycode.
///
/// Returns `None` for keys without a counterpart, and for letters and
/// space when `use_ime` is set (those arrive as text).
pub fn to_android_keycode(key: Key, use_ime: bool) -> Option<u32> {
    match key {
        Key::Char(c) => match c {
            'a'..='z' if use_ime => None,
            ' ' if use_ime => None,
            'a'..='z' => Some(AKEYCODE_A + (c as u32 - 'a' as u32)),
            '0'..='9' => Some(AKEYCODE_0 + (c as u32 - '0' as u32)),
            ' ' => Some(AKEYCODE_SPACE),
            ',' => Some(AKEYCODE_COMMA),
            '.' => Some(AKEYCODE_PERIOD),
            _ => None,
        },
        Key::Backspace => Some(AKEYCODE_DEL),
        Key::Enter => Some(AKEYCODE_ENTER),
        Key::Escape => Some(AKEYCODE_ESCAPE),
        Key::Tab => Some(AKEYCODE_TAB),
        Key::Delete => Some(AKEYCODE_FORWARD_DEL),
        Key::Up => Some(AKEYCODE_DPAD_UP),
        Key::Down => Some(AKEYCODE_DPAD_DOWN),
        Key::Left => Some(AKEYCODE_DPAD_LEFT),
        Key::Right => Some(AKEYCODE_DPAD_RIGHT),
        Key::PageUp => Some(AKEYCODE_PAGE_UP),
        Key::PageDown => Some(AKEYCODE_PAGE_DOWN),
        Key::Home => Some(AKEYCODE_MOVE_HOME),
        Key::End => Some(AKEYCODE_MOVE_END),
    }
}

/// Android meta state for the held modifiers.
///
/// Only Shift can reach the device: Alt and Meta are swallowed by the
/// translator, and Ctrl is always a shortcut prefix.
pub fn to_android_metastate(mods: Modifiers) -> u32 {
    if mods.contains(Modifiers::SHIFT) {
        AMETA_SHIFT_ON
    } else {
        0
    }
}
