//! Control messages sent from the host to the device agent.
//!
//! Each outbound message is one type byte followed by a variant-specific
//! body with big-endian numerics. Variable-length text is length-prefixed
//! with a `u16` and capped ([`TEXT_MAX_LENGTH`] for injected text,
//! [`CLIPBOARD_TEXT_MAX_LENGTH`] for the clipboard).
//!
//! ## Wire format
//!
//! ```text
//! KEYCODE       (0x00)  u8 action, be_u32 keycode, be_u32 metastate
//! TEXT          (0x01)  be_u16 len, utf8[len]
//! MOUSE         (0x02)  u8 action, be_u32 buttons, position
//! TOUCH         (0x03)  u8 action, be_i32 id, position
//! SCROLL        (0x04)  position, be_i32 hscroll, be_i32 vscroll
//! COMMAND       (0x05)  u8 action
//! SET_CLIPBOARD (0x06)  be_u16 len, utf8[len]
//! SET_POWER     (0x07)  u8 mode
//!
//! position = be_i32 x, be_i32 y, be_u16 width, be_u16 height
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::error::MirraError;

/// Maximum encoded length of injected text.
pub const TEXT_MAX_LENGTH: usize = 300;

/// Maximum encoded length of clipboard text.
pub const CLIPBOARD_TEXT_MAX_LENGTH: usize = 4093;

/// Largest possible serialized message (type + length prefix + clipboard).
pub const SERIALIZED_MAX_SIZE: usize = 3 + CLIPBOARD_TEXT_MAX_LENGTH;

// ── Geometry ─────────────────────────────────────────────────────

/// A point in device frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

/// A point qualified by the device frame size it was measured against.
///
/// The agent rescales `point` from `screen_size` to the current device
/// resolution, so the host must always report the frame size it knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub point: Point,
    pub screen_size: Size,
}

impl Position {
    pub fn new(x: i32, y: i32, screen_size: Size) -> Self {
        Self {
            point: Point { x, y },
            screen_size,
        }
    }

    fn serialize(&self, buf: &mut BytesMut) {
        buf.put_i32(self.point.x);
        buf.put_i32(self.point.y);
        buf.put_u16(self.screen_size.width);
        buf.put_u16(self.screen_size.height);
    }

    fn deserialize(buf: &mut &[u8]) -> Result<Self, MirraError> {
        if buf.len() < 12 {
            return Err(MirraError::ShortRead {
                expected: 12,
                actual: buf.len(),
            });
        }
        Ok(Self {
            point: Point {
                x: buf.get_i32(),
                y: buf.get_i32(),
            },
            screen_size: Size {
                width: buf.get_u16(),
                height: buf.get_u16(),
            },
        })
    }
}

// ── Actions ──────────────────────────────────────────────────────

/// Android `KeyEvent` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyAction {
    Down = 0,
    Up = 1,
}

/// Android `MotionEvent` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MotionAction {
    Down = 0,
    Up = 1,
    Move = 2,
}

/// Device-side commands without a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandAction {
    BackOrScreenOn = 0,
    ExpandNotificationPanel = 1,
    CollapseNotificationPanel = 2,
    Quit = 3,
    Portrait = 4,
    Landscape = 5,
    Ping = 6,
    GetClipboard = 7,
}

/// Display power mode, mirroring `SurfaceControl` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScreenPowerMode {
    Off = 0,
    Normal = 2,
}

// ── ControlEvent ─────────────────────────────────────────────────

const TYPE_INJECT_KEYCODE: u8 = 0;
const TYPE_INJECT_TEXT: u8 = 1;
const TYPE_INJECT_MOUSE_EVENT: u8 = 2;
const TYPE_INJECT_TOUCH_EVENT: u8 = 3;
const TYPE_INJECT_SCROLL_EVENT: u8 = 4;
const TYPE_COMMAND: u8 = 5;
const TYPE_SET_CLIPBOARD: u8 = 6;
const TYPE_SET_SCREEN_POWER_MODE: u8 = 7;

/// Payload of a control message. Variants own their text by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    Keycode {
        action: KeyAction,
        keycode: u32,
        metastate: u32,
    },
    Text {
        text: String,
    },
    Mouse {
        action: MotionAction,
        buttons: u32,
        position: Position,
    },
    Touch {
        action: MotionAction,
        touch_id: i32,
        position: Position,
    },
    Scroll {
        position: Position,
        hscroll: i32,
        vscroll: i32,
    },
    Command {
        action: CommandAction,
    },
    SetClipboard {
        text: String,
    },
    SetScreenPowerMode {
        mode: ScreenPowerMode,
    },
}

/// A control message queued for the device: the event plus a timestamp
/// in milliseconds relative to the session reference.
///
/// The timestamp is host-side bookkeeping; it is not part of the wire
/// format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub timestamp: u32,
    pub event: ControlEvent,
}

impl ControlMessage {
    pub fn new(timestamp: u32, event: ControlEvent) -> Self {
        Self { timestamp, event }
    }

    /// Serialize into `buf`, returning the number of bytes written.
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<usize, MirraError> {
        self.event.serialize(buf)
    }
}

impl ControlEvent {
    /// Serialize into `buf`, returning the number of bytes written.
    pub fn serialize(&self, buf: &mut BytesMut) -> Result<usize, MirraError> {
        let start = buf.len();
        match self {
            Self::Keycode {
                action,
                keycode,
                metastate,
            } => {
                buf.put_u8(TYPE_INJECT_KEYCODE);
                buf.put_u8(*action as u8);
                buf.put_u32(*keycode);
                buf.put_u32(*metastate);
            }
            Self::Text { text } => {
                let len = checked_text_len(text, TEXT_MAX_LENGTH)?;
                buf.put_u8(TYPE_INJECT_TEXT);
                buf.put_u16(len);
                buf.put_slice(text.as_bytes());
            }
            Self::Mouse {
                action,
                buttons,
                position,
            } => {
                buf.put_u8(TYPE_INJECT_MOUSE_EVENT);
                buf.put_u8(*action as u8);
                buf.put_u32(*buttons);
                position.serialize(buf);
            }
            Self::Touch {
                action,
                touch_id,
                position,
            } => {
                buf.put_u8(TYPE_INJECT_TOUCH_EVENT);
                buf.put_u8(*action as u8);
                buf.put_i32(*touch_id);
                position.serialize(buf);
            }
            Self::Scroll {
                position,
                hscroll,
                vscroll,
            } => {
                buf.put_u8(TYPE_INJECT_SCROLL_EVENT);
                position.serialize(buf);
                buf.put_i32(*hscroll);
                buf.put_i32(*vscroll);
            }
            Self::Command { action } => {
                buf.put_u8(TYPE_COMMAND);
                buf.put_u8(*action as u8);
            }
            Self::SetClipboard { text } => {
                let len = checked_text_len(text, CLIPBOARD_TEXT_MAX_LENGTH)?;
                buf.put_u8(TYPE_SET_CLIPBOARD);
                buf.put_u16(len);
                buf.put_slice(text.as_bytes());
            }
            Self::SetScreenPowerMode { mode } => {
                buf.put_u8(TYPE_SET_SCREEN_POWER_MODE);
                buf.put_u8(*mode as u8);
            }
        }
        Ok(buf.len() - start)
    }

    /// Decode one event from `buf`, returning it with the number of
    /// bytes consumed.
    pub fn deserialize(mut buf: &[u8]) -> Result<(Self, usize), MirraError> {
        let full = buf.len();
        if buf.is_empty() {
            return Err(MirraError::ShortRead {
                expected: 1,
                actual: 0,
            });
        }
        let ty = buf.get_u8();
        let event = match ty {
            TYPE_INJECT_KEYCODE => {
                need(&buf, 9)?;
                Self::Keycode {
                    action: key_action(buf.get_u8())?,
                    keycode: buf.get_u32(),
                    metastate: buf.get_u32(),
                }
            }
            TYPE_INJECT_TEXT => Self::Text {
                text: get_text(&mut buf)?,
            },
            TYPE_INJECT_MOUSE_EVENT => {
                need(&buf, 17)?;
                Self::Mouse {
                    action: motion_action(buf.get_u8())?,
                    buttons: buf.get_u32(),
                    position: Position::deserialize(&mut buf)?,
                }
            }
            TYPE_INJECT_TOUCH_EVENT => {
                need(&buf, 17)?;
                Self::Touch {
                    action: motion_action(buf.get_u8())?,
                    touch_id: buf.get_i32(),
                    position: Position::deserialize(&mut buf)?,
                }
            }
            TYPE_INJECT_SCROLL_EVENT => {
                need(&buf, 20)?;
                Self::Scroll {
                    position: Position::deserialize(&mut buf)?,
                    hscroll: buf.get_i32(),
                    vscroll: buf.get_i32(),
                }
            }
            TYPE_COMMAND => {
                need(&buf, 1)?;
                Self::Command {
                    action: command_action(buf.get_u8())?,
                }
            }
            TYPE_SET_CLIPBOARD => Self::SetClipboard {
                text: get_text(&mut buf)?,
            },
            TYPE_SET_SCREEN_POWER_MODE => {
                need(&buf, 1)?;
                Self::SetScreenPowerMode {
                    mode: match buf.get_u8() {
                        0 => ScreenPowerMode::Off,
                        2 => ScreenPowerMode::Normal,
                        other => return Err(MirraError::UnknownMessageType(other)),
                    },
                }
            }
            other => return Err(MirraError::UnknownMessageType(other)),
        };
        Ok((event, full - buf.len()))
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Validate a text field against its cap before anything is written,
/// so a failed serialization leaves the buffer untouched.
fn checked_text_len(text: &str, max: usize) -> Result<u16, MirraError> {
    let len = text.len();
    if len > max {
        return Err(MirraError::Overflow { len, max });
    }
    Ok(len as u16)
}

fn get_text(buf: &mut &[u8]) -> Result<String, MirraError> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    need(buf, len)?;
    let text = String::from_utf8(buf[..len].to_vec())?;
    buf.advance(len);
    Ok(text)
}

fn need(buf: &[u8], n: usize) -> Result<(), MirraError> {
    if buf.len() < n {
        return Err(MirraError::ShortRead {
            expected: n,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn key_action(v: u8) -> Result<KeyAction, MirraError> {
    match v {
        0 => Ok(KeyAction::Down),
        1 => Ok(KeyAction::Up),
        other => Err(MirraError::UnknownMessageType(other)),
    }
}

fn motion_action(v: u8) -> Result<MotionAction, MirraError> {
    match v {
        0 => Ok(MotionAction::Down),
        1 => Ok(MotionAction::Up),
        2 => Ok(MotionAction::Move),
        other => Err(MirraError::UnknownMessageType(other)),
    }
}

fn command_action(v: u8) -> Result<CommandAction, MirraError> {
    use CommandAction::*;
    Ok(match v {
        0 => BackOrScreenOn,
        1 => ExpandNotificationPanel,
        2 => CollapseNotificationPanel,
        3 => Quit,
        4 => Portrait,
        5 => Landscape,
        6 => Ping,
        7 => GetClipboard,
        other => return Err(MirraError::UnknownMessageType(other)),
    })
}

// ── Tests ────────────────────────────────────────────────────────
