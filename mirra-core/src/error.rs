//! Domain-specific error types for the mirra host.
//!
//! All fallible operations return `Result<T, MirraError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the mirra host library.
#[derive(Debug, Error)]
pub enum MirraError {
    // ── Setup Errors ─────────────────────────────────────────────
    /// An invocation of the device bridge tool exited with a failure.
    #[error("bridge command '{action}' failed (exit code {code:?})")]
    BridgeCommand {
        action: &'static str,
        code: Option<i32>,
    },

    /// Both reverse and forward tunnel setup failed.
    #[error("could not establish a tunnel (reverse and forward both failed)")]
    TunnelFailed,

    /// The agent never answered the readiness probe.
    #[error("could not connect to the agent after {attempts} attempts")]
    ConnectTimeout { attempts: u32 },

    /// The device meta header could not be read.
    #[error("invalid device meta header: {0}")]
    InvalidDeviceMeta(&'static str),

    /// A session operation was attempted in the wrong phase.
    #[error("invalid session phase: {0}")]
    InvalidPhase(&'static str),

    // ── Wire Errors ──────────────────────────────────────────────
    /// The stream ended in the middle of a framed record.
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    /// A video packet header declared a zero-length payload.
    #[error("video packet with zero-length payload")]
    ZeroLength,

    /// A text field exceeds its wire-format cap.
    #[error("text overflow: {len} bytes (max {max})")]
    Overflow { len: usize, max: usize },

    /// A type byte did not map to any known control message.
    #[error("unknown control message type: {0:#04x}")]
    UnknownMessageType(u8),

    /// UTF-8 conversion failed.
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    // ── Dispatch Errors ──────────────────────────────────────────
    /// A packet sink could not process a packet.
    #[error("packet dispatch failed: {0}")]
    Dispatch(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = MirraError::Overflow { len: 301, max: 300 };
        assert!(e.to_string().contains("301"));
        assert!(e.to_string().contains("300"));

        let e = MirraError::ZeroLength;
        assert!(e.to_string().contains("zero-length"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: MirraError = io_err.into();
        assert!(matches!(e, MirraError::Io(_)));
    }
}
