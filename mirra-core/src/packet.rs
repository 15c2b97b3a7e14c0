//! Framed video packet type shared by the stream worker and its sinks.
//!
//! ## Wire format
//!
//! Each packet on the video socket is preceded by a 12-byte header:
//! ```text
//! pts:   u64  (8, big-endian)   2^64-1 marks a config packet
//! size:  u32  (4, big-endian)   payload length, never zero
//! ```
//! followed by `size` bytes of raw H.264.

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

/// Sentinel `pts` marking a config packet (SPS/PPS, no renderable frame).
pub const NO_PTS: u64 = u64::MAX;

/// Size of the per-packet meta header on the wire.
pub const FRAME_HEADER_SIZE: usize = 12;

bitflags! {
    /// Per-packet flags set by the stream worker before dispatch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PacketFlags: u8 {
        /// The payload contains a key frame (IDR).
        const KEY = 1;
    }
}

/// One demultiplexed video packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoPacket {
    /// Presentation timestamp in microseconds, or [`NO_PTS`] for config.
    pub pts: u64,
    /// Decode timestamp; set to `pts` by the stream worker before a
    /// recorder write, absent otherwise.
    pub dts: Option<u64>,
    /// Flags set during parsing.
    pub flags: PacketFlags,
    /// Raw H.264 payload (Annex-B).
    pub payload: Bytes,
}

impl VideoPacket {
    /// Build a config packet (codec parameters, sentinel `pts`).
    pub fn config(payload: impl Into<Bytes>) -> Self {
        Self {
            pts: NO_PTS,
            dts: None,
            flags: PacketFlags::empty(),
            payload: payload.into(),
        }
    }

    /// Build a data packet carrying one frame.
    pub fn data(pts: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            pts,
            dts: None,
            flags: PacketFlags::empty(),
            payload: payload.into(),
        }
    }

    /// Whether this packet carries codec parameters instead of a frame.
    pub fn is_config(&self) -> bool {
        self.pts == NO_PTS
    }

    /// Whether the KEY flag is set.
    pub fn is_key(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    /// Serialize to the on-wire representation (header + payload).
    ///
    /// Used by tests and tools that emulate the device side; the host
    /// itself only ever reads this format.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        buf.put_u64(self.pts);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}
