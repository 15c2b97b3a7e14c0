//! Consumers of demultiplexed video packets.
//!
//! The stream worker does not know what happens to a packet after
//! dispatch; it only talks to [`PacketSink`]. The decoder and the
//! recorder are the two implementations that matter: the decoder side
//! is represented here by [`FrameSink`], which publishes complete
//! access units for the display layer, and the recorder lives in
//! [`crate::recorder`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::watch;

use crate::error::MirraError;
use crate::packet::VideoPacket;

/// Something that consumes one video packet at a time.
///
/// `push` returns `Ok(false)` when the sink refuses the packet (for
/// example after an interrupt); the stream worker then stops cleanly.
pub trait PacketSink: Send {
    fn push(&mut self, packet: &VideoPacket) -> Result<bool, MirraError>;

    /// Flush and release resources. Called once, on worker shutdown.
    fn close(&mut self) {}
}

// ── FrameSink ────────────────────────────────────────────────────

/// One complete coded frame, ready for a decoder.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Presentation timestamp in microseconds.
    pub pts: u64,
    /// Whether this unit can be decoded without prior frames.
    pub key: bool,
    /// The Annex-B payload (config parameters prefixed when present).
    pub data: Bytes,
}

/// Decoder-facing sink: publishes each frame into a single watch slot.
///
/// The display side holds the [`watch::Receiver`] and reads the latest
/// frame whenever it is notified; the producer never blocks on it.
pub struct FrameSink {
    interrupted: Arc<AtomicBool>,
    frame_tx: watch::Sender<Option<VideoFrame>>,
}

/// Handle used to interrupt the decoder from another task.
///
/// After `interrupt()`, the next push returns `false` and the stream
/// worker unwinds.
#[derive(Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl FrameSink {
    /// Create the sink plus the receiver for the display side.
    pub fn new() -> (Self, watch::Receiver<Option<VideoFrame>>) {
        let (frame_tx, frame_rx) = watch::channel(None);
        let sink = Self {
            interrupted: Arc::new(AtomicBool::new(false)),
            frame_tx,
        };
        (sink, frame_rx)
    }

    /// A cloneable handle that makes the next push fail.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(Arc::clone(&self.interrupted))
    }
}

impl PacketSink for FrameSink {
    fn push(&mut self, packet: &VideoPacket) -> Result<bool, MirraError> {
        if self.interrupted.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let frame = VideoFrame {
            pts: packet.pts,
            key: packet.is_key(),
            data: packet.payload.clone(),
        };
        // A dropped receiver means the display is gone; stop the stream.
        Ok(self.frame_tx.send(Some(frame)).is_ok())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketFlags;

    #[test]
    fn push_publishes_latest_frame() {
        let (mut sink, rx) = FrameSink::new();
        let mut pkt = VideoPacket::data(42, vec![0x65, 0x01]);
        pkt.flags |= PacketFlags::KEY;

        assert!(sink.push(&pkt).unwrap());
        let frame = rx.borrow().clone().unwrap();
        assert_eq!(frame.pts, 42);
        assert!(frame.key);
        assert_eq!(&frame.data[..], &[0x65, 0x01]);
    }

    #[test]
    fn interrupt_refuses_next_push() {
        let (mut sink, _rx) = FrameSink::new();
        let handle = sink.interrupt_handle();

        let pkt = VideoPacket::data(1, vec![0x41]);
        assert!(sink.push(&pkt).unwrap());
        handle.interrupt();
        assert!(!sink.push(&pkt).unwrap());
    }

    #[test]
    fn dropped_receiver_refuses_push() {
        let (mut sink, rx) = FrameSink::new();
        drop(rx);
        let pkt = VideoPacket::data(1, vec![0x41]);
        assert!(!sink.push(&pkt).unwrap());
    }
}
