//! Video wire codec — Decoder for `tokio_util::codec::FramedRead`.
//!
//! Reads the 12-byte big-endian meta header (`pts: u64`, `size: u32`)
//! added by the device agent before each raw packet, then waits for the
//! full payload before yielding a [`VideoPacket`].
//!
//! End-of-stream in the middle of a header or payload is reported as
//! [`MirraError::ShortRead`]; the stream worker treats it as a clean end
//! of stream, not as a failure.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::MirraError;
use crate::packet::{FRAME_HEADER_SIZE, PacketFlags, VideoPacket};

/// Stateless decoder for framed video packets.
pub struct VideoCodec;

impl Decoder for VideoCodec {
    type Item = VideoPacket;
    type Error = MirraError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Need the full meta header to learn the payload length.
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let pts = u64::from_be_bytes(src[0..8].try_into().expect("slice of 8"));
        let size = u32::from_be_bytes(src[8..12].try_into().expect("slice of 4")) as usize;

        // The agent never sends empty packets; a zero size means the
        // stream is corrupt.
        if size == 0 {
            return Err(MirraError::ZeroLength);
        }

        let total = FRAME_HEADER_SIZE + size;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(size).freeze();

        Ok(Some(VideoPacket {
            pts,
            dts: None,
            flags: PacketFlags::empty(),
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(pkt) => Ok(Some(pkt)),
            None if src.is_empty() => Ok(None),
            None => {
                // The socket closed mid-record.
                let expected = if src.len() < FRAME_HEADER_SIZE {
                    FRAME_HEADER_SIZE
                } else {
                    let size =
                        u32::from_be_bytes(src[8..12].try_into().expect("slice of 4")) as usize;
                    FRAME_HEADER_SIZE + size
                };
                Err(MirraError::ShortRead {
                    expected,
                    actual: src.len(),
                })
            }
        }
    }
}
