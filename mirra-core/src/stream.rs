//! Video stream worker.
//!
//! A background task that owns the video socket, demultiplexes the
//! framed wire protocol and dispatches packets to the decoder and/or
//! recorder sinks.
//!
//! Config packets (sentinel `pts`) never reach the decoder on their
//! own: their payload is accumulated and prefixed onto the next data
//! packet, which is then submitted as one combined packet with the data
//! packet's timestamps. The recorder additionally receives config
//! packets pass-through, and every data packet with `dts := pts`.
//!
//! The agent emits complete NAL-unit groups per packet, so each payload
//! is treated as one complete frame; the KEY flag is set when the group
//! contains an IDR slice.

use bytes::BytesMut;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec::VideoCodec;
use crate::error::MirraError;
use crate::h264;
use crate::packet::{PacketFlags, VideoPacket};
use crate::sink::PacketSink;

/// Events posted by the stream worker to the session event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamNotice {
    /// The worker exited: end of stream, I/O error or interruption.
    Stopped,
}

/// Demultiplexer state plus its two optional sinks.
pub struct StreamWorker {
    decoder: Option<Box<dyn PacketSink>>,
    recorder: Option<Box<dyn PacketSink>>,
    pending: BytesMut,
}

impl StreamWorker {
    pub fn new(
        decoder: Option<Box<dyn PacketSink>>,
        recorder: Option<Box<dyn PacketSink>>,
    ) -> Self {
        Self {
            decoder,
            recorder,
            pending: BytesMut::new(),
        }
    }

    /// Run the worker on `reader` as a background task.
    ///
    /// Exactly one [`StreamNotice::Stopped`] is posted on exit, whatever
    /// the cause. Cancel `token` (and interrupt the decoder) to stop the
    /// worker from outside.
    pub fn spawn<R>(
        mut self,
        reader: R,
        token: CancellationToken,
        notice_tx: mpsc::UnboundedSender<StreamNotice>,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            self.run(reader, token).await;
            let _ = notice_tx.send(StreamNotice::Stopped);
        })
    }

    async fn run<R>(&mut self, reader: R, token: CancellationToken)
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut frames = FramedRead::new(reader, VideoCodec);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("stream worker interrupted");
                    break;
                }
                item = frames.next() => match item {
                    None => {
                        debug!("end of frames");
                        break;
                    }
                    Some(Ok(packet)) => match self.process(packet) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            error!("could not process packet: {e}");
                            break;
                        }
                    },
                    Some(Err(MirraError::ShortRead { .. })) => {
                        // The socket closed mid-record; same as EOS.
                        debug!("video stream closed mid-record");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("video stream error: {e}");
                        break;
                    }
                },
            }
        }

        // Reverse initialization order.
        if let Some(recorder) = &mut self.recorder {
            recorder.close();
        }
        if let Some(decoder) = &mut self.decoder {
            decoder.close();
        }
    }

    /// Dispatch one wire packet. Returns `Ok(false)` when a sink
    /// refused it and the worker must stop.
    fn process(&mut self, mut packet: VideoPacket) -> Result<bool, MirraError> {
        if packet.is_config() {
            // Keep the parameters for the next data packet; the
            // recorder still sees the config packet itself.
            self.pending.extend_from_slice(&packet.payload);
            if let Some(recorder) = &mut self.recorder {
                if !recorder.push(&packet)? {
                    return Ok(false);
                }
            }
            return Ok(true);
        }

        if !self.pending.is_empty() {
            let mut combined = self.pending.split();
            combined.extend_from_slice(&packet.payload);
            packet.payload = combined.freeze();
        }

        if h264::contains_key_frame(&packet.payload) {
            packet.flags |= PacketFlags::KEY;
        }

        if let Some(decoder) = &mut self.decoder {
            if !decoder.push(&packet)? {
                return Ok(false);
            }
        }

        if let Some(recorder) = &mut self.recorder {
            packet.dts = Some(packet.pts);
            if !recorder.push(&packet)? {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::NO_PTS;
    use std::sync::{Arc, Mutex};

    /// Records every pushed packet; can refuse after N pushes.
    struct CollectSink {
        got: Arc<Mutex<Vec<VideoPacket>>>,
        refuse_after: Option<usize>,
        pushed: usize,
    }

    impl CollectSink {
        fn new() -> (Self, Arc<Mutex<Vec<VideoPacket>>>) {
            let got = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    got: Arc::clone(&got),
                    refuse_after: None,
                    pushed: 0,
                },
                got,
            )
        }
    }

    impl PacketSink for CollectSink {
        fn push(&mut self, packet: &VideoPacket) -> Result<bool, MirraError> {
            if self.refuse_after.is_some_and(|n| self.pushed >= n) {
                return Ok(false);
            }
            self.pushed += 1;
            self.got.lock().unwrap().push(packet.clone());
            Ok(true)
        }
    }

    fn annexb_unit(nal: &[u8]) -> Vec<u8> {
        let mut v = vec![0, 0, 0, 1];
        v.extend_from_slice(nal);
        v
    }

    #[test]
    fn config_is_coalesced_with_next_frame() {
        let (decoder, frames) = CollectSink::new();
        let mut worker = StreamWorker::new(Some(Box::new(decoder)), None);

        let sps = annexb_unit(&[0x67, 0x42]);
        let pps = annexb_unit(&[0x68, 0xCE]);
        let idr = annexb_unit(&[0x65, 0x88]);

        assert!(worker.process(VideoPacket::config(sps.clone())).unwrap());
        assert!(worker.process(VideoPacket::config(pps.clone())).unwrap());
        assert!(worker.process(VideoPacket::data(1000, idr.clone())).unwrap());

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.pts, 1000);
        assert!(frame.is_key());
        let expected: Vec<u8> = [sps, pps, idr].concat();
        assert_eq!(&frame.payload[..], &expected[..]);
    }

    #[test]
    fn pending_is_cleared_after_coalescing() {
        let (decoder, frames) = CollectSink::new();
        let mut worker = StreamWorker::new(Some(Box::new(decoder)), None);

        worker
            .process(VideoPacket::config(annexb_unit(&[0x67])))
            .unwrap();
        worker
            .process(VideoPacket::data(1, annexb_unit(&[0x65])))
            .unwrap();
        worker
            .process(VideoPacket::data(2, annexb_unit(&[0x41])))
            .unwrap();

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        // Only the first frame carries the config prefix.
        assert!(frames[0].payload.starts_with(&[0, 0, 0, 1, 0x67]));
        assert_eq!(&frames[1].payload[..], &annexb_unit(&[0x41])[..]);
        // The second frame is not an IDR.
        assert!(!frames[1].is_key());
    }

    #[test]
    fn no_packet_dropped_or_duplicated() {
        let (decoder, frames) = CollectSink::new();
        let mut worker = StreamWorker::new(Some(Box::new(decoder)), None);

        for pts in 0..50u64 {
            if pts % 10 == 0 {
                worker
                    .process(VideoPacket::config(annexb_unit(&[0x67, pts as u8])))
                    .unwrap();
            }
            worker
                .process(VideoPacket::data(pts, annexb_unit(&[0x41, pts as u8])))
                .unwrap();
        }

        let frames = frames.lock().unwrap();
        let ptss: Vec<u64> = frames.iter().map(|f| f.pts).collect();
        assert_eq!(ptss, (0..50).collect::<Vec<u64>>());
    }

    #[test]
    fn recorder_sees_config_and_gets_dts() {
        let (recorder, recorded) = CollectSink::new();
        let mut worker = StreamWorker::new(None, Some(Box::new(recorder)));

        worker
            .process(VideoPacket::config(annexb_unit(&[0x67])))
            .unwrap();
        worker
            .process(VideoPacket::data(500, annexb_unit(&[0x65])))
            .unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].pts, NO_PTS);
        assert_eq!(recorded[0].dts, None);
        assert_eq!(recorded[1].pts, 500);
        assert_eq!(recorded[1].dts, Some(500));
    }

    #[test]
    fn refused_push_stops_the_worker() {
        let (mut decoder, _frames) = CollectSink::new();
        decoder.refuse_after = Some(1);
        let mut worker = StreamWorker::new(Some(Box::new(decoder)), None);

        assert!(
            worker
                .process(VideoPacket::data(1, annexb_unit(&[0x41])))
                .unwrap()
        );
        assert!(
            !worker
                .process(VideoPacket::data(2, annexb_unit(&[0x41])))
                .unwrap()
        );
    }

    #[tokio::test]
    async fn worker_posts_stopped_on_eos() {
        let (decoder, frames) = CollectSink::new();
        let worker = StreamWorker::new(Some(Box::new(decoder)), None);

        let mut wire = Vec::new();
        wire.extend_from_slice(&VideoPacket::config(annexb_unit(&[0x67])).encode());
        wire.extend_from_slice(&VideoPacket::data(7, annexb_unit(&[0x65])).encode());

        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let handle = worker.spawn(
            std::io::Cursor::new(wire),
            CancellationToken::new(),
            notice_tx,
        );

        assert_eq!(notice_rx.recv().await, Some(StreamNotice::Stopped));
        handle.await.unwrap();
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn truncated_header_is_clean_eos() {
        let (decoder, frames) = CollectSink::new();
        let worker = StreamWorker::new(Some(Box::new(decoder)), None);

        let mut wire = VideoPacket::data(7, annexb_unit(&[0x65])).encode().to_vec();
        wire.extend_from_slice(&[0u8; 11]); // truncated next header

        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let handle = worker.spawn(
            std::io::Cursor::new(wire),
            CancellationToken::new(),
            notice_tx,
        );

        assert_eq!(notice_rx.recv().await, Some(StreamNotice::Stopped));
        handle.await.unwrap();
        // The complete packet before the truncation was delivered.
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker() {
        let worker = StreamWorker::new(None, None);
        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        // A reader that never yields data.
        let (reader, _writer) = tokio::io::duplex(64);
        let handle = worker.spawn(reader, token.clone(), notice_tx);

        token.cancel();
        assert_eq!(notice_rx.recv().await, Some(StreamNotice::Stopped));
        handle.await.unwrap();
    }
}
