//! Raw H.264 stream recorder.
//!
//! Writes the packets dispatched by the stream worker to a file as an
//! Annex-B elementary stream: config packets pass through as-is, data
//! packets arrive with their config prefix already coalesced and with
//! `dts` set to `pts`. Container muxing is out of scope here; the
//! produced `.h264` file is playable as-is.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::MirraError;
use crate::packet::VideoPacket;
use crate::sink::PacketSink;

/// File-backed packet recorder.
pub struct H264Recorder {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    packets: u64,
}

impl H264Recorder {
    /// Create (truncate) the output file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, MirraError> {
        let path = path.as_ref().to_owned();
        let file = File::create(&path)?;
        info!("recording to {}", path.display());
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            packets: 0,
        })
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PacketSink for H264Recorder {
    fn push(&mut self, packet: &VideoPacket) -> Result<bool, MirraError> {
        // Data packets must carry a decode timestamp by the time they
        // reach the recorder.
        debug_assert!(packet.is_config() || packet.dts == Some(packet.pts));

        let writer = self
            .writer
            .as_mut()
            .ok_or(MirraError::Dispatch("recorder already closed"))?;
        writer.write_all(&packet.payload)?;
        self.packets += 1;
        Ok(true)
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("could not flush {}: {e}", self.path.display());
            }
            debug!(
                "recording finished: {} packets to {}",
                self.packets,
                self.path.display()
            );
        }
    }
}

impl Drop for H264Recorder {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ────────────────────────────────────────────────────────
