//! # mirra-core
//!
//! Host-side library for the mirra screen mirroring and remote control
//! bridge.
//!
//! This crate contains:
//! - **Wire types**: `VideoPacket` framing and `ControlMessage` serialization
//! - **Codec**: `VideoCodec` for framed video I/O via `tokio_util`
//! - **Bridge**: `DeviceBridge` capability over the external `adb` tool
//! - **Server**: `ServerSession` setup/connect/teardown state machine
//! - **Stream**: background worker demultiplexing video into packet sinks
//! - **Controller**: background worker draining the control-message queue
//! - **Sinks**: `PacketSink` with decoder (`FrameSink`) and recorder impls
//! - **Error**: `MirraError` — typed, `thiserror`-based error hierarchy

pub mod bridge;
pub mod codec;
pub mod control;
pub mod controller;
pub mod error;
pub mod h264;
pub mod packet;
pub mod recorder;
pub mod server;
pub mod sink;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use bridge::{AdbBridge, DeviceBridge, ProcessHandle, connect_hint};
pub use codec::VideoCodec;
pub use control::{
    CLIPBOARD_TEXT_MAX_LENGTH, CommandAction, ControlEvent, ControlMessage, KeyAction,
    MotionAction, Point, Position, SERIALIZED_MAX_SIZE, ScreenPowerMode, Size, TEXT_MAX_LENGTH,
};
pub use controller::ControllerHandle;
pub use error::MirraError;
pub use packet::{FRAME_HEADER_SIZE, NO_PTS, PacketFlags, VideoPacket};
pub use recorder::H264Recorder;
pub use server::{
    DeviceMeta, ServerParams, ServerSession, SessionPhase, read_device_meta, server_jar_path,
};
pub use sink::{FrameSink, InterruptHandle, PacketSink, VideoFrame};
pub use stream::{StreamNotice, StreamWorker};
