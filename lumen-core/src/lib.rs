//! # lumen-core
//!
//! Discovery and transport library for pushing a screen stream to a
//! receiver on the same LAN with no manual configuration.
//!
//! This crate contains:
//! - **Discovery**: SSDP-style search (`DiscoveryClient`) and advertise/respond
//!   (`DiscoveryServer`), with per-pass dedup in `Registry`
//! - **Wire**: big-endian length prefix and the 12-byte `Handshake`
//! - **Codec**: `FrameCodec` for length-prefixed framed TCP I/O via `tokio_util`
//! - **Session**: phase machine, `StreamSender` and `StreamReceiver`
//! - **Stats**: rolling throughput meter and per-session summaries
//! - **Error**: `LumenError`, a typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod discovery;
pub mod error;
pub mod session;
pub mod stats;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{FrameCodec, MAX_FRAME_SIZE};
pub use discovery::{
    AdvertiseConfig, AdvertiseHandle, DeviceRecord, DiscoveryClient, DiscoveryConfig,
    DiscoveryServer, Location, Registry, SsdpMessage, list_devices, select_device,
    start_advertising,
};
pub use error::{LumenError, MessageError};
pub use session::{
    DEFAULT_STREAM_PORT, FrameSink, FrameSource, Session, SessionPhase, StreamConfig,
    StreamReceiver, StreamSender,
};
pub use stats::{SessionSummary, ThroughputMeter};
pub use wire::{Handshake, PixelFormat};
