//! Streaming sessions: connection management and framed transfer.
//!
//! ## Architecture
//!
//! ```text
//! PRODUCER                                   CONSUMER
//! ┌──────────────────────┐                  ┌──────────────────────┐
//! │ FrameSource          │                  │ StreamReceiver       │
//! │   ↓                  │                  │   accept loop        │
//! │ StreamSender         │   TCP            │   ↓                  │
//! │   connect + tune     │ ──────────►      │ Session::accept      │
//! │   ↓                  │  handshake       │   ↓                  │
//! │ Session::send_frame  │  [len][payload]… │ Session::receive_frame│
//! │                      │                  │   ↓                  │
//! │                      │                  │ FrameSink            │
//! └──────────────────────┘                  └──────────────────────┘
//! ```
//!
//! | Module     | Purpose                                          |
//! |------------|--------------------------------------------------|
//! | `phase`    | `Connecting → Handshaking → Streaming → Closed`  |
//! | `stream`   | `Session`: handshake plus framed send/receive    |
//! | `sender`   | Producer: bounded connect, tuning, send loop     |
//! | `receiver` | Consumer: listen/accept loop, one session at a time |

pub mod phase;
pub mod receiver;
pub mod sender;
pub mod stream;

use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::warn;

use crate::codec::MAX_FRAME_SIZE;
use crate::error::LumenError;
use crate::wire::{Handshake, PixelFormat};

pub use phase::SessionPhase;
pub use receiver::StreamReceiver;
pub use sender::StreamSender;
pub use stream::Session;

/// Default TCP port for the stream.
pub const DEFAULT_STREAM_PORT: u16 = 8081;

// ── StreamConfig ─────────────────────────────────────────────────

/// Configuration shared by both ends of a session.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Frame width in pixels (sent in the handshake).
    pub width: u32,
    /// Frame height in pixels (sent in the handshake).
    pub height: u32,
    /// Target frames per second (sent in the handshake).
    pub fps: u32,
    /// Pixel layout; must match on both ends.
    pub pixel_format: PixelFormat,
    /// Exchange the 12-byte handshake. When off, both ends use the
    /// geometry above.
    pub handshake: bool,
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Deadline for receiving the handshake after accept.
    pub handshake_timeout: Duration,
    /// Kernel socket buffer size applied to session sockets.
    pub socket_buffer_size: usize,
    /// How often the sender logs throughput.
    pub report_interval: Duration,
    /// Largest frame a consumer will agree to.
    pub max_frame_len: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 10,
            pixel_format: PixelFormat::Rgb24,
            handshake: true,
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            socket_buffer_size: 4 * 1024 * 1024,
            report_interval: Duration::from_secs(5),
            max_frame_len: MAX_FRAME_SIZE,
        }
    }
}

impl StreamConfig {
    /// The handshake this configuration describes.
    pub fn local_handshake(&self) -> Handshake {
        Handshake::new(self.width, self.height, self.fps)
    }

    /// Validated per-frame buffer size for the configured geometry.
    pub fn frame_len(&self) -> Result<usize, LumenError> {
        self.local_handshake()
            .validate(self.pixel_format, self.max_frame_len)
    }
}

// ── Collaborators ────────────────────────────────────────────────

/// Produces one fixed-size pixel buffer per frame interval.
///
/// Implemented by the platform capture layer; closures returning
/// `Bytes` work too.
pub trait FrameSource: Send {
    fn produce_frame(&mut self) -> Result<Bytes, LumenError>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Bytes + Send,
{
    fn produce_frame(&mut self) -> Result<Bytes, LumenError> {
        Ok(self())
    }
}

/// Receives every complete frame, in order.
///
/// Only whole frames of the negotiated size are ever passed in.
pub trait FrameSink: Send {
    fn consume_frame(&mut self, frame: &[u8]);
}

impl<F> FrameSink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn consume_frame(&mut self, frame: &[u8]) {
        self(frame)
    }
}

// ── Socket tuning ────────────────────────────────────────────────

/// Disable Nagle and enlarge the kernel buffers of a session socket.
///
/// Buffer sizing is advisory (the kernel may clamp it), so failures
/// there are logged rather than returned.
pub fn tune_stream(stream: &TcpStream, buffer_size: usize) -> Result<(), LumenError> {
    stream.set_nodelay(true)?;

    let sock = socket2::SockRef::from(stream);
    if let Err(e) = sock.set_send_buffer_size(buffer_size) {
        warn!(error = %e, buffer_size, "could not enlarge send buffer");
    }
    if let Err(e) = sock.set_recv_buffer_size(buffer_size) {
        warn!(error = %e, buffer_size, "could not enlarge receive buffer");
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_len_is_rgb_720p() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.frame_len().unwrap(), 1280 * 720 * 3);
    }

    #[test]
    fn closures_are_collaborators() {
        let mut source = || Bytes::from_static(b"px");
        assert_eq!(&source.produce_frame().unwrap()[..], b"px");

        let mut seen = Vec::new();
        let mut sink = |frame: &[u8]| seen.push(frame.len());
        sink.consume_frame(b"abc");
        assert_eq!(seen, vec![3]);
    }

    #[tokio::test]
    async fn tuning_disables_nagle() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();

        tune_stream(&client, 4 * 1024 * 1024).unwrap();
        assert!(client.nodelay().unwrap());
    }
}
