//! One established streaming session over any byte stream.
//!
//! [`Session`] owns the socket, the negotiated geometry, the phase and
//! the cumulative counters. It is generic over the transport so the
//! same code runs over `TcpStream` and over in-memory mocks.

use std::net::SocketAddr;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::codec::FrameCodec;
use crate::error::LumenError;
use crate::session::StreamConfig;
use crate::session::phase::SessionPhase;
use crate::stats::SessionSummary;
use crate::wire::Handshake;

/// A connected producer/consumer pair, seen from one end.
pub struct Session<S> {
    framed: Framed<S, FrameCodec>,
    phase: SessionPhase,
    peer: Option<SocketAddr>,
    /// Geometry in force (from the handshake or the local config).
    handshake: Handshake,
    frame_len: usize,
    frames: u64,
    bytes: u64,
    started: Instant,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a freshly connected or accepted transport.
    pub fn new(io: S, peer: Option<SocketAddr>) -> Self {
        Self {
            framed: Framed::new(io, FrameCodec::new()),
            phase: SessionPhase::Connecting,
            peer,
            handshake: Handshake::new(0, 0, 0),
            frame_len: 0,
            frames: 0,
            bytes: 0,
            started: Instant::now(),
        }
    }

    // ── Handshake ────────────────────────────────────────────────

    /// Producer side: announce the geometry and enter `Streaming`.
    pub async fn open(&mut self, config: &StreamConfig) -> Result<(), LumenError> {
        self.phase.begin_handshake()?;
        let handshake = config.local_handshake();

        let result = async {
            let frame_len = config.frame_len()?;
            if config.handshake {
                handshake.write_to(self.framed.get_mut()).await?;
            }
            Ok::<_, LumenError>(frame_len)
        }
        .await;

        self.finish_handshake(handshake, result)
    }

    /// Consumer side: read and validate the peer's geometry, then enter
    /// `Streaming`.
    ///
    /// The read is bounded by `config.handshake_timeout` and by
    /// `shutdown`.
    pub async fn accept(
        &mut self,
        config: &StreamConfig,
        shutdown: &CancellationToken,
    ) -> Result<(), LumenError> {
        self.phase.begin_handshake()?;

        let result = if config.handshake {
            let read = tokio::time::timeout(
                config.handshake_timeout,
                Handshake::read_from(self.framed.get_mut()),
            );
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => Err(LumenError::Cancelled),
                r = read => match r {
                    Ok(Ok(hs)) => Ok(hs),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(LumenError::Timeout(config.handshake_timeout)),
                },
            }
        } else {
            Ok(config.local_handshake())
        };

        match result {
            Ok(handshake) => {
                let frame_len = handshake.validate(config.pixel_format, config.max_frame_len);
                self.finish_handshake(handshake, frame_len)
            }
            Err(e) => {
                self.phase.close();
                Err(e)
            }
        }
    }

    fn finish_handshake(
        &mut self,
        handshake: Handshake,
        frame_len: Result<usize, LumenError>,
    ) -> Result<(), LumenError> {
        let frame_len = match frame_len {
            Ok(len) => len,
            Err(e) => {
                self.phase.close();
                return Err(e);
            }
        };

        *self.framed.codec_mut() = FrameCodec::expecting(frame_len);
        self.handshake = handshake;
        self.frame_len = frame_len;
        self.started = Instant::now();
        self.phase.start_streaming()?;

        debug!(
            peer = ?self.peer,
            width = handshake.width,
            height = handshake.height,
            fps = handshake.fps,
            frame_len,
            "session streaming"
        );
        Ok(())
    }

    // ── Frames ───────────────────────────────────────────────────

    /// Send one frame: length prefix, then the payload.
    ///
    /// Partial socket writes are retried until the whole frame is
    /// accepted. Any failure, or `shutdown` firing, closes the session.
    pub async fn send_frame(
        &mut self,
        payload: Bytes,
        shutdown: &CancellationToken,
    ) -> Result<(), LumenError> {
        self.ensure_streaming()?;
        if payload.len() != self.frame_len {
            self.phase.close();
            return Err(LumenError::PayloadSizeMismatch {
                expected: self.frame_len,
                actual: payload.len(),
            });
        }

        let len = payload.len() as u64;
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(LumenError::Cancelled),
            r = self.framed.send(payload) => r,
        };

        match result {
            Ok(()) => {
                self.frames += 1;
                self.bytes += len;
                Ok(())
            }
            Err(e) => {
                self.phase.close();
                Err(e)
            }
        }
    }

    /// Receive exactly one frame of the negotiated size.
    ///
    /// A length prefix that differs from the negotiated size, an early
    /// close, or `shutdown` firing closes the session; a short frame is
    /// never returned.
    pub async fn receive_frame(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<BytesMut, LumenError> {
        self.ensure_streaming()?;

        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(LumenError::Cancelled),
            next = self.framed.next() => match next {
                Some(Ok(frame)) => Ok(frame),
                Some(Err(e)) => Err(e),
                None => Err(LumenError::PeerClosed),
            },
        };

        match result {
            Ok(frame) => {
                self.frames += 1;
                self.bytes += frame.len() as u64;
                Ok(frame)
            }
            Err(e) => {
                self.phase.close();
                Err(e)
            }
        }
    }

    fn ensure_streaming(&self) -> Result<(), LumenError> {
        if self.phase.is_streaming() {
            Ok(())
        } else {
            Err(LumenError::ProtocolViolation("session is not streaming"))
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    /// Mark the session finished.
    pub fn close(&mut self) {
        self.phase.close();
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Geometry in force for this session.
    pub fn handshake(&self) -> Handshake {
        self.handshake
    }

    /// Negotiated size of every frame in bytes.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Frames transferred so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Totals so far.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames: self.frames,
            bytes: self.bytes,
            duration: self.started.elapsed(),
        }
    }

    /// The underlying transport.
    pub fn get_ref(&self) -> &S {
        self.framed.get_ref()
    }
}

// ── Tests ────────────────────────────────────────────────────────
