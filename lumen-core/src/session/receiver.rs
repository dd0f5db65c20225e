//! Consumer side: listen/accept loop serving one producer at a time.
//!
//! The receiver keeps listening across producer disconnects; a broken
//! or misbehaving session ends only that session. Further connection
//! attempts wait in the listen backlog until the current session ends.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::LumenError;
use crate::session::stream::Session;
use crate::session::{FrameSink, StreamConfig, tune_stream};

/// Pending connections the kernel queues while a session is active.
const LISTEN_BACKLOG: u32 = 8;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listening end of the stream.
pub struct StreamReceiver {
    listener: TcpListener,
    config: StreamConfig,
}

impl StreamReceiver {
    /// Bind and listen on `addr` with address reuse enabled.
    ///
    /// Failure here is a resource error and is returned immediately.
    pub async fn bind(addr: SocketAddr, config: StreamConfig) -> Result<Self, LumenError> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;

        info!(addr = %listener.local_addr()?, "stream receiver listening");
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, LumenError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Accept producers until `shutdown` fires, handing every complete
    /// frame to `sink`.
    pub async fn run<K>(&self, sink: &mut K, shutdown: CancellationToken) -> Result<(), LumenError>
    where
        K: FrameSink + ?Sized,
    {
        loop {
            let accept = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.listener.accept() => result,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept error");
                    if backoff(&shutdown).await {
                        continue;
                    }
                    break;
                }
            };

            info!(%peer, "sender connected");
            if let Err(e) = tune_stream(&stream, self.config.socket_buffer_size) {
                warn!(%peer, error = %e, "socket tuning failed");
            }

            let mut session = Session::new(stream, Some(peer));
            let ended = self.serve(&mut session, sink, &shutdown).await;
            let summary = session.summary();

            match ended {
                Ok(()) | Err(LumenError::Cancelled) => {
                    info!(%peer, %summary, "session stopped by shutdown");
                    break;
                }
                Err(e) if e.is_disconnect() => {
                    info!(%peer, %summary, "sender disconnected");
                }
                Err(e) => {
                    warn!(%peer, %summary, error = %e, "session closed");
                }
            }
        }

        info!("stream receiver stopped");
        Ok(())
    }

    /// Run one session: handshake, then frames into `sink` until the
    /// session fails or `shutdown` fires.
    pub async fn serve<S, K>(
        &self,
        session: &mut Session<S>,
        sink: &mut K,
        shutdown: &CancellationToken,
    ) -> Result<(), LumenError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        K: FrameSink + ?Sized,
    {
        session.accept(&self.config, shutdown).await?;
        let hs = session.handshake();
        info!(
            peer = ?session.peer(),
            width = hs.width,
            height = hs.height,
            fps = hs.fps,
            "handshake accepted"
        );

        loop {
            let frame = session.receive_frame(shutdown).await?;
            sink.consume_frame(&frame);
        }
    }
}

/// Sleep for [`ACCEPT_BACKOFF`]; `false` if `shutdown` fired first.
async fn backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(ACCEPT_BACKOFF) => true,
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use crate::wire::{Handshake, encode_length_prefix};

    #[tokio::test]
    async fn bind_reports_ephemeral_port() {
        let receiver = StreamReceiver::bind("127.0.0.1:0".parse().unwrap(), StreamConfig::default())
            .await
            .unwrap();
        assert_ne!(receiver.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn run_returns_on_cancelled_token() {
        let receiver = StreamReceiver::bind("127.0.0.1:0".parse().unwrap(), StreamConfig::default())
            .await
            .unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let mut sink = |_: &[u8]| {};
        tokio::time::timeout(Duration::from_millis(100), receiver.run(&mut sink, token))
            .await
            .expect("run ignored a cancelled token")
            .unwrap();
    }

    #[tokio::test]
    async fn serve_forwards_only_complete_frames() {
        let receiver = StreamReceiver::bind("127.0.0.1:0".parse().unwrap(), StreamConfig {
            width: 1,
            height: 2,
            fps: 5,
            ..StreamConfig::default()
        })
        .await
        .unwrap();

        let mut wire = Handshake::new(1, 2, 5).encode().to_vec();
        wire.extend_from_slice(&encode_length_prefix(6));
        wire.extend_from_slice(b"abcdef");
        wire.extend_from_slice(&encode_length_prefix(6));
        wire.extend_from_slice(b"ghi");
        let mut builder = tokio_test::io::Builder::new();
        for chunk in wire.chunks(2) {
            builder.read(chunk);
        }

        let token = CancellationToken::new();
        let mut session = Session::new(builder.build(), None);
        let mut frames: Vec<Vec<u8>> = Vec::new();
        let mut sink = |f: &[u8]| frames.push(f.to_vec());

        let err = receiver
            .serve(&mut session, &mut sink, &token)
            .await
            .unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(frames, vec![b"abcdef".to_vec()]);
    }

    #[tokio::test]
    async fn accept_backoff_waits_before_retry() {
        let token = CancellationToken::new();
        let started = std::time::Instant::now();
        assert!(backoff(&token).await);
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test]
    async fn accept_backoff_yields_to_shutdown() {
        let token = CancellationToken::new();
        token.cancel();
        let woke = tokio::time::timeout(ACCEPT_BACKOFF / 2, backoff(&token))
            .await
            .expect("backoff ignored a cancelled token");
        assert!(!woke);
    }
}
