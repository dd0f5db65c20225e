//! Producer side: bounded connect, socket tuning and the send loop.
//!
//! 1. [`StreamSender::connect`] opens the TCP connection under a
//!    deadline, tunes the socket and sends the handshake.
//! 2. [`StreamSender::stream`] pulls buffers from a [`FrameSource`] once
//!    per frame interval and sends them until a send fails or shutdown
//!    is requested, logging throughput every `report_interval`.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LumenError;
use crate::session::stream::Session;
use crate::session::{FrameSource, StreamConfig, tune_stream};
use crate::stats::{SessionSummary, ThroughputMeter};

/// Connects to a consumer and pushes frames to it.
#[derive(Debug, Clone, Default)]
pub struct StreamSender {
    config: StreamConfig,
}

impl StreamSender {
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Connect to `addr`, tune the socket and send the handshake.
    ///
    /// The connect attempt is bounded by `connect_timeout`: an
    /// unreachable consumer fails fast with [`LumenError::Timeout`]
    /// instead of hanging. No automatic retry.
    pub async fn connect(
        &self,
        addr: SocketAddr,
        shutdown: &CancellationToken,
    ) -> Result<Session<TcpStream>, LumenError> {
        info!(%addr, "connecting to receiver");

        let timeout = self.config.connect_timeout;
        let stream = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(LumenError::Cancelled),
            r = tokio::time::timeout(timeout, TcpStream::connect(addr)) => match r {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!(%addr, error = %e, "connect failed");
                    return Err(e.into());
                }
                Err(_) => {
                    warn!(%addr, ?timeout, "connect timed out");
                    return Err(LumenError::Timeout(timeout));
                }
            },
        };

        tune_stream(&stream, self.config.socket_buffer_size)?;

        let mut session = Session::new(stream, Some(addr));
        session.open(&self.config).await?;
        info!(
            %addr,
            width = self.config.width,
            height = self.config.height,
            fps = self.config.fps,
            "connected; streaming"
        );
        Ok(session)
    }

    /// Send frames from `source` at the configured rate.
    ///
    /// Returns `Ok` with the session totals when `shutdown` fires, or
    /// the error that ended the stream. Totals stay available through
    /// [`Session::summary`] either way.
    pub async fn stream<S>(
        &self,
        session: &mut Session<TcpStream>,
        source: &mut S,
        shutdown: &CancellationToken,
    ) -> Result<SessionSummary, LumenError>
    where
        S: FrameSource + ?Sized,
    {
        let fps = session.handshake().fps.max(1);
        let frame_interval = Duration::from_secs_f64(1.0 / fps as f64);
        let mut pacer = tokio::time::interval(frame_interval);
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let report_every = self.config.report_interval;
        let mut report = tokio::time::interval_at(Instant::now() + report_every, report_every);
        let mut meter = ThroughputMeter::with_window(report_every);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = report.tick() => {
                    let (fps, bytes_per_sec) = meter.rates(std::time::Instant::now());
                    info!(
                        frames = session.frame_count(),
                        fps = format_args!("{fps:.1}"),
                        bytes_per_sec,
                        "throughput"
                    );
                }
                _ = pacer.tick() => {
                    let frame = match source.produce_frame() {
                        Ok(frame) => frame,
                        Err(e) => {
                            session.close();
                            return Err(e);
                        }
                    };
                    let len = frame.len() as u64;
                    match session.send_frame(frame, shutdown).await {
                        Ok(()) => meter.record(len),
                        Err(LumenError::Cancelled) => break,
                        Err(e) => {
                            let summary = session.summary();
                            warn!(error = %e, %summary, "stream ended");
                            return Err(e);
                        }
                    }
                }
            }
        }

        session.close();
        let summary = session.summary();
        debug!(%summary, "stream stopped by shutdown");
        Ok(summary)
    }
}

// ── Tests ────────────────────────────────────────────────────────
