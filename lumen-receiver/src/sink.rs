//! Stand-in render sink: counts frames and logs render throughput.
//!
//! A windowed renderer plugs in through the same [`FrameSink`] trait.

use std::time::{Duration, Instant};

use lumen_core::{FrameSink, SessionSummary, ThroughputMeter};
use tracing::{debug, info};

/// Counts every frame it is handed.
#[derive(Debug)]
pub struct LoggingSink {
    meter: ThroughputMeter,
    report_every: Duration,
    last_report: Instant,
    frames: u64,
    bytes: u64,
    started: Instant,
    /// Sum of the first byte of every frame; cheap evidence the payload
    /// was actually read.
    checksum: u64,
}

impl LoggingSink {
    pub fn new(report_every: Duration) -> Self {
        let now = Instant::now();
        Self {
            meter: ThroughputMeter::with_window(report_every),
            report_every,
            last_report: now,
            frames: 0,
            bytes: 0,
            started: now,
            checksum: 0,
        }
    }

    /// Totals across every session this sink has served.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            frames: self.frames,
            bytes: self.bytes,
            duration: self.started.elapsed(),
        }
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }
}

impl FrameSink for LoggingSink {
    fn consume_frame(&mut self, frame: &[u8]) {
        self.frames += 1;
        self.bytes += frame.len() as u64;
        self.checksum = self
            .checksum
            .wrapping_add(frame.first().copied().unwrap_or_default() as u64);
        self.meter.record(frame.len() as u64);

        if self.frames == 1 {
            debug!(len = frame.len(), "first frame rendered");
        }
        if self.last_report.elapsed() >= self.report_every {
            self.last_report = Instant::now();
            let (fps, bytes_per_sec) = self.meter.rates(self.last_report);
            info!(
                frames = self.frames,
                fps = format_args!("{fps:.1}"),
                bytes_per_sec,
                "render throughput"
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_frames_and_bytes() {
        let mut sink = LoggingSink::new(Duration::from_secs(5));
        sink.consume_frame(&[7u8; 12]);
        sink.consume_frame(&[3u8; 12]);
        let summary = sink.summary();
        assert_eq!(summary.frames, 2);
        assert_eq!(summary.bytes, 24);
        assert_eq!(sink.checksum(), 10);
    }

    #[test]
    fn works_behind_dyn() {
        let mut sink = LoggingSink::new(Duration::from_millis(1));
        let dyn_sink: &mut dyn FrameSink = &mut sink;
        dyn_sink.consume_frame(&[1, 2, 3]);
        assert_eq!(sink.summary().frames, 1);
    }
}
