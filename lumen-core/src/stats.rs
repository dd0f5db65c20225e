//! Throughput accounting for streaming sessions.
//!
//! [`ThroughputMeter`] tracks frames and bytes over a rolling window and
//! derives frames/second and bytes/second for the periodic report.
//! [`SessionSummary`] is the cumulative total reported when a session
//! ends.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

/// Rolling-window throughput meter.
///
/// Records `(timestamp, bytes)` samples, one per frame, and computes
/// averages over the most recent `window` duration.
#[derive(Debug)]
pub struct ThroughputMeter {
    /// Samples: `(when, bytes)`.
    samples: VecDeque<(Instant, u64)>,
    /// Window duration.
    window: Duration,
    /// Running total of bytes in the window.
    window_bytes: u64,
}

impl ThroughputMeter {
    /// Create a meter with a 5-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(5))
    }

    /// Create a meter with a custom window duration.
    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            window,
            window_bytes: 0,
        }
    }

    /// Record that one frame of `bytes` was transferred now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.window_bytes += bytes;
        self.evict(when);
    }

    /// Frames/second and bytes/second as of `now`.
    ///
    /// Samples older than the window are dropped first, so a stalled
    /// producer reads as a falling rate rather than the last healthy one.
    pub fn rates(&mut self, now: Instant) -> (f64, u64) {
        self.evict(now);
        (self.frames_per_sec(), self.bytes_per_sec())
    }

    /// Frames per second over the samples currently held.
    ///
    /// N samples cover N-1 intervals; fewer than two samples read as 0.
    pub fn frames_per_sec(&self) -> f64 {
        match self.span() {
            Some(secs) => (self.samples.len() - 1) as f64 / secs,
            None => 0.0,
        }
    }

    /// Bytes per second over the samples currently held.
    ///
    /// The first sample only marks the start of the span, so its bytes
    /// are not counted.
    pub fn bytes_per_sec(&self) -> u64 {
        match (self.span(), self.samples.front()) {
            (Some(secs), Some(&(_, first))) => {
                (self.window_bytes.saturating_sub(first) as f64 / secs) as u64
            }
            _ => 0,
        }
    }

    /// Number of samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Seconds from the first to the last sample; `None` with fewer than
    /// two samples or a zero span.
    fn span(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let (first, _) = self.samples.front()?;
        let (last, _) = self.samples.back()?;
        let d = last.saturating_duration_since(*first);
        if d.is_zero() { None } else { Some(d.as_secs_f64()) }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.saturating_duration_since(ts) > self.window {
                self.samples.pop_front();
                self.window_bytes = self.window_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── SessionSummary ───────────────────────────────────────────────

/// Cumulative totals for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionSummary {
    /// Frames fully transferred.
    pub frames: u64,
    /// Payload bytes fully transferred (length prefixes excluded).
    pub bytes: u64,
    /// Wall-clock time spent in the session.
    pub duration: Duration,
}

impl SessionSummary {
    /// Average frames per second over the whole session.
    pub fn average_fps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 { self.frames as f64 / secs } else { 0.0 }
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames, {} bytes in {:.1}s ({:.1} fps)",
            self.frames,
            self.bytes,
            self.duration.as_secs_f64(),
            self.average_fps()
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_returns_zero() {
        let meter = ThroughputMeter::new();
        assert_eq!(meter.bytes_per_sec(), 0);
        assert_eq!(meter.frames_per_sec(), 0.0);
    }

    #[test]
    fn ten_frames_over_one_second() {
        let mut meter = ThroughputMeter::with_window(Duration::from_secs(5));
        let t0 = Instant::now();
        for i in 0..=10 {
            meter.record_at(t0 + Duration::from_millis(100 * i), 100_000);
        }
        let fps = meter.frames_per_sec();
        assert!((fps - 10.0).abs() < 0.01, "fps = {fps}");
        assert_eq!(meter.bytes_per_sec(), 1_000_000);
    }

    #[test]
    fn steady_stream_reads_its_true_rate() {
        let mut meter = ThroughputMeter::with_window(Duration::from_secs(10));
        let t0 = Instant::now();
        for i in 0..51 {
            meter.record_at(t0 + Duration::from_millis(100 * i), 1000);
        }
        let (fps, bps) = meter.rates(t0 + Duration::from_secs(5));
        assert!((fps - 10.0).abs() < 0.05, "fps = {fps}");
        assert_eq!(bps, 10_000);
    }

    #[test]
    fn single_sample_has_no_rate() {
        let mut meter = ThroughputMeter::with_window(Duration::from_secs(1));
        let t0 = Instant::now();
        meter.record_at(t0, 1000);
        assert_eq!(meter.rates(t0), (0.0, 0));
    }

    #[test]
    fn same_instant_samples_have_no_rate() {
        let mut meter = ThroughputMeter::new();
        let t0 = Instant::now();
        meter.record_at(t0, 10);
        meter.record_at(t0, 10);
        assert_eq!(meter.rates(t0), (0.0, 0));
    }

    #[test]
    fn stalled_meter_decays_to_zero() {
        let window = Duration::from_secs(1);
        let mut meter = ThroughputMeter::with_window(window);
        let t0 = Instant::now();
        for i in 0..=10 {
            meter.record_at(t0 + Duration::from_millis(100 * i), 500);
        }
        let last = t0 + Duration::from_secs(1);
        let (fps, _) = meter.rates(last);
        assert!(fps > 9.0, "fps = {fps}");

        let (fps, bps) = meter.rates(last + window * 2);
        assert_eq!(fps, 0.0);
        assert_eq!(bps, 0);
        assert_eq!(meter.sample_count(), 0);
    }

    #[test]
    fn evicts_old_samples() {
        let mut meter = ThroughputMeter::with_window(Duration::from_millis(500));
        let t0 = Instant::now();
        meter.record_at(t0, 1000);
        meter.record_at(t0 + Duration::from_secs(1), 500);
        assert_eq!(meter.sample_count(), 1);
    }

    #[test]
    fn summary_display() {
        let summary = SessionSummary {
            frames: 20,
            bytes: 2048,
            duration: Duration::from_secs(2),
        };
        let text = summary.to_string();
        assert!(text.contains("20 frames"));
        assert!(text.contains("2048 bytes"));
        assert!(text.contains("10.0 fps"));
    }
}
