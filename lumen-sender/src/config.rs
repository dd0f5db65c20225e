//! Sender configuration.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use lumen_core::discovery::ssdp_group;
use lumen_core::{DEFAULT_STREAM_PORT, DiscoveryConfig, PixelFormat, StreamConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the sender.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Discovery settings.
    pub discovery: DiscoverySection,
    /// Stream settings.
    pub stream: StreamSection,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Fixed receiver (IP:port). Empty means discover.
    pub target: String,
    /// Where search requests go.
    pub search_address: String,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Collection window in milliseconds.
    pub window_ms: u64,
    /// Times the search is sent.
    pub send_count: u32,
    /// Drop receivers that refuse a TCP connect.
    pub verify_reachability: bool,
    pub reachability_timeout_ms: u64,
    pub multicast_ttl: u32,
    /// Port assumed when a response has no `LOCATION`.
    pub default_port: u16,
}

/// Stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// "rgb24" or "bgra32".
    pub pixel_format: String,
    /// Send the 12-byte handshake.
    pub handshake: bool,
    /// Kernel send buffer in KiB.
    pub socket_buffer_kb: usize,
    /// Seconds between throughput reports.
    pub report_interval_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            search_address: ssdp_group().to_string(),
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            window_ms: 3000,
            send_count: 3,
            verify_reachability: true,
            reachability_timeout_ms: 500,
            multicast_ttl: 2,
            default_port: DEFAULT_STREAM_PORT,
        }
    }
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 10,
            pixel_format: "rgb24".into(),
            handshake: true,
            socket_buffer_kb: 4096,
            report_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderConfig {
    /// Load from TOML, falling back to defaults on any error.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!("bad config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// The fixed target, if one is configured and parses.
    pub fn target_addr(&self) -> Option<SocketAddr> {
        let target = self.network.target.trim();
        if target.is_empty() {
            return None;
        }
        match target.parse() {
            Ok(addr) => Some(addr),
            Err(_) => {
                tracing::warn!("ignoring unparseable target {target:?}");
                None
            }
        }
    }

    /// Discovery window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.discovery.window_ms.clamp(200, 30_000))
    }

    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        let d = &self.discovery;
        let defaults = DiscoveryConfig::default();
        DiscoveryConfig {
            search_addr: self
                .network
                .search_address
                .parse()
                .unwrap_or(defaults.search_addr),
            window: self.window(),
            send_count: d.send_count.clamp(1, 10),
            verify_reachability: d.verify_reachability,
            reachability_timeout: Duration::from_millis(d.reachability_timeout_ms.clamp(50, 5000)),
            multicast_ttl: d.multicast_ttl.clamp(1, 32),
            default_port: d.default_port,
            ..defaults
        }
    }

    pub fn to_stream_config(&self) -> StreamConfig {
        let s = &self.stream;
        StreamConfig {
            width: s.width.clamp(1, 7680),
            height: s.height.clamp(1, 4320),
            fps: s.fps.clamp(1, 120),
            pixel_format: parse_pixel_format(&s.pixel_format),
            handshake: s.handshake,
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.clamp(100, 60_000)),
            socket_buffer_size: s.socket_buffer_kb.clamp(64, 64 * 1024) * 1024,
            report_interval: Duration::from_secs(s.report_interval_secs.max(1)),
            ..StreamConfig::default()
        }
    }
}

fn parse_pixel_format(name: &str) -> PixelFormat {
    if name.trim().eq_ignore_ascii_case("bgra32") {
        PixelFormat::Bgra32
    } else {
        PixelFormat::Rgb24
    }
}

// ── Tests ────────────────────────────────────────────────────────
