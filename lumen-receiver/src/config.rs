//! Configuration for the receiver process.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;
use std::time::Duration;

use lumen_core::discovery::{AdvertiseConfig, SSDP_PORT};
use lumen_core::{DEFAULT_STREAM_PORT, PixelFormat, StreamConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Discovery advertising.
    pub discovery: DiscoverySection,
    /// Stream geometry and socket tuning.
    pub stream: StreamSection,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the stream listener binds to.
    pub bind_address: String,
    /// TCP port for the stream (advertised in `LOCATION`).
    pub stream_port: u16,
    /// UDP port the discovery responder binds to.
    pub discovery_port: u16,
    /// Address to advertise. Empty means auto-detect.
    pub advertise_ip: String,
}

/// Discovery advertising.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    /// Answer searches and announce presence.
    pub enabled: bool,
    /// Seconds between `ssdp:alive` announcements.
    pub announce_interval_secs: u64,
    /// `max-age` advertised in `CACHE-CONTROL`.
    pub max_age_secs: u64,
    /// Multicast TTL for announcements.
    pub multicast_ttl: u32,
}

/// Stream settings. Geometry comes from the sender's handshake; the
/// values here apply when the handshake is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// "rgb24" or "bgra32".
    pub pixel_format: String,
    /// Expect the 12-byte handshake from the sender.
    pub handshake: bool,
    pub handshake_timeout_ms: u64,
    /// Kernel socket buffer size in KiB.
    pub socket_buffer_kb: usize,
    /// Largest frame accepted, in MiB.
    pub max_frame_mb: usize,
    /// Seconds between render throughput reports.
    pub report_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            stream_port: DEFAULT_STREAM_PORT,
            discovery_port: SSDP_PORT,
            advertise_ip: String::new(),
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            enabled: true,
            announce_interval_secs: 30,
            max_age_secs: 30,
            multicast_ttl: 2,
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
            handshake_timeout_ms: 5000,
            socket_buffer_kb: 4096,
            max_frame_mb: 64,
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

impl ReceiverConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Where the stream listener binds.
    pub fn stream_bind_addr(&self) -> SocketAddr {
        let ip = self
            .network
            .bind_address
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.network.stream_port)
    }

    /// Stream settings for the core receiver.
    pub fn to_stream_config(&self) -> StreamConfig {
        let s = &self.stream;
        StreamConfig {
            width: s.width.clamp(1, 7680),
            height: s.height.clamp(1, 4320),
            fps: s.fps.clamp(1, 120),
            pixel_format: parse_pixel_format(&s.pixel_format),
            handshake: s.handshake,
            handshake_timeout: Duration::from_millis(s.handshake_timeout_ms.max(100)),
            socket_buffer_size: s.socket_buffer_kb.clamp(64, 64 * 1024) * 1024,
            report_interval: Duration::from_secs(s.report_interval_secs.max(1)),
            max_frame_len: s.max_frame_mb.clamp(1, 256) * 1024 * 1024,
            ..StreamConfig::default()
        }
    }

    /// Discovery advertising settings for the core server.
    pub fn to_advertise_config(&self) -> AdvertiseConfig {
        let d = &self.discovery;
        AdvertiseConfig {
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, self.network.discovery_port),
            stream_port: self.network.stream_port,
            advertise_ip: self.network.advertise_ip.parse().ok(),
            announce_interval: Duration::from_secs(d.announce_interval_secs.clamp(1, 1800)),
            max_age: Duration::from_secs(d.max_age_secs.clamp(1, 86_400)),
            multicast_ttl: d.multicast_ttl.clamp(1, 32),
            ..AdvertiseConfig::default()
        }
    }
}

/// Unknown names fall back to RGB24.
pub fn parse_pixel_format(name: &str) -> PixelFormat {
    match name.trim().to_ascii_lowercase().as_str() {
        "bgra32" | "bgra" => PixelFormat::Bgra32,
        "rgb24" | "rgb" => PixelFormat::Rgb24,
        other => {
            tracing::warn!("unknown pixel format {other:?}; using rgb24");
            PixelFormat::Rgb24
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ReceiverConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("stream_port"));
        assert!(text.contains("[discovery]"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ReceiverConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ReceiverConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.stream_port, 8081);
        assert_eq!(parsed.network.discovery_port, 1900);
        assert_eq!(parsed.stream.fps, 10);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed: ReceiverConfig = toml::from_str("[network]\nstream_port = 9100\n").unwrap();
        assert_eq!(parsed.network.stream_port, 9100);
        assert!(parsed.discovery.enabled);
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn advertise_config_carries_stream_port() {
        let mut cfg = ReceiverConfig::default();
        cfg.network.stream_port = 9100;
        cfg.network.advertise_ip = "10.0.0.5".into();
        let adv = cfg.to_advertise_config();
        assert_eq!(adv.stream_port, 9100);
        assert_eq!(adv.advertise_ip, Some(Ipv4Addr::new(10, 0, 0, 5)));

        cfg.network.advertise_ip.clear();
        assert_eq!(cfg.to_advertise_config().advertise_ip, None);
    }

    #[test]
    fn to_configs_clamp() {
        let mut cfg = ReceiverConfig::default();
        cfg.stream.fps = 0;
        cfg.stream.max_frame_mb = 10_000;
        cfg.discovery.announce_interval_secs = 0;
        let stream = cfg.to_stream_config();
        assert_eq!(stream.fps, 1);
        assert_eq!(stream.max_frame_len, 256 * 1024 * 1024);
        assert_eq!(
            cfg.to_advertise_config().announce_interval,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn pixel_format_names() {
        assert_eq!(parse_pixel_format("BGRA32"), PixelFormat::Bgra32);
        assert_eq!(parse_pixel_format("rgb24"), PixelFormat::Rgb24);
        assert_eq!(parse_pixel_format("yuv420"), PixelFormat::Rgb24);
    }
}
