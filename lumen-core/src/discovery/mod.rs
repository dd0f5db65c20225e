//! Zero-configuration discovery of receivers on the local segment.
//!
//! ```text
//! SENDER (client)                          RECEIVER (server)
//!   M-SEARCH ×3 ──── 239.255.255.250:1900 ──► responder
//!            ◄──────── 200 OK (unicast) ────┘
//!                                            announcer
//!            ◄──── NOTIFY ssdp:alive every 30 s
//! ```
//!
//! | Module     | Purpose                                         |
//! |------------|-------------------------------------------------|
//! | `registry` | Per-pass dedup of `(address, port)` records     |
//! | `message`  | Datagram parser and builders                    |
//! | `client`   | Search, collect, verify reachability            |
//! | `server`   | Responder and announcer under one shutdown token|

pub mod client;
pub mod message;
pub mod registry;
pub mod server;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::session::DEFAULT_STREAM_PORT;

pub use client::DiscoveryClient;
pub use message::{Location, SsdpMessage};
pub use registry::{DeviceRecord, Registry};
pub use server::{AdvertiseHandle, DiscoveryServer, start_advertising};

/// Well-known SSDP multicast group.
pub const SSDP_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
/// Well-known SSDP port.
pub const SSDP_PORT: u16 = 1900;
/// Identifies this protocol's traffic on the shared group.
pub const SERVICE_TYPE: &str = "urn:screen-share:receiver";
/// Receive buffer for one discovery datagram.
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// The group and port searches and announcements are sent to.
pub const fn ssdp_group() -> SocketAddrV4 {
    SocketAddrV4::new(SSDP_MULTICAST_GROUP, SSDP_PORT)
}

// ── DiscoveryConfig ──────────────────────────────────────────────

/// Settings for one discovery pass on the sending side.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Where search requests are sent.
    pub search_addr: SocketAddr,
    pub service_type: String,
    /// Collection window when `discover` is given no explicit timeout.
    pub window: Duration,
    /// Times the search request is sent.
    pub send_count: u32,
    /// Pause between repeated sends.
    pub send_spacing: Duration,
    /// Stop collecting after this many datagrams.
    pub response_cap: usize,
    /// `MX` hint placed in the request.
    pub mx: u32,
    pub multicast_ttl: u32,
    /// Port assumed when a response carries no `LOCATION` port.
    pub default_port: u16,
    /// Drop candidates that refuse a short TCP connect.
    pub verify_reachability: bool,
    pub reachability_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_addr: SocketAddr::V4(ssdp_group()),
            service_type: SERVICE_TYPE.to_string(),
            window: Duration::from_secs(3),
            send_count: 3,
            send_spacing: Duration::from_millis(100),
            response_cap: 30,
            mx: 3,
            multicast_ttl: 2,
            default_port: DEFAULT_STREAM_PORT,
            verify_reachability: true,
            reachability_timeout: Duration::from_millis(500),
        }
    }
}

// ── AdvertiseConfig ──────────────────────────────────────────────

/// Settings for the receiving side's discovery server.
#[derive(Debug, Clone)]
pub struct AdvertiseConfig {
    /// Local address the responder listens on.
    pub bind_addr: SocketAddrV4,
    /// Group the responder joins.
    pub group: Ipv4Addr,
    /// Where `NOTIFY` announcements go.
    pub announce_addr: SocketAddr,
    pub service_type: String,
    /// TCP port advertised in `LOCATION`.
    pub stream_port: u16,
    /// Address advertised in `LOCATION`; detected when `None`.
    pub advertise_ip: Option<Ipv4Addr>,
    pub max_age: Duration,
    pub announce_interval: Duration,
    pub multicast_ttl: u32,
    /// `SERVER` header value.
    pub server: String,
}

impl Default for AdvertiseConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT),
            group: SSDP_MULTICAST_GROUP,
            announce_addr: SocketAddr::V4(ssdp_group()),
            service_type: SERVICE_TYPE.to_string(),
            stream_port: DEFAULT_STREAM_PORT,
            advertise_ip: None,
            max_age: Duration::from_secs(30),
            announce_interval: Duration::from_secs(30),
            multicast_ttl: 2,
            server: format!("lumen/{} UPnP/1.0", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ── Selection helpers ────────────────────────────────────────────

/// Numbered list for a selection prompt, one device per line:
/// `[0] 192.168.1.100:8081`.
pub fn list_devices(devices: &[DeviceRecord]) -> String {
    devices
        .iter()
        .enumerate()
        .map(|(i, d)| format!("[{i}] {d}\n"))
        .collect()
}

/// Resolve a numeric choice typed by the user.
pub fn select_device<'a>(devices: &'a [DeviceRecord], input: &str) -> Option<&'a DeviceRecord> {
    let index: usize = input.trim().parse().ok()?;
    devices.get(index)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn devices() -> Vec<DeviceRecord> {
        let mut reg = Registry::new();
        reg.add(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)), 8081);
        reg.add(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 7)), 9100);
        reg.into_records()
    }

    #[test]
    fn list_is_numbered_in_order() {
        assert_eq!(
            list_devices(&devices()),
            "[0] 192.168.1.100:8081\n[1] 192.168.1.7:9100\n"
        );
        assert_eq!(list_devices(&[]), "");
    }

    #[test]
    fn select_parses_index() {
        let devices = devices();
        assert_eq!(select_device(&devices, " 1\n").map(|d| d.port), Some(9100));
        assert!(select_device(&devices, "2").is_none());
        assert!(select_device(&devices, "x").is_none());
        assert!(select_device(&devices, "-1").is_none());
    }

    #[test]
    fn defaults_match_protocol_constants() {
        let d = DiscoveryConfig::default();
        assert_eq!(d.search_addr.to_string(), "239.255.255.250:1900");
        assert_eq!(d.send_count, 3);
        assert_eq!(d.response_cap, 30);
        assert_eq!(d.default_port, 8081);

        let a = AdvertiseConfig::default();
        assert_eq!(a.bind_addr.port(), 1900);
        assert_eq!(a.max_age, Duration::from_secs(30));
        assert!(a.server.starts_with("lumen/"));
    }
}
