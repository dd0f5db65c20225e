//! Sending side of discovery: search, collect, verify.
//!
//! One call to [`DiscoveryClient::discover`] is one pass:
//!
//! 1. open an ephemeral UDP socket with broadcast and multicast TTL set
//! 2. send the search request `send_count` times, `send_spacing` apart
//! 3. collect responses until the window closes or `response_cap` is hit
//! 4. keep success responses for our service type, dedup by key
//! 5. optionally drop candidates that refuse a short TCP connect
//!
//! Discovery finding nothing is a normal outcome, so `discover` never
//! fails; it logs the reason and returns an empty list.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use futures::future::join_all;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, trace, warn};

use crate::discovery::message::SsdpMessage;
use crate::discovery::registry::{DeviceRecord, Registry};
use crate::discovery::{DiscoveryConfig, MAX_DATAGRAM_SIZE};
use crate::error::LumenError;

/// Finds receivers advertising our service type.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryClient {
    config: DiscoveryConfig,
}

/// A receiver endpoint extracted from one response datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub address: IpAddr,
    pub port: u16,
    pub instance_id: Option<String>,
}

impl DiscoveryClient {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run one discovery pass lasting at most `window`.
    ///
    /// Returns receivers in first-responded-first order. Socket setup
    /// failures are logged and produce an empty list.
    pub async fn discover(&self, window: Duration) -> Vec<DeviceRecord> {
        match self.try_discover(window).await {
            Ok(devices) => {
                info!(count = devices.len(), "discovery finished");
                devices
            }
            Err(e) => {
                warn!(error = %e, "discovery failed");
                Vec::new()
            }
        }
    }

    /// Whether at least one receiver answers within the configured window.
    pub async fn has_receivers(&self) -> bool {
        !self.discover(self.config.window).await.is_empty()
    }

    /// [`discover`](Self::discover) without the error swallowing.
    pub async fn try_discover(&self, window: Duration) -> Result<Vec<DeviceRecord>, LumenError> {
        let deadline = Instant::now() + window;
        let socket = self.search_socket()?;

        let request = SsdpMessage::search(
            self.config.search_addr,
            &self.config.service_type,
            self.config.mx,
        )
        .to_bytes();

        for i in 0..self.config.send_count {
            if i > 0 {
                tokio::time::sleep(self.config.send_spacing).await;
            }
            socket.send_to(&request, self.config.search_addr).await?;
            trace!(target_addr = %self.config.search_addr, attempt = i + 1, "search sent");
        }
        debug!(
            target_addr = %self.config.search_addr,
            sends = self.config.send_count,
            ?window,
            "searching for receivers"
        );

        let mut registry = Registry::new();
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        let mut received = 0usize;

        while received < self.config.response_cap {
            let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Ok(pair)) => pair,
                Ok(Err(e)) => {
                    // ICMP unreachable surfaces here on some platforms.
                    debug!(error = %e, "recv error during discovery");
                    received += 1;
                    continue;
                }
            };
            received += 1;

            let Some(candidate) = candidate_from_datagram(&buf[..len], from, &self.config) else {
                continue;
            };
            if registry.add_with_id(candidate.address, candidate.port, candidate.instance_id) {
                debug!(address = %candidate.address, port = candidate.port, %from, "receiver found");
            }
        }

        let devices = registry.into_records();
        if !self.config.verify_reachability {
            return Ok(devices);
        }
        Ok(filter_reachable(devices, self.config.reachability_timeout).await)
    }

    fn search_socket(&self) -> io::Result<UdpSocket> {
        let v4 = self.config.search_addr.is_ipv4();
        let domain = if v4 { Domain::IPV4 } else { Domain::IPV6 };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if v4 {
            socket.set_broadcast(true)?;
            socket.set_multicast_ttl_v4(self.config.multicast_ttl)?;
        } else {
            socket.set_multicast_hops_v6(self.config.multicast_ttl)?;
        }
        socket.set_nonblocking(true)?;

        let local: SocketAddr = if v4 {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        socket.bind(&local.into())?;
        UdpSocket::from_std(socket.into())
    }
}

/// Interpret one datagram as a response, or `None` if it is not ours.
///
/// A response without `LOCATION` maps to the sender's address and the
/// configured default port. A `LOCATION` host that is not an IP literal
/// keeps its port but takes the sender's address. An unparseable
/// `LOCATION` drops the response.
pub fn candidate_from_datagram(
    data: &[u8],
    from: SocketAddr,
    config: &DiscoveryConfig,
) -> Option<Candidate> {
    let msg = match SsdpMessage::parse(data) {
        Ok(msg) => msg,
        Err(e) => {
            trace!(%from, error = %e, "ignoring datagram");
            return None;
        }
    };
    if !msg.is_success_for(&config.service_type) {
        trace!(%from, start = %msg.start_line(), "ignoring unrelated message");
        return None;
    }

    let (address, port) = match msg.location() {
        Ok(Some(location)) => (
            location.host.parse::<IpAddr>().unwrap_or(from.ip()),
            location.port.unwrap_or(config.default_port),
        ),
        Ok(None) => (from.ip(), config.default_port),
        Err(e) => {
            debug!(%from, error = %e, "response with bad LOCATION");
            return None;
        }
    };

    Some(Candidate {
        address,
        port,
        instance_id: msg.usn().map(str::to_string),
    })
}

/// Keep only devices accepting a TCP connect within `limit`, in order.
pub async fn filter_reachable(devices: Vec<DeviceRecord>, limit: Duration) -> Vec<DeviceRecord> {
    let checks = join_all(devices.iter().map(|d| is_reachable(d.socket_addr(), limit))).await;
    devices
        .into_iter()
        .zip(checks)
        .filter_map(|(device, ok)| {
            if !ok {
                debug!(addr = %device.socket_addr(), "dropping unreachable receiver");
            }
            ok.then_some(device)
        })
        .collect()
}

/// Short TCP connect check.
pub async fn is_reachable(addr: SocketAddr, limit: Duration) -> bool {
    matches!(timeout(limit, TcpStream::connect(addr)).await, Ok(Ok(_)))
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn from() -> SocketAddr {
        "192.168.1.50:1900".parse().unwrap()
    }

    fn response(location: Option<&str>) -> Vec<u8> {
        let mut text = String::from("HTTP/1.1 200 OK\r\nCACHE-CONTROL: max-age=30\r\n");
        if let Some(loc) = location {
            text.push_str(&format!("LOCATION: {loc}\r\n"));
        }
        text.push_str("ST: urn:screen-share:receiver\r\nUSN: uuid:abc::urn:screen-share:receiver\r\n\r\n");
        text.into_bytes()
    }

    #[test]
    fn candidate_from_location() {
        let config = DiscoveryConfig::default();
        let c = candidate_from_datagram(&response(Some("http://10.0.0.5:9100/")), from(), &config)
            .unwrap();
        assert_eq!(c.address, "10.0.0.5".parse::<IpAddr>().unwrap());
        assert_eq!(c.port, 9100);
        assert_eq!(c.instance_id.as_deref(), Some("uuid:abc::urn:screen-share:receiver"));
    }

    #[test]
    fn missing_location_falls_back_to_source() {
        let config = DiscoveryConfig::default();
        let c = candidate_from_datagram(&response(None), from(), &config).unwrap();
        assert_eq!(c.address, from().ip());
        assert_eq!(c.port, 8081);
    }

    #[test]
    fn hostname_location_keeps_port() {
        let config = DiscoveryConfig::default();
        let c = candidate_from_datagram(&response(Some("http://tv.local:7000/")), from(), &config)
            .unwrap();
        assert_eq!(c.address, from().ip());
        assert_eq!(c.port, 7000);
    }

    #[test]
    fn foreign_traffic_is_ignored() {
        let config = DiscoveryConfig::default();
        let dial = b"HTTP/1.1 200 OK\r\nST: urn:dial-multiscreen-org:service:dial:1\r\nLOCATION: http://10.0.0.9:8008/\r\n\r\n";
        let search = b"M-SEARCH * HTTP/1.1\r\nST: urn:screen-share:receiver\r\n\r\n";
        assert!(candidate_from_datagram(dial, from(), &config).is_none());
        assert!(candidate_from_datagram(search, from(), &config).is_none());
        assert!(candidate_from_datagram(b"\x00\x01garbage", from(), &config).is_none());
        assert!(
            candidate_from_datagram(&response(Some("not a url")), from(), &config).is_none()
        );
    }

    #[tokio::test]
    async fn discover_dedups_repeated_answers() {
        // A responder that answers every search, plus some noise.
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_addr = responder.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((_, peer)) = responder.recv_from(&mut buf).await else {
                    return;
                };
                let _ = responder.send_to(b"NOTIFY * HTTP/1.1\r\nNT: other\r\n\r\n", peer).await;
                let _ = responder
                    .send_to(&response(Some("http://10.0.0.5:9100/")), peer)
                    .await;
            }
        });

        let client = DiscoveryClient::new(DiscoveryConfig {
            search_addr: responder_addr,
            verify_reachability: false,
            ..DiscoveryConfig::default()
        });
        let devices = client.discover(Duration::from_millis(600)).await;
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].to_string(), "10.0.0.5:9100");
    }

    #[tokio::test]
    async fn discover_sends_spaced_searches() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let responder_addr = responder.local_addr().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let Ok((len, peer)) = responder.recv_from(&mut buf).await else {
                    return;
                };
                let is_search = SsdpMessage::parse(&buf[..len])
                    .is_ok_and(|m| m.is_search_for(crate::discovery::SERVICE_TYPE));
                if is_search {
                    let _ = tx.send(Instant::now());
                    let _ = responder
                        .send_to(&response(Some("http://10.0.0.5:9100/")), peer)
                        .await;
                }
            }
        });

        let config = DiscoveryConfig {
            search_addr: responder_addr,
            verify_reachability: false,
            ..DiscoveryConfig::default()
        };
        let spacing = config.send_spacing;
        let client = DiscoveryClient::new(config.clone());
        let devices = client.discover(Duration::from_millis(600)).await;
        assert_eq!(devices.len(), 1);

        let mut arrivals = Vec::new();
        while let Ok(at) = rx.try_recv() {
            arrivals.push(at);
        }
        assert_eq!(arrivals.len() as u32, config.send_count);
        assert_eq!(arrivals.len(), 3);
        for pair in arrivals.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= spacing - Duration::from_millis(20), "gap = {gap:?}");
        }
    }

    #[tokio::test]
    async fn discover_with_no_responders_is_empty() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = DiscoveryClient::new(DiscoveryConfig {
            search_addr: silent.local_addr().unwrap(),
            send_spacing: Duration::from_millis(10),
            ..DiscoveryConfig::default()
        });

        let started = std::time::Instant::now();
        assert!(!client.has_receivers().await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn reachability_filter_keeps_listening_ports() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = listener.local_addr().unwrap();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        let mut reg = Registry::new();
        reg.add(closed.ip(), closed.port());
        reg.add(open.ip(), open.port());

        let kept = filter_reachable(reg.into_records(), Duration::from_millis(500)).await;
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].socket_addr(), open);
    }
}
