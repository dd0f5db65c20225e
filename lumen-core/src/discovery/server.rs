//! Receiving side of discovery: answer searches, announce presence.
//!
//! Two loops share one shutdown token:
//!
//! - **responder**: bound to the discovery port and joined to the
//!   group; answers matching searches unicast to the asker
//! - **announcer**: sends `ssdp:alive` every `announce_interval` and an
//!   `ssdp:byebye` on the way out
//!
//! [`DiscoveryServer::run`] returns only after both loops have exited.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::discovery::message::{Advertisement, Location, SsdpMessage};
use crate::discovery::{AdvertiseConfig, MAX_DATAGRAM_SIZE};
use crate::error::LumenError;

/// Floor for the re-announcement period.
const MIN_ANNOUNCE_INTERVAL: Duration = Duration::from_millis(100);

/// Bound sockets plus the advertisement they serve.
pub struct DiscoveryServer {
    config: AdvertiseConfig,
    responder: UdpSocket,
    announcer: UdpSocket,
    location: Location,
    instance_id: String,
}

impl DiscoveryServer {
    /// Bind both sockets and work out the advertised location.
    ///
    /// Bind failures are returned. Failing to join the multicast group
    /// is logged and tolerated: unicast searches still work.
    pub async fn bind(config: AdvertiseConfig) -> Result<Self, LumenError> {
        let responder = UdpSocket::from_std(responder_socket(&config)?)?;
        let announcer = UdpSocket::from_std(announcer_socket(&config)?)?;

        let ip = config.advertise_ip.unwrap_or_else(detect_local_ipv4);
        let location = Location::new(ip.to_string(), config.stream_port);
        let instance_id = instance_id(&location);

        info!(
            bind = %responder.local_addr()?,
            %location,
            usn = %instance_id,
            "discovery server ready"
        );
        Ok(Self {
            config,
            responder,
            announcer,
            location,
            instance_id,
        })
    }

    /// Where the responder is listening.
    pub fn responder_addr(&self) -> Result<SocketAddr, LumenError> {
        Ok(self.responder.local_addr()?)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Serve until `shutdown` fires; returns once both loops are done.
    pub async fn run(self, shutdown: CancellationToken) {
        let advert = Advertisement {
            service_type: &self.config.service_type,
            location: &self.location,
            max_age_secs: self.config.max_age.as_secs(),
            server: &self.config.server,
            instance_id: &self.instance_id,
        };
        let interval = self.config.announce_interval.max(MIN_ANNOUNCE_INTERVAL);

        tokio::join!(
            respond_loop(&self.responder, &advert, &shutdown),
            announce_loop(
                &self.announcer,
                self.config.announce_addr,
                interval,
                &advert,
                &shutdown
            ),
        );
        info!("discovery server stopped");
    }

    /// Run in the background under a child of `shutdown`.
    pub fn spawn(self, shutdown: &CancellationToken) -> AdvertiseHandle {
        let token = shutdown.child_token();
        let task = tokio::spawn(self.run(token.clone()));
        AdvertiseHandle { token, task }
    }
}

/// Owner of a spawned [`DiscoveryServer`].
#[derive(Debug)]
pub struct AdvertiseHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl AdvertiseHandle {
    /// Stop both loops and wait for them to exit.
    pub async fn shutdown(self) -> Result<(), LumenError> {
        self.token.cancel();
        self.task
            .await
            .map_err(|e| LumenError::Other(format!("discovery task failed: {e}")))
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Bind with `config` and advertise until `shutdown` fires.
pub async fn start_advertising(
    config: AdvertiseConfig,
    shutdown: CancellationToken,
) -> Result<(), LumenError> {
    DiscoveryServer::bind(config).await?.run(shutdown).await;
    Ok(())
}

// ── Loops ────────────────────────────────────────────────────────

async fn respond_loop(socket: &UdpSocket, advert: &Advertisement<'_>, shutdown: &CancellationToken) {
    let response = SsdpMessage::response(advert).to_bytes();
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, from) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            r = socket.recv_from(&mut buf) => match r {
                Ok(pair) => pair,
                Err(e) => {
                    debug!(error = %e, "responder recv error");
                    continue;
                }
            },
        };

        match SsdpMessage::parse(&buf[..len]) {
            Ok(msg) if msg.is_search_for(advert.service_type) => {
                match socket.send_to(&response, from).await {
                    Ok(_) => debug!(%from, "answered search"),
                    Err(e) => warn!(%from, error = %e, "failed to answer search"),
                }
            }
            Ok(msg) => trace!(%from, start = %msg.start_line(), "ignoring message"),
            Err(e) => trace!(%from, error = %e, "ignoring datagram"),
        }
    }
    debug!("responder stopped");
}

async fn announce_loop(
    socket: &UdpSocket,
    target: SocketAddr,
    every: Duration,
    advert: &Advertisement<'_>,
    shutdown: &CancellationToken,
) {
    let alive = SsdpMessage::notify_alive(target, advert).to_bytes();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => match socket.send_to(&alive, target).await {
                Ok(_) => trace!(%target, "announced"),
                Err(e) => warn!(%target, error = %e, "announcement failed"),
            },
        }
    }

    let byebye = SsdpMessage::notify_byebye(target, advert).to_bytes();
    if let Err(e) = socket.send_to(&byebye, target).await {
        debug!(%target, error = %e, "byebye failed");
    }
    debug!("announcer stopped");
}

// ── Sockets ──────────────────────────────────────────────────────

fn responder_socket(config: &AdvertiseConfig) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(config.bind_addr).into())?;

    if let Err(e) = socket.join_multicast_v4(&config.group, &Ipv4Addr::UNSPECIFIED) {
        warn!(group = %config.group, error = %e, "multicast join failed; unicast searches only");
    }
    Ok(socket.into())
}

fn announcer_socket(config: &AdvertiseConfig) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_multicast_ttl_v4(config.multicast_ttl)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).into())?;
    Ok(socket.into())
}

/// Address of the interface that routes off-host, or loopback.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn detect_local_ipv4() -> Ipv4Addr {
    let route_ip = || -> io::Result<IpAddr> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };
    match route_ip() {
        Ok(IpAddr::V4(ip)) if !ip.is_unspecified() => ip,
        _ => Ipv4Addr::LOCALHOST,
    }
}

/// `uuid:`-style id unique to this advertising instance.
fn instance_id(location: &Location) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(location.to_string().as_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&nanos.to_le_bytes());
    let hash = hasher.finalize();
    let b = hash.as_bytes();

    let hex = |bytes: &[u8]| -> String { bytes.iter().map(|x| format!("{x:02x}")).collect() };
    format!(
        "uuid:{}-{}-{}-{}-{}",
        hex(&b[0..4]),
        hex(&b[4..6]),
        hex(&b[6..8]),
        hex(&b[8..10]),
        hex(&b[10..16])
    )
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::message::{NTS_ALIVE, NTS_BYEBYE};

    async fn local_server(announce_addr: SocketAddr) -> DiscoveryServer {
        DiscoveryServer::bind(AdvertiseConfig {
            bind_addr: SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0),
            announce_addr,
            advertise_ip: Some(Ipv4Addr::LOCALHOST),
            stream_port: 9100,
            ..AdvertiseConfig::default()
        })
        .await
        .unwrap()
    }

    async fn recv_message(socket: &UdpSocket, within: Duration) -> Option<SsdpMessage> {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (len, _) = tokio::time::timeout(within, socket.recv_from(&mut buf))
            .await
            .ok()?
            .ok()?;
        SsdpMessage::parse(&buf[..len]).ok()
    }

    #[tokio::test]
    async fn answers_matching_search_unicast() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = local_server(sink.local_addr().unwrap()).await;
        let responder = server.responder_addr().unwrap();
        let usn = server.instance_id().to_string();
        let handle = server.spawn(&CancellationToken::new());

        let asker = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let search = SsdpMessage::search(responder, crate::discovery::SERVICE_TYPE, 3);
        asker.send_to(&search.to_bytes(), responder).await.unwrap();

        let reply = recv_message(&asker, Duration::from_secs(2)).await.unwrap();
        assert!(reply.is_success_for(crate::discovery::SERVICE_TYPE));
        assert_eq!(reply.location().unwrap(), Some(Location::new("127.0.0.1", 9100)));
        assert!(reply.usn().unwrap().starts_with(&usn));

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn answers_ssdp_all_but_not_other_services() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = local_server(sink.local_addr().unwrap()).await;
        let responder = server.responder_addr().unwrap();
        let handle = server.spawn(&CancellationToken::new());

        let asker = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let other = SsdpMessage::search(responder, "urn:schemas-upnp-org:device:MediaRenderer:1", 3);
        asker.send_to(&other.to_bytes(), responder).await.unwrap();
        assert!(recv_message(&asker, Duration::from_millis(300)).await.is_none());

        let all = SsdpMessage::search(responder, "ssdp:all", 3);
        asker.send_to(&all.to_bytes(), responder).await.unwrap();
        assert!(recv_message(&asker, Duration::from_secs(2)).await.is_some());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn announcer_sends_alive_then_byebye() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = local_server(sink.local_addr().unwrap()).await;
        let handle = server.spawn(&CancellationToken::new());

        let alive = recv_message(&sink, Duration::from_secs(2)).await.unwrap();
        assert_eq!(alive.header("NTS"), Some(NTS_ALIVE));
        assert_eq!(alive.location().unwrap(), Some(Location::new("127.0.0.1", 9100)));
        assert_eq!(alive.max_age_secs(), Some(30));

        handle.shutdown().await.unwrap();
        let bye = recv_message(&sink, Duration::from_secs(2)).await.unwrap();
        assert_eq!(bye.header("NTS"), Some(NTS_BYEBYE));
    }

    #[tokio::test]
    async fn run_returns_promptly_on_cancelled_token() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = local_server(sink.local_addr().unwrap()).await;
        let token = CancellationToken::new();
        token.cancel();

        tokio::time::timeout(Duration::from_millis(500), server.run(token))
            .await
            .expect("server ignored a cancelled token");
    }

    #[test]
    fn instance_id_is_uuid_shaped() {
        let id = instance_id(&Location::new("10.0.0.5", 8081));
        let uuid = id.strip_prefix("uuid:").unwrap();
        let groups: Vec<_> = uuid.split('-').map(str::len).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert!(uuid.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
    }
}
