//! SSDP-style discovery datagrams: parsing and construction.
//!
//! Three message kinds travel on the discovery group:
//!
//! ```text
//! M-SEARCH * HTTP/1.1        search request   (client → group)
//! HTTP/1.1 200 OK            search response  (server → requester, unicast)
//! NOTIFY * HTTP/1.1          announcement     (server → group)
//! ```
//!
//! Each is a start line followed by `NAME: value` header lines and a
//! blank line. Header names are matched case-insensitively.

use std::fmt;
use std::net::SocketAddr;

use crate::error::MessageError;

/// `NTS` value for a live announcement.
pub const NTS_ALIVE: &str = "ssdp:alive";
/// `NTS` value for a departing announcement.
pub const NTS_BYEBYE: &str = "ssdp:byebye";
/// Search target matching every service.
pub const ST_ALL: &str = "ssdp:all";

// ── StartLine ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLine {
    /// `M-SEARCH * HTTP/1.1`
    Search,
    /// `NOTIFY * HTTP/1.1`
    Notify,
    /// `HTTP/1.1 <status> <reason>`
    Response { status: u16 },
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLine::Search => f.write_str("M-SEARCH * HTTP/1.1"),
            StartLine::Notify => f.write_str("NOTIFY * HTTP/1.1"),
            StartLine::Response { status: 200 } => f.write_str("HTTP/1.1 200 OK"),
            StartLine::Response { status } => write!(f, "HTTP/1.1 {status} Error"),
        }
    }
}

impl StartLine {
    fn parse(line: &str) -> Result<Self, MessageError> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some("M-SEARCH"), Some("*"), Some(v)) if v.starts_with("HTTP/1.") => Ok(Self::Search),
            (Some("NOTIFY"), Some("*"), Some(v)) if v.starts_with("HTTP/1.") => Ok(Self::Notify),
            (Some(v), Some(code), _) if v.starts_with("HTTP/1.") => code
                .parse()
                .map(|status| Self::Response { status })
                .map_err(|_| MessageError::UnknownStartLine(line.to_string())),
            _ => Err(MessageError::UnknownStartLine(line.to_string())),
        }
    }
}

// ── SsdpMessage ──────────────────────────────────────────────────

/// A parsed or to-be-sent discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpMessage {
    start: StartLine,
    /// `(NAME, value)` with names upper-cased, in wire order.
    headers: Vec<(String, String)>,
}

impl SsdpMessage {
    pub fn new(start: StartLine) -> Self {
        Self {
            start,
            headers: Vec::new(),
        }
    }

    /// Append a header.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_uppercase(), value.into()));
        self
    }

    /// Search request for `service_type`, addressed to `host`.
    pub fn search(host: SocketAddr, service_type: &str, mx: u32) -> Self {
        Self::new(StartLine::Search)
            .with_header("HOST", host.to_string())
            .with_header("MAN", "\"ssdp:discover\"")
            .with_header("MX", mx.to_string())
            .with_header("ST", service_type)
    }

    /// Unicast answer to a search.
    pub fn response(advert: &Advertisement<'_>) -> Self {
        Self::new(StartLine::Response { status: 200 })
            .with_header("CACHE-CONTROL", format!("max-age={}", advert.max_age_secs))
            .with_header("EXT", "")
            .with_header("LOCATION", advert.location.to_string())
            .with_header("SERVER", advert.server)
            .with_header("ST", advert.service_type)
            .with_header("USN", advert.usn())
    }

    /// Periodic `ssdp:alive` announcement.
    pub fn notify_alive(host: SocketAddr, advert: &Advertisement<'_>) -> Self {
        Self::new(StartLine::Notify)
            .with_header("HOST", host.to_string())
            .with_header("CACHE-CONTROL", format!("max-age={}", advert.max_age_secs))
            .with_header("LOCATION", advert.location.to_string())
            .with_header("NT", advert.service_type)
            .with_header("NTS", NTS_ALIVE)
            .with_header("SERVER", advert.server)
            .with_header("USN", advert.usn())
    }

    /// Departure announcement sent on shutdown.
    pub fn notify_byebye(host: SocketAddr, advert: &Advertisement<'_>) -> Self {
        Self::new(StartLine::Notify)
            .with_header("HOST", host.to_string())
            .with_header("NT", advert.service_type)
            .with_header("NTS", NTS_BYEBYE)
            .with_header("USN", advert.usn())
    }

    /// Parse one datagram.
    pub fn parse(data: &[u8]) -> Result<Self, MessageError> {
        let text = std::str::from_utf8(data).map_err(|_| MessageError::NotUtf8)?;
        let mut lines = text.lines();

        let first = lines.next().map(str::trim).unwrap_or_default();
        if first.is_empty() {
            return Err(MessageError::Empty);
        }
        let start = StartLine::parse(first)?;

        let mut headers = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| MessageError::MalformedHeader(line.to_string()))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(MessageError::MalformedHeader(line.to_string()));
            }
            headers.push((name.to_ascii_uppercase(), value.trim().to_string()));
        }

        Ok(Self { start, headers })
    }

    /// Render for the wire.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn start_line(&self) -> StartLine {
        self.start
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this is a search request a `service_type` server should answer.
    pub fn is_search_for(&self, service_type: &str) -> bool {
        self.start == StartLine::Search
            && self
                .header("ST")
                .is_some_and(|st| st == service_type || st == ST_ALL)
    }

    /// Whether this is a success response for `service_type`.
    pub fn is_success_for(&self, service_type: &str) -> bool {
        matches!(self.start, StartLine::Response { status: 200 })
            && self.header("ST") == Some(service_type)
    }

    /// The parsed `LOCATION` header; `Ok(None)` if absent.
    pub fn location(&self) -> Result<Option<Location>, MessageError> {
        self.header("LOCATION").map(Location::parse).transpose()
    }

    /// The advertiser's unique service name, if present and non-empty.
    pub fn usn(&self) -> Option<&str> {
        self.header("USN").filter(|v| !v.is_empty())
    }

    /// `max-age` from `CACHE-CONTROL`, in seconds.
    pub fn max_age_secs(&self) -> Option<u64> {
        self.header("CACHE-CONTROL")?
            .split(',')
            .filter_map(|d| d.trim().strip_prefix("max-age"))
            .filter_map(|rest| rest.trim_start().strip_prefix('='))
            .find_map(|v| v.trim().parse().ok())
    }
}

impl fmt::Display for SsdpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\r\n", self.start)?;
        for (name, value) in &self.headers {
            if value.is_empty() {
                write!(f, "{name}:\r\n")?;
            } else {
                write!(f, "{name}: {value}\r\n")?;
            }
        }
        f.write_str("\r\n")
    }
}

// ── Advertisement ────────────────────────────────────────────────

/// The fields a server puts in every response and announcement.
#[derive(Debug, Clone)]
pub struct Advertisement<'a> {
    pub service_type: &'a str,
    pub location: &'a Location,
    pub max_age_secs: u64,
    pub server: &'a str,
    /// Unique id of this advertising instance (`uuid:...`).
    pub instance_id: &'a str,
}

impl Advertisement<'_> {
    fn usn(&self) -> String {
        format!("{}::{}", self.instance_id, self.service_type)
    }
}

// ── Location ─────────────────────────────────────────────────────

/// `scheme://host[:port]/path` from a `LOCATION` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Location {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: "http".into(),
            host: host.into(),
            port: Some(port),
        }
    }

    pub fn parse(url: &str) -> Result<Self, MessageError> {
        let invalid = || MessageError::InvalidLocation(url.to_string());

        let (scheme, rest) = url.trim().split_once("://").ok_or_else(invalid)?;
        if scheme.is_empty() {
            return Err(invalid());
        }
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            // [v6]:port
            let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
            let port = match after.strip_prefix(':') {
                Some(p) => Some(p.parse().map_err(|_| invalid())?),
                None if after.is_empty() => None,
                None => return Err(invalid()),
            };
            (host, port)
        } else {
            let (host, port) = match authority.rsplit_once(':') {
                Some((host, p)) => (host, Some(p.parse().map_err(|_| invalid())?)),
                None => (authority, None),
            };
            // IPv6 literals must be bracketed.
            if host.contains(':') {
                return Err(invalid());
            }
            (host, port)
        };

        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) => write!(f, "{}://{host}:{port}/", self.scheme),
            None => write!(f, "{}://{host}/", self.scheme),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
