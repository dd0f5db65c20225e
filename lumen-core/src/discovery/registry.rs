//! Per-pass deduplication of discovered receivers.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// A receiver seen during one discovery pass.
///
/// Identity is `(address, port)`; `instance_id` is informational.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub address: IpAddr,
    pub port: u16,
    pub first_seen: Instant,
    /// The advertiser's `USN`, when it sent one.
    pub instance_id: Option<String>,
}

impl DeviceRecord {
    pub fn key(&self) -> (IpAddr, u16) {
        (self.address, self.port)
    }

    /// Where to connect for the stream.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Insertion-ordered set of [`DeviceRecord`]s keyed by `(address, port)`.
///
/// Created empty for each discovery call and dropped after its snapshot
/// is returned. There is no removal.
#[derive(Debug, Default)]
pub struct Registry {
    records: Vec<DeviceRecord>,
    seen: HashSet<(IpAddr, u16)>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. Returns `false` (and changes nothing) if the key
    /// is already present.
    pub fn add(&mut self, address: IpAddr, port: u16) -> bool {
        self.add_with_id(address, port, None)
    }

    /// Like [`add`](Self::add), keeping the advertiser's instance id.
    pub fn add_with_id(&mut self, address: IpAddr, port: u16, instance_id: Option<String>) -> bool {
        if !self.seen.insert((address, port)) {
            return false;
        }
        self.records.push(DeviceRecord {
            address,
            port,
            first_seen: Instant::now(),
            instance_id,
        });
        true
    }

    /// Records in first-discovered-first order.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        self.records.clone()
    }

    /// Consume the registry, yielding its records in insertion order.
    pub fn into_records(self) -> Vec<DeviceRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
