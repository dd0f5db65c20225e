//! Domain-specific error types for lumen discovery and streaming.
//!
//! All fallible operations return `Result<T, LumenError>`.
//! No panics on invalid input: every error is typed and recoverable
//! at the session or discovery-call boundary.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for lumen.
#[derive(Debug, Error)]
pub enum LumenError {
    // ── Handshake Errors ─────────────────────────────────────────
    /// The session handshake carried unusable values.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(&'static str),

    // ── Framing Errors ───────────────────────────────────────────
    /// The length prefix does not match the session's frame size.
    #[error("frame length mismatch: expected {expected}, got {actual}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    /// Frame size exceeded the codec limit.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The capture source produced a buffer of the wrong size.
    #[error("payload size mismatch: session expects {expected}, source produced {actual}")]
    PayloadSizeMismatch { expected: usize, actual: usize },

    /// A session operation was attempted in the wrong phase.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/UDP layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The peer closed the connection.
    #[error("peer closed the connection")]
    PeerClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The operation observed the shutdown token.
    #[error("operation cancelled")]
    Cancelled,

    // ── Discovery Errors ─────────────────────────────────────────
    /// A discovery datagram could not be parsed.
    #[error("invalid discovery message: {0}")]
    Message(#[from] MessageError),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── MessageError ─────────────────────────────────────────────────

/// Typed parse error for discovery datagrams.
///
/// Unrelated multicast traffic on the discovery group is expected, so
/// these are routinely produced and dropped by the discovery loops.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("empty datagram")]
    Empty,

    #[error("datagram is not valid utf-8")]
    NotUtf8,

    #[error("unrecognised start line: {0:?}")]
    UnknownStartLine(String),

    #[error("malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("missing {0} header")]
    MissingHeader(&'static str),

    #[error("invalid LOCATION: {0:?}")]
    InvalidLocation(String),
}

impl LumenError {
    /// Whether this error means the remote side went away, as opposed to
    /// a protocol or local failure.
    pub fn is_disconnect(&self) -> bool {
        match self {
            LumenError::PeerClosed => true,
            LumenError::Connection(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::WriteZero
            ),
            _ => false,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LumenError {
    fn from(s: String) -> Self {
        LumenError::Other(s)
    }
}

impl From<&str> for LumenError {
    fn from(s: &str) -> Self {
        LumenError::Other(s.to_string())
    }
}
