//! Per-session state machine shared by the producer and consumer sides.
//!
//! Transitions return `Result` instead of panicking; any I/O failure
//! short-circuits to `Closed` via [`SessionPhase::close`].

use std::time::{Duration, Instant};

use crate::error::LumenError;

// ── SessionPhase ─────────────────────────────────────────────────

/// The current phase of a streaming session.
///
/// ```text
///  Connecting ──► Handshaking ──► Streaming
///       │               │              │
///       └───────────────┴──────────────┴──► Closed
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Socket established (or being established); nothing exchanged yet.
    #[default]
    Connecting,

    /// Exchanging the session handshake.
    Handshaking,

    /// Handshake complete; frames are flowing.
    Streaming {
        /// When the session entered the `Streaming` state.
        since: Instant,
    },

    /// Terminal. A new session needs a new connection.
    Closed,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Streaming { .. } => write!(f, "Streaming"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl SessionPhase {
    /// Returns `true` once frames may be sent or received.
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }

    /// Returns `true` in the terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// How long the session has been streaming.
    ///
    /// Returns `None` for any other phase.
    pub fn streaming_duration(&self) -> Option<Duration> {
        match self {
            Self::Streaming { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Handshaking`.
    ///
    /// Valid from: `Connecting`.
    pub fn begin_handshake(&mut self) -> Result<(), LumenError> {
        match self {
            Self::Connecting => {
                *self = Self::Handshaking;
                Ok(())
            }
            _ => Err(LumenError::ProtocolViolation(
                "cannot handshake: not in Connecting state",
            )),
        }
    }

    /// Transition to `Streaming`.
    ///
    /// Valid from: `Handshaking`.
    pub fn start_streaming(&mut self) -> Result<(), LumenError> {
        match self {
            Self::Handshaking => {
                *self = Self::Streaming {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(LumenError::ProtocolViolation(
                "cannot stream: not in Handshaking state",
            )),
        }
    }

    /// Transition to `Closed` from any state. Idempotent.
    pub fn close(&mut self) {
        *self = Self::Closed;
    }
}

// ── Tests ────────────────────────────────────────────────────────
