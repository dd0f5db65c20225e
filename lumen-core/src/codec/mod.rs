//! Length-prefixed frame codec for `tokio_util::codec` framed I/O.
//!
//! The decoder accumulates partial reads in the framed read buffer and
//! only yields a frame once the prefix and the full payload are present.
//! Sessions are fixed-size: a prefix that differs from the negotiated
//! frame length is a protocol violation, never a resize.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LumenError;
use crate::wire::{LENGTH_PREFIX_SIZE, decode_length_prefix, encode_length_prefix};

/// Upper bound on a single frame (an 8K BGRA frame fits with room to spare).
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Codec for `[u32 big-endian length][payload]` frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Frame size negotiated for the session, if fixed.
    expected_len: Option<usize>,
    max_len: usize,
}

impl FrameCodec {
    /// A codec that accepts any frame up to [`MAX_FRAME_SIZE`].
    pub fn new() -> Self {
        Self {
            expected_len: None,
            max_len: MAX_FRAME_SIZE,
        }
    }

    /// A codec that only accepts frames of exactly `len` bytes.
    pub fn expecting(len: usize) -> Self {
        Self {
            expected_len: Some(len),
            max_len: MAX_FRAME_SIZE.max(len),
        }
    }

    /// Override the maximum accepted frame size.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    /// The fixed frame size this codec enforces, if any.
    pub fn expected_len(&self) -> Option<usize> {
        self.expected_len
    }

    fn check_len(&self, len: usize) -> Result<(), LumenError> {
        if let Some(expected) = self.expected_len {
            if len != expected {
                return Err(LumenError::FrameLengthMismatch {
                    expected,
                    actual: len,
                });
            }
        }
        if len > self.max_len || len > u32::MAX as usize {
            return Err(LumenError::FrameTooLarge {
                size: len,
                max: self.max_len,
            });
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = LumenError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        // Validate as soon as the prefix is in, before buffering the payload.
        let len = decode_length_prefix(&src[..LENGTH_PREFIX_SIZE])? as usize;
        self.check_len(len)?;

        let total = LENGTH_PREFIX_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        Ok(Some(src.split_to(len)))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            // A short trailing frame is discarded, never handed on.
            None => Err(LumenError::PeerClosed),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = LumenError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.check_len(item.len())?;
        dst.reserve(LENGTH_PREFIX_SIZE + item.len());
        dst.put_slice(&encode_length_prefix(item.len() as u32));
        dst.put_slice(&item);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
