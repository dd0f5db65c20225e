//! Byte-order codec functions for the streaming session.
//!
//! Every big-endian conversion on the TCP stream lives here; the frame
//! codec and the session code call these instead of converting inline.
//!
//! ## Wire format
//!
//! **Handshake** (12 bytes, once, producer → consumer):
//! ```text
//! width:  u32  (4)
//! height: u32  (4)
//! fps:    u32  (4)
//! ```
//!
//! **Frame** (repeated):
//! ```text
//! length: u32  (4)
//! data:   [u8] (length)
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::LumenError;

// ── Length prefix ────────────────────────────────────────────────

/// Size of the frame length prefix on the wire.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Encode a frame length as a big-endian prefix.
pub fn encode_length_prefix(len: u32) -> [u8; LENGTH_PREFIX_SIZE] {
    len.to_be_bytes()
}

/// Decode a big-endian length prefix from the first four bytes of `data`.
pub fn decode_length_prefix(data: &[u8]) -> Result<u32, LumenError> {
    match data {
        [a, b, c, d, ..] => Ok(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => Err(LumenError::Other(format!(
            "length prefix too short: {} < {LENGTH_PREFIX_SIZE}",
            data.len()
        ))),
    }
}

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of the raw buffers carried in frames.
///
/// Not carried on the wire: both ends are configured with the same
/// format and derive the frame size from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    #[default]
    Rgb24,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra32,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Bgra32 => 4,
        }
    }
}

// ── Handshake ────────────────────────────────────────────────────

/// Session metadata sent once by the producer right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Handshake {
    /// Encoded size on the wire.
    pub const SIZE: usize = 12;

    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Serialize to bytes (big-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.width.to_be_bytes());
        buf[4..8].copy_from_slice(&self.height.to_be_bytes());
        buf[8..12].copy_from_slice(&self.fps.to_be_bytes());
        buf
    }

    /// Deserialize from bytes. Does not validate the values.
    pub fn decode(data: &[u8]) -> Result<Self, LumenError> {
        if data.len() < Self::SIZE {
            return Err(LumenError::InvalidHandshake("handshake too short"));
        }
        Ok(Self {
            width: decode_length_prefix(&data[0..4])?,
            height: decode_length_prefix(&data[4..8])?,
            fps: decode_length_prefix(&data[8..12])?,
        })
    }

    /// Size in bytes of one frame at this geometry, or `None` on overflow.
    pub fn frame_len(&self, format: PixelFormat) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(format.bytes_per_pixel())
    }

    /// Reject degenerate values and return the per-frame buffer size.
    pub fn validate(&self, format: PixelFormat, max_frame_len: usize) -> Result<usize, LumenError> {
        if self.width == 0 || self.height == 0 {
            return Err(LumenError::InvalidHandshake("zero width or height"));
        }
        if self.fps == 0 {
            return Err(LumenError::InvalidHandshake("zero frames per second"));
        }
        let len = self
            .frame_len(format)
            .ok_or(LumenError::InvalidHandshake("frame size overflows"))?;
        if len > max_frame_len || len > u32::MAX as usize {
            return Err(LumenError::FrameTooLarge {
                size: len,
                max: max_frame_len.min(u32::MAX as usize),
            });
        }
        Ok(len)
    }

    /// Write the encoded handshake, looping over partial writes.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<(), LumenError>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.encode()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read exactly one handshake, accumulating partial reads.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, LumenError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = [0u8; Self::SIZE];
        match reader.read_exact(&mut buf).await {
            Ok(_) => Self::decode(&buf),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(LumenError::PeerClosed),
            Err(e) => Err(e.into()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_is_big_endian() {
        assert_eq!(encode_length_prefix(921_600), [0x00, 0x0E, 0x10, 0x00]);
        assert_eq!(decode_length_prefix(&[0x00, 0x0E, 0x10, 0x00]).unwrap(), 921_600);
    }

    #[test]
    fn length_prefix_too_short() {
        assert!(decode_length_prefix(&[0, 1, 2]).is_err());
    }

    #[test]
    fn handshake_roundtrip() {
        let hs = Handshake::new(640, 480, 10);
        let encoded = hs.encode();
        assert_eq!(&encoded[0..4], &[0, 0, 0x02, 0x80]);
        assert_eq!(Handshake::decode(&encoded).unwrap(), hs);
    }

    #[test]
    fn handshake_too_short() {
        assert!(Handshake::decode(&[0u8; 11]).is_err());
    }

    #[test]
    fn validate_rejects_degenerate_values() {
        let max = 64 * 1024 * 1024;
        assert!(Handshake::new(0, 480, 10).validate(PixelFormat::Rgb24, max).is_err());
        assert!(Handshake::new(640, 0, 10).validate(PixelFormat::Rgb24, max).is_err());
        assert!(Handshake::new(640, 480, 0).validate(PixelFormat::Rgb24, max).is_err());
        assert_eq!(
            Handshake::new(640, 480, 10).validate(PixelFormat::Rgb24, max).unwrap(),
            640 * 480 * 3
        );
    }

    #[test]
    fn validate_rejects_oversized_frames() {
        let err = Handshake::new(u32::MAX, u32::MAX, 30)
            .validate(PixelFormat::Bgra32, 1024)
            .unwrap_err();
        assert!(matches!(
            err,
            LumenError::InvalidHandshake(_) | LumenError::FrameTooLarge { .. }
        ));

        let err = Handshake::new(1920, 1080, 30)
            .validate(PixelFormat::Bgra32, 1024)
            .unwrap_err();
        assert!(matches!(err, LumenError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn handshake_read_accumulates_partial_reads() {
        let bytes = Handshake::new(1280, 720, 30).encode();
        let mut mock = tokio_test::io::Builder::new()
            .read(&bytes[0..1])
            .read(&bytes[1..4])
            .read(&bytes[4..6])
            .read(&bytes[6..9])
            .read(&bytes[9..12])
            .build();

        let hs = Handshake::read_from(&mut mock).await.unwrap();
        assert_eq!(hs, Handshake::new(1280, 720, 30));
    }

    #[tokio::test]
    async fn handshake_read_reports_early_close() {
        let bytes = Handshake::new(1280, 720, 30).encode();
        let mut mock = tokio_test::io::Builder::new().read(&bytes[0..5]).build();

        let err = Handshake::read_from(&mut mock).await.unwrap_err();
        assert!(matches!(err, LumenError::PeerClosed));
    }

    #[tokio::test]
    async fn handshake_write_survives_partial_writes() {
        let bytes = Handshake::new(640, 480, 10).encode();
        let mut mock = tokio_test::io::Builder::new()
            .write(&bytes[0..3])
            .write(&bytes[3..7])
            .write(&bytes[7..12])
            .build();

        Handshake::new(640, 480, 10).write_to(&mut mock).await.unwrap();
    }
}
