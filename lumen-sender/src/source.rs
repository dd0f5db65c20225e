//! Synthetic capture source.
//!
//! Platform screen capture plugs in through [`FrameSource`]; the test
//! pattern lets the sender run end to end without it.

use bytes::{BufMut, Bytes, BytesMut};
use lumen_core::{FrameSource, LumenError, PixelFormat, StreamConfig};

/// Horizontal gradient that scrolls one column per frame.
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u32,
    height: u32,
    format: PixelFormat,
    tick: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            tick: 0,
        }
    }

    pub fn for_config(config: &StreamConfig) -> Self {
        Self::new(config.width, config.height, config.pixel_format)
    }

    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    fn render(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.frame_len());
        let w = self.width.max(1);
        for y in 0..self.height {
            for x in 0..self.width {
                let shade = ((x.wrapping_add(self.tick) % w) * 255 / w) as u8;
                let band = ((y * 4 / self.height.max(1)) * 64) as u8;
                match self.format {
                    PixelFormat::Rgb24 => buf.put_slice(&[shade, band, 255 - shade]),
                    PixelFormat::Bgra32 => buf.put_slice(&[255 - shade, band, shade, 0xFF]),
                }
            }
        }
        buf.freeze()
    }
}

impl FrameSource for TestPattern {
    fn produce_frame(&mut self) -> Result<Bytes, LumenError> {
        let frame = self.render();
        self.tick = self.tick.wrapping_add(1);
        Ok(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_session_size() {
        let mut rgb = TestPattern::new(8, 4, PixelFormat::Rgb24);
        assert_eq!(rgb.produce_frame().unwrap().len(), 8 * 4 * 3);

        let mut bgra = TestPattern::new(8, 4, PixelFormat::Bgra32);
        let frame = bgra.produce_frame().unwrap();
        assert_eq!(frame.len(), 8 * 4 * 4);
        assert_eq!(frame[3], 0xFF);
    }

    #[test]
    fn pattern_moves() {
        let mut p = TestPattern::new(16, 2, PixelFormat::Rgb24);
        let a = p.produce_frame().unwrap();
        let b = p.produce_frame().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn matches_stream_config() {
        let config = StreamConfig {
            width: 64,
            height: 32,
            ..StreamConfig::default()
        };
        let p = TestPattern::for_config(&config);
        assert_eq!(p.frame_len(), config.frame_len().unwrap());
    }
}
