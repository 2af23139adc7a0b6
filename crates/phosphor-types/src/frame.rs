//! Raster geometry and the RGB8 output frame.
//!
//! Every raster in the engine (per-worker work buffers and the output
//! frame) shares one [`FrameSize`], taken from the sensor geometry before
//! streaming starts. Pixels carry three 8-bit channels:
//!
//! | channel | meaning                      |
//! |---------|------------------------------|
//! | 0       | "on" polarity intensity      |
//! | 1       | "off" polarity intensity     |
//! | 2       | unused, kept for RGB layout  |

use std::collections::TryReserveError;
use std::slice::{ChunksExact, ChunksExactMut};

use serde::{Deserialize, Serialize};

/// Number of 8-bit channels per pixel.
pub const CHANNELS: usize = 3;

/// Largest width or height addressable by 16-bit event coordinates.
pub const MAX_DIMENSION: u32 = 65_536;

/// One pixel as `[on, off, aux]`.
pub type Pixel = [u8; CHANNELS];

/// Width and height of a raster, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
}

impl FrameSize {
    /// Create a new geometry.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Return `true` if either dimension is zero.
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Return `true` if both dimensions are in `1..=MAX_DIMENSION`, i.e. every
    /// pixel can be addressed by an event.
    pub const fn is_addressable(self) -> bool {
        !self.is_empty() && self.width <= MAX_DIMENSION && self.height <= MAX_DIMENSION
    }

    /// Total number of pixels (saturating).
    pub fn pixel_count(self) -> usize {
        usize::try_from(u64::from(self.width).saturating_mul(u64::from(self.height)))
            .unwrap_or(usize::MAX)
    }

    /// Total number of bytes for an RGB8 raster of this size.
    pub fn byte_len(self) -> usize {
        self.pixel_count().saturating_mul(CHANNELS)
    }

    /// Return `true` if `(x, y)` lies inside `[0, width) x [0, height)`.
    pub fn contains(self, x: u16, y: u16) -> bool {
        u32::from(x) < self.width && u32::from(y) < self.height
    }

    /// Row-major pixel index of `(x, y)`, or `None` if out of bounds.
    pub fn index(self, x: u16, y: u16) -> Option<usize> {
        if !self.contains(x, y) {
            return None;
        }
        let width = usize::try_from(self.width).ok()?;
        usize::from(y)
            .checked_mul(width)?
            .checked_add(usize::from(x))
    }
}

/// Pixel counts of a frame split by the dominant channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LitPixels {
    /// Pixels whose "on" channel is brighter than the "off" channel.
    pub on: usize,
    /// Pixels whose "off" channel is brighter than the "on" channel.
    pub off: usize,
}

impl LitPixels {
    /// Total lit pixels.
    pub const fn total(self) -> usize {
        self.on.saturating_add(self.off)
    }
}

/// An RGB8 raster in row-major order.
///
/// The backing storage is allocated once at construction and then only
/// overwritten in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    size: FrameSize,
    data: Vec<u8>,
}

impl Frame {
    /// Allocate a zeroed frame of the given geometry.
    ///
    /// Fails instead of aborting if the allocator cannot provide the
    /// backing storage.
    pub fn try_new(size: FrameSize) -> Result<Self, TryReserveError> {
        let len = size.byte_len();
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, 0);
        Ok(Self { size, data })
    }

    /// Wrap raw RGB8 bytes. Returns `None` if the length does not match the
    /// geometry.
    pub fn from_bytes(size: FrameSize, data: Vec<u8>) -> Option<Self> {
        (data.len() == size.byte_len()).then_some(Self { size, data })
    }

    /// Geometry of the frame.
    pub const fn size(&self) -> FrameSize {
        self.size
    }

    /// Raw pixel bytes, three per pixel.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterate over pixels as 3-byte chunks.
    pub fn pixels(&self) -> ChunksExact<'_, u8> {
        self.data.chunks_exact(CHANNELS)
    }

    /// Iterate mutably over pixels as 3-byte chunks.
    pub fn pixels_mut(&mut self) -> ChunksExactMut<'_, u8> {
        self.data.chunks_exact_mut(CHANNELS)
    }

    /// The pixel at `(x, y)`, or `None` if out of bounds.
    pub fn pixel(&self, x: u16, y: u16) -> Option<Pixel> {
        let start = self.size.index(x, y)?.checked_mul(CHANNELS)?;
        let end = start.checked_add(CHANNELS)?;
        let bytes = self.data.get(start..end)?;
        <Pixel>::try_from(bytes).ok()
    }

    /// Reset every channel to zero.
    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Count pixels by dominant polarity channel.
    pub fn lit_pixels(&self) -> LitPixels {
        self.pixels().fold(LitPixels::default(), |mut acc, px| {
            match px {
                [on, off, ..] if on > off => acc.on = acc.on.saturating_add(1),
                [on, off, ..] if off > on => acc.off = acc.off.saturating_add(1),
                _ => {}
            }
            acc
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn size_contains_and_index() {
        let size = FrameSize::new(4, 3);
        assert_eq!(size.pixel_count(), 12);
        assert_eq!(size.byte_len(), 36);
        assert!(size.contains(3, 2));
        assert!(!size.contains(4, 0));
        assert!(!size.contains(0, 3));
        assert_eq!(size.index(1, 1), Some(5));
        assert_eq!(size.index(4, 1), None);
    }

    #[test]
    fn zero_dimension_is_empty() {
        assert!(FrameSize::new(0, 10).is_empty());
        assert!(FrameSize::new(10, 0).is_empty());
        assert!(!FrameSize::new(1, 1).is_empty());
    }

    #[test]
    fn addressable_geometry_fits_event_coordinates() {
        assert!(FrameSize::new(1, 1).is_addressable());
        assert!(FrameSize::new(MAX_DIMENSION, MAX_DIMENSION).is_addressable());
        assert!(!FrameSize::new(MAX_DIMENSION + 1, 1).is_addressable());
        assert!(!FrameSize::new(1, u32::MAX).is_addressable());
        assert!(!FrameSize::new(0, 4).is_addressable());
    }

    #[test]
    fn oversized_frame_is_an_error_not_a_panic() {
        assert!(Frame::try_new(FrameSize::new(u32::MAX, u32::MAX)).is_err());
    }

    #[test]
    fn new_frame_is_zeroed() {
        let frame = Frame::try_new(FrameSize::new(4, 4)).unwrap();
        assert_eq!(frame.as_bytes().len(), 48);
        assert!(frame.as_bytes().iter().all(|b| *b == 0));
        assert_eq!(frame.pixel(3, 3), Some([0, 0, 0]));
        assert_eq!(frame.pixel(4, 3), None);
    }

    #[test]
    fn from_bytes_checks_length() {
        let size = FrameSize::new(2, 2);
        assert!(Frame::from_bytes(size, vec![0; 12]).is_some());
        assert!(Frame::from_bytes(size, vec![0; 11]).is_none());
    }

    #[test]
    fn pixel_reads_row_major_layout() {
        let size = FrameSize::new(2, 2);
        let mut bytes = vec![0; 12];
        // (1, 1) is pixel index 3 -> bytes 9..12
        bytes.splice(9..12, [7, 8, 9]);
        let frame = Frame::from_bytes(size, bytes).unwrap();
        assert_eq!(frame.pixel(1, 1), Some([7, 8, 9]));
        assert_eq!(frame.pixel(0, 1), Some([0, 0, 0]));
    }

    #[test]
    fn lit_pixels_counts_dominant_channel() {
        let size = FrameSize::new(3, 1);
        let frame = Frame::from_bytes(size, vec![200, 10, 0, 5, 90, 0, 40, 40, 0]).unwrap();
        let lit = frame.lit_pixels();
        assert_eq!(lit, LitPixels { on: 1, off: 1 });
        assert_eq!(lit.total(), 2);
    }

    #[test]
    fn clear_resets_all_bytes() {
        let mut frame = Frame::from_bytes(FrameSize::new(2, 1), vec![255; 6]).unwrap();
        frame.clear();
        assert!(frame.as_bytes().iter().all(|b| *b == 0));
    }
}
