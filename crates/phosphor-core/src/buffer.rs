//! Per-worker work buffers: rasterization and decay.
//!
//! Each worker owns exactly one [`WorkBuffer`]. Writes go through the
//! worker's [`BufferWriter`], which is not `Clone` and is moved into the
//! worker thread at pool construction, so no two threads can ever write the
//! same buffer. Readers (the merger) hold plain `Arc<WorkBuffer>` handles.
//!
//! # Pixel storage
//!
//! A pixel is one `AtomicU32` packing `[on, off, aux, 0]` in little-endian
//! byte order. All accesses are `Relaxed`: the single writer never needs to
//! synchronize with itself, and a concurrent merge is allowed to observe a
//! buffer halfway through a batch or a decay pass. What it can never
//! observe is a torn pixel, because every pixel is a single atomic word.

use std::collections::TryReserveError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use phosphor_types::{Event, Frame, FrameSize, Pixel};

/// Channel intensity written for the polarity that fired.
const LIT: u8 = u8::MAX;

/// Pack `[on, off, aux]` into one atomic word.
const fn pack(px: Pixel) -> u32 {
    let [on, off, aux] = px;
    u32::from_le_bytes([on, off, aux, 0])
}

/// Unpack an atomic word into `[on, off, aux]`.
const fn unpack(word: u32) -> Pixel {
    let [on, off, aux, _] = word.to_le_bytes();
    [on, off, aux]
}

/// Result of rasterizing one run of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RasterOutcome {
    /// Events written into the buffer.
    pub written: usize,
    /// Events dropped because their coordinates were outside the frame.
    pub discarded: usize,
}

/// A worker-private raster, readable from any thread.
#[derive(Debug)]
pub struct WorkBuffer {
    size: FrameSize,
    pixels: Box<[AtomicU32]>,
}

impl WorkBuffer {
    fn zeroed(size: FrameSize) -> Result<Self, TryReserveError> {
        let count = size.pixel_count();
        let mut pixels = Vec::new();
        pixels.try_reserve_exact(count)?;
        pixels.extend((0..count).map(|_| AtomicU32::new(0)));
        Ok(Self {
            size,
            pixels: pixels.into_boxed_slice(),
        })
    }

    /// Geometry of the buffer.
    pub const fn size(&self) -> FrameSize {
        self.size
    }

    /// Current value of the pixel at `(x, y)`, or `None` if out of bounds.
    pub fn pixel(&self, x: u16, y: u16) -> Option<Pixel> {
        let idx = self.size.index(x, y)?;
        self.pixels
            .get(idx)
            .map(|word| unpack(word.load(Ordering::Relaxed)))
    }

    /// Overwrite `frame` with the contents of this buffer.
    ///
    /// The caller guarantees matching geometry.
    pub(crate) fn copy_into(&self, frame: &mut Frame) {
        for (dst, word) in frame.pixels_mut().zip(self.pixels.iter()) {
            dst.copy_from_slice(&unpack(word.load(Ordering::Relaxed)));
        }
    }

    /// Saturating-add this buffer onto `frame`, channel by channel.
    ///
    /// The caller guarantees matching geometry.
    pub(crate) fn add_into(&self, frame: &mut Frame) {
        for (dst, word) in frame.pixels_mut().zip(self.pixels.iter()) {
            let src = unpack(word.load(Ordering::Relaxed));
            for (d, s) in dst.iter_mut().zip(src) {
                *d = d.saturating_add(s);
            }
        }
    }
}

/// Exclusive write handle to one [`WorkBuffer`].
#[derive(Debug)]
pub struct BufferWriter {
    buffer: Arc<WorkBuffer>,
}

impl BufferWriter {
    /// Allocate a zero-initialized buffer of the given geometry.
    ///
    /// Fails instead of aborting if the pixel storage cannot be reserved.
    pub fn new(size: FrameSize) -> Result<Self, TryReserveError> {
        Ok(Self {
            buffer: Arc::new(WorkBuffer::zeroed(size)?),
        })
    }

    /// A shared read handle to the buffer.
    pub fn share(&self) -> Arc<WorkBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Read access to the buffer through the writer.
    pub fn buffer(&self) -> &WorkBuffer {
        &self.buffer
    }

    /// Write every event of `events` into the buffer.
    ///
    /// The polarity that fired is set to full intensity and the other one
    /// to zero; the auxiliary channel keeps its previous value. Later
    /// events at the same coordinate overwrite earlier ones. Events outside
    /// the frame are counted in [`RasterOutcome::discarded`] and skipped.
    pub fn rasterize(&mut self, events: &[Event]) -> RasterOutcome {
        let size = self.buffer.size;
        let mut outcome = RasterOutcome::default();

        for event in events {
            let Some(word) = size
                .index(event.x, event.y)
                .and_then(|idx| self.buffer.pixels.get(idx))
            else {
                outcome.discarded = outcome.discarded.saturating_add(1);
                continue;
            };

            let [_, _, aux] = unpack(word.load(Ordering::Relaxed));
            let px = if event.polarity.is_on() {
                [LIT, 0, aux]
            } else {
                [0, LIT, aux]
            };
            word.store(pack(px), Ordering::Relaxed);
            outcome.written = outcome.written.saturating_add(1);
        }

        outcome
    }

    /// Subtract `amount` from every channel of every pixel, saturating at
    /// zero.
    pub fn decay(&mut self, amount: u8) {
        if amount == 0 {
            return;
        }
        for word in self.buffer.pixels.iter() {
            let current = word.load(Ordering::Relaxed);
            if current == 0 {
                continue;
            }
            let faded = unpack(current).map(|channel| channel.saturating_sub(amount));
            word.store(pack(faded), Ordering::Relaxed);
        }
    }
}
