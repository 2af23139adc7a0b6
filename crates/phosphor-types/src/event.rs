//! Sensor events and event batches.
//!
//! An [`Event`] is a single timestamped change detected at one pixel of an
//! event-based sensor. Sources deliver events in contiguous runs; an
//! [`EventBatch`] is a read-only view of such a run that can be handed to
//! another thread.
//!
//! # Ownership
//!
//! The event run itself is stored behind an [`Arc`], so the source and the
//! worker that eventually rasterizes the batch share the allocation. The
//! engine never copies individual events and never mutates the run; the
//! batch is dropped (releasing its reference) as soon as it is processed.

use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Binary polarity of a sensor event.
///
/// `On` means the observed brightness increased, `Off` that it decreased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    /// Brightness decreased.
    Off,
    /// Brightness increased.
    On,
}

impl Polarity {
    /// Return `true` for [`Polarity::On`].
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

impl From<bool> for Polarity {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}

/// A single timestamped sensor event.
///
/// Coordinates are pixel positions on the sensor; the timestamp is in
/// microseconds relative to a source-defined origin (usually the start of
/// the stream) and is monotonic within one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// Column of the pixel that fired.
    pub x: u16,
    /// Row of the pixel that fired.
    pub y: u16,
    /// Direction of the brightness change.
    pub polarity: Polarity,
    /// Source timestamp in microseconds.
    pub timestamp: i64,
}

impl Event {
    /// Create a new event.
    pub const fn new(x: u16, y: u16, polarity: Polarity, timestamp: i64) -> Self {
        Self {
            x,
            y,
            polarity,
            timestamp,
        }
    }
}

/// A contiguous run `[begin, end)` of events owned by the source.
///
/// Cloning a batch only bumps the reference count of the underlying run.
/// The boundaries are not validated on construction: a source may hand over
/// a malformed pair (`begin > end`, or `end` past the run), and the consumer
/// is expected to detect it through [`EventBatch::events`] returning `None`.
#[derive(Debug, Clone)]
pub struct EventBatch {
    run: Arc<[Event]>,
    begin: usize,
    end: usize,
}

impl EventBatch {
    /// Wrap an entire run of events as one batch.
    pub fn new(run: impl Into<Arc<[Event]>>) -> Self {
        let run = run.into();
        let end = run.len();
        Self { run, begin: 0, end }
    }

    /// Create a batch over the `[begin, end)` sub-range of a shared run.
    pub const fn from_range(run: Arc<[Event]>, begin: usize, end: usize) -> Self {
        Self { run, begin, end }
    }

    /// Index of the first event of the batch within the run.
    pub const fn begin(&self) -> usize {
        self.begin
    }

    /// Index one past the last event of the batch within the run.
    pub const fn end(&self) -> usize {
        self.end
    }

    /// The boundaries as a range.
    pub const fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    /// The events of the batch, or `None` if the boundaries are malformed.
    pub fn events(&self) -> Option<&[Event]> {
        self.run.get(self.range())
    }

    /// Return `true` if the boundaries describe a valid range of the run.
    pub fn is_well_formed(&self) -> bool {
        self.events().is_some()
    }

    /// Number of events the boundaries claim to span (0 if inverted).
    pub const fn declared_len(&self) -> usize {
        self.end.saturating_sub(self.begin)
    }

    /// Timestamp of the newest (last) event, if the batch is well formed
    /// and non-empty.
    pub fn newest_timestamp(&self) -> Option<i64> {
        self.events()
            .and_then(<[Event]>::last)
            .map(|event| event.timestamp)
    }
}

impl From<Vec<Event>> for EventBatch {
    fn from(events: Vec<Event>) -> Self {
        Self::new(events)
    }
}
