//! The event source boundary.
//!
//! An [`EventSource`] is anything that produces event batches on its own
//! thread(s) and knows the geometry of the sensor behind it: a camera
//! driver, a file replayer, a synthetic generator. The stream hands the
//! source a [`BatchSink`] on start; the source calls
//! [`BatchSink::deliver`] for every batch and stops calling it once
//! [`EventSource::stop`] returns.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use phosphor_core::Submitter;
use phosphor_types::{EventBatch, FrameSize};
use tracing::trace;

use crate::error::SourceError;

/// A producer of event batches.
pub trait EventSource: Send {
    /// Short human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Sensor geometry. Must be available before streaming starts.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the device cannot be queried.
    fn geometry(&self) -> Result<FrameSize, SourceError>;

    /// Begin delivering batches into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::AlreadyStarted`] if the source is running, or
    /// another [`SourceError`] if delivery cannot begin.
    fn start(&mut self, sink: BatchSink) -> Result<(), SourceError>;

    /// Stop delivering batches. After this returns, the sink handed to
    /// [`start`](EventSource::start) is no longer called. Stopping a source
    /// that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the delivery thread could not be shut
    /// down cleanly. The source is considered stopped regardless.
    fn stop(&mut self) -> Result<(), SourceError>;
}

/// What happened to a delivered batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The batch was enqueued for rasterization.
    Queued,
    /// The batch was older than the freshness threshold and dropped.
    Stale,
    /// Nothing is accepting batches (stream stopped).
    Rejected,
}

/// Drops batches whose newest event lags too far behind the wall clock.
///
/// Event timestamps are microseconds since the stream started; a batch is
/// stale when `elapsed_since_start_us - newest_timestamp >= max_lag`. Empty
/// and malformed batches are never considered stale.
#[derive(Debug, Clone)]
pub struct FreshnessFilter {
    max_lag_us: i64,
    origin: Instant,
    dropped: Arc<AtomicU64>,
}

impl FreshnessFilter {
    /// A filter measuring lag against wall-clock time since `origin`.
    pub fn new(max_lag: Duration, origin: Instant) -> Self {
        Self {
            max_lag_us: i64::try_from(max_lag.as_micros()).unwrap_or(i64::MAX),
            origin,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Maximum admitted lag.
    pub fn max_lag(&self) -> Duration {
        Duration::from_micros(u64::try_from(self.max_lag_us).unwrap_or(0))
    }

    /// Return `true` if `batch` is fresh enough at `now`.
    pub fn is_fresh_at(&self, batch: &EventBatch, now: Instant) -> bool {
        let Some(newest) = batch.newest_timestamp() else {
            return true;
        };
        let elapsed_us =
            i64::try_from(now.saturating_duration_since(self.origin).as_micros()).unwrap_or(i64::MAX);
        elapsed_us.saturating_sub(newest) < self.max_lag_us
    }

    /// Check `batch` against the current time, counting it if stale.
    pub fn admit(&self, batch: &EventBatch) -> bool {
        if self.is_fresh_at(batch, Instant::now()) {
            return true;
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        false
    }

    /// Batches dropped so far by this filter and its clones.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Callback target handed to an [`EventSource`].
///
/// Cheap to clone; every clone feeds the same pool.
#[derive(Debug, Clone)]
pub struct BatchSink {
    submitter: Submitter,
    freshness: Option<FreshnessFilter>,
}

impl BatchSink {
    /// A sink feeding `submitter`, optionally filtering stale batches.
    pub const fn new(submitter: Submitter, freshness: Option<FreshnessFilter>) -> Self {
        Self {
            submitter,
            freshness,
        }
    }

    /// Hand one batch to the engine. Never blocks.
    pub fn deliver(&self, batch: EventBatch) -> Delivery {
        if let Some(filter) = &self.freshness
            && !filter.admit(&batch)
        {
            trace!(events = batch.declared_len(), "dropping stale batch");
            return Delivery::Stale;
        }
        match self.submitter.submit(batch) {
            Ok(()) => Delivery::Queued,
            Err(_) => Delivery::Rejected,
        }
    }

    /// Return `true` while the pool behind this sink accepts batches.
    pub fn is_open(&self) -> bool {
        self.submitter.is_running()
    }
}
