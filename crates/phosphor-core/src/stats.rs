//! Worker pool statistics.
//!
//! Workers bump [`PoolCounters`] once per batch or decay pass (never per
//! event), so the counters stay off the per-pixel hot path. A
//! [`PoolStats`] snapshot is cheap to take from any thread and serializes
//! to JSON for logging.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::buffer::RasterOutcome;

/// Live counters shared by all workers of one pool.
#[derive(Debug, Default)]
pub struct PoolCounters {
    batches_processed: AtomicU64,
    malformed_batches: AtomicU64,
    events_rasterized: AtomicU64,
    events_discarded: AtomicU64,
    decay_passes: AtomicU64,
    worker_panics: AtomicU64,
    rejected_batches: AtomicU64,
}

fn widen(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

impl PoolCounters {
    /// Record one rasterized batch.
    pub fn record_batch(&self, outcome: RasterOutcome) {
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        self.events_rasterized
            .fetch_add(widen(outcome.written), Ordering::Relaxed);
        if outcome.discarded > 0 {
            self.events_discarded
                .fetch_add(widen(outcome.discarded), Ordering::Relaxed);
        }
    }

    /// Record a batch whose boundaries did not describe a valid run.
    pub fn record_malformed(&self) {
        self.malformed_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one decay pass.
    pub fn record_decay(&self) {
        self.decay_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a panic caught at a worker loop boundary.
    pub fn record_panic(&self) {
        self.worker_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a batch submitted after the pool stopped.
    pub fn record_rejected(&self) {
        self.rejected_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot, attaching the current queue depth.
    pub fn snapshot(&self, queue_depth: usize) -> PoolStats {
        PoolStats {
            batches_processed: self.batches_processed.load(Ordering::Relaxed),
            malformed_batches: self.malformed_batches.load(Ordering::Relaxed),
            events_rasterized: self.events_rasterized.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            decay_passes: self.decay_passes.load(Ordering::Relaxed),
            worker_panics: self.worker_panics.load(Ordering::Relaxed),
            rejected_batches: self.rejected_batches.load(Ordering::Relaxed),
            queue_depth: widen(queue_depth),
        }
    }
}

/// Point-in-time view of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Batches rasterized by any worker.
    pub batches_processed: u64,
    /// Batches dropped because their boundaries were invalid.
    pub malformed_batches: u64,
    /// Events written into a work buffer.
    pub events_rasterized: u64,
    /// Events dropped for out-of-range coordinates.
    pub events_discarded: u64,
    /// Decay passes applied across all workers.
    pub decay_passes: u64,
    /// Panics caught inside worker loops.
    pub worker_panics: u64,
    /// Batches refused because the pool was no longer running.
    pub rejected_batches: u64,
    /// Batches waiting in the task queue when the snapshot was taken.
    pub queue_depth: u64,
}
