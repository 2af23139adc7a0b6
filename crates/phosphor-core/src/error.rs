//! Error types for the `phosphor-core` crate.
//!
//! Worker-pool operations return [`PoolError`]. Per-event problems
//! (out-of-range coordinates, malformed batch boundaries) are not errors at
//! this level: workers recover from them locally and count them in the pool
//! statistics.

use std::collections::TryReserveError;

use phosphor_types::{FrameSize, MAX_DIMENSION};

use crate::pool::MAX_WORKERS;

/// Errors that can occur when creating or operating a worker pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The requested frame geometry has a zero dimension or one that 16-bit
    /// event coordinates cannot address.
    #[error(
        "invalid frame geometry {width}x{height}: both dimensions must be in 1..={max}",
        max = MAX_DIMENSION
    )]
    InvalidGeometry {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// The thread count is zero or above [`MAX_WORKERS`].
    #[error("invalid thread count {threads}: must be in 1..={max}", max = MAX_WORKERS)]
    InvalidThreadCount {
        /// The rejected thread count.
        threads: usize,
    },

    /// Memory for the work buffers or worker table could not be reserved.
    #[error("failed to allocate {what}: {source}")]
    Allocation {
        /// What was being allocated.
        what: &'static str,
        /// The underlying allocation error.
        source: TryReserveError,
    },

    /// The operating system refused to spawn a worker thread.
    #[error("failed to spawn worker thread {index}: {source}")]
    ThreadSpawn {
        /// Index of the worker that could not be spawned.
        index: usize,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The pool has been shut down.
    #[error("worker pool is not running")]
    NotRunning,

    /// The output frame does not match the pool geometry.
    #[error("output frame is {actual:?}, pool frames are {expected:?}")]
    GeometryMismatch {
        /// Geometry of the pool's work buffers.
        expected: FrameSize,
        /// Geometry of the frame passed in.
        actual: FrameSize,
    },

    /// Fade frequency must be at least 1 Hz.
    #[error("invalid fade frequency {hz} Hz: must be at least 1")]
    InvalidFadeFrequency {
        /// The rejected frequency.
        hz: u32,
    },
}
