//! Error types for the `phosphor-stream` crate.
//!
//! Event sources report [`SourceError`]; the camera-stream facade reports
//! [`StreamError`], which distinguishes lifecycle misuse (calling an
//! operation in the wrong state) from failures of the source or the pool.

use std::collections::TryReserveError;

use phosphor_core::PoolError;
use phosphor_types::MAX_DIMENSION;

/// Errors raised by an event source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The underlying device or driver cannot be reached.
    #[error("event source unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The source reported a geometry with a zero dimension or one larger
    /// than event coordinates can address.
    #[error(
        "event source reported invalid geometry {width}x{height} (limit {max})",
        max = MAX_DIMENSION
    )]
    InvalidGeometry {
        /// Reported width.
        width: u32,
        /// Reported height.
        height: u32,
    },

    /// The source is already delivering batches.
    #[error("event source is already started")]
    AlreadyStarted,

    /// The source's delivery thread could not be spawned.
    #[error("failed to spawn event source thread: {source}")]
    ThreadSpawn {
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The source's delivery thread terminated with a panic.
    #[error("event source thread `{name}` panicked")]
    ThreadPanicked {
        /// Name of the thread.
        name: String,
    },
}

/// Why [`CameraStream::new`](crate::CameraStream::new) failed.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The source could not report a usable geometry.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The output frame could not be allocated.
    #[error("cannot allocate a {width}x{height} output frame: {source}")]
    FrameAllocation {
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
        /// The underlying allocation error.
        source: TryReserveError,
    },
}

/// Errors raised by [`CameraStream`](crate::CameraStream) operations.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The stream could not be set up (source unavailable, bad geometry,
    /// out of memory).
    #[error("stream initialization failed: {source}")]
    Initialization {
        /// What went wrong.
        source: InitError,
    },

    /// `start` was called on a running stream.
    #[error("stream is already running")]
    AlreadyRunning,

    /// The operation needs a running stream.
    #[error("stream is not running")]
    NotRunning,

    /// The stream has been closed.
    #[error("stream is not initialized")]
    NotInitialized,

    /// The event source failed to start or stop.
    #[error("event source error: {source}")]
    Source {
        /// The underlying source error.
        source: SourceError,
    },

    /// The worker pool rejected an operation or failed to start.
    #[error("worker pool error: {source}")]
    Pool {
        /// The underlying pool error.
        #[from]
        source: PoolError,
    },
}
