//! Event-to-frame accumulation engine.
//!
//! A fixed pool of worker threads drains event batches from a shared queue,
//! rasterizes them into worker-private buffers, and fades those buffers
//! over wall-clock time. On demand, the buffers are merged into one output
//! frame by saturating pixel-wise addition.
//!
//! # Modules
//!
//! - [`buffer`] -- Per-worker [`WorkBuffer`] and its exclusive
//!   [`BufferWriter`] (rasterize, decay).
//! - [`config`] -- Configuration loading from `phosphor-config.yaml` into
//!   strongly-typed structs.
//! - [`error`] -- [`PoolError`].
//! - [`fade`] -- Fade parameters, shared [`FadeSettings`], and the
//!   per-worker [`LinearFade`] clock.
//! - [`pool`] -- The [`WorkerPool`], its [`Submitter`] handle, and the
//!   merger.
//! - [`queue`] -- The lock-free [`TaskQueue`] of pending batches.
//! - [`stats`] -- Pool counters and the serializable [`PoolStats`]
//!   snapshot.
//!
//! [`WorkBuffer`]: buffer::WorkBuffer
//! [`BufferWriter`]: buffer::BufferWriter
//! [`PoolError`]: error::PoolError
//! [`FadeSettings`]: fade::FadeSettings
//! [`LinearFade`]: fade::LinearFade
//! [`WorkerPool`]: pool::WorkerPool
//! [`Submitter`]: pool::Submitter
//! [`TaskQueue`]: queue::TaskQueue
//! [`PoolStats`]: stats::PoolStats

pub mod buffer;
pub mod config;
pub mod error;
pub mod fade;
pub mod pool;
pub mod queue;
pub mod stats;

pub use error::PoolError;
pub use fade::FadeParams;
pub use pool::{ShutdownReport, Submitter, WorkerPool};
pub use stats::PoolStats;
