//! The worker pool: N threads, each rasterizing and fading its own buffer.
//!
//! # Worker loop
//!
//! Every worker repeats, until the pool-wide `running` flag is cleared:
//!
//! 1. If its decay deadline has passed, apply one decay pass.
//! 2. Pop one batch from the [`TaskQueue`] and rasterize it.
//! 3. If the queue was empty, sleep on a condition variable until either a
//!    producer signals new work or the next decay deadline arrives.
//!
//! The deadline is checked before every pop, so a worker jammed with
//! batches still decays at most one batch late. A worker registers itself
//! as a sleeper under the idle lock before its final emptiness check, and
//! producers take that lock to signal whenever a sleeper is registered, so
//! a submission never waits for a decay deadline to be noticed.
//!
//! # Merging
//!
//! [`WorkerPool::merge`] copies the first work buffer into the output frame
//! and saturating-adds the rest. It takes no lock and may observe a buffer
//! in the middle of a batch or a decay pass; the result is a slightly
//! blurred composite, never a torn pixel.
//!
//! # Shutdown
//!
//! [`WorkerPool::shutdown`] clears the running flag, wakes every sleeper,
//! joins every worker, and only then releases the work buffers. A worker
//! that cannot be joined is logged and the remaining joins still run.
//! Dropping a pool shuts it down.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use phosphor_types::{EventBatch, Frame, FrameSize};
use tracing::{debug, error, info, warn};

use crate::buffer::{BufferWriter, WorkBuffer};
use crate::error::PoolError;
use crate::fade::{FadeParams, FadeSettings, LinearFade};
use crate::queue::TaskQueue;
use crate::stats::{PoolCounters, PoolStats};

/// Upper bound on the number of workers in one pool.
pub const MAX_WORKERS: usize = 1_024;

/// State shared between the pool handle, its submitters and its workers.
#[derive(Debug)]
struct Shared {
    queue: TaskQueue,
    running: AtomicBool,
    fade: FadeSettings,
    counters: PoolCounters,
    /// Workers that hold or are waiting on `idle`, about to sleep.
    sleepers: AtomicUsize,
    idle: Mutex<()>,
    wake: Condvar,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn submit(&self, batch: EventBatch) -> Result<(), PoolError> {
        if !self.is_running() {
            self.counters.record_rejected();
            return Err(PoolError::NotRunning);
        }
        self.queue.push(batch);
        // Pairs with the SeqCst increment in `sleep_until`: either the worker
        // sees this batch, or this load sees the worker.
        atomic::fence(Ordering::SeqCst);
        if self.sleepers.load(Ordering::SeqCst) > 0 {
            let _guard = self.idle.lock();
            self.wake.notify_one();
        }
        Ok(())
    }

    /// Sleep until `deadline` unless there is work or the pool is stopping.
    fn sleep_until(&self, deadline: Instant) {
        let mut guard = self.idle.lock();
        self.sleepers.fetch_add(1, Ordering::SeqCst);
        if self.is_running() && self.queue.is_empty() {
            let _timed_out = self.wake.wait_until(&mut guard, deadline);
        }
        self.sleepers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Clear the running flag and wake every sleeping worker.
    ///
    /// The flag is cleared before the lock is taken, so a worker either
    /// sees it under the lock or is already waiting when `notify_all` runs.
    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let _guard = self.idle.lock();
        self.wake.notify_all();
    }

    /// Wake every sleeping worker so it re-reads the fade settings.
    fn nudge(&self) {
        let _guard = self.idle.lock();
        self.wake.notify_all();
    }
}

/// Cloneable handle for enqueueing batches from a source callback.
///
/// A submitter keeps the queue alive but not the workers: once the pool
/// shuts down, every submission is rejected with [`PoolError::NotRunning`]
/// and counted.
#[derive(Debug, Clone)]
pub struct Submitter {
    shared: Arc<Shared>,
}

impl Submitter {
    /// Enqueue a batch and wake one idle worker. Never blocks.
    pub fn submit(&self, batch: EventBatch) -> Result<(), PoolError> {
        self.shared.submit(batch)
    }

    /// Return `true` while the pool accepts batches.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }
}

/// Outcome of [`WorkerPool::shutdown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited and were joined cleanly.
    pub joined: usize,
    /// Workers whose thread terminated with a panic.
    pub join_failures: usize,
    /// Batches still queued at shutdown, dropped unprocessed.
    pub dropped_batches: usize,
}

/// A fixed set of worker threads accumulating events into private buffers.
#[derive(Debug)]
pub struct WorkerPool {
    shared: Arc<Shared>,
    size: FrameSize,
    thread_count: usize,
    /// Read handles to every work buffer; `None` once the pool is shut down.
    buffers: Option<Vec<Arc<WorkBuffer>>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Allocate `threads` zero-initialized work buffers of `size` and spawn
    /// one worker per buffer.
    ///
    /// Every buffer is allocated before the first thread starts, so an
    /// allocation failure leaves nothing to clean up. If a thread fails to
    /// spawn, the workers spawned so far are stopped and joined before the
    /// error is returned.
    pub fn new(threads: usize, size: FrameSize, fade: FadeParams) -> Result<Self, PoolError> {
        if !size.is_addressable() {
            return Err(PoolError::InvalidGeometry {
                width: size.width,
                height: size.height,
            });
        }
        if threads == 0 || threads > MAX_WORKERS {
            return Err(PoolError::InvalidThreadCount { threads });
        }
        if fade.fade_frequency_hz == 0 {
            return Err(PoolError::InvalidFadeFrequency { hz: 0 });
        }

        let shared = Arc::new(Shared {
            queue: TaskQueue::new(),
            running: AtomicBool::new(true),
            fade: FadeSettings::new(fade),
            counters: PoolCounters::default(),
            sleepers: AtomicUsize::new(0),
            idle: Mutex::new(()),
            wake: Condvar::new(),
        });

        let writers = allocate_writers(threads, size)?;
        let buffers: Vec<_> = writers.iter().map(BufferWriter::share).collect();
        let mut workers = Vec::new();
        workers
            .try_reserve_exact(threads)
            .map_err(|source| PoolError::Allocation {
                what: "worker table",
                source,
            })?;

        for (index, writer) in writers.into_iter().enumerate() {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("phosphor-worker-{index}"))
                .spawn(move || worker_loop(index, writer, &worker_shared));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    error!(index, error = %source, "failed to spawn worker thread");
                    shared.stop();
                    join_workers(workers);
                    return Err(PoolError::ThreadSpawn { index, source });
                }
            }
        }

        info!(
            threads,
            width = size.width,
            height = size.height,
            fade_time_ms = fade.fade_time_ms,
            fade_frequency_hz = fade.fade_frequency_hz,
            "worker pool started"
        );

        Ok(Self {
            shared,
            size,
            thread_count: threads,
            buffers: Some(buffers),
            workers,
        })
    }

    /// Enqueue a batch for rasterization. Never blocks.
    pub fn submit(&self, batch: EventBatch) -> Result<(), PoolError> {
        self.shared.submit(batch)
    }

    /// A cloneable submission handle for source callbacks.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Write the saturating pixel-wise sum of all work buffers into `output`.
    pub fn merge(&self, output: &mut Frame) -> Result<(), PoolError> {
        let buffers = self.buffers()?;
        if output.size() != self.size {
            return Err(PoolError::GeometryMismatch {
                expected: self.size,
                actual: output.size(),
            });
        }
        merge_buffers(buffers, output);
        Ok(())
    }

    /// Current fade time in milliseconds.
    pub fn fade_time_ms(&self) -> Result<u32, PoolError> {
        self.buffers()?;
        Ok(self.shared.fade.fade_time_ms())
    }

    /// Set the fade time in milliseconds. Zero clears every buffer on the
    /// next decay pass.
    pub fn set_fade_time_ms(&self, ms: u32) -> Result<(), PoolError> {
        self.buffers()?;
        let previous = self.shared.fade.set_fade_time_ms(ms);
        debug!(previous, fade_time_ms = ms, "fade time changed");
        Ok(())
    }

    /// Current number of decay passes per second.
    pub fn fade_frequency_hz(&self) -> Result<u32, PoolError> {
        self.buffers()?;
        Ok(self.shared.fade.fade_frequency_hz())
    }

    /// Set the number of decay passes per second (at least 1).
    ///
    /// Sleeping workers are woken so the new cadence applies immediately.
    pub fn set_fade_frequency_hz(&self, hz: u32) -> Result<(), PoolError> {
        self.buffers()?;
        let previous = self
            .shared
            .fade
            .set_fade_frequency_hz(hz)
            .ok_or(PoolError::InvalidFadeFrequency { hz })?;
        debug!(previous, fade_frequency_hz = hz, "fade frequency changed");
        self.shared.nudge();
        Ok(())
    }

    /// Both fade parameters at once.
    pub fn fade_params(&self) -> Result<FadeParams, PoolError> {
        self.buffers()?;
        Ok(self.shared.fade.params())
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(self.shared.queue.len())
    }

    /// Batches currently waiting in the task queue.
    pub fn queue_depth(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of workers the pool was created with.
    pub const fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Geometry of every work buffer.
    pub const fn size(&self) -> FrameSize {
        self.size
    }

    /// Return `true` until [`shutdown`](Self::shutdown) has run.
    pub const fn is_running(&self) -> bool {
        self.buffers.is_some()
    }

    /// Stop every worker, join it, and release the work buffers.
    ///
    /// Calling this on a pool that is already shut down does nothing and
    /// returns an empty report.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if self.buffers.is_none() {
            return ShutdownReport::default();
        }

        self.shared.stop();
        let (joined, join_failures) = join_workers(std::mem::take(&mut self.workers));

        // Buffers go only after every writer has been joined.
        self.buffers = None;

        let dropped_batches = std::iter::from_fn(|| self.shared.queue.try_pop()).count();
        let report = ShutdownReport {
            joined,
            join_failures,
            dropped_batches,
        };
        info!(joined, join_failures, dropped_batches, "worker pool shut down");
        report
    }

    fn buffers(&self) -> Result<&[Arc<WorkBuffer>], PoolError> {
        self.buffers.as_deref().ok_or(PoolError::NotRunning)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Reserve and zero one work buffer per worker.
fn allocate_writers(threads: usize, size: FrameSize) -> Result<Vec<BufferWriter>, PoolError> {
    let mut writers = Vec::new();
    writers
        .try_reserve_exact(threads)
        .map_err(|source| PoolError::Allocation {
            what: "buffer table",
            source,
        })?;
    for _ in 0..threads {
        let writer = BufferWriter::new(size).map_err(|source| {
            error!(
                width = size.width,
                height = size.height,
                error = %source,
                "failed to allocate work buffer"
            );
            PoolError::Allocation {
                what: "work buffer",
                source,
            }
        })?;
        writers.push(writer);
    }
    Ok(writers)
}

/// Copy the first buffer into `output` and saturating-add the others.
/// With no buffers the output is cleared.
fn merge_buffers(buffers: &[Arc<WorkBuffer>], output: &mut Frame) {
    let Some((first, rest)) = buffers.split_first() else {
        output.clear();
        return;
    };
    first.copy_into(output);
    for buffer in rest {
        buffer.add_into(output);
    }
}

/// Join every handle, returning `(joined, failed)`.
fn join_workers(workers: Vec<JoinHandle<()>>) -> (usize, usize) {
    let mut joined = 0usize;
    let mut failed = 0usize;
    for handle in workers {
        let name = handle.thread().name().unwrap_or("phosphor-worker").to_owned();
        match handle.join() {
            Ok(()) => joined = joined.saturating_add(1),
            Err(_) => {
                failed = failed.saturating_add(1);
                error!(worker = %name, "worker thread terminated with a panic");
            }
        }
    }
    (joined, failed)
}

fn worker_loop(index: usize, mut writer: BufferWriter, shared: &Shared) {
    debug!(worker = index, "worker started");
    let mut clock = LinearFade::new(Instant::now());

    while shared.is_running() {
        let interval = shared.fade.pass_interval();
        let now = Instant::now();
        if clock.is_due(now, interval) {
            let amount = clock.advance(now, shared.fade.fade_time());
            writer.decay(amount);
            shared.counters.record_decay();
        }

        if let Some(batch) = shared.queue.try_pop() {
            rasterize_batch(index, &mut writer, &batch, &shared.counters);
            continue;
        }

        shared.sleep_until(clock.next_due(interval));
    }

    debug!(worker = index, "worker stopped");
}

/// Rasterize one batch, recovering locally from anything that goes wrong.
fn rasterize_batch(
    index: usize,
    writer: &mut BufferWriter,
    batch: &EventBatch,
    counters: &PoolCounters,
) {
    let Some(events) = batch.events() else {
        counters.record_malformed();
        warn!(
            worker = index,
            begin = batch.begin(),
            end = batch.end(),
            "dropping malformed event batch"
        );
        return;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| writer.rasterize(events))) {
        Ok(outcome) => {
            if outcome.discarded > 0 {
                debug!(
                    worker = index,
                    discarded = outcome.discarded,
                    "discarded out-of-range events"
                );
            }
            counters.record_batch(outcome);
        }
        Err(_) => {
            counters.record_panic();
            error!(
                worker = index,
                events = events.len(),
                "panic while rasterizing batch, batch dropped"
            );
        }
    }
}
