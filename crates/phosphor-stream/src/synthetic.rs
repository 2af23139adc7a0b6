//! A synthetic event source for demos and tests.
//!
//! [`SyntheticSource`] runs one generator thread that emits batches of
//! uniformly distributed events at a fixed rate. The generator is seeded,
//! so the sequence of coordinates and polarities is reproducible; only the
//! timestamps depend on the wall clock.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use phosphor_types::{Event, EventBatch, FrameSize, Polarity};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::source::{BatchSink, Delivery, EventSource};

/// Settings for a [`SyntheticSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticConfig {
    /// Sensor geometry to emulate.
    pub size: FrameSize,
    /// Generator seed.
    pub seed: u64,
    /// Events per batch.
    pub batch_size: usize,
    /// Batches per second.
    pub batches_per_second: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            size: FrameSize::new(640, 480),
            seed: 42,
            batch_size: 512,
            batches_per_second: 200,
        }
    }
}

/// Stop flag the generator can sleep on.
#[derive(Debug, Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    fn raise(&self) {
        *self.stopped.lock() = true;
        self.wake.notify_all();
    }

    /// Sleep until `deadline` or until stopped. Returns `true` if stopped.
    fn sleep_until(&self, deadline: Instant) -> bool {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.wake.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// Seeded random event generator running on its own thread.
#[derive(Debug)]
pub struct SyntheticSource {
    config: SyntheticConfig,
    running: Option<(Arc<StopSignal>, JoinHandle<u64>)>,
}

impl SyntheticSource {
    /// A stopped source with the given settings.
    pub const fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }
}

impl EventSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn geometry(&self) -> Result<FrameSize, SourceError> {
        let size = self.config.size;
        if !size.is_addressable() {
            return Err(SourceError::InvalidGeometry {
                width: size.width,
                height: size.height,
            });
        }
        Ok(size)
    }

    fn start(&mut self, sink: BatchSink) -> Result<(), SourceError> {
        if self.running.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        let size = self.geometry()?;

        let stop = Arc::new(StopSignal::default());
        let generator = Generator {
            rng: StdRng::seed_from_u64(self.config.seed),
            size,
            batch_size: self.config.batch_size.max(1),
            interval: Duration::from_secs(1)
                .checked_div(self.config.batches_per_second.max(1))
                .unwrap_or(Duration::from_secs(1)),
        };
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("phosphor-synthetic".to_owned())
            .spawn(move || generator.run(&sink, &thread_stop))
            .map_err(|source| SourceError::ThreadSpawn { source })?;

        info!(
            width = size.width,
            height = size.height,
            seed = self.config.seed,
            batch_size = self.config.batch_size,
            batches_per_second = self.config.batches_per_second,
            "synthetic source started"
        );
        self.running = Some((stop, handle));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        let Some((stop, handle)) = self.running.take() else {
            return Ok(());
        };
        stop.raise();
        match handle.join() {
            Ok(batches) => {
                info!(batches, "synthetic source stopped");
                Ok(())
            }
            Err(_) => Err(SourceError::ThreadPanicked {
                name: "phosphor-synthetic".to_owned(),
            }),
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "synthetic source did not stop cleanly");
        }
    }
}

/// State owned by the generator thread.
struct Generator {
    rng: StdRng,
    size: FrameSize,
    batch_size: usize,
    interval: Duration,
}

impl Generator {
    /// Emit batches until stopped. Returns the number of batches queued.
    fn run(mut self, sink: &BatchSink, stop: &StopSignal) -> u64 {
        let origin = Instant::now();
        let mut next = origin;
        let mut queued = 0u64;

        loop {
            let batch = self.batch(origin);
            match sink.deliver(batch) {
                Delivery::Queued => queued = queued.saturating_add(1),
                Delivery::Stale => {}
                Delivery::Rejected => {
                    debug!("sink closed, synthetic generator exiting");
                    break;
                }
            }

            next = next.checked_add(self.interval).unwrap_or(next);
            // Fell behind: resynchronize instead of bursting to catch up.
            let now = Instant::now();
            if next < now {
                next = now;
            }
            if stop.sleep_until(next) {
                break;
            }
        }
        queued
    }

    fn batch(&mut self, origin: Instant) -> EventBatch {
        let timestamp = i64::try_from(origin.elapsed().as_micros()).unwrap_or(i64::MAX);
        let events: Vec<Event> = (0..self.batch_size)
            .map(|_| {
                let x = self.rng.random_range(0..self.size.width);
                let y = self.rng.random_range(0..self.size.height);
                Event::new(
                    u16::try_from(x).unwrap_or(u16::MAX),
                    u16::try_from(y).unwrap_or(u16::MAX),
                    Polarity::from(self.rng.random_bool(0.5)),
                    timestamp,
                )
            })
            .collect();
        EventBatch::new(events)
    }
}
