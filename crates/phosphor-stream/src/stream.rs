//! The camera-stream facade.
//!
//! [`CameraStream`] ties one [`EventSource`] to a [`WorkerPool`] and owns
//! the output [`Frame`] the display layer reads. Its lifecycle is
//!
//! ```text
//! new() ──► Initialized ──start()──► Running
//!               ▲   ◄──────stop()──────┘
//!               └──close()──► Closed
//! ```
//!
//! A pool (and its work buffers) exists only while the stream is running;
//! `stop` tears it down and a later `start` builds a fresh one. The output
//! frame is allocated once in [`CameraStream::new`] and only overwritten in
//! place. Fade settings changed while running survive a stop/start cycle.

use std::time::{Duration, Instant};

use phosphor_core::{FadeParams, PoolStats, ShutdownReport, WorkerPool};
use phosphor_types::{Frame, FrameSize};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{InitError, SourceError, StreamError};
use crate::source::{BatchSink, EventSource, FreshnessFilter};

/// Lifecycle state of a [`CameraStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    /// Source opened and frame allocated; not streaming.
    Initialized,
    /// Source delivering batches into a live pool.
    Running,
    /// Closed for good; every operation fails with `NotInitialized`.
    Closed,
}

/// Stream statistics: pool counters plus batches the freshness filter
/// dropped before they reached the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Worker pool counters.
    #[serde(flatten)]
    pub pool: PoolStats,
    /// Batches dropped as stale.
    pub stale_batches: u64,
}

/// Outcome of [`CameraStream::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopReport {
    /// Whether the source stopped without error.
    pub source_stopped: bool,
    /// Worker join results.
    pub pool: ShutdownReport,
    /// Statistics at the moment the pool was shut down.
    pub stats: StreamStats,
}

/// State that exists only while running.
#[derive(Debug)]
struct Live {
    pool: WorkerPool,
    freshness: Option<FreshnessFilter>,
    started_at: Instant,
}

impl Live {
    fn stats(&self) -> StreamStats {
        StreamStats {
            pool: self.pool.stats(),
            stale_batches: self.freshness.as_ref().map_or(0, FreshnessFilter::dropped),
        }
    }
}

/// A live event stream rendered into a decaying frame.
#[derive(Debug)]
pub struct CameraStream<S: EventSource> {
    source: S,
    size: FrameSize,
    frame: Frame,
    fade: FadeParams,
    max_lag: Option<Duration>,
    closed: bool,
    live: Option<Live>,
}

impl<S: EventSource> CameraStream<S> {
    /// Open `source`, query its geometry, and allocate the output frame.
    pub fn new(source: S) -> Result<Self, StreamError> {
        Self::open(source).map_err(|source| StreamError::Initialization { source })
    }

    fn open(source: S) -> Result<Self, InitError> {
        let size = source.geometry()?;
        if !size.is_addressable() {
            return Err(SourceError::InvalidGeometry {
                width: size.width,
                height: size.height,
            }
            .into());
        }
        let frame = Frame::try_new(size).map_err(|source| InitError::FrameAllocation {
            width: size.width,
            height: size.height,
            source,
        })?;
        info!(
            source = source.name(),
            width = size.width,
            height = size.height,
            "stream initialized"
        );
        Ok(Self {
            source,
            size,
            frame,
            fade: FadeParams::default(),
            max_lag: None,
            closed: false,
            live: None,
        })
    }

    /// Fade parameters the pool starts with.
    #[must_use]
    pub const fn with_fade(mut self, fade: FadeParams) -> Self {
        self.fade = fade;
        self
    }

    /// Drop batches whose newest event lags the wall clock by `max_lag`
    /// or more. `None` disables the filter (the default).
    #[must_use]
    pub const fn with_freshness(mut self, max_lag: Option<Duration>) -> Self {
        self.max_lag = max_lag;
        self
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> StreamState {
        if self.closed {
            StreamState::Closed
        } else if self.live.is_some() {
            StreamState::Running
        } else {
            StreamState::Initialized
        }
    }

    /// Return `true` while batches are being accumulated.
    pub const fn is_running(&self) -> bool {
        self.live.is_some()
    }

    /// Return `true` until [`close`](Self::close) has run.
    pub const fn is_initialized(&self) -> bool {
        !self.closed
    }

    /// Sensor (and frame) geometry.
    pub const fn geometry(&self) -> Result<FrameSize, StreamError> {
        if self.closed {
            return Err(StreamError::NotInitialized);
        }
        Ok(self.size)
    }

    /// Build a pool of `threads` workers and start the source.
    ///
    /// If the source fails to start, the pool is shut down again and the
    /// stream stays `Initialized`.
    pub fn start(&mut self, threads: usize) -> Result<(), StreamError> {
        match self.state() {
            StreamState::Closed => return Err(StreamError::NotInitialized),
            StreamState::Running => return Err(StreamError::AlreadyRunning),
            StreamState::Initialized => {}
        }

        let mut pool = WorkerPool::new(threads, self.size, self.fade)?;
        let started_at = Instant::now();
        let freshness = self
            .max_lag
            .map(|max_lag| FreshnessFilter::new(max_lag, started_at));
        let sink = BatchSink::new(pool.submitter(), freshness.clone());

        if let Err(source) = self.source.start(sink) {
            error!(
                source_name = self.source.name(),
                error = %source,
                "event source failed to start"
            );
            pool.shutdown();
            return Err(StreamError::Source { source });
        }

        info!(
            source = self.source.name(),
            threads,
            freshness_ms = self.max_lag.map(|lag| lag.as_millis()),
            "stream started"
        );
        self.live = Some(Live {
            pool,
            freshness,
            started_at,
        });
        Ok(())
    }

    /// Stop the source, then shut the pool down.
    ///
    /// Every step runs even if an earlier one fails; failures are logged
    /// and reflected in the returned [`StopReport`].
    pub fn stop(&mut self) -> Result<StopReport, StreamError> {
        if self.closed {
            return Err(StreamError::NotInitialized);
        }
        let Some(mut live) = self.live.take() else {
            return Err(StreamError::NotRunning);
        };

        let source_stopped = match self.source.stop() {
            Ok(()) => true,
            Err(e) => {
                error!(source = self.source.name(), error = %e, "event source failed to stop");
                false
            }
        };

        if let Ok(fade) = live.pool.fade_params() {
            self.fade = fade;
        }
        let stats = live.stats();
        let pool = live.pool.shutdown();
        if pool.join_failures > 0 {
            warn!(failures = pool.join_failures, "some workers did not join cleanly");
        }

        info!(
            source = self.source.name(),
            uptime_ms = live.started_at.elapsed().as_millis(),
            batches = stats.pool.batches_processed,
            "stream stopped"
        );
        Ok(StopReport {
            source_stopped,
            pool,
            stats,
        })
    }

    /// Stop if running, then close the stream for good.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if self.is_running()
            && let Err(e) = self.stop()
        {
            warn!(error = %e, "stop during close failed");
        }
        self.closed = true;
        debug!(source = self.source.name(), "stream closed");
    }

    /// Merge the work buffers into the output frame and hand it to `f`.
    ///
    /// The frame is a composite of whatever each work buffer held when it
    /// was read; see [`WorkerPool::merge`].
    pub fn with_frame<R>(&mut self, f: impl FnOnce(&Frame) -> R) -> Result<R, StreamError> {
        if self.closed {
            return Err(StreamError::NotInitialized);
        }
        let live = self.live.as_ref().ok_or(StreamError::NotRunning)?;
        live.pool.merge(&mut self.frame)?;
        Ok(f(&self.frame))
    }

    /// Merge and return a copy of the output frame.
    pub fn snapshot(&mut self) -> Result<Frame, StreamError> {
        self.with_frame(Frame::clone)
    }

    /// Current fade time in milliseconds.
    pub fn fade_time_ms(&self) -> Result<u32, StreamError> {
        Ok(self.live()?.pool.fade_time_ms()?)
    }

    /// Set the fade time in milliseconds.
    pub fn set_fade_time_ms(&self, ms: u32) -> Result<(), StreamError> {
        self.live()?.pool.set_fade_time_ms(ms)?;
        Ok(())
    }

    /// Current decay pass frequency in Hz.
    pub fn fade_frequency_hz(&self) -> Result<u32, StreamError> {
        Ok(self.live()?.pool.fade_frequency_hz()?)
    }

    /// Set the decay pass frequency in Hz (at least 1).
    pub fn set_fade_frequency_hz(&self, hz: u32) -> Result<(), StreamError> {
        self.live()?.pool.set_fade_frequency_hz(hz)?;
        Ok(())
    }

    /// Both fade parameters.
    pub fn fade_params(&self) -> Result<FadeParams, StreamError> {
        Ok(self.live()?.pool.fade_params()?)
    }

    /// Snapshot of the stream statistics.
    pub fn stats(&self) -> Result<StreamStats, StreamError> {
        Ok(self.live()?.stats())
    }

    fn live(&self) -> Result<&Live, StreamError> {
        if self.closed {
            return Err(StreamError::NotInitialized);
        }
        self.live.as_ref().ok_or(StreamError::NotRunning)
    }
}

impl<S: EventSource> Drop for CameraStream<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::push::PushSource;

    /// A source whose start always fails.
    #[derive(Debug)]
    struct Broken;

    impl EventSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn geometry(&self) -> Result<FrameSize, SourceError> {
            Ok(FrameSize::new(4, 4))
        }

        fn start(&mut self, _sink: BatchSink) -> Result<(), SourceError> {
            Err(SourceError::Unavailable {
                message: "no device".to_owned(),
            })
        }

        fn stop(&mut self) -> Result<(), SourceError> {
            Ok(())
        }
    }

    #[test]
    fn invalid_geometry_fails_initialization() {
        for size in [
            FrameSize::new(0, 0),
            FrameSize::new(u32::MAX, u32::MAX),
            FrameSize::new(640, 65_537),
        ] {
            let err = CameraStream::new(PushSource::new("cam", size)).unwrap_err();
            assert!(
                matches!(
                    err,
                    StreamError::Initialization {
                        source: InitError::Source(SourceError::InvalidGeometry { .. })
                    }
                ),
                "{size:?}: {err}"
            );
        }
    }

    #[test]
    fn unavailable_source_fails_initialization() {
        /// A source that cannot report its geometry.
        #[derive(Debug)]
        struct Unplugged;

        impl EventSource for Unplugged {
            fn name(&self) -> &str {
                "unplugged"
            }

            fn geometry(&self) -> Result<FrameSize, SourceError> {
                Err(SourceError::Unavailable {
                    message: "device not found".to_owned(),
                })
            }

            fn start(&mut self, _sink: BatchSink) -> Result<(), SourceError> {
                Ok(())
            }

            fn stop(&mut self) -> Result<(), SourceError> {
                Ok(())
            }
        }

        let err = CameraStream::new(Unplugged).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Initialization {
                source: InitError::Source(SourceError::Unavailable { .. })
            }
        ));
    }

    #[test]
    fn failed_source_start_leaves_stream_initialized() {
        let mut stream = CameraStream::new(Broken).unwrap();
        let err = stream.start(2).unwrap_err();
        assert!(matches!(err, StreamError::Source { .. }));
        assert_eq!(stream.state(), StreamState::Initialized);
    }

    #[test]
    fn zero_threads_is_a_pool_error() {
        let mut stream = CameraStream::new(PushSource::new("cam", FrameSize::new(4, 4))).unwrap();
        let err = stream.start(0).unwrap_err();
        assert!(matches!(err, StreamError::Pool { .. }));
        assert!(!stream.is_running());
    }

    #[test]
    fn stats_serialize_flat() {
        let stats = StreamStats {
            stale_batches: 3,
            ..StreamStats::default()
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["stale_batches"], 3);
        assert_eq!(json["batches_processed"], 0);
    }
}
