//! Adapter for event drivers that own their delivery thread.
//!
//! Camera SDKs usually invoke a registered callback from a thread they
//! control. [`PushSource`] is the [`EventSource`] side of that: the stream
//! starts and stops it like any other source, while the driver keeps a
//! cloneable [`PushHandle`] and calls [`PushHandle::deliver`] from its
//! callback. Batches delivered while the stream is stopped are rejected.

use std::sync::Arc;

use parking_lot::RwLock;
use phosphor_types::{Event, EventBatch, FrameSize};
use tracing::debug;

use crate::error::SourceError;
use crate::source::{BatchSink, Delivery, EventSource};

type SinkSlot = Arc<RwLock<Option<BatchSink>>>;

/// An event source fed from outside through [`PushHandle`]s.
#[derive(Debug)]
pub struct PushSource {
    name: String,
    size: FrameSize,
    slot: SinkSlot,
}

impl PushSource {
    /// A source named `name` for a sensor of the given geometry.
    pub fn new(name: impl Into<String>, size: FrameSize) -> Self {
        Self {
            name: name.into(),
            size,
            slot: Arc::new(RwLock::new(None)),
        }
    }

    /// A handle for the driver callback.
    pub fn handle(&self) -> PushHandle {
        PushHandle {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl EventSource for PushSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn geometry(&self) -> Result<FrameSize, SourceError> {
        if !self.size.is_addressable() {
            return Err(SourceError::InvalidGeometry {
                width: self.size.width,
                height: self.size.height,
            });
        }
        Ok(self.size)
    }

    fn start(&mut self, sink: BatchSink) -> Result<(), SourceError> {
        let mut slot = self.slot.write();
        if slot.is_some() {
            return Err(SourceError::AlreadyStarted);
        }
        *slot = Some(sink);
        debug!(source = %self.name, "push source attached");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        if self.slot.write().take().is_some() {
            debug!(source = %self.name, "push source detached");
        }
        Ok(())
    }
}

/// Driver-side handle of a [`PushSource`].
#[derive(Debug, Clone)]
pub struct PushHandle {
    slot: SinkSlot,
}

impl PushHandle {
    /// Hand a batch to the stream. Never blocks on the engine; the slot
    /// lock is only contended while the stream starts or stops.
    pub fn deliver(&self, batch: EventBatch) -> Delivery {
        self.slot
            .read()
            .as_ref()
            .map_or(Delivery::Rejected, |sink| sink.deliver(batch))
    }

    /// Deliver the `[begin, end)` sub-range of a shared event run.
    pub fn deliver_run(&self, run: Arc<[Event]>, begin: usize, end: usize) -> Delivery {
        self.deliver(EventBatch::from_range(run, begin, end))
    }

    /// Return `true` while the stream is started and accepting batches.
    pub fn is_streaming(&self) -> bool {
        self.slot.read().as_ref().is_some_and(BatchSink::is_open)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use phosphor_core::{FadeParams, WorkerPool};
    use phosphor_types::Polarity;

    use super::*;

    #[test]
    fn handle_rejects_until_started() {
        let pool = WorkerPool::new(1, FrameSize::new(4, 4), FadeParams::default()).unwrap();
        let mut source = PushSource::new("driver", FrameSize::new(4, 4));
        let handle = source.handle();
        let batch = EventBatch::new(vec![Event::new(1, 1, Polarity::On, 0)]);

        assert!(!handle.is_streaming());
        assert_eq!(handle.deliver(batch.clone()), Delivery::Rejected);

        source.start(BatchSink::new(pool.submitter(), None)).unwrap();
        assert!(handle.is_streaming());
        assert_eq!(handle.deliver(batch.clone()), Delivery::Queued);

        source.stop().unwrap();
        assert!(!handle.is_streaming());
        assert_eq!(handle.deliver(batch), Delivery::Rejected);
    }

    #[test]
    fn double_start_is_rejected() {
        let pool = WorkerPool::new(1, FrameSize::new(4, 4), FadeParams::default()).unwrap();
        let mut source = PushSource::new("driver", FrameSize::new(4, 4));
        source.start(BatchSink::new(pool.submitter(), None)).unwrap();
        assert!(matches!(
            source.start(BatchSink::new(pool.submitter(), None)),
            Err(SourceError::AlreadyStarted)
        ));
    }

    #[test]
    fn zero_geometry_is_rejected() {
        let source = PushSource::new("driver", FrameSize::new(4, 0));
        assert!(matches!(
            source.geometry(),
            Err(SourceError::InvalidGeometry { width: 4, height: 0 })
        ));
        assert_eq!(source.name(), "driver");
    }
}
