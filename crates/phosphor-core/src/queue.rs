//! Unbounded multi-producer, multi-consumer task queue of event batches.
//!
//! The queue decouples the arrival cadence of the event source from the
//! processing cadence of the worker pool. It is backed by a lock-free
//! [`Injector`], so [`TaskQueue::push`] never blocks the source's callback
//! thread, and any number of workers may [`TaskQueue::try_pop`] concurrently.
//!
//! Batches pushed by one producer are popped in FIFO order. Capacity is
//! unbounded: a source that outruns the workers grows the queue, which is
//! why [`TaskQueue::len`] is exposed as a queue-depth metric.

use crossbeam_deque::{Injector, Steal};
use phosphor_types::EventBatch;

/// Concurrent FIFO of pending event batches.
#[derive(Debug, Default)]
pub struct TaskQueue {
    injector: Injector<EventBatch>,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            injector: Injector::new(),
        }
    }

    /// Enqueue a batch. Never blocks.
    pub fn push(&self, batch: EventBatch) {
        self.injector.push(batch);
    }

    /// Dequeue the oldest batch, or `None` if the queue is empty.
    ///
    /// A steal that races with another consumer is retried; the loop only
    /// spins while some other thread is making progress on the queue.
    pub fn try_pop(&self) -> Option<EventBatch> {
        loop {
            match self.injector.steal() {
                Steal::Success(batch) => return Some(batch),
                Steal::Empty => return None,
                Steal::Retry => {}
            }
        }
    }

    /// Number of batches currently waiting.
    pub fn len(&self) -> usize {
        self.injector.len()
    }

    /// Return `true` if no batches are waiting.
    pub fn is_empty(&self) -> bool {
        self.injector.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use phosphor_types::{Event, Polarity};

    use super::*;

    fn batch_tagged(tag: u16) -> EventBatch {
        EventBatch::new(vec![Event::new(tag, 0, Polarity::On, i64::from(tag))])
    }

    fn tag_of(batch: &EventBatch) -> u16 {
        batch.events().unwrap().first().unwrap().x
    }

    #[test]
    fn empty_queue_pops_nothing() {
        let queue = TaskQueue::new();
        assert!(queue.is_empty());
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn single_producer_order_is_fifo() {
        let queue = TaskQueue::new();
        for tag in 0..10 {
            queue.push(batch_tagged(tag));
        }
        assert_eq!(queue.len(), 10);

        let popped: Vec<u16> = std::iter::from_fn(|| queue.try_pop())
            .map(|b| tag_of(&b))
            .collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let queue = Arc::new(TaskQueue::new());
        let producers: Vec<_> = (0..4u16)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250u16 {
                        queue.push(batch_tagged(p * 1000 + i));
                    }
                })
            })
            .collect();
        for handle in producers {
            handle.join().unwrap();
        }

        let mut tags: Vec<u16> = std::iter::from_fn(|| queue.try_pop())
            .map(|b| tag_of(&b))
            .collect();
        assert_eq!(tags.len(), 1000);
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), 1000);
    }
}
