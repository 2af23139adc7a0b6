//! Integration tests for the `phosphor-core` worker pool.
//!
//! These run real worker threads against small frames. Timing-sensitive
//! assertions poll pool statistics with a generous deadline instead of
//! sleeping for fixed amounts, so they stay stable on loaded machines.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use phosphor_core::{FadeParams, PoolError, PoolStats, WorkerPool};
use phosphor_types::{Event, EventBatch, Frame, FrameSize, Polarity};

/// Fade time long enough that no decay pass changes a pixel during a test.
const FROZEN: FadeParams = FadeParams {
    fade_time_ms: u32::MAX,
    fade_frequency_hz: 60,
};

/// Poll `pool.stats()` until `done` holds, failing after five seconds.
fn wait_for(pool: &WorkerPool, done: impl Fn(&PoolStats) -> bool) -> PoolStats {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = pool.stats();
        if done(&stats) {
            return stats;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for pool, last stats: {stats:?}"
        );
        thread::sleep(Duration::from_millis(2));
    }
}

fn on(x: u16, y: u16) -> Event {
    Event::new(x, y, Polarity::On, 0)
}

fn off(x: u16, y: u16) -> Event {
    Event::new(x, y, Polarity::Off, 0)
}

fn lit_coordinates(frame: &Frame) -> Vec<(u16, u16)> {
    let size = frame.size();
    let mut lit = Vec::new();
    for y in 0..size.height as u16 {
        for x in 0..size.width as u16 {
            if frame.pixel(x, y) != Some([0, 0, 0]) {
                lit.push((x, y));
            }
        }
    }
    lit
}

// =============================================================================
// End-to-end
// =============================================================================

#[test]
fn single_event_lights_then_fades_out() {
    // One pass per second so the first pass lands a full fade time after start.
    let fade = FadeParams {
        fade_time_ms: 1_000,
        fade_frequency_hz: 1,
    };
    let mut pool = WorkerPool::new(2, FrameSize::new(4, 4), fade).unwrap();
    pool.submit(EventBatch::new(vec![on(1, 1)])).unwrap();
    wait_for(&pool, |s| s.batches_processed == 1);

    let mut frame = Frame::try_new(FrameSize::new(4, 4)).unwrap();
    pool.merge(&mut frame).unwrap();
    assert_eq!(frame.pixel(1, 1), Some([255, 0, 0]));
    assert_eq!(lit_coordinates(&frame), vec![(1, 1)]);

    // Each worker's first pass covers at least the full fade time.
    wait_for(&pool, |s| s.decay_passes >= 2);
    pool.merge(&mut frame).unwrap();
    assert_eq!(frame.pixel(1, 1), Some([0, 0, 0]));

    let report = pool.shutdown();
    assert_eq!(report.joined, 2);
}

#[test]
fn fading_pixel_never_brightens() {
    let fade = FadeParams {
        fade_time_ms: 300,
        fade_frequency_hz: 100,
    };
    let pool = WorkerPool::new(1, FrameSize::new(2, 2), fade).unwrap();
    pool.submit(EventBatch::new(vec![off(0, 1)])).unwrap();
    wait_for(&pool, |s| s.batches_processed == 1);

    let mut frame = Frame::try_new(FrameSize::new(2, 2)).unwrap();
    let mut previous = u8::MAX;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        pool.merge(&mut frame).unwrap();
        let [on_channel, off_channel, aux] = frame.pixel(0, 1).unwrap();
        assert_eq!(on_channel, 0);
        assert_eq!(aux, 0);
        assert!(off_channel <= previous, "{off_channel} > {previous}");
        previous = off_channel;
        if off_channel == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "pixel never faded out");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn zero_fade_time_clears_on_next_pass() {
    let pool = WorkerPool::new(1, FrameSize::new(2, 2), FROZEN).unwrap();
    pool.submit(EventBatch::new(vec![on(1, 0)])).unwrap();
    let before = wait_for(&pool, |s| s.batches_processed == 1);

    pool.set_fade_time_ms(0).unwrap();
    // A pass already in flight may have read the old fade time.
    wait_for(&pool, |s| s.decay_passes >= before.decay_passes + 2);

    let mut frame = Frame::try_new(FrameSize::new(2, 2)).unwrap();
    pool.merge(&mut frame).unwrap();
    assert_eq!(frame.pixel(1, 0), Some([0, 0, 0]));
}

#[test]
fn flooded_worker_keeps_decaying() {
    let size = FrameSize::new(4, 4);
    let fade = FadeParams {
        fade_time_ms: 60,
        fade_frequency_hz: 100,
    };
    let pool = WorkerPool::new(1, size, fade).unwrap();
    pool.submit(EventBatch::new(vec![on(0, 0)])).unwrap();

    // Far more work than the worker can finish before (0, 0) fades out.
    let flood: Arc<[Event]> = vec![on(3, 3); 4_096].into();
    for _ in 0..100_000 {
        pool.submit(EventBatch::new(Arc::clone(&flood))).unwrap();
    }
    // (0, 0) was queued first, so it is lit from here on until it fades.
    wait_for(&pool, |s| s.batches_processed >= 1);

    let mut frame = Frame::try_new(size).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        pool.merge(&mut frame).unwrap();
        if frame.pixel(0, 0) == Some([0, 0, 0]) {
            break;
        }
        assert!(Instant::now() < deadline, "pixel never faded under load");
        thread::sleep(Duration::from_millis(2));
    }

    let stats = pool.stats();
    assert!(stats.queue_depth > 0, "queue drained before the fade: {stats:?}");
    assert!(stats.decay_passes > 0);
    assert_ne!(frame.pixel(3, 3), Some([0, 0, 0]));
}

#[test]
fn idle_worker_wakes_for_new_work_before_its_decay_deadline() {
    // One pass per second: a missed wake-up would stall a batch for up to 1 s.
    let fade = FadeParams {
        fade_time_ms: u32::MAX,
        fade_frequency_hz: 1,
    };
    let pool = WorkerPool::new(2, FrameSize::new(4, 4), fade).unwrap();

    for round in 1..=40u64 {
        // Let the workers go back to sleep between submissions.
        thread::sleep(Duration::from_millis(3));
        let submitted = Instant::now();
        pool.submit(EventBatch::new(vec![on(1, 2)])).unwrap();
        wait_for(&pool, |s| s.batches_processed == round);
        let latency = submitted.elapsed();
        assert!(
            latency < Duration::from_millis(500),
            "round {round}: batch waited {latency:?}"
        );
    }
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn merge_is_idempotent_without_writes() {
    let pool = WorkerPool::new(3, FrameSize::new(8, 8), FROZEN).unwrap();
    pool.submit(EventBatch::new(vec![on(0, 0), off(7, 7), on(3, 4)]))
        .unwrap();
    wait_for(&pool, |s| s.batches_processed == 1);

    let mut first = Frame::try_new(FrameSize::new(8, 8)).unwrap();
    let mut second = Frame::try_new(FrameSize::new(8, 8)).unwrap();
    pool.merge(&mut first).unwrap();
    pool.merge(&mut second).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.pixel(7, 7), Some([0, 255, 0]));
}

#[test]
fn merge_sums_across_workers_with_saturation() {
    let pool = WorkerPool::new(4, FrameSize::new(2, 2), FROZEN).unwrap();
    // Whichever workers pick these up, the shared pixel is lit in at least
    // one buffer; summing never wraps below full intensity.
    for _ in 0..16 {
        pool.submit(EventBatch::new(vec![on(0, 0)])).unwrap();
    }
    wait_for(&pool, |s| s.batches_processed == 16);

    let mut frame = Frame::try_new(FrameSize::new(2, 2)).unwrap();
    pool.merge(&mut frame).unwrap();
    assert_eq!(frame.pixel(0, 0), Some([255, 0, 0]));
}

#[test]
fn merge_rejects_mismatched_frame() {
    let pool = WorkerPool::new(1, FrameSize::new(4, 4), FROZEN).unwrap();
    let mut frame = Frame::try_new(FrameSize::new(4, 5)).unwrap();
    let err = pool.merge(&mut frame).unwrap_err();
    assert!(matches!(err, PoolError::GeometryMismatch { .. }));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn concurrent_producers_lose_no_events() {
    const PRODUCERS: u16 = 4;
    const BATCHES: u16 = 64;
    const PER_BATCH: u16 = 16;
    const SIDE: u16 = 64;

    let size = FrameSize::new(u32::from(SIDE), u32::from(SIDE));
    let pool = WorkerPool::new(3, size, FROZEN).unwrap();
    let submitter = pool.submitter();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let submitter = submitter.clone();
            thread::spawn(move || {
                for b in 0..BATCHES {
                    let base = (p * BATCHES + b) * PER_BATCH;
                    let run: Arc<[Event]> = (0..PER_BATCH)
                        .map(|i| {
                            let n = base + i;
                            on(n % SIDE, n / SIDE)
                        })
                        .collect::<Vec<_>>()
                        .into();
                    submitter.submit(EventBatch::new(run)).unwrap();
                }
            })
        })
        .collect();
    for handle in producers {
        handle.join().unwrap();
    }

    let total = u64::from(PRODUCERS * BATCHES);
    let stats = wait_for(&pool, |s| s.batches_processed == total);
    assert_eq!(stats.events_rasterized, u64::from(PRODUCERS * BATCHES * PER_BATCH));
    assert_eq!(stats.events_discarded, 0);

    let mut frame = Frame::try_new(size).unwrap();
    pool.merge(&mut frame).unwrap();
    assert!(frame.pixels().all(|px| px == [255, 0, 0]));
}

// =============================================================================
// Bad input
// =============================================================================

#[test]
fn out_of_range_events_are_counted_and_dropped() {
    let pool = WorkerPool::new(2, FrameSize::new(4, 4), FROZEN).unwrap();
    pool.submit(EventBatch::new(vec![on(4, 0), off(0, 4), on(2, 2)]))
        .unwrap();
    let stats = wait_for(&pool, |s| s.batches_processed == 1);
    assert_eq!(stats.events_rasterized, 1);
    assert_eq!(stats.events_discarded, 2);

    let mut frame = Frame::try_new(FrameSize::new(4, 4)).unwrap();
    pool.merge(&mut frame).unwrap();
    assert_eq!(lit_coordinates(&frame), vec![(2, 2)]);
}

#[test]
fn malformed_batch_does_not_stop_workers() {
    let pool = WorkerPool::new(1, FrameSize::new(4, 4), FROZEN).unwrap();
    let run: Arc<[Event]> = vec![on(0, 0), on(1, 1)].into();
    pool.submit(EventBatch::from_range(Arc::clone(&run), 2, 1))
        .unwrap();
    pool.submit(EventBatch::from_range(Arc::clone(&run), 0, 9))
        .unwrap();
    pool.submit(EventBatch::from_range(run, 1, 2)).unwrap();

    let stats = wait_for(&pool, |s| s.batches_processed == 1);
    assert_eq!(stats.malformed_batches, 2);

    let mut frame = Frame::try_new(FrameSize::new(4, 4)).unwrap();
    pool.merge(&mut frame).unwrap();
    assert_eq!(lit_coordinates(&frame), vec![(1, 1)]);
}

// =============================================================================
// Configuration surface
// =============================================================================

#[test]
fn fade_settings_round_trip_while_running() {
    let pool = WorkerPool::new(2, FrameSize::new(4, 4), FadeParams::default()).unwrap();
    assert_eq!(pool.fade_time_ms().unwrap(), 1_000);
    assert_eq!(pool.fade_frequency_hz().unwrap(), 60);

    pool.set_fade_time_ms(250).unwrap();
    pool.set_fade_frequency_hz(30).unwrap();
    assert_eq!(
        pool.fade_params().unwrap(),
        FadeParams {
            fade_time_ms: 250,
            fade_frequency_hz: 30,
        }
    );

    let err = pool.set_fade_frequency_hz(0).unwrap_err();
    assert!(matches!(err, PoolError::InvalidFadeFrequency { hz: 0 }));
    assert_eq!(pool.fade_frequency_hz().unwrap(), 30);
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn shutdown_joins_workers_and_releases_buffers() {
    let mut pool = WorkerPool::new(3, FrameSize::new(4, 4), FROZEN).unwrap();
    assert_eq!(pool.thread_count(), 3);
    let submitter = pool.submitter();

    let report = pool.shutdown();
    assert_eq!(report.joined, 3);
    assert_eq!(report.join_failures, 0);
    assert!(!pool.is_running());

    let mut frame = Frame::try_new(FrameSize::new(4, 4)).unwrap();
    assert!(matches!(pool.merge(&mut frame), Err(PoolError::NotRunning)));
    assert!(matches!(pool.fade_time_ms(), Err(PoolError::NotRunning)));
    assert!(matches!(pool.set_fade_time_ms(5), Err(PoolError::NotRunning)));
    assert!(matches!(
        pool.set_fade_frequency_hz(5),
        Err(PoolError::NotRunning)
    ));

    assert!(!submitter.is_running());
    let err = submitter.submit(EventBatch::new(vec![on(0, 0)])).unwrap_err();
    assert!(matches!(err, PoolError::NotRunning));
    assert_eq!(pool.stats().rejected_batches, 1);
}

#[test]
fn dropping_a_running_pool_joins_its_workers() {
    let pool = WorkerPool::new(2, FrameSize::new(4, 4), FROZEN).unwrap();
    let submitter = pool.submitter();
    pool.submit(EventBatch::new(vec![on(0, 0)])).unwrap();
    drop(pool);
    assert!(!submitter.is_running());
}
