//! Headless engine binary for Phosphor.
//!
//! Wires a synthetic event source into a camera stream and runs a display
//! loop that pulls the merged frame at a fixed refresh rate. There is no
//! window: each pulled frame is summarized by its lit-pixel counts, and the
//! stream statistics are logged once per second.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `phosphor-config.yaml` (or the path given as
//!    the first argument), falling back to defaults
//! 2. Initialize structured logging (tracing)
//! 3. Build the synthetic source and open the stream
//! 4. Start the worker pool with the configured fade settings
//! 5. Run the display loop until `display.run_seconds` elapse or Ctrl-C is
//!    pressed (only Ctrl-C ends it if `run_seconds` is 0)
//! 6. Stop the stream and log the final statistics as JSON

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use phosphor_core::config::{DisplayConfig, EngineConfig, LogFormat, LoggingConfig};
use phosphor_stream::{CameraStream, EventSource, SyntheticConfig, SyntheticSource};
use phosphor_types::{Frame, FrameSize};
use tracing::{info, trace, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, resolved against the working directory.
const DEFAULT_CONFIG_PATH: &str = "phosphor-config.yaml";

/// Interval between two status lines.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the stream fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let (config, from_file) = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("phosphor-engine starting");
    if from_file {
        info!(path = %config_path.display(), "configuration loaded");
    } else {
        info!(path = %config_path.display(), "config file not found, using defaults");
    }

    // 3. Build the source and open the stream.
    let source = SyntheticSource::new(SyntheticConfig {
        size: FrameSize::new(config.source.width, config.source.height),
        seed: config.source.seed,
        batch_size: config.source.batch_size,
        batches_per_second: config.source.batches_per_second,
    });
    let max_lag = config
        .freshness
        .enabled
        .then(|| Duration::from_millis(config.freshness.max_lag_ms));
    let mut stream = CameraStream::new(source)
        .map_err(EngineError::from)?
        .with_fade(config.pool.fade_params())
        .with_freshness(max_lag);

    // 4. Start the pool.
    stream.start(config.pool.threads).map_err(EngineError::from)?;
    let fade = stream.fade_params().map_err(EngineError::from)?;
    info!(
        threads = config.pool.threads,
        fade_time_ms = fade.fade_time_ms,
        fade_frequency_hz = fade.fade_frequency_hz,
        "stream running"
    );

    // 5. Display loop.
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    if let Err(e) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        warn!(error = %e, "failed to install Ctrl-C handler, only a bounded run will report");
    }
    let loop_result = run_display_loop(&mut stream, &config.display, &interrupted);

    // 6. Stop and report, even if the loop failed.
    let report = stream.stop().map_err(EngineError::from)?;
    if !report.source_stopped {
        warn!("event source did not stop cleanly");
    }
    let stats_json = serde_json::to_string(&report.stats).map_err(EngineError::from)?;
    info!(
        joined = report.pool.joined,
        join_failures = report.pool.join_failures,
        dropped_batches = report.pool.dropped_batches,
        stats = %stats_json,
        "phosphor-engine stopped"
    );

    loop_result?;
    Ok(())
}

/// Load configuration from `path`, or defaults (plus environment overrides)
/// if the file does not exist. The flag reports whether the file was read.
fn load_config(path: &std::path::Path) -> Result<(EngineConfig, bool), EngineError> {
    if path.exists() {
        return Ok((EngineConfig::from_file(path)?, true));
    }
    let mut config = EngineConfig::default();
    config.apply_env_overrides()?;
    config.validate()?;
    Ok((config, false))
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Pull frames at `display.refresh_hz` until `display.run_seconds` elapse
/// or `interrupted` is raised.
fn run_display_loop<S: EventSource>(
    stream: &mut CameraStream<S>,
    display: &DisplayConfig,
    interrupted: &AtomicBool,
) -> Result<(), EngineError> {
    let frame_interval = Duration::from_secs(1)
        .checked_div(display.refresh_hz.max(1))
        .unwrap_or(STATUS_INTERVAL);
    let started = Instant::now();
    let stop_at = (display.run_seconds > 0)
        .then(|| started.checked_add(Duration::from_secs(display.run_seconds)))
        .flatten();

    let mut next_frame = started;
    let mut next_status = started.checked_add(STATUS_INTERVAL).unwrap_or(started);
    let mut frames = 0u64;

    loop {
        if interrupted.load(Ordering::Relaxed) {
            info!("interrupted, stopping");
            break;
        }
        let now = Instant::now();
        if stop_at.is_some_and(|deadline| now >= deadline) {
            break;
        }

        let lit = stream.with_frame(Frame::lit_pixels)?;
        frames = frames.saturating_add(1);
        trace!(frame = frames, on = lit.on, off = lit.off, "frame pulled");

        if now >= next_status {
            let stats = stream.stats()?;
            info!(
                frames,
                lit_on = lit.on,
                lit_off = lit.off,
                queue_depth = stats.pool.queue_depth,
                batches = stats.pool.batches_processed,
                events = stats.pool.events_rasterized,
                stale = stats.stale_batches,
                "engine status"
            );
            next_status = next_status.checked_add(STATUS_INTERVAL).unwrap_or(now);
        }

        next_frame = next_frame.checked_add(frame_interval).unwrap_or(now);
        let now = Instant::now();
        if next_frame > now {
            thread::sleep(next_frame.saturating_duration_since(now));
        } else {
            // Running behind; skip ahead instead of pulling in a burst.
            next_frame = now;
        }
    }

    info!(frames, "display loop finished");
    Ok(())
}
