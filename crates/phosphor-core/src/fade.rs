//! Decay ("fade") parameters and the linear fade clock.
//!
//! # Policy
//!
//! Pixels fade by **linear subtraction**. A decay pass at time `now`
//! subtracts
//!
//! ```text
//! amount = floor((255 * elapsed_us + carry) / fade_time_us)    (clamped to 255)
//! ```
//!
//! from every channel of the worker's buffer, where `elapsed_us` is the
//! wall-clock time since that worker's previous pass. The division
//! remainder is carried into the next pass, so a fast pass cadence with a
//! long fade time still fades at the right rate instead of rounding every
//! step down to zero. A pixel written at 255 and left alone therefore
//! reaches exactly 0 once `fade_time` has elapsed, independent of how
//! often passes run. A fade time of zero clears the buffer on the next
//! pass.
//!
//! The fade frequency only controls the cadence of passes (one pass every
//! `1s / fade_frequency_hz`), and with it how smooth the fade looks.
//!
//! # Sharing
//!
//! [`FadeSettings`] is read by every worker on every loop iteration and
//! written rarely from a control thread. Each field is an independent
//! atomic; a reader may observe a new fade time together with an old fade
//! frequency, which is harmless.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default time for a fully lit pixel to fade to black, in milliseconds.
pub const DEFAULT_FADE_TIME_MS: u32 = 1_000;

/// Default number of decay passes per second.
pub const DEFAULT_FADE_FREQUENCY_HZ: u32 = 60;

/// Full channel intensity as a `u128` for the fade arithmetic.
const FULL_SCALE: u128 = 255;

/// Plain fade parameters, as configured or as observed at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FadeParams {
    /// Time for a fully lit pixel to fade to zero, in milliseconds.
    #[serde(default = "default_fade_time_ms")]
    pub fade_time_ms: u32,
    /// Decay passes per second (must be at least 1).
    #[serde(default = "default_fade_frequency_hz")]
    pub fade_frequency_hz: u32,
}

impl Default for FadeParams {
    fn default() -> Self {
        Self {
            fade_time_ms: DEFAULT_FADE_TIME_MS,
            fade_frequency_hz: DEFAULT_FADE_FREQUENCY_HZ,
        }
    }
}

const fn default_fade_time_ms() -> u32 {
    DEFAULT_FADE_TIME_MS
}

const fn default_fade_frequency_hz() -> u32 {
    DEFAULT_FADE_FREQUENCY_HZ
}

/// Runtime-adjustable fade parameters shared by all workers of a pool.
#[derive(Debug)]
pub struct FadeSettings {
    fade_time_ms: AtomicU32,
    fade_frequency_hz: AtomicU32,
}

impl FadeSettings {
    /// Create settings from initial parameters. A zero frequency is raised
    /// to 1 Hz.
    pub fn new(params: FadeParams) -> Self {
        Self {
            fade_time_ms: AtomicU32::new(params.fade_time_ms),
            fade_frequency_hz: AtomicU32::new(params.fade_frequency_hz.max(1)),
        }
    }

    /// Current fade time in milliseconds.
    pub fn fade_time_ms(&self) -> u32 {
        self.fade_time_ms.load(Ordering::Acquire)
    }

    /// Set the fade time in milliseconds. Returns the previous value.
    pub fn set_fade_time_ms(&self, ms: u32) -> u32 {
        self.fade_time_ms.swap(ms, Ordering::AcqRel)
    }

    /// Current number of decay passes per second.
    pub fn fade_frequency_hz(&self) -> u32 {
        self.fade_frequency_hz.load(Ordering::Acquire)
    }

    /// Set the decay pass frequency.
    ///
    /// Returns the previous frequency on success, or `None` if the value
    /// was rejected (zero).
    pub fn set_fade_frequency_hz(&self, hz: u32) -> Option<u32> {
        if hz == 0 {
            return None;
        }
        Some(self.fade_frequency_hz.swap(hz, Ordering::AcqRel))
    }

    /// Current fade time as a [`Duration`].
    pub fn fade_time(&self) -> Duration {
        Duration::from_millis(u64::from(self.fade_time_ms()))
    }

    /// Time between two decay passes of one worker.
    pub fn pass_interval(&self) -> Duration {
        let hz = self.fade_frequency_hz().max(1);
        Duration::from_secs(1)
            .checked_div(hz)
            .unwrap_or(Duration::from_secs(1))
    }

    /// Snapshot of both parameters.
    pub fn params(&self) -> FadeParams {
        FadeParams {
            fade_time_ms: self.fade_time_ms(),
            fade_frequency_hz: self.fade_frequency_hz(),
        }
    }
}

impl Default for FadeSettings {
    fn default() -> Self {
        Self::new(FadeParams::default())
    }
}

/// Per-worker clock computing how much to subtract on each decay pass.
#[derive(Debug, Clone)]
pub struct LinearFade {
    last_pass: Instant,
    carry: u128,
    span_us: u128,
}

impl LinearFade {
    /// Start the clock at `now` with no accumulated remainder.
    pub const fn new(now: Instant) -> Self {
        Self {
            last_pass: now,
            carry: 0,
            span_us: 0,
        }
    }

    /// Instant at which the next pass becomes due.
    pub fn next_due(&self, interval: Duration) -> Instant {
        self.last_pass.checked_add(interval).unwrap_or(self.last_pass)
    }

    /// Return `true` if a pass is due at `now`.
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        now >= self.next_due(interval)
    }

    /// Advance the clock to `now` and return the per-channel amount to
    /// subtract for the elapsed interval.
    pub fn advance(&mut self, now: Instant, fade_time: Duration) -> u8 {
        let elapsed = now.saturating_duration_since(self.last_pass);
        if now > self.last_pass {
            self.last_pass = now;
        }

        let span_us = fade_time.as_micros();
        if span_us != self.span_us {
            // Remainder was measured against the old fade time.
            self.carry = 0;
            self.span_us = span_us;
        }
        if span_us == 0 {
            return u8::MAX;
        }

        let budget = FULL_SCALE
            .saturating_mul(elapsed.as_micros())
            .saturating_add(self.carry);
        let steps = budget.checked_div(span_us).unwrap_or(FULL_SCALE);
        if steps >= FULL_SCALE {
            self.carry = 0;
            return u8::MAX;
        }
        self.carry = budget.checked_rem(span_us).unwrap_or(0);
        u8::try_from(steps).unwrap_or(u8::MAX)
    }
}
