//! Configuration loading and typed config structures for the Phosphor engine.
//!
//! The canonical configuration lives in `phosphor-config.yaml` next to the
//! binary. Every section and field has a default, so an empty file (or no
//! file at all) yields a runnable configuration.
//!
//! A handful of settings can be overridden from the environment without
//! editing the file:
//!
//! | variable | field |
//! |----------|-------|
//! | `PHOSPHOR_THREADS` | `pool.threads` |
//! | `PHOSPHOR_FADE_TIME_MS` | `pool.fade_time_ms` |
//! | `PHOSPHOR_LOG_LEVEL` | `logging.level` |

use std::path::Path;

use phosphor_types::MAX_DIMENSION;
use serde::{Deserialize, Serialize};

use crate::fade::{DEFAULT_FADE_FREQUENCY_HZ, DEFAULT_FADE_TIME_MS, FadeParams};
use crate::pool::MAX_WORKERS;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `phosphor-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool sizing and fade parameters.
    #[serde(default)]
    pub pool: PoolConfig,

    /// Synthetic event source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Optional stale-batch filter.
    #[serde(default)]
    pub freshness: FreshnessConfig,

    /// Headless display loop settings.
    #[serde(default)]
    pub display: DisplayConfig,

    /// Log level and output format.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the YAML is invalid, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// Environment overrides are not applied.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `PHOSPHOR_*` environment variables when set.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from an arbitrary key lookup.
    ///
    /// `lookup` is called with each supported variable name and returns its
    /// value if set.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("PHOSPHOR_THREADS") {
            self.pool.threads = parse_number("pool.threads", &val)?;
        }
        if let Some(val) = lookup("PHOSPHOR_FADE_TIME_MS") {
            self.pool.fade_time_ms = parse_number("pool.fade_time_ms", &val)?;
        }
        if let Some(val) = lookup("PHOSPHOR_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(())
    }

    /// Check every range constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.threads == 0 || self.pool.threads > MAX_WORKERS {
            return Err(invalid("pool.threads", format!("must be in 1..={MAX_WORKERS}")));
        }
        if self.pool.fade_frequency_hz == 0 {
            return Err(invalid("pool.fade_frequency_hz", "must be at least 1"));
        }
        for (field, value) in [
            ("source.width", self.source.width),
            ("source.height", self.source.height),
        ] {
            if value == 0 || value > MAX_DIMENSION {
                return Err(invalid(field, format!("must be in 1..={MAX_DIMENSION}")));
            }
        }
        if self.source.batch_size == 0 {
            return Err(invalid("source.batch_size", "must be at least 1"));
        }
        if self.source.batches_per_second == 0 {
            return Err(invalid("source.batches_per_second", "must be at least 1"));
        }
        if self.freshness.enabled && self.freshness.max_lag_ms == 0 {
            return Err(invalid("freshness.max_lag_ms", "must be non-zero when enabled"));
        }
        if self.display.refresh_hz == 0 {
            return Err(invalid("display.refresh_hz", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(field, format!("`{raw}` is not a valid number: {e}")))
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads (and work buffers).
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Time for a fully lit pixel to fade to black, in milliseconds.
    #[serde(default = "default_fade_time_ms")]
    pub fade_time_ms: u32,

    /// Decay passes per second per worker.
    #[serde(default = "default_fade_frequency_hz")]
    pub fade_frequency_hz: u32,
}

impl PoolConfig {
    /// The fade parameters of this section.
    pub const fn fade_params(&self) -> FadeParams {
        FadeParams {
            fade_time_ms: self.fade_time_ms,
            fade_frequency_hz: self.fade_frequency_hz,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            fade_time_ms: default_fade_time_ms(),
            fade_frequency_hz: default_fade_frequency_hz(),
        }
    }
}

/// Synthetic event source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Sensor width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Sensor height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Seed of the event generator.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Events per delivered batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches delivered per second.
    #[serde(default = "default_batches_per_second")]
    pub batches_per_second: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            seed: default_seed(),
            batch_size: default_batch_size(),
            batches_per_second: default_batches_per_second(),
        }
    }
}

/// Stale-batch filter configuration. Disabled unless `enabled` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Whether stale batches are dropped before reaching the pool.
    #[serde(default)]
    pub enabled: bool,

    /// Maximum age of a batch's newest event, in milliseconds.
    #[serde(default = "default_max_lag_ms")]
    pub max_lag_ms: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_lag_ms: default_max_lag_ms(),
        }
    }
}

/// Headless display loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Frame pulls per second.
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,

    /// Stop after this many seconds (0 = run until interrupted).
    #[serde(default)]
    pub run_seconds: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
            run_seconds: 0,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter (trace, debug, info, warn, error, or a full
    /// `EnvFilter` directive). `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_threads() -> usize {
    4
}

const fn default_fade_time_ms() -> u32 {
    DEFAULT_FADE_TIME_MS
}

const fn default_fade_frequency_hz() -> u32 {
    DEFAULT_FADE_FREQUENCY_HZ
}

const fn default_width() -> u32 {
    1280
}

const fn default_height() -> u32 {
    720
}

const fn default_seed() -> u64 {
    42
}

const fn default_batch_size() -> usize {
    512
}

const fn default_batches_per_second() -> u32 {
    200
}

const fn default_max_lag_ms() -> u64 {
    1_000
}

const fn default_refresh_hz() -> u32 {
    30
}

fn default_log_level() -> String {
    "info".to_owned()
}
