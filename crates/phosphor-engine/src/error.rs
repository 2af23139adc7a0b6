//! Error types for the engine binary.
//!
//! [`EngineError`] wraps every failure mode of startup and the display
//! loop so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: phosphor_core::config::ConfigError,
    },

    /// The camera stream failed to start, stop, or render.
    #[error("stream error: {source}")]
    Stream {
        /// The underlying stream error.
        #[from]
        source: phosphor_stream::StreamError,
    },

    /// Statistics could not be serialized for the final report.
    #[error("failed to serialize statistics: {source}")]
    Report {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
