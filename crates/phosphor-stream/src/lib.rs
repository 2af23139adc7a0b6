//! Camera-stream facade and event sources for the Phosphor engine.
//!
//! A [`CameraStream`] couples one [`EventSource`] to a worker pool and
//! exposes the capability set a display layer needs: start, stop, pull
//! the current frame, query geometry, and adjust the fade.
//!
//! # Modules
//!
//! - [`error`] -- [`SourceError`], [`InitError`], and [`StreamError`].
//! - [`push`] -- [`PushSource`] for drivers that own their callback thread.
//! - [`source`] -- The [`EventSource`] trait, [`BatchSink`], and the
//!   optional [`FreshnessFilter`].
//! - [`stream`] -- The [`CameraStream`] facade.
//! - [`synthetic`] -- A seeded random [`SyntheticSource`].

pub mod error;
pub mod push;
pub mod source;
pub mod stream;
pub mod synthetic;

pub use error::{InitError, SourceError, StreamError};
pub use push::{PushHandle, PushSource};
pub use source::{BatchSink, Delivery, EventSource, FreshnessFilter};
pub use stream::{CameraStream, StopReport, StreamState, StreamStats};
pub use synthetic::{SyntheticConfig, SyntheticSource};
