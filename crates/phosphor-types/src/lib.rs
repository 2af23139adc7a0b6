//! Shared type definitions for the Phosphor event-to-frame engine.
//!
//! This crate is the single source of truth for the values that cross
//! component boundaries: sensor events delivered by an event source, the
//! batches that carry them into the worker pool, and the raster geometry
//! and output frame handed to the display layer.
//!
//! # Modules
//!
//! - [`event`] -- [`Event`], [`Polarity`], and the shared [`EventBatch`] run
//! - [`frame`] -- [`FrameSize`] geometry and the RGB8 output [`Frame`]

pub mod event;
pub mod frame;

// Re-export all public types at crate root for convenience.
pub use event::{Event, EventBatch, Polarity};
pub use frame::{CHANNELS, Frame, FrameSize, LitPixels, MAX_DIMENSION, Pixel};
