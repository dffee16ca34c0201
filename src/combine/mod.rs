//! Composite artifact production
//!
//! The post-session batch step that merges the accumulated histories into
//! one time-aligned video.

pub mod pipeline;

pub use pipeline::{CombineError, CombineReport, Combiner};
