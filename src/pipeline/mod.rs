//! # Pipeline Orchestration
//!
//! Runs an ordered list of effect stages over one decoded source, reports
//! progress, and hands the result to the encoder and audio muxer.
//!
//! Stages that work frame by frame (or on adjacent pairs) consume frames
//! directly from the decoder when they come first. Reverse, and every stage
//! after the first, works on the fully materialized output of its predecessor.

pub mod engine;
pub mod progress;

pub use engine::{AudioOutcome, Pipeline, PipelineEngine, RunReport, RunState};
pub use progress::{CancelToken, ProgressCallback, ProgressTracker};
