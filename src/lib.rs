//! # vidfx
//!
//! Deterministic frame and sequence transforms for decoded video.
//!
//! A pipeline is an ordered list of effects (rotation, speed changes, reverse,
//! tone, sketch, motion silhouette, camera shake and blur) applied to a video
//! decoded by FFmpeg. The result is re-encoded and, when possible, the source
//! audio track is re-attached.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use vidfx::{
//!     config::Config,
//!     effects::{EffectEntry, EffectRegistry},
//!     pipeline::{Pipeline, PipelineEngine},
//!     video::{FfmpegAudioMuxer, FfmpegDecoder, FfmpegEncoder},
//! };
//!
//! # fn main() -> vidfx::Result<()> {
//! let config = Config::default();
//! let registry = EffectRegistry::new();
//! let stages = ["flip:direction=RotateCW90", "speed:mode=down,factor=2"]
//!     .iter()
//!     .map(|s| s.parse())
//!     .collect::<vidfx::Result<Vec<EffectEntry>>>()?;
//! let pipeline = Pipeline::from_entries(&registry, &stages)?;
//!
//! let mut decoder = FfmpegDecoder::new("input.mp4", "ffmpeg", "ffprobe");
//! let mut encoder = FfmpegEncoder::new("ffmpeg", config.video.encode_params());
//! let mut muxer = FfmpegAudioMuxer::new("ffmpeg");
//!
//! let mut engine = PipelineEngine::new(config, pipeline);
//! let report = engine.run(
//!     &mut decoder,
//!     &mut encoder,
//!     Some(&mut muxer),
//!     Path::new("input.mp4"),
//!     Path::new("output.mp4"),
//! )?;
//! println!("{} frames @ {} fps", report.frame_count, report.frame_rate);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`effects`] - Frame and sequence operators and the effect registry
//! - [`pipeline`] - Stage orchestration, progress and cancellation
//! - [`video`] - Frame types and the FFmpeg decode/encode/audio boundary
//! - [`config`] - Configuration management
//!
//! ## Custom Operators
//!
//! Per-frame transforms implement [`FrameOperator`](effects::FrameOperator):
//!
//! ```rust,no_run
//! use vidfx::effects::FrameOperator;
//! use vidfx::video::types::Frame;
//! use vidfx::Result;
//!
//! struct Passthrough;
//!
//! impl FrameOperator for Passthrough {
//!     fn name(&self) -> &str {
//!         "passthrough"
//!     }
//!
//!     fn apply(&self, _index: usize, frame: &Frame) -> Result<Frame> {
//!         Ok(frame.clone())
//!     }
//! }
//! ```

pub mod config;
pub mod effects;
pub mod error;
pub mod pipeline;
pub mod video;

// Re-export commonly used types for convenience
pub use crate::{
    config::Config,
    effects::{EffectRegistry, EffectSpec, FrameOperator},
    error::{Result, VidfxError},
    pipeline::{Pipeline, PipelineEngine, RunReport},
};
