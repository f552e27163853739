//! # Effect Operators
//!
//! Every transform a pipeline can name, plus the registry that parses
//! configuration entries into validated [`EffectSpec`]s.
//!
//! ## Built-in Effects
//!
//! - **flip**: 90° rotations and mirrors
//! - **speed**: frame dropping (up) or repetition (down)
//! - **reverse**: backwards playback
//! - **tone**: grayscale themes
//! - **sketch**: pencil sketch
//! - **motionDiff**: motion silhouette against the previous frame
//! - **shake**: seismic camera shake
//! - **blur**: uniform Gaussian blur
//!
//! ## Usage
//!
//! ```rust,no_run
//! use vidfx::effects::{EffectEntry, EffectRegistry};
//!
//! let registry = EffectRegistry::new();
//! let entry: EffectEntry = "flip:direction=RotateCW90".parse().unwrap();
//! let spec = registry.parse(&entry).unwrap();
//! ```

pub mod blur;
pub mod geometry;
pub mod motion_diff;
pub mod params;
pub mod registry;
pub mod shake;
pub mod sketch;
pub mod spec;
pub mod temporal;
pub mod tone;
pub mod traits;

pub use blur::BlurOperator;
pub use geometry::FlipOperator;
pub use motion_diff::MotionDiffOperator;
pub use params::{EffectEntry, EffectParams, ParamValue};
pub use registry::{EffectDescriptor, EffectRegistry};
pub use sketch::SketchOperator;
pub use spec::{EffectSpec, ExecutionMode, FlipDirection, ShakeScale, SpeedMode, ToneTheme};
pub use tone::ToneOperator;
pub use traits::FrameOperator;
