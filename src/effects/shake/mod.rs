//! Synthetic camera shake: band-limited motion generation and its per-frame
//! application.

pub mod applicator;
pub mod filter;
pub mod motion;

pub use applicator::{Displacement, ShakeApplicator, MAX_ANGLE_DEG};
pub use filter::BandPass;
pub use motion::{generate_seismic_motion, AxisMagnitudes, MotionSeries, SeismicMotion};
