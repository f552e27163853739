use crate::{error::Result, video::types::Frame};

/// Core trait for per-frame operators
///
/// An operator maps one input frame to one output frame and holds no mutable
/// state, so the engine may call it from several worker threads at once.
pub trait FrameOperator: Send + Sync {
    /// Returns the operator name used in logs and error messages
    fn name(&self) -> &str;

    /// Transform a single frame
    ///
    /// # Arguments
    ///
    /// * `index` - Position of the frame in the stage input. Only operators whose
    ///   output varies over time (the shake applicator) look at it.
    /// * `frame` - The source frame, left untouched
    fn apply(&self, index: usize, frame: &Frame) -> Result<Frame>;

    /// Output size for an input of `(width, height)`
    fn output_dimensions(&self, input: (u32, u32)) -> (u32, u32) {
        input
    }
}
