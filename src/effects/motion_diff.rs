use image::{GrayImage, Luma};

use crate::{
    error::{EffectError, Result},
    video::types::Frame,
};

/// Absolute luma difference above which a pixel counts as moving
pub const MOTION_THRESHOLD: u8 = 25;

/// Binary silhouette from two luma images of equal size
///
/// Unchanged pixels are white and moving pixels black; `invert` swaps the two.
pub fn silhouette_from_luma(current: &GrayImage, previous: &GrayImage, invert: bool) -> GrayImage {
    let mut out = GrayImage::new(current.width(), current.height());
    for ((dst, a), b) in out.pixels_mut().zip(current.pixels()).zip(previous.pixels()) {
        let moving = a[0].abs_diff(b[0]) > MOTION_THRESHOLD;
        *dst = Luma([if moving != invert { 0 } else { 255 }]);
    }
    out
}

/// Silhouette for output position `index`
///
/// Fails with `MissingFrame` when either frame is absent, which is always the
/// case for the first frame of a sequence.
pub fn motion_silhouette(
    index: usize,
    current: Option<&Frame>,
    previous: Option<&Frame>,
    invert: bool,
) -> Result<Frame> {
    let (current, previous) = match (current, previous) {
        (Some(c), Some(p)) => (c, p),
        _ => return Err(EffectError::MissingFrame { index }.into()),
    };
    if current.dimensions() != previous.dimensions() {
        return Err(EffectError::DimensionMismatch {
            expected: previous.dimensions(),
            actual: current.dimensions(),
        }
        .into());
    }
    let mask = silhouette_from_luma(&current.to_luma(), &previous.to_luma(), invert);
    Ok(Frame::from_gray(&mask))
}

/// Frame-differencing stage; needs each frame together with its predecessor
pub struct MotionDiffOperator {
    invert: bool,
}

impl MotionDiffOperator {
    pub fn new(invert: bool) -> Self {
        Self { invert }
    }

    pub fn name(&self) -> &str {
        "motionDiff"
    }

    /// Silhouette for output position `index` given precomputed luma pairs
    pub fn apply_luma(&self, index: usize, current: Option<&GrayImage>, previous: Option<&GrayImage>) -> Result<Frame> {
        match (current, previous) {
            (Some(c), Some(p)) if c.dimensions() == p.dimensions() => {
                Ok(Frame::from_gray(&silhouette_from_luma(c, p, self.invert)))
            }
            (Some(c), Some(p)) => Err(EffectError::DimensionMismatch {
                expected: p.dimensions(),
                actual: c.dimensions(),
            }
            .into()),
            _ => Err(EffectError::MissingFrame { index }.into()),
        }
    }

    pub fn apply_pair(&self, index: usize, current: Option<&Frame>, previous: Option<&Frame>) -> Result<Frame> {
        motion_silhouette(index, current, previous, self.invert)
    }
}
