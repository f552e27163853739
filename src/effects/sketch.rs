use image::{GrayImage, Luma};

use crate::{
    effects::{blur::gaussian_blur_gray, traits::FrameOperator},
    error::Result,
    video::types::Frame,
};

/// Blur kernel applied to the inverted luma
pub const SKETCH_KERNEL: u32 = 21;

/// Colour-dodge blend of the luma over its blurred negative
///
/// `out = clamp(L * 256 / (255 - blur(255 - L)), 0, 255)`, with the divisor kept
/// at one or above.
pub fn dodge_sketch(luma: &GrayImage, ksize: u32) -> GrayImage {
    let mut inverted = luma.clone();
    for pixel in inverted.pixels_mut() {
        *pixel = Luma([255 - pixel[0]]);
    }
    let blurred = gaussian_blur_gray(&inverted, ksize);

    let mut out = GrayImage::new(luma.width(), luma.height());
    for ((dst, l), b) in out.pixels_mut().zip(luma.pixels()).zip(blurred.pixels()) {
        let divisor = (255 - b[0] as u32).max(1);
        let value = (l[0] as u32 * 256 + divisor / 2) / divisor;
        *dst = Luma([value.min(255) as u8]);
    }
    out
}

/// Pencil-sketch stage
pub struct SketchOperator {
    ksize: u32,
}

impl SketchOperator {
    pub fn new() -> Self {
        Self { ksize: SKETCH_KERNEL }
    }
}

impl Default for SketchOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameOperator for SketchOperator {
    fn name(&self) -> &str {
        "sketch"
    }

    fn apply(&self, _index: usize, frame: &Frame) -> Result<Frame> {
        Ok(Frame::from_gray(&dodge_sketch(&frame.to_luma(), self.ksize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_regions_go_white() {
        let frame = Frame::new_filled(30, 30, [90, 90, 90]);
        let out = SketchOperator::new().apply(0, &frame).unwrap();
        assert!(out.as_rgb_bytes().iter().all(|&v| v == 255));
    }

    #[test]
    fn test_black_stays_black() {
        let frame = Frame::new_black(25, 25);
        let out = SketchOperator::new().apply(0, &frame).unwrap();
        assert!(out.as_rgb_bytes().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_edges_are_darker_than_flat_areas() {
        // Dark square on a light background
        let frame = Frame::from_fn(41, 41, |x, y| {
            if (15..26).contains(&x) && (15..26).contains(&y) {
                [40, 40, 40]
            } else {
                [200, 200, 200]
            }
        });
        let out = SketchOperator::new().apply(0, &frame).unwrap();
        let edge = out.get_pixel(15, 20)[0];
        let background = out.get_pixel(2, 2)[0];
        assert!(edge < background, "edge {} background {}", edge, background);
        assert_eq!(out.dimensions(), (41, 41));
    }
}
