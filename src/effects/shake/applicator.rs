use image::{Rgb, RgbImage};

use crate::{
    effects::{
        blur::{gaussian_blur, reflect_101},
        shake::motion::MotionSeries,
        traits::FrameOperator,
    },
    error::Result,
    video::types::Frame,
};

/// Hard ceiling on rotation, in degrees
pub const MAX_ANGLE_DEG: f64 = 5.0;

/// Translation is limited to this fraction of the frame size
const MAX_SHIFT_FRACTION: f64 = 0.1;

/// Per-frame displacement, already clamped to the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Displacement {
    pub dx: f64,
    pub dy: f64,
    pub angle: f64,
}

impl Displacement {
    pub const IDENTITY: Displacement = Displacement {
        dx: 0.0,
        dy: 0.0,
        angle: 0.0,
    };

    pub fn magnitude(&self) -> f64 {
        self.dx.hypot(self.dy)
    }

    fn is_identity(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0 && self.angle == 0.0
    }
}

/// Moves each frame by its entry in a precomputed [`MotionSeries`]
pub struct ShakeApplicator {
    series: MotionSeries,
    blur_threshold: f64,
    max_kernel: u32,
}

impl ShakeApplicator {
    pub fn new(series: MotionSeries, blur_threshold: f64, max_kernel: u32) -> Self {
        Self {
            series,
            blur_threshold,
            max_kernel: max_kernel.max(1) | 1,
        }
    }

    pub fn series(&self) -> &MotionSeries {
        &self.series
    }

    /// Clamped motion for frame `index`; identity past the end of the series
    pub fn displacement(&self, index: usize, width: u32, height: u32) -> Displacement {
        let Some((dx, dy, angle)) = self.series.sample(index) else {
            return Displacement::IDENTITY;
        };
        let max_dx = width as f64 * MAX_SHIFT_FRACTION;
        let max_dy = height as f64 * MAX_SHIFT_FRACTION;
        Displacement {
            dx: finite_or_zero(dx).clamp(-max_dx, max_dx),
            dy: finite_or_zero(dy).clamp(-max_dy, max_dy),
            angle: finite_or_zero(angle).clamp(-MAX_ANGLE_DEG, MAX_ANGLE_DEG),
        }
    }

    /// Odd blur kernel for a motion of `magnitude` pixels, `None` below the threshold
    pub fn blur_kernel(&self, magnitude: f64) -> Option<u32> {
        if magnitude <= self.blur_threshold {
            return None;
        }
        let k = 2 * (magnitude / 4.0).ceil() as u32 + 1;
        Some(k.min(self.max_kernel))
    }

    /// Frame resampled through the rotation-plus-translation, with optional motion blur
    pub fn shake_frame(&self, frame: &Frame, motion: Displacement) -> Frame {
        if motion.is_identity() {
            return frame.clone();
        }
        let warped = warp_affine(frame, motion);
        match self.blur_kernel(motion.magnitude()) {
            Some(k) if k > 1 => gaussian_blur(&warped, k),
            _ => warped,
        }
    }
}

impl FrameOperator for ShakeApplicator {
    fn name(&self) -> &str {
        "shake"
    }

    fn apply(&self, index: usize, frame: &Frame) -> Result<Frame> {
        let (width, height) = frame.dimensions();
        Ok(self.shake_frame(frame, self.displacement(index, width, height)))
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Rotate about the centre, then translate; sampled by inverse mapping
fn warp_affine(frame: &Frame, motion: Displacement) -> Frame {
    let (width, height) = frame.dimensions();
    let src = frame.as_image();
    let (cx, cy) = ((width as f64 - 1.0) / 2.0, (height as f64 - 1.0) / 2.0);
    let (sin, cos) = motion.angle.to_radians().sin_cos();

    let out = RgbImage::from_fn(width, height, |x, y| {
        let ux = x as f64 - cx - motion.dx;
        let uy = y as f64 - cy - motion.dy;
        // Inverse rotation back into source space
        let sx = cos * ux + sin * uy + cx;
        let sy = -sin * ux + cos * uy + cy;
        Rgb(bilinear(src, sx, sy))
    });
    Frame::new(out)
}

fn bilinear(src: &RgbImage, sx: f64, sy: f64) -> [u8; 3] {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let (x0, y0) = (sx.floor(), sy.floor());
    let (fx, fy) = (sx - x0, sy - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let at = |x: i64, y: i64| src.get_pixel(reflect_101(x, w) as u32, reflect_101(y, h) as u32).0;
    let (p00, p10) = (at(x0, y0), at(x0 + 1, y0));
    let (p01, p11) = (at(x0, y0 + 1), at(x0 + 1, y0 + 1));

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn series(dx: f64, dy: f64, angle: f64, len: usize) -> MotionSeries {
        MotionSeries {
            horizontal: vec![dx; len],
            vertical: vec![dy; len],
            rotation: vec![angle; len],
        }
    }

    fn gradient(width: u32, height: u32) -> Frame {
        Frame::from_fn(width, height, |x, y| [(x * 9) as u8, (y * 11) as u8, 128])
    }

    #[test]
    fn test_still_series_is_identity() {
        let frame = gradient(20, 12);
        let shake = ShakeApplicator::new(MotionSeries::still(4), 2.0, 15);
        for i in 0..4 {
            assert_eq!(shake.apply(i, &frame).unwrap(), frame);
        }
    }

    #[test]
    fn test_index_past_series_is_identity() {
        let frame = gradient(20, 12);
        let shake = ShakeApplicator::new(series(1.5, 1.0, 2.0, 2), 100.0, 15);
        assert_eq!(shake.displacement(5, 20, 12), Displacement::IDENTITY);
        assert_eq!(shake.apply(5, &frame).unwrap(), frame);
    }

    #[test]
    fn test_integer_shift_moves_content() {
        let frame = gradient(20, 20);
        let shake = ShakeApplicator::new(series(2.0, 0.0, 0.0, 1), 100.0, 15);
        let out = shake.apply(0, &frame).unwrap();
        assert_eq!(out.get_pixel(10, 5), frame.get_pixel(8, 5));
        // Border is reflected, never black
        assert_eq!(out.get_pixel(0, 5), frame.get_pixel(2, 5));
    }

    #[test]
    fn test_blur_kernel_is_odd_and_capped() {
        let shake = ShakeApplicator::new(MotionSeries::still(1), 2.0, 14);
        assert_eq!(shake.blur_kernel(1.5), None);
        assert_eq!(shake.blur_kernel(3.0), Some(3));
        assert_eq!(shake.blur_kernel(9.0), Some(7));
        assert_eq!(shake.blur_kernel(400.0), Some(15));
    }

    #[test]
    fn test_keeps_dimensions() {
        let frame = gradient(31, 17);
        let shake = ShakeApplicator::new(series(40.0, -40.0, 30.0, 1), 2.0, 15);
        assert_eq!(shake.apply(0, &frame).unwrap().dimensions(), (31, 17));
    }

    proptest! {
        #[test]
        fn prop_displacement_is_bounded(
            dx in -1.0e6f64..1.0e6,
            dy in -1.0e6f64..1.0e6,
            angle in -1.0e3f64..1.0e3,
            width in 1u32..4000,
            height in 1u32..4000,
        ) {
            let shake = ShakeApplicator::new(series(dx, dy, angle, 1), 2.0, 15);
            let d = shake.displacement(0, width, height);
            prop_assert!(d.dx.abs() <= width as f64 / 10.0);
            prop_assert!(d.dy.abs() <= height as f64 / 10.0);
            prop_assert!(d.angle.abs() <= MAX_ANGLE_DEG);
        }
    }
}
