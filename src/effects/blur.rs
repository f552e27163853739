//! Separable Gaussian blur with reflected borders.

use image::GrayImage;

use crate::{
    effects::traits::FrameOperator,
    error::Result,
    video::types::Frame,
};

/// Mirror an out-of-range coordinate back into `[0, n)` without repeating the edge
pub(crate) fn reflect_101(i: i64, n: i64) -> i64 {
    if n <= 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let i = i.rem_euclid(period);
    if i >= n {
        period - i
    } else {
        i
    }
}

/// Normalised 1-D Gaussian weights for an odd `ksize`
///
/// Sigma follows the usual size-derived rule `0.3 * ((k - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(ksize: u32) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    if ksize == 1 {
        return vec![1.0];
    }

    let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let radius = (ksize / 2) as i32;
    let denom = 2.0 * sigma * sigma;

    let weights: Vec<f64> = (-radius..=radius)
        .map(|i| (-(i as f64 * i as f64) / denom).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Blur interleaved 8-bit samples with `channels` values per pixel
fn blur_interleaved(src: &[u8], width: u32, height: u32, channels: usize, ksize: u32) -> Vec<u8> {
    let kernel = gaussian_kernel(ksize);
    if kernel.len() == 1 {
        return src.to_vec();
    }

    let radius = (kernel.len() / 2) as i64;
    let (w, h) = (width as i64, height as i64);
    let stride = width as usize * channels;
    let mut tmp = vec![0f32; src.len()];
    let mut out = vec![0u8; src.len()];

    for y in 0..height as usize {
        let row = &src[y * stride..(y + 1) * stride];
        for x in 0..w {
            for c in 0..channels {
                let mut acc = 0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sx = reflect_101(x + k as i64 - radius, w) as usize;
                    acc += row[sx * channels + c] as f32 * weight;
                }
                tmp[y * stride + x as usize * channels + c] = acc;
            }
        }
    }

    for y in 0..h {
        for x in 0..width as usize {
            for c in 0..channels {
                let mut acc = 0f32;
                for (k, weight) in kernel.iter().enumerate() {
                    let sy = reflect_101(y + k as i64 - radius, h) as usize;
                    acc += tmp[sy * stride + x * channels + c] * weight;
                }
                out[y as usize * stride + x * channels + c] = acc.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

/// Gaussian blur of a colour frame with an odd square kernel
pub fn gaussian_blur(frame: &Frame, ksize: u32) -> Frame {
    let (width, height) = frame.dimensions();
    let data = blur_interleaved(frame.as_rgb_bytes(), width, height, 3, ksize);
    // Same length as the source buffer
    Frame::from_rgb_bytes(width, height, data).unwrap_or_else(|| frame.clone())
}

/// Gaussian blur of a single-channel image
pub fn gaussian_blur_gray(image: &GrayImage, ksize: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let data = blur_interleaved(image.as_raw(), width, height, 1, ksize);
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| image.clone())
}

/// Standalone blur stage
pub struct BlurOperator {
    strength: u32,
}

impl BlurOperator {
    pub fn new(strength: u32) -> Self {
        Self {
            strength: strength.max(1) | 1,
        }
    }
}

impl FrameOperator for BlurOperator {
    fn name(&self) -> &str {
        "blur"
    }

    fn apply(&self, _index: usize, frame: &Frame) -> Result<Frame> {
        Ok(gaussian_blur(frame, self.strength))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_101() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(3, 5), 3);
        assert_eq!(reflect_101(-7, 1), 0);
    }

    #[test]
    fn test_kernel_is_normalised_and_symmetric() {
        let kernel = gaussian_kernel(21);
        assert_eq!(kernel.len(), 21);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_eq!(kernel[0], kernel[20]);
        assert!(kernel[10] > kernel[9]);
    }

    #[test]
    fn test_even_kernel_rounds_up() {
        assert_eq!(gaussian_kernel(4).len(), 5);
        assert_eq!(gaussian_kernel(0), vec![1.0]);
    }

    #[test]
    fn test_blur_preserves_flat_frame() {
        let frame = Frame::new_filled(16, 9, [10, 128, 250]);
        assert_eq!(gaussian_blur(&frame, 7), frame);
    }

    #[test]
    fn test_blur_spreads_an_impulse() {
        let mut frame = Frame::new_black(9, 9);
        frame.set_pixel(4, 4, [255, 255, 255]);
        let blurred = gaussian_blur(&frame, 5);
        assert!(blurred.get_pixel(4, 4)[0] < 255);
        assert!(blurred.get_pixel(5, 4)[0] > 0);
        assert_eq!(blurred.dimensions(), (9, 9));
    }

    #[test]
    fn test_blur_operator_keeps_dimensions() {
        let frame = Frame::new_filled(7, 3, [1, 2, 3]);
        let out = BlurOperator::new(3).apply(0, &frame).unwrap();
        assert_eq!(out.dimensions(), (7, 3));
    }
}
