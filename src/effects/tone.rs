use image::{GrayImage, Luma};

use crate::{
    effects::{spec::ToneTheme, traits::FrameOperator},
    error::Result,
    video::types::Frame,
};

/// Linear stretch presets: `out = in * scale + offset`
const BRIGHT_STRETCH: (f32, f32) = (1.3, 40.0);
const DARK_STRETCH: (f32, f32) = (1.2, -60.0);

fn stretch(value: u8, (scale, offset): (f32, f32)) -> u8 {
    (value as f32 * scale + offset).round().clamp(0.0, 255.0) as u8
}

/// Remap a luma image with one of the named themes
pub fn remap_luma(luma: &GrayImage, theme: ToneTheme) -> GrayImage {
    let map = |v: u8| match theme {
        ToneTheme::Normal => v,
        ToneTheme::Inverted => 255 - v,
        ToneTheme::Bright => stretch(v, BRIGHT_STRETCH),
        ToneTheme::Dark => stretch(v, DARK_STRETCH),
    };
    // 256-entry lookup table, applied per pixel
    let lut: Vec<u8> = (0..=255u8).map(map).collect();

    let mut out = luma.clone();
    for pixel in out.pixels_mut() {
        *pixel = Luma([lut[pixel[0] as usize]]);
    }
    out
}

/// Grayscale theme stage, re-expanded to three channels
pub struct ToneOperator {
    theme: ToneTheme,
}

impl ToneOperator {
    pub fn new(theme: ToneTheme) -> Self {
        Self { theme }
    }
}

impl FrameOperator for ToneOperator {
    fn name(&self) -> &str {
        "tone"
    }

    fn apply(&self, _index: usize, frame: &Frame) -> Result<Frame> {
        Ok(Frame::from_gray(&remap_luma(&frame.to_luma(), self.theme)))
    }
}
