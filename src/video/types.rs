use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use std::path::Path;

use crate::error::{EffectError, Result, VideoError};

/// Represents a single video frame
///
/// This is a thin wrapper around an RGB image buffer. Single-channel
/// intermediates (luma, masks) are plain [`GrayImage`]s and are expanded back
/// into a `Frame` by channel replication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    buffer: RgbImage,
}

impl Frame {
    /// Create a new frame from an RGB image buffer
    pub fn new(buffer: RgbImage) -> Self {
        Self { buffer }
    }

    /// Create a new frame with the given dimensions filled with black
    pub fn new_black(width: u32, height: u32) -> Self {
        Self {
            buffer: ImageBuffer::new(width, height),
        }
    }

    /// Create a new frame with the given dimensions filled with the specified color
    pub fn new_filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb(color));
        Self { buffer }
    }

    /// Create a frame by evaluating `f(x, y)` for every pixel
    pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
    where
        F: FnMut(u32, u32) -> [u8; 3],
    {
        let buffer = ImageBuffer::from_fn(width, height, |x, y| Rgb(f(x, y)));
        Self { buffer }
    }

    /// Expand a single-channel image into a frame by replicating the channel
    pub fn from_gray(gray: &GrayImage) -> Self {
        let buffer = ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y)[0];
            Rgb([v, v, v])
        });
        Self { buffer }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Get a pixel at the given coordinates (returns RGB array)
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 3] {
        self.buffer.get_pixel(x, y).0
    }

    /// Set a pixel at the given coordinates
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 3]) {
        self.buffer.put_pixel(x, y, Rgb(color));
    }

    /// Get the underlying image buffer
    pub fn as_image(&self) -> &RgbImage {
        &self.buffer
    }

    /// Single-channel luma using the BT.601 weights in 14-bit fixed point
    pub fn to_luma(&self) -> GrayImage {
        let (width, height) = self.dimensions();
        let mut gray = GrayImage::new(width, height);
        for (src, dst) in self.buffer.pixels().zip(gray.pixels_mut()) {
            let [r, g, b] = src.0;
            let y = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + 8192) >> 14;
            *dst = Luma([y.min(255) as u8]);
        }
        gray
    }

    /// Raw interleaved RGB bytes
    pub fn as_rgb_bytes(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    /// Create a frame from raw RGB bytes
    pub fn from_rgb_bytes(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(|buffer| Self { buffer })
    }
}

/// An ordered list of equally sized frames plus their playback rate
///
/// Every frame in a sequence has identical dimensions. Emptiness is allowed
/// while a sequence is being built, but [`FrameSequence::ensure_non_empty`]
/// is checked before anything is handed to an encoder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSequence {
    frames: Vec<Frame>,
    frame_rate: u32,
}

impl FrameSequence {
    /// Build a sequence, rejecting frames whose dimensions differ from the first
    pub fn new(frames: Vec<Frame>, frame_rate: u32) -> Result<Self> {
        if frame_rate == 0 {
            return Err(EffectError::InvalidRate { rate: 0, factor: 1 }.into());
        }
        if let Some(first) = frames.first() {
            let expected = first.dimensions();
            if let Some(bad) = frames.iter().find(|f| f.dimensions() != expected) {
                return Err(EffectError::DimensionMismatch {
                    expected,
                    actual: bad.dimensions(),
                }
                .into());
            }
        }
        Ok(Self { frames, frame_rate })
    }

    /// Sequence of `count` copies of a solid-colour frame
    pub fn solid(count: usize, frame_rate: u32, width: u32, height: u32, color: [u8; 3]) -> Result<Self> {
        Self::new(vec![Frame::new_filled(width, height, color); count], frame_rate)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Dimensions shared by every frame, `None` for an empty sequence
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(Frame::dimensions)
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.frame_rate as f64
    }

    pub fn ensure_non_empty(&self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(VideoError::EmptySequence.into());
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

/// Video stream metadata reported by a decoder
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub frame_rate: u32,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

impl VideoMetadata {
    pub fn duration(&self) -> f64 {
        if self.frame_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.frame_rate as f64
    }
}

/// Input container extensions accepted by the decoder
pub fn is_supported_input<P: AsRef<Path>>(path: P) -> bool {
    matches!(
        path.as_ref().extension().and_then(|ext| ext.to_str()),
        Some(ext) if matches!(ext.to_lowercase().as_str(), "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v")
    )
}
