use std::f64::consts::PI;

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::{
    effects::shake::filter::BandPass,
    error::{EffectError, Result},
};

/// Default band-pass edges in Hz
pub const DEFAULT_LOW_CUT_HZ: f64 = 0.5;
pub const DEFAULT_HIGH_CUT_HZ: f64 = 15.0;

/// Translation amplitude per unit of `exp(magnitude)`, in pixels
const TRANSLATION_GAIN: f64 = 0.02;

/// Rotation moves this many times less than translation, in degrees
const ROTATION_DAMPING: f64 = 10.0;

/// Per-frame camera motion for the three shake axes
#[derive(Debug, Clone, PartialEq)]
pub struct MotionSeries {
    /// Horizontal displacement in pixels
    pub horizontal: Vec<f64>,
    /// Vertical displacement in pixels
    pub vertical: Vec<f64>,
    /// Rotation in degrees
    pub rotation: Vec<f64>,
}

impl MotionSeries {
    /// Series that never moves the frame
    pub fn still(len: usize) -> Self {
        Self {
            horizontal: vec![0.0; len],
            vertical: vec![0.0; len],
            rotation: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.horizontal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.horizontal.is_empty()
    }

    /// `(dx, dy, angle)` for `index`, `None` past the end of the series
    pub fn sample(&self, index: usize) -> Option<(f64, f64, f64)> {
        Some((
            *self.horizontal.get(index)?,
            *self.vertical.get(index)?,
            *self.rotation.get(index)?,
        ))
    }
}

/// Seismic-scale magnitude (1-8) for each axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMagnitudes {
    pub horizontal: f64,
    pub vertical: f64,
    pub rotation: f64,
}

impl AxisMagnitudes {
    pub fn uniform(magnitude: f64) -> Self {
        Self {
            horizontal: magnitude,
            vertical: magnitude,
            rotation: magnitude,
        }
    }
}

/// Band-limited noise generator for camera shake
#[derive(Debug, Clone)]
pub struct SeismicMotion {
    pub low_cut_hz: f64,
    pub high_cut_hz: f64,
}

impl Default for SeismicMotion {
    fn default() -> Self {
        Self {
            low_cut_hz: DEFAULT_LOW_CUT_HZ,
            high_cut_hz: DEFAULT_HIGH_CUT_HZ,
        }
    }
}

impl SeismicMotion {
    pub fn new(low_cut_hz: f64, high_cut_hz: f64) -> Self {
        Self {
            low_cut_hz,
            high_cut_hz,
        }
    }

    /// Generate `ceil(duration * frame_rate)` samples per axis
    ///
    /// The output is a pure function of the arguments: one generator seeded
    /// with `seed` draws the horizontal, vertical and rotation noise in that order.
    pub fn generate(
        &self,
        duration: f64,
        frame_rate: u32,
        magnitudes: AxisMagnitudes,
        seed: u64,
    ) -> Result<MotionSeries> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(invalid("duration", duration));
        }
        if frame_rate == 0 {
            return Err(EffectError::InvalidRate { rate: 0, factor: 1 }.into());
        }
        for (axis, m) in [
            ("horizontal", magnitudes.horizontal),
            ("vertical", magnitudes.vertical),
            ("rotation", magnitudes.rotation),
        ] {
            if !m.is_finite() {
                return Err(invalid(axis, m));
            }
        }

        let len = (duration * frame_rate as f64).ceil() as usize;
        let filter = BandPass::new(self.low_cut_hz, self.high_cut_hz, frame_rate as f64);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut axis = |amplitude: f64| {
            let noise = gaussian_noise(&mut rng, len);
            let mut shaped = filter.filtfilt(&noise);
            normalise_rms(&mut shaped);
            for v in shaped.iter_mut() {
                *v *= amplitude;
            }
            shaped
        };

        let horizontal = axis(translation_amplitude(magnitudes.horizontal));
        let vertical = axis(translation_amplitude(magnitudes.vertical));
        let rotation = axis(translation_amplitude(magnitudes.rotation) / ROTATION_DAMPING);

        debug!(
            "Generated {} shake samples at {} fps (seed {})",
            len, frame_rate, seed
        );

        Ok(MotionSeries {
            horizontal,
            vertical,
            rotation,
        })
    }
}

/// Three-axis motion with the default band and one magnitude for every axis
pub fn generate_seismic_motion(
    duration: f64,
    frame_rate: u32,
    magnitude: f64,
    seed: u64,
) -> Result<MotionSeries> {
    SeismicMotion::default().generate(duration, frame_rate, AxisMagnitudes::uniform(magnitude), seed)
}

fn translation_amplitude(magnitude: f64) -> f64 {
    magnitude.exp() * TRANSLATION_GAIN
}

/// Zero-mean, unit-variance samples via the Box-Muller transform
fn gaussian_noise(rng: &mut StdRng, len: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(len + 1);
    while out.len() < len {
        // Open interval keeps ln() finite
        let u1: f64 = 1.0 - rng.gen::<f64>();
        let u2: f64 = rng.gen();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;
        out.push(r * theta.cos());
        out.push(r * theta.sin());
    }
    out.truncate(len);
    out
}

fn normalise_rms(signal: &mut [f64]) {
    if signal.is_empty() {
        return;
    }
    let rms = (signal.iter().map(|v| v * v).sum::<f64>() / signal.len() as f64).sqrt();
    if rms > f64::EPSILON {
        for v in signal.iter_mut() {
            *v /= rms;
        }
    }
}

fn invalid(parameter: &str, value: f64) -> crate::error::VidfxError {
    EffectError::InvalidParameter {
        effect: "shake".to_string(),
        parameter: parameter.to_string(),
        value: value.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_rounds_up() {
        let series = generate_seismic_motion(1.5, 30, 3.0, 7).unwrap();
        assert_eq!(series.len(), 45);
        let series = generate_seismic_motion(0.34, 10, 3.0, 7).unwrap();
        assert_eq!(series.len(), 4);
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let a = generate_seismic_motion(2.0, 24, 5.0, 1234).unwrap();
        let b = generate_seismic_motion(2.0, 24, 5.0, 1234).unwrap();
        assert_eq!(a, b);

        let c = generate_seismic_motion(2.0, 24, 5.0, 1235).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_rotation_is_damped() {
        let series = generate_seismic_motion(4.0, 30, 4.0, 99).unwrap();
        let rms = |v: &[f64]| (v.iter().map(|x| x * x).sum::<f64>() / v.len() as f64).sqrt();
        let expected = 4.0f64.exp() * TRANSLATION_GAIN;
        assert!((rms(&series.horizontal) - expected).abs() < 1e-9);
        assert!((rms(&series.rotation) - expected / ROTATION_DAMPING).abs() < 1e-9);
    }

    #[test]
    fn test_amplitude_grows_with_magnitude() {
        let low = generate_seismic_motion(2.0, 30, 1.0, 5).unwrap();
        let high = generate_seismic_motion(2.0, 30, 6.0, 5).unwrap();
        let peak = |v: &[f64]| v.iter().fold(0.0f64, |m, x| m.max(x.abs()));
        assert!(peak(&high.vertical) > peak(&low.vertical));
    }

    #[test]
    fn test_sample_past_end() {
        let series = MotionSeries::still(3);
        assert_eq!(series.sample(2), Some((0.0, 0.0, 0.0)));
        assert_eq!(series.sample(3), None);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(generate_seismic_motion(f64::NAN, 30, 3.0, 0).is_err());
        assert!(generate_seismic_motion(1.0, 0, 3.0, 0).is_err());
        assert!(generate_seismic_motion(-1.0, 30, 3.0, 0).is_err());
        assert!(generate_seismic_motion(0.0, 30, 3.0, 0).unwrap().is_empty());
    }
}
