//! Butterworth band-pass with forward-backward (zero-phase) application.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

/// Longest odd-extension pad added to each end before filtering
const MAX_PAD: usize = 15;

/// Upper cut is kept below Nyquist by this fraction of the sample rate
const MAX_HIGH_CUT_RATIO: f64 = 0.45;

/// Second-order section, normalised so that `a0 == 1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    /// Butterworth low-pass at `cutoff` Hz
    pub fn low_pass(cutoff: f64, sample_rate: f64) -> Self {
        let (cos, alpha) = Self::prewarp(cutoff, sample_rate);
        let b = [(1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0];
        Self::normalised(b, cos, alpha)
    }

    /// Butterworth high-pass at `cutoff` Hz
    pub fn high_pass(cutoff: f64, sample_rate: f64) -> Self {
        let (cos, alpha) = Self::prewarp(cutoff, sample_rate);
        let b = [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0];
        Self::normalised(b, cos, alpha)
    }

    fn prewarp(cutoff: f64, sample_rate: f64) -> (f64, f64) {
        let w0 = 2.0 * PI * cutoff / sample_rate;
        (w0.cos(), w0.sin() / (2.0 * FRAC_1_SQRT_2))
    }

    fn normalised(b: [f64; 3], cos: f64, alpha: f64) -> Self {
        let a0 = 1.0 + alpha;
        Self {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [-2.0 * cos / a0, (1.0 - alpha) / a0],
        }
    }

    /// DC gain of the section
    fn dc_gain(&self) -> f64 {
        (self.b[0] + self.b[1] + self.b[2]) / (1.0 + self.a[0] + self.a[1])
    }

    /// Run the section over `input`, starting in steady state for `input[0]`
    fn run(&self, input: &[f64]) -> Vec<f64> {
        let Some(&x0) = input.first() else {
            return Vec::new();
        };
        let g = self.dc_gain();
        let mut z1 = (g - self.b[0]) * x0;
        let mut z2 = (self.b[2] - self.a[1] * g) * x0;

        input
            .iter()
            .map(|&x| {
                let y = self.b[0] * x + z1;
                z1 = self.b[1] * x - self.a[0] * y + z2;
                z2 = self.b[2] * x - self.a[1] * y;
                y
            })
            .collect()
    }
}

/// High-pass at the low cut cascaded with a low-pass at the high cut
#[derive(Debug, Clone, PartialEq)]
pub struct BandPass {
    sections: [Biquad; 2],
}

impl BandPass {
    /// Build a 4th-order band-pass, adjusting the cuts to fit `sample_rate`
    pub fn new(low_cut: f64, high_cut: f64, sample_rate: f64) -> Self {
        let high = high_cut.min(MAX_HIGH_CUT_RATIO * sample_rate);
        let low = if low_cut >= high { 0.1 * high } else { low_cut };
        Self {
            sections: [
                Biquad::high_pass(low, sample_rate),
                Biquad::low_pass(high, sample_rate),
            ],
        }
    }

    fn run(&self, input: &[f64]) -> Vec<f64> {
        self.sections
            .iter()
            .fold(input.to_vec(), |signal, section| section.run(&signal))
    }

    /// Zero-phase filtering: forward pass, then the same filter over the reversed result
    pub fn filtfilt(&self, input: &[f64]) -> Vec<f64> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = MAX_PAD.min(n - 1);
        let padded = odd_extend(input, pad);

        let mut forward = self.run(&padded);
        forward.reverse();
        let mut backward = self.run(&forward);
        backward.reverse();

        backward[pad..pad + n].to_vec()
    }
}

/// Point-reflect `pad` samples about each end
fn odd_extend(input: &[f64], pad: usize) -> Vec<f64> {
    let n = input.len();
    let (first, last) = (input[0], input[n - 1]);
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - input[i]));
    out.extend_from_slice(input);
    out.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_odd_extension() {
        let ext = odd_extend(&[1.0, 2.0, 4.0], 2);
        assert_eq!(ext, vec![-2.0, 0.0, 1.0, 2.0, 4.0, 6.0, 7.0]);
    }

    #[test]
    fn test_passband_sine_has_no_phase_lag() {
        let input = sine(3.0, 30.0, 300);
        let output = BandPass::new(0.5, 15.0, 30.0).filtfilt(&input);
        assert_eq!(output.len(), input.len());
        for i in 50..250 {
            assert!(
                (output[i] - input[i]).abs() < 0.05,
                "sample {}: {} vs {}",
                i,
                output[i],
                input[i]
            );
        }
    }

    #[test]
    fn test_dc_is_removed() {
        let output = BandPass::new(0.5, 15.0, 30.0).filtfilt(&vec![1.0; 120]);
        assert!(output.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_out_of_band_is_attenuated() {
        let input = sine(14.0, 30.0, 300);
        let output = BandPass::new(0.5, 5.0, 30.0).filtfilt(&input);
        let peak = output[50..250].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(peak < 0.2, "peak {}", peak);
    }

    #[test]
    fn test_short_inputs() {
        let filter = BandPass::new(0.5, 15.0, 30.0);
        assert!(filter.filtfilt(&[]).is_empty());
        assert_eq!(filter.filtfilt(&[0.7]).len(), 1);
        assert_eq!(filter.filtfilt(&[0.1, -0.3, 0.2]).len(), 3);
    }
}
