//! Magnitude spectrum readback for level displays

use std::f32::consts::PI;

use realfft::RealFftPlanner;

use crate::engine::dsp::spectral::{bin_frequency, linear_to_decibels};
use crate::engine::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectrumBin {
    pub index: usize,
    pub frequency: f64,
    /// Single-sided amplitude, normalized so a full-scale sine reads 1.0
    pub magnitude: f32,
    pub decibels: f64,
}

/// Hann-windowed magnitude spectrum of a mono block.
///
/// Returns `samples.len() / 2 + 1` bins from DC to Nyquist.
pub fn magnitude_spectrum(samples: &[f32], sample_rate: u32) -> EngineResult<Vec<SpectrumBin>> {
    let n = samples.len();
    if n < 2 || sample_rate == 0 {
        return Err(EngineError::InvalidParameter(format!(
            "spectrum needs at least 2 samples and a positive rate (got {} samples at {} Hz)",
            n, sample_rate
        )));
    }

    let mut planner = RealFftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let mut input = fft.make_input_vec();
    let mut output = fft.make_output_vec();

    let mut window_sum = 0.0f32;
    for (i, (dst, &s)) in input.iter_mut().zip(samples).enumerate() {
        let w = 0.5 - 0.5 * (2.0 * PI * i as f32 / n as f32).cos();
        window_sum += w;
        *dst = s * w;
    }

    fft.process(&mut input, &mut output)
        .map_err(|e| EngineError::InvalidParameter(e.to_string()))?;

    let scale = 2.0 / window_sum;
    Ok(output
        .iter()
        .enumerate()
        .map(|(index, c)| {
            let magnitude = c.norm() * scale;
            SpectrumBin {
                index,
                frequency: bin_frequency(index, sample_rate, n),
                magnitude,
                decibels: linear_to_decibels(magnitude as f64),
            }
        })
        .collect())
}

/// Loudest bin, ignoring DC.
pub fn peak_bin(bins: &[SpectrumBin]) -> Option<&SpectrumBin> {
    bins.iter()
        .skip(1)
        .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn finds_a_pure_tone() {
        let samples = sine(1000.0, 48000, 4800, 1.0);
        let bins = magnitude_spectrum(&samples, 48000).unwrap();
        assert_eq!(bins.len(), 2401);

        let peak = peak_bin(&bins).unwrap();
        assert_eq!(peak.index, 100);
        assert!((peak.frequency - 1000.0).abs() < 1e-9);
        assert!(peak.decibels.abs() < 0.1);
    }

    #[test]
    fn half_scale_tone_reads_minus_six() {
        let samples = sine(500.0, 48000, 4800, 0.5);
        let bins = magnitude_spectrum(&samples, 48000).unwrap();
        assert!((bins[50].decibels + 6.02).abs() < 0.1);
    }

    #[test]
    fn rejects_tiny_blocks() {
        assert!(magnitude_spectrum(&[0.0], 48000).is_err());
        assert!(magnitude_spectrum(&[0.0, 0.0], 0).is_err());
    }
}
