//! Graphic equalizer: a cascade of peaking biquads, one per band

use crate::engine::config::DEFAULT_Q;
use crate::engine::dsp::biquad::BiquadFilter;
use crate::engine::dsp::spectral::linear_to_decibels;
use crate::engine::error::{EngineError, EngineResult};

pub const GRAPHIC_3_BAND_FREQUENCIES: [f32; 3] = [900.0, 3000.0, 6000.0];
pub const GRAPHIC_7_BAND_FREQUENCIES: [f32; 7] = [50.0, 125.0, 315.0, 750.0, 2200.0, 6000.0, 12000.0];
pub const GRAPHIC_10_BAND_FREQUENCIES: [f32; 10] = [
    32.0, 63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Ordered centre frequencies sharing one Q.
#[derive(Debug, Clone, PartialEq)]
pub struct BandLayout {
    frequencies: Vec<f32>,
    q: f32,
}

impl BandLayout {
    pub fn new(frequencies: Vec<f32>, q: f32) -> EngineResult<Self> {
        if frequencies.is_empty() {
            return Err(EngineError::InvalidParameter("a band layout needs at least one band".into()));
        }
        if !(q > 0.0 && q.is_finite()) {
            return Err(EngineError::InvalidParameter(format!("Q must be positive (got {})", q)));
        }
        Ok(Self { frequencies, q })
    }

    pub fn three_band() -> Self {
        Self {
            frequencies: GRAPHIC_3_BAND_FREQUENCIES.to_vec(),
            q: DEFAULT_Q,
        }
    }

    pub fn seven_band() -> Self {
        Self {
            frequencies: GRAPHIC_7_BAND_FREQUENCIES.to_vec(),
            q: DEFAULT_Q,
        }
    }

    pub fn ten_band() -> Self {
        Self {
            frequencies: GRAPHIC_10_BAND_FREQUENCIES.to_vec(),
            q: DEFAULT_Q,
        }
    }

    /// Same bands with a different shared Q.
    pub fn with_q(mut self, q: f32) -> EngineResult<Self> {
        if !(q > 0.0 && q.is_finite()) {
            return Err(EngineError::InvalidParameter(format!("Q must be positive (got {})", q)));
        }
        self.q = q;
        Ok(self)
    }

    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn len(&self) -> usize {
        self.frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// A cascade of peaking filters: stage `i` consumes the output of stage
/// `i - 1`, so every band shapes the result.
#[derive(Debug, Clone)]
pub struct EqualizerBank {
    sample_rate: f32,
    stages: Vec<BiquadFilter>,
}

impl EqualizerBank {
    /// One peaking stage per `(frequency, gain)` pair. Bands beyond the
    /// shorter of the two slices are not built. Any invalid band fails the
    /// whole bank.
    pub fn build(sample_rate: f32, frequencies: &[f32], q: f32, gains_db: &[f32]) -> EngineResult<Self> {
        let stages = frequencies
            .iter()
            .zip(gains_db)
            .map(|(&freq, &gain)| BiquadFilter::peaking_eq(sample_rate, freq, q, gain))
            .collect::<EngineResult<Vec<_>>>()?;

        if gains_db.len() < frequencies.len() {
            log::debug!(
                "Equalizer built {} of {} bands; the rest pass through",
                stages.len(),
                frequencies.len()
            );
        }

        Ok(Self { sample_rate, stages })
    }

    pub fn from_layout(sample_rate: f32, layout: &BandLayout, gains_db: &[f32]) -> EngineResult<Self> {
        Self::build(sample_rate, layout.frequencies(), layout.q(), gains_db)
    }

    /// Like [`from_layout`](Self::from_layout) with linear per-band gains.
    pub fn from_linear_gains(sample_rate: f32, layout: &BandLayout, linear: &[f32]) -> EngineResult<Self> {
        let gains_db: Vec<f32> = linear
            .iter()
            .map(|&g| {
                if g > 0.0 {
                    Ok(linear_to_decibels(g as f64) as f32)
                } else {
                    Err(EngineError::InvalidParameter(format!(
                        "linear band gain must be positive (got {})",
                        g
                    )))
                }
            })
            .collect::<EngineResult<_>>()?;
        Self::from_layout(sample_rate, layout, &gains_db)
    }

    pub fn graphic_3(sample_rate: f32, gains_db: &[f32]) -> EngineResult<Self> {
        Self::from_layout(sample_rate, &BandLayout::three_band(), gains_db)
    }

    pub fn graphic_7(sample_rate: f32, gains_db: &[f32]) -> EngineResult<Self> {
        Self::from_layout(sample_rate, &BandLayout::seven_band(), gains_db)
    }

    pub fn graphic_10(sample_rate: f32, gains_db: &[f32]) -> EngineResult<Self> {
        Self::from_layout(sample_rate, &BandLayout::ten_band(), gains_db)
    }

    pub fn graphic_3_linear(sample_rate: f32, linear: &[f32]) -> EngineResult<Self> {
        Self::from_linear_gains(sample_rate, &BandLayout::three_band(), linear)
    }

    pub fn graphic_7_linear(sample_rate: f32, linear: &[f32]) -> EngineResult<Self> {
        Self::from_linear_gains(sample_rate, &BandLayout::seven_band(), linear)
    }

    pub fn graphic_10_linear(sample_rate: f32, linear: &[f32]) -> EngineResult<Self> {
        Self::from_linear_gains(sample_rate, &BandLayout::ten_band(), linear)
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[BiquadFilter] {
        &self.stages
    }

    /// Runs one sample through every stage in order.
    #[inline]
    pub fn transform(&mut self, sample: f32) -> f32 {
        self.stages
            .iter_mut()
            .fold(sample, |acc, stage| stage.transform(acc))
    }

    /// Filters a mono block in place.
    pub fn process(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.transform(*s);
        }
    }

    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(BiquadFilter::reset);
    }

    /// Combined magnitude response of the cascade at `frequency`, in dB.
    pub fn response_db(&self, frequency: f32) -> f32 {
        self.stages.iter().map(|s| s.response_db(frequency)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predefined_layouts() {
        assert_eq!(BandLayout::three_band().frequencies(), &[900.0, 3000.0, 6000.0]);
        assert_eq!(BandLayout::seven_band().len(), 7);
        assert_eq!(BandLayout::ten_band().len(), 10);
        assert_eq!(BandLayout::ten_band().q(), 3.0);
    }

    #[test]
    fn short_gain_vector_truncates_bank() {
        let bank = EqualizerBank::graphic_10(44100.0, &[3.0, -3.0, 6.0]).unwrap();
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.stages()[2].frequency(), 125.0);
    }

    #[test]
    fn long_gain_vector_ignores_extras() {
        let bank = EqualizerBank::graphic_3(44100.0, &[0.0; 8]).unwrap();
        assert_eq!(bank.len(), 3);
    }

    #[test]
    fn one_bad_band_fails_the_bank() {
        // 16 kHz is above Nyquist at 22.05 kHz.
        let result = EqualizerBank::graphic_10(22050.0, &[0.0; 10]);
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
    }

    #[test]
    fn bands_combine_in_cascade() {
        let bank = EqualizerBank::graphic_3(48000.0, &[6.0, 0.0, -6.0]).unwrap();
        assert!(bank.response_db(900.0) > 5.0);
        assert!(bank.response_db(6000.0) < -5.0);

        let boost_only = EqualizerBank::graphic_3(48000.0, &[6.0]).unwrap();
        assert!(boost_only.response_db(6000.0).abs() < 0.5);
    }

    #[test]
    fn flat_bank_passes_signal() {
        let mut bank = EqualizerBank::graphic_7(44100.0, &[0.0; 7]).unwrap();
        let mut block: Vec<f32> = (0..512).map(|i| (i as f32 * 0.37).sin()).collect();
        let original = block.clone();
        bank.process(&mut block);
        for (a, b) in block.iter().zip(&original) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn linear_gains_convert_to_decibels() {
        let bank = EqualizerBank::graphic_3_linear(48000.0, &[2.0, 1.0, 0.5]).unwrap();
        assert!((bank.stages()[0].gain_db() - 6.0206).abs() < 1e-3);
        assert_eq!(bank.stages()[1].gain_db(), 0.0);
        assert!((bank.stages()[2].gain_db() + 6.0206).abs() < 1e-3);

        assert!(EqualizerBank::graphic_3_linear(48000.0, &[0.0]).is_err());
    }

    #[test]
    fn layout_validation() {
        assert!(BandLayout::new(Vec::new(), 3.0).is_err());
        assert!(BandLayout::new(vec![1000.0], 0.0).is_err());
        let wide = BandLayout::three_band().with_q(0.7).unwrap();
        assert_eq!(wide.q(), 0.7);
    }
}
