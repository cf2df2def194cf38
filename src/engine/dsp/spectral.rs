//! FFT bin and decibel conversions

use realfft::num_complex::Complex;

/// Level reported for non-positive (or NaN) amplitudes.
pub const MIN_DECIBELS: f64 = -144.0;

/// Centre frequency of FFT bin `index`. Indices past Nyquist are not
/// folded; the caller interprets aliasing.
pub fn bin_frequency(index: usize, sample_rate: u32, fft_size: usize) -> f64 {
    index as f64 * sample_rate as f64 / fft_size as f64
}

/// Nearest FFT bin to `frequency`, rounding half away from zero.
///
/// Frequencies at or above Nyquist give indices beyond `fft_size / 2`;
/// callers must clamp. Negative frequencies saturate to bin 0.
pub fn nearest_bin(frequency: f64, sample_rate: u32, fft_size: usize) -> usize {
    (frequency * fft_size as f64 / sample_rate as f64).round() as usize
}

/// `20 * log10(x)`, or [`MIN_DECIBELS`] when `x <= 0`.
pub fn linear_to_decibels(x: f64) -> f64 {
    if x > 0.0 {
        20.0 * x.log10()
    } else {
        MIN_DECIBELS
    }
}

pub fn decibels_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

pub fn linear_array_to_decibels(linear: &[f32]) -> Vec<f32> {
    linear
        .iter()
        .map(|&x| linear_to_decibels(x as f64) as f32)
        .collect()
}

/// Display string for a level, as shown next to a gain slider.
pub fn format_decibels(db: f64) -> String {
    if db <= MIN_DECIBELS {
        "-inf dB".to_string()
    } else {
        format!("{:+.1} dB", db)
    }
}

/// Real sample as a complex value with zero imaginary part.
pub fn to_complex(sample: f32) -> Complex<f32> {
    Complex::new(sample, 0.0)
}

/// Real part of a complex value.
pub fn to_real(value: Complex<f32>) -> f32 {
    value.re
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_frequency_scenario() {
        let f = bin_frequency(10, 44100, 1024);
        assert!((f - 430.664_062_5).abs() < 1e-9);
        assert_eq!(nearest_bin(430.66, 44100, 1024), 10);
    }

    #[test]
    fn bins_round_trip_up_to_nyquist() {
        for &(sr, n) in &[(44100u32, 1024usize), (48000, 4096), (22050, 512), (96000, 2048)] {
            for i in 0..=n / 2 {
                assert_eq!(nearest_bin(bin_frequency(i, sr, n), sr, n), i);
            }
        }
    }

    #[test]
    fn nearest_bin_is_unbounded_above_nyquist() {
        assert_eq!(nearest_bin(44100.0, 44100, 1024), 1024);
        assert_eq!(nearest_bin(-100.0, 44100, 1024), 0);
    }

    #[test]
    fn half_amplitude_is_minus_six_db() {
        assert!((linear_to_decibels(0.5) + 6.0206).abs() < 1e-4);
        assert_eq!(linear_to_decibels(1.0), 0.0);
    }

    #[test]
    fn decibels_increase_with_amplitude() {
        let mut previous = linear_to_decibels(1e-9);
        for step in 1..2000 {
            let db = linear_to_decibels(step as f64 * 1e-3);
            assert!(db > previous);
            previous = db;
        }
    }

    #[test]
    fn non_positive_amplitudes_hit_the_floor() {
        assert_eq!(linear_to_decibels(0.0), MIN_DECIBELS);
        assert_eq!(linear_to_decibels(-1.0), MIN_DECIBELS);
        assert_eq!(linear_to_decibels(f64::NAN), MIN_DECIBELS);
        assert_eq!(format_decibels(MIN_DECIBELS), "-inf dB");
    }

    #[test]
    fn decibel_pair_inverts() {
        for &db in &[-15.0, -6.0, 0.0, 3.0, 15.0] {
            assert!((linear_to_decibels(decibels_to_linear(db)) - db).abs() < 1e-9);
        }
    }

    #[test]
    fn array_form_and_formatting() {
        let db = linear_array_to_decibels(&[1.0, 2.0, 0.0]);
        assert_eq!(db[0], 0.0);
        assert!((db[1] - 6.0206).abs() < 1e-3);
        assert_eq!(db[2], MIN_DECIBELS as f32);
        assert_eq!(format_decibels(-6.0206), "-6.0 dB");
        assert_eq!(format_decibels(3.0), "+3.0 dB");
    }

    #[test]
    fn complex_helpers() {
        let c = to_complex(0.75);
        assert_eq!(c.im, 0.0);
        assert_eq!(to_real(c), 0.75);
    }
}
