use std::f32::consts::PI;

use crate::engine::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    PeakingEq,
    HighPass,
    LowShelf,
    LowPass,
    HighShelf,
}

/// Normalized coefficients (a0 divided out).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

/// Second-order IIR stage (RBJ Audio EQ Cookbook designs), Direct Form I.
///
/// The delay registers carry over between calls, so one instance must see
/// its samples exactly once and in order.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    filter_type: FilterType,
    sample_rate: f32,
    frequency: f32,
    q: f32,
    gain_db: f32,
    coeffs: Coefficients,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    pub fn new(
        filter_type: FilterType,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain_db: f32,
    ) -> EngineResult<Self> {
        let mut f = Self {
            filter_type,
            sample_rate,
            frequency,
            q,
            gain_db,
            coeffs: Coefficients {
                b0: 1.0,
                b1: 0.0,
                b2: 0.0,
                a1: 0.0,
                a2: 0.0,
            },
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        };
        f.update(filter_type, sample_rate, frequency, q, gain_db)?;
        Ok(f)
    }

    /// Peaking EQ: `gain_db` at `centre_freq`, unity far from it.
    pub fn peaking_eq(sample_rate: f32, centre_freq: f32, q: f32, gain_db: f32) -> EngineResult<Self> {
        Self::new(FilterType::PeakingEq, sample_rate, centre_freq, q, gain_db)
    }

    /// Recomputes the coefficients. Delay registers are kept.
    pub fn update(
        &mut self,
        filter_type: FilterType,
        sample_rate: f32,
        frequency: f32,
        q: f32,
        gain_db: f32,
    ) -> EngineResult<()> {
        validate(sample_rate, frequency, q, gain_db)?;

        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos = w0.cos();
        let sin = w0.sin();
        let a = 10.0f32.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::PeakingEq => {
                let alpha = sin / (2.0 * q);
                (
                    1.0 + alpha * a,
                    -2.0 * cos,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos,
                    1.0 - alpha / a,
                )
            }

            FilterType::HighPass => {
                let alpha = sin / (2.0 * q);
                (
                    (1.0 + cos) / 2.0,
                    -(1.0 + cos),
                    (1.0 + cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }

            FilterType::LowPass => {
                let alpha = sin / (2.0 * q);
                (
                    (1.0 - cos) / 2.0,
                    1.0 - cos,
                    (1.0 - cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }

            // Shelves read `q` as the shelf slope S.
            FilterType::LowShelf => {
                let alpha = sin / 2.0 * ((a + 1.0 / a) * (1.0 / q - 1.0) + 2.0).sqrt();
                (
                    a * ((a + 1.0) - (a - 1.0) * cos + 2.0 * a.sqrt() * alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
                    a * ((a + 1.0) - (a - 1.0) * cos - 2.0 * a.sqrt() * alpha),
                    (a + 1.0) + (a - 1.0) * cos + 2.0 * a.sqrt() * alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos),
                    (a + 1.0) + (a - 1.0) * cos - 2.0 * a.sqrt() * alpha,
                )
            }

            FilterType::HighShelf => {
                let alpha = sin / 2.0 * ((a + 1.0 / a) * (1.0 / q - 1.0) + 2.0).sqrt();
                (
                    a * ((a + 1.0) + (a - 1.0) * cos + 2.0 * a.sqrt() * alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
                    a * ((a + 1.0) + (a - 1.0) * cos - 2.0 * a.sqrt() * alpha),
                    (a + 1.0) - (a - 1.0) * cos + 2.0 * a.sqrt() * alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos),
                    (a + 1.0) - (a - 1.0) * cos - 2.0 * a.sqrt() * alpha,
                )
            }
        };

        self.coeffs = Coefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        };
        self.filter_type = filter_type;
        self.sample_rate = sample_rate;
        self.frequency = frequency;
        self.q = q;
        self.gain_db = gain_db;
        Ok(())
    }

    /// Filters one sample and advances the delay registers.
    #[inline]
    pub fn transform(&mut self, x: f32) -> f32 {
        let c = &self.coeffs;
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Magnitude response at `frequency`, in dB.
    pub fn response_db(&self, frequency: f32) -> f32 {
        let w = 2.0 * PI * frequency / self.sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());
        let c = &self.coeffs;

        let num_re = c.b0 + c.b1 * c1 + c.b2 * c2;
        let num_im = -(c.b1 * s1 + c.b2 * s2);
        let den_re = 1.0 + c.a1 * c1 + c.a2 * c2;
        let den_im = -(c.a1 * s1 + c.a2 * s2);

        let power = (num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im);
        10.0 * power.log10()
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn coefficients(&self) -> Coefficients {
        self.coeffs
    }
}

fn validate(sample_rate: f32, frequency: f32, q: f32, gain_db: f32) -> EngineResult<()> {
    if !(sample_rate > 0.0 && sample_rate.is_finite()) {
        return Err(EngineError::InvalidParameter(format!(
            "sample rate must be positive (got {})",
            sample_rate
        )));
    }
    if !(frequency > 0.0 && frequency < sample_rate / 2.0) {
        return Err(EngineError::InvalidParameter(format!(
            "frequency {} Hz is outside (0, {}) Hz",
            frequency,
            sample_rate / 2.0
        )));
    }
    if !(q > 0.0 && q.is_finite()) {
        return Err(EngineError::InvalidParameter(format!("Q must be positive (got {})", q)));
    }
    if !gain_db.is_finite() {
        return Err(EngineError::InvalidParameter(format!(
            "gain must be finite (got {})",
            gain_db
        )));
    }
    Ok(())
}
