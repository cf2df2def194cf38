pub mod biquad;
pub mod eq;
pub mod resampler;
pub mod spectral;
pub mod spectrum;

pub use biquad::{BiquadFilter, FilterType};
pub use eq::{BandLayout, EqualizerBank};
