//! Audio core of a two-deck DJ app: decoding, a graphic equalizer run as a
//! buffered transform pipeline, and a registry of live streams and outputs.

pub mod engine;

pub use engine::config::EngineConfig;
pub use engine::dsp::eq::{BandLayout, EqualizerBank};
pub use engine::engine::AudioEngine;
pub use engine::error::{EngineError, EngineResult};
pub use engine::pipeline::{CancelToken, EqualizerPipeline, PipelineState, RunHandle, RunOutcome};
pub use engine::registry::AudioRegistry;
pub use engine::session::SessionId;
