use std::path::Path;
use std::sync::Arc;

use crate::engine::clock::PlaybackState;
use crate::engine::config::EngineConfig;
use crate::engine::dsp::eq::{BandLayout, EqualizerBank};
use crate::engine::dsp::spectral::format_decibels;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::pipeline::{EqualizerPipeline, PipelineState, RunHandle};
use crate::engine::registry::AudioRegistry;
use crate::engine::session::SessionId;
use crate::engine::stream::PcmStream;

/// Entry point for the UI: a registry plus one equalizer pipeline per deck.
pub struct AudioEngine {
    registry: Arc<AudioRegistry>,
    config: EngineConfig,
    decks: Vec<EqualizerPipeline>,
}

impl AudioEngine {
    /// Engine on the default output device.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let registry = Arc::new(AudioRegistry::with_cpal(config.clone()));
        Ok(Self::with_registry(registry, config))
    }

    pub fn with_registry(registry: Arc<AudioRegistry>, config: EngineConfig) -> Self {
        let decks = (0..config.decks.max(1))
            .map(|_| EqualizerPipeline::new(registry.clone(), config.clone()))
            .collect();
        log::info!("AudioEngine: {} decks ready", config.decks.max(1));
        Self {
            registry,
            config,
            decks,
        }
    }

    pub fn registry(&self) -> &Arc<AudioRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn deck_count(&self) -> usize {
        self.decks.len()
    }

    fn deck(&self, deck: usize) -> EngineResult<&EqualizerPipeline> {
        self.decks.get(deck).ok_or_else(|| {
            EngineError::InvalidParameter(format!(
                "deck {} does not exist ({} decks)",
                deck,
                self.decks.len()
            ))
        })
    }

    /// Opens a track for later equalizing.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> EngineResult<SessionId> {
        self.registry.open_reader(path)
    }

    /// One of the graphic layouts (3, 7 or 10 bands) at the configured Q.
    pub fn layout(&self, bands: usize) -> EngineResult<BandLayout> {
        let layout = match bands {
            3 => BandLayout::three_band(),
            7 => BandLayout::seven_band(),
            10 => BandLayout::ten_band(),
            other => {
                return Err(EngineError::InvalidParameter(format!(
                    "no {}-band layout (3, 7 or 10)",
                    other
                )))
            }
        };
        layout.with_q(self.config.default_q)
    }

    /// Filters `source` on `deck` with per-band gains in dB and plays the
    /// result. The run happens in the background.
    pub fn equalize(
        &self,
        deck: usize,
        source: SessionId,
        layout: &BandLayout,
        gains_db: &[f32],
    ) -> EngineResult<RunHandle> {
        let pipeline = self.deck(deck)?;
        let stream = self
            .registry
            .stream(source)
            .ok_or_else(|| EngineError::NotFound(format!("stream {}", source)))?;
        let sample_rate = stream.format().sample_rate as f32;
        let bank = EqualizerBank::from_layout(sample_rate, layout, gains_db)?;

        log::info!(
            "AudioEngine: deck {} equalizing {} with [{}]",
            deck,
            source,
            self.gain_labels(gains_db).join(", ")
        );
        pipeline.spawn(Some(stream), Some(&bank))
    }

    /// Like [`equalize`](Self::equalize) with linear per-band gains.
    pub fn equalize_linear(
        &self,
        deck: usize,
        source: SessionId,
        layout: &BandLayout,
        linear: &[f32],
    ) -> EngineResult<RunHandle> {
        let pipeline = self.deck(deck)?;
        let stream = self
            .registry
            .stream(source)
            .ok_or_else(|| EngineError::NotFound(format!("stream {}", source)))?;
        let sample_rate = stream.format().sample_rate as f32;
        let bank = EqualizerBank::from_linear_gains(sample_rate, layout, linear)?;
        pipeline.spawn(Some(stream), Some(&bank))
    }

    pub fn deck_state(&self, deck: usize) -> EngineResult<PipelineState> {
        Ok(self.deck(deck)?.state())
    }

    pub fn stop(&self, output: SessionId) -> EngineResult<()> {
        self.registry.stop_output(output)
    }

    pub fn pause(&self, output: SessionId) -> EngineResult<()> {
        self.registry.pause_output(output)
    }

    pub fn resume(&self, output: SessionId) -> EngineResult<()> {
        self.registry.resume_output(output)
    }

    pub fn elapsed_secs(&self, output: SessionId) -> EngineResult<f64> {
        self.registry.elapsed_secs(output)
    }

    pub fn playback_state(&self, output: SessionId) -> EngineResult<PlaybackState> {
        self.registry.playback_state(output)
    }

    /// Clamps raw slider positions to the configured gain range.
    pub fn clamp_gains(&self, gains_db: &[f32]) -> Vec<f32> {
        gains_db.iter().map(|&g| self.config.clamp_gain_db(g)).collect()
    }

    /// Slider captions, e.g. `+3.0 dB`.
    pub fn gain_labels(&self, gains_db: &[f32]) -> Vec<String> {
        gains_db.iter().map(|&g| format_decibels(g as f64)).collect()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.registry.stop_all();
    }
}
