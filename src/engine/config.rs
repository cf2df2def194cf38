//! Engine configuration
//!
//! Tunables for the transform pipeline, the equalizer defaults and the
//! playback sinks. Stored as YAML; a missing or unreadable file falls
//! back to defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::error::{EngineError, EngineResult};

/// Bytes requested from the source per load step
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Frames filtered between cancellation checks
pub const DEFAULT_FILTER_BATCH_FRAMES: usize = 1024;

/// Shared Q of the predefined graphic layouts
pub const DEFAULT_Q: f32 = 3.0;

/// Slider range of a graphic equalizer band (dB)
pub const DEFAULT_GAIN_MIN_DB: f32 = -15.0;
pub const DEFAULT_GAIN_MAX_DB: f32 = 15.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Load request size in bytes
    pub chunk_size: usize,

    /// Frames processed between cancellation checks during filtering
    pub filter_batch_frames: usize,

    /// Q used by the predefined band layouts
    pub default_q: f32,

    /// Lower bound of the band gain slider (dB)
    pub gain_min_db: f32,

    /// Upper bound of the band gain slider (dB)
    pub gain_max_db: f32,

    /// Ring buffer capacity between feeder and device callback, in seconds
    pub output_buffer_secs: f32,

    /// Chunk size handed to the resampler, in frames
    pub resample_chunk_frames: usize,

    /// Number of independent pipelines (decks) the engine exposes
    pub decks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            filter_batch_frames: DEFAULT_FILTER_BATCH_FRAMES,
            default_q: DEFAULT_Q,
            gain_min_db: DEFAULT_GAIN_MIN_DB,
            gain_max_db: DEFAULT_GAIN_MAX_DB,
            output_buffer_secs: 1.0,
            resample_chunk_frames: 1024,
            decks: 2,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file, using defaults when the file is
    /// missing or cannot be parsed.
    pub fn load(path: &Path) -> Self {
        log::info!("EngineConfig::load: Loading from {:?}", path);

        if !path.exists() {
            log::info!("EngineConfig::load: Config file doesn't exist, using defaults");
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|contents| serde_yaml::from_str::<Self>(&contents).map_err(|e| e.to_string()));

        match parsed {
            Ok(config) => match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    log::warn!("EngineConfig::load: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("EngineConfig::load: Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration as YAML, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> EngineResult<()> {
        log::info!("EngineConfig::save: Saving to {:?}", path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| EngineError::InvalidParameter(format!("unserializable config: {}", e)))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 || self.filter_batch_frames == 0 || self.resample_chunk_frames == 0 {
            return Err(EngineError::InvalidParameter(
                "chunk and batch sizes must be non-zero".into(),
            ));
        }
        if !(self.default_q > 0.0 && self.default_q.is_finite()) {
            return Err(EngineError::InvalidParameter(format!(
                "default Q must be positive (got {})",
                self.default_q
            )));
        }
        let gains_finite = self.gain_min_db.is_finite() && self.gain_max_db.is_finite();
        if !(gains_finite && self.gain_min_db <= self.gain_max_db) {
            return Err(EngineError::InvalidParameter(format!(
                "gain range must be finite and ordered (got {} dB..{} dB)",
                self.gain_min_db, self.gain_max_db
            )));
        }
        if !(self.output_buffer_secs > 0.0 && self.output_buffer_secs.is_finite()) {
            return Err(EngineError::InvalidParameter(
                "output buffer must hold a positive duration".into(),
            ));
        }
        Ok(())
    }

    /// Clamp a slider value into the configured gain range. Unlike
    /// `f32::clamp` this never panics on an unvalidated range.
    pub fn clamp_gain_db(&self, gain_db: f32) -> f32 {
        gain_db.max(self.gain_min_db).min(self.gain_max_db)
    }
}
