use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::{Fft, FixedSync, Resampler as RubatoResampler};

use crate::engine::error::{EngineError, EngineResult};

/// Interleaved f32 sample rate converter over rubato's FFT resampler.
///
/// Input is accumulated until a full chunk is available, so `process` may
/// return fewer (or no) frames for small inputs. Call `flush` once at the
/// end to drain the tail.
pub struct Resampler {
    resampler: Fft<f32>,
    channels: usize,
    chunk_size: usize,
    pending: Vec<f32>,
    planar_in: Vec<Vec<f32>>,
    planar_out: Vec<Vec<f32>>,
}

impl Resampler {
    pub fn new(
        source_sample_rate: u32,
        target_sample_rate: u32,
        channels: usize,
        chunk_size: usize,
    ) -> EngineResult<Self> {
        if channels == 0 || chunk_size == 0 {
            return Err(EngineError::InvalidParameter(format!(
                "resampler needs channels and chunk size (got {} and {})",
                channels, chunk_size
            )));
        }

        let resampler = Fft::<f32>::new(
            source_sample_rate as usize,
            target_sample_rate as usize,
            chunk_size,
            2,
            channels,
            FixedSync::Input,
        )
        .map_err(|e| EngineError::Resample(e.to_string()))?;

        log::debug!(
            "Resampler: {}Hz -> {}Hz, {}ch, {} frames per chunk",
            source_sample_rate,
            target_sample_rate,
            channels,
            chunk_size
        );

        Ok(Self {
            resampler,
            channels,
            chunk_size,
            pending: Vec::with_capacity(chunk_size * channels),
            planar_in: vec![vec![0.0; chunk_size]; channels],
            planar_out: vec![Vec::new(); channels],
        })
    }

    /// Feeds interleaved samples and returns whatever full chunks produced.
    pub fn process(&mut self, input: &[f32]) -> EngineResult<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let mut output = Vec::new();
        let chunk_samples = self.chunk_size * self.channels;
        let mut consumed = 0;

        while self.pending.len() - consumed >= chunk_samples {
            let chunk = &self.pending[consumed..consumed + chunk_samples];
            for (i, frame) in chunk.chunks_exact(self.channels).enumerate() {
                for (ch, &s) in frame.iter().enumerate() {
                    self.planar_in[ch][i] = s;
                }
            }
            consumed += chunk_samples;

            let out_len = self.resampler.output_frames_next();
            for plane in self.planar_out.iter_mut() {
                plane.resize(out_len, 0.0);
            }

            let input_adapter =
                SequentialSliceOfVecs::new(&self.planar_in, self.channels, self.chunk_size)
                    .map_err(|e| EngineError::Resample(e.to_string()))?;
            let mut output_adapter =
                SequentialSliceOfVecs::new_mut(&mut self.planar_out, self.channels, out_len)
                    .map_err(|e| EngineError::Resample(e.to_string()))?;

            let (_, written) = self
                .resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, None)
                .map_err(|e| EngineError::Resample(e.to_string()))?;

            output.reserve(written * self.channels);
            for i in 0..written {
                for plane in &self.planar_out {
                    output.push(plane[i]);
                }
            }
        }

        self.pending.drain(..consumed);
        Ok(output)
    }

    /// Pads the buffered tail with silence and pushes it through.
    pub fn flush(&mut self) -> EngineResult<Vec<f32>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }

        let remaining_frames = self.pending.len() / self.channels;
        let padding = (self.chunk_size - remaining_frames) * self.channels;
        self.pending.resize(self.pending.len() + padding, 0.0);

        self.process(&[])
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}
