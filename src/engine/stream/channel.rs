//! Volume/pan channel over a decoded stream
//!
//! A channel always produces stereo 32-bit float at the source's sample rate.
//! Mono sources are duplicated to both sides before panning.

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::format::PcmFormat;
use crate::engine::stream::{fill_from, PcmStream, SharedStream};

const OUTPUT_CHANNELS: u16 = 2;

pub struct Channel {
    source: SharedStream,
    source_format: PcmFormat,
    format: PcmFormat,
    volume: f32,
    /// -1.0 = hard left, 0.0 = centre, 1.0 = hard right
    pan: f32,
    scratch: Vec<u8>,
}

impl Channel {
    pub fn new(source: SharedStream) -> EngineResult<Self> {
        let source_format = source.format();
        source_format.validate()?;
        if source_format.channels > 2 {
            return Err(EngineError::UnsupportedFormat(format!(
                "channels wrap mono or stereo sources, got {} channels",
                source_format.channels
            )));
        }

        Ok(Self {
            source,
            source_format,
            format: PcmFormat::float32(source_format.sample_rate, OUTPUT_CHANNELS),
            volume: 1.0,
            pan: 0.0,
            scratch: Vec::new(),
        })
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) -> EngineResult<()> {
        if !(volume >= 0.0 && volume.is_finite()) {
            return Err(EngineError::InvalidParameter(format!(
                "volume must be a non-negative finite value (got {})",
                volume
            )));
        }
        self.volume = volume;
        Ok(())
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn set_pan(&mut self, pan: f32) -> EngineResult<()> {
        if !(-1.0..=1.0).contains(&pan) {
            return Err(EngineError::InvalidParameter(format!(
                "pan must lie in [-1, 1] (got {})",
                pan
            )));
        }
        self.pan = pan;
        Ok(())
    }

    /// Left/right multipliers for the current volume and pan. Panning only
    /// ever attenuates the opposite side.
    fn side_gains(&self) -> (f32, f32) {
        (
            self.volume * (1.0 - self.pan).min(1.0),
            self.volume * (1.0 + self.pan).min(1.0),
        )
    }

    fn frame_count(&self) -> u64 {
        self.source.byte_len() / self.source_format.block_align() as u64
    }
}

impl PcmStream for Channel {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn byte_len(&self) -> u64 {
        self.frame_count() * self.format.block_align() as u64
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize> {
        let len = self.byte_len();
        if offset >= len || buf.is_empty() {
            return Ok(0);
        }

        let out_block = self.format.block_align();
        let in_block = self.source_format.block_align();
        let bps = self.source_format.bytes_per_sample();
        let wanted = buf.len().min((len - offset) as usize);
        let first_frame = offset / out_block as u64;
        let skip = (offset % out_block as u64) as usize;
        let frames = (skip + wanted).div_ceil(out_block);

        self.scratch.resize(frames * in_block, 0);
        let got = fill_from(&mut self.source, first_frame * in_block as u64, &mut self.scratch)?;
        let frames_read = got / in_block;

        let (left_gain, right_gain) = self.side_gains();
        let mut rendered = Vec::with_capacity(frames_read * out_block);
        for frame in self.scratch[..frames_read * in_block].chunks_exact(in_block) {
            let left = self.source_format.decode_sample(&frame[..bps]);
            let right = if self.source_format.channels == 1 {
                left
            } else {
                self.source_format.decode_sample(&frame[bps..2 * bps])
            };
            rendered.extend_from_slice(&(left * left_gain).to_le_bytes());
            rendered.extend_from_slice(&(right * right_gain).to_le_bytes());
        }

        if skip >= rendered.len() {
            return Ok(0);
        }
        let n = (rendered.len() - skip).min(wanted);
        buf[..n].copy_from_slice(&rendered[skip..skip + n]);
        Ok(n)
    }
}
