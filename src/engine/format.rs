use crate::engine::error::{EngineError, EngineResult};

/// How a sample's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// IEEE-754 float, little-endian
    Float,
    /// Signed integer, little-endian
    Int,
}

/// Layout of an interleaved PCM byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl PcmFormat {
    pub const fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
            encoding: SampleEncoding::Float,
        }
    }

    pub const fn int16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            encoding: SampleEncoding::Int,
        }
    }

    /// Stride between consecutive samples in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_per_sample as usize / 8
    }

    /// Size of one interleaved frame in bytes.
    pub fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(EngineError::InvalidParameter(format!(
                "sample rate and channel count must be positive (got {} Hz, {} channels)",
                self.sample_rate, self.channels
            )));
        }
        match (self.encoding, self.bits_per_sample) {
            (SampleEncoding::Float, 32) | (SampleEncoding::Int, 16) => Ok(()),
            (encoding, bits) => Err(EngineError::UnsupportedFormat(format!(
                "{}-bit {:?} samples",
                bits, encoding
            ))),
        }
    }

    /// Reads one sample from `bytes`, which must hold at least `bytes_per_sample` bytes.
    #[inline]
    pub fn decode_sample(&self, bytes: &[u8]) -> f32 {
        match self.encoding {
            SampleEncoding::Float => {
                let mut raw = [0u8; 4];
                raw.copy_from_slice(&bytes[..4]);
                f32::from_le_bytes(raw)
            }
            SampleEncoding::Int => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
        }
    }

    /// Writes one sample into `out`, which must hold at least `bytes_per_sample` bytes.
    /// Integer encodings clip to full scale.
    #[inline]
    pub fn encode_sample(&self, value: f32, out: &mut [u8]) {
        match self.encoding {
            SampleEncoding::Float => out[..4].copy_from_slice(&value.to_le_bytes()),
            SampleEncoding::Int => {
                let scaled = (value.clamp(-1.0, 1.0) * 32767.0).round() as i16;
                out[..2].copy_from_slice(&scaled.to_le_bytes());
            }
        }
    }

    /// Playback duration of `byte_len` bytes in this format.
    pub fn duration_secs(&self, byte_len: u64) -> f64 {
        let block = self.block_align() as f64;
        if block == 0.0 || self.sample_rate == 0 {
            return 0.0;
        }
        byte_len as f64 / block / self.sample_rate as f64
    }
}
