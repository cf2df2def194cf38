use crate::engine::error::EngineResult;
use crate::engine::format::PcmFormat;
use crate::engine::stream::PcmStream;

/// A PCM stream backed by an in-memory byte buffer.
///
/// Filtered pipeline output is delivered to the playback sink in this form.
#[derive(Debug, Clone)]
pub struct MemorySource {
    format: PcmFormat,
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(format: PcmFormat, data: Vec<u8>) -> Self {
        Self { format, data }
    }

    /// Builds a 32-bit float stream from interleaved samples.
    pub fn from_samples(sample_rate: u32, channels: u16, samples: &[f32]) -> Self {
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(PcmFormat::float32(sample_rate, channels), data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl PcmStream for MemorySource {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize> {
        let len = self.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }
}
