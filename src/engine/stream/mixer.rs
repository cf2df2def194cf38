//! Summing mixer over float streams

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::format::{PcmFormat, SampleEncoding};
use crate::engine::stream::{fill_from, PcmStream, SharedStream};

/// Sums any number of 32-bit float inputs sharing one rate and channel count.
///
/// The mixer is as long as its longest input; shorter inputs contribute
/// silence once they end. With `auto_stop` set the mixer reports end of
/// stream after the longest input ends, otherwise it keeps producing
/// silence for reads past that point.
pub struct Mixer {
    inputs: Vec<SharedStream>,
    format: PcmFormat,
    auto_stop: bool,
    scratch: Vec<u8>,
}

impl Mixer {
    pub fn new(inputs: Vec<SharedStream>, auto_stop: bool) -> EngineResult<Self> {
        let first = inputs.first().ok_or_else(|| {
            EngineError::InvalidParameter("a mixer needs at least one input".into())
        })?;
        let format = first.format();
        format.validate()?;
        if format.encoding != SampleEncoding::Float {
            return Err(EngineError::UnsupportedFormat(
                "mixer inputs must be 32-bit float".into(),
            ));
        }
        for input in &inputs[1..] {
            check_input(&format, input)?;
        }

        Ok(Self {
            inputs,
            format,
            auto_stop,
            scratch: Vec::new(),
        })
    }

    pub fn add_input(&mut self, input: SharedStream) -> EngineResult<()> {
        check_input(&self.format, &input)?;
        self.inputs.push(input);
        Ok(())
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn auto_stop(&self) -> bool {
        self.auto_stop
    }
}

fn check_input(format: &PcmFormat, input: &SharedStream) -> EngineResult<()> {
    let candidate = input.format();
    if candidate != *format {
        return Err(EngineError::InvalidParameter(format!(
            "mixer input format {:?} does not match {:?}",
            candidate, format
        )));
    }
    Ok(())
}

impl PcmStream for Mixer {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn byte_len(&self) -> u64 {
        self.inputs.iter().map(|i| i.byte_len()).max().unwrap_or(0)
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize> {
        let bps = self.format.bytes_per_sample() as u64;
        if offset % bps != 0 {
            return Err(EngineError::InvalidParameter(format!(
                "mixer reads must be sample-aligned (offset {})",
                offset
            )));
        }

        let len = self.byte_len();
        let n = if self.auto_stop {
            if offset >= len {
                return Ok(0);
            }
            buf.len().min((len - offset) as usize)
        } else {
            buf.len()
        };

        let out = &mut buf[..n];
        out.fill(0);

        let Self { inputs, scratch, .. } = self;
        scratch.resize(n, 0);
        for input in inputs.iter_mut() {
            let got = fill_from(input, offset, &mut scratch[..n])?;
            for (acc, sample) in out[..got].chunks_exact_mut(4).zip(scratch[..got].chunks_exact(4)) {
                let sum = f32::from_le_bytes([acc[0], acc[1], acc[2], acc[3]])
                    + f32::from_le_bytes([sample[0], sample[1], sample[2], sample[3]]);
                acc.copy_from_slice(&sum.to_le_bytes());
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::MemorySource;
    use crate::engine::stream::share;

    fn samples(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn sums_and_pads_shorter_inputs() {
        let a = share(MemorySource::from_samples(44100, 1, &[0.25, 0.25, 0.25]));
        let b = share(MemorySource::from_samples(44100, 1, &[0.5]));
        let mut mixer = Mixer::new(vec![a, b], true).unwrap();
        assert_eq!(mixer.byte_len(), 12);

        let mut buf = vec![0u8; 12];
        assert_eq!(mixer.read(0, &mut buf).unwrap(), 12);
        assert_eq!(samples(&buf), vec![0.75, 0.25, 0.25]);
    }

    #[test]
    fn auto_stop_ends_after_longest_input() {
        let a = share(MemorySource::from_samples(44100, 1, &[0.1]));
        let mut stopping = Mixer::new(vec![a.clone()], true).unwrap();
        let mut endless = Mixer::new(vec![a], false).unwrap();

        let mut buf = vec![0xffu8; 8];
        assert_eq!(stopping.read(4, &mut buf).unwrap(), 0);
        assert_eq!(endless.read(4, &mut buf).unwrap(), 8);
        assert_eq!(samples(&buf), vec![0.0, 0.0]);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let a = share(MemorySource::from_samples(44100, 2, &[0.0, 0.0]));
        let b = share(MemorySource::from_samples(48000, 2, &[0.0, 0.0]));
        assert!(Mixer::new(vec![a.clone(), b], true).is_err());

        let c = share(MemorySource::new(PcmFormat::int16(44100, 2), vec![0; 4]));
        let mut mixer = Mixer::new(vec![a], true).unwrap();
        assert!(mixer.add_input(c).is_err());
        assert_eq!(mixer.input_count(), 1);
    }

    #[test]
    fn empty_input_list_is_invalid() {
        assert!(matches!(
            Mixer::new(Vec::new(), true),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn unaligned_read_is_invalid() {
        let a = share(MemorySource::from_samples(44100, 1, &[0.1, 0.2]));
        let mut mixer = Mixer::new(vec![a], true).unwrap();
        let mut buf = [0u8; 4];
        assert!(mixer.read(2, &mut buf).is_err());
    }
}
