use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::format::PcmFormat;
use crate::engine::stream::PcmStream;

/// File reader producing interleaved 32-bit float PCM.
///
/// Packets are decoded lazily as reads advance; decoded bytes are kept so
/// earlier offsets can be re-read without seeking.
pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: PcmFormat,
    decoded: Vec<u8>,
    /// Channel count of the decoded buffers, once one has been seen
    decoded_channels: Option<u16>,
    byte_len: u64,
    exhausted: bool,
    short_reported: bool,
}

impl SymphoniaDecoder {
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref).map_err(|e| match e.kind() {
            ErrorKind::NotFound => EngineError::NotFound(path_ref.display().to_string()),
            _ => EngineError::Io(e),
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path_ref.extension().and_then(|s| s.to_str()) {
            hint.with_extension(ext);
        }

        let meta_opts = MetadataOptions::default();
        let fmt_opts = FormatOptions::default();
        let dec_opts = DecoderOptions::default();

        let unsupported = |what: String| {
            EngineError::UnsupportedFormat(format!("{}: {}", path_ref.display(), what))
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| unsupported(e.to_string()))?;

        let reader = probed.format;

        let params = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .map(|t| (t.id, t.codec_params.clone()))
            .ok_or_else(|| unsupported("no supported audio tracks found".into()))?;
        let (track_id, codec_params) = params;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| unsupported("unknown sample rate".into()))?;
        let declared = codec_params.channels.map(|c| c.count() as u16);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &dec_opts)
            .map_err(|e| unsupported(e.to_string()))?;

        let mut this = Self {
            reader,
            decoder,
            track_id,
            format: PcmFormat::float32(sample_rate, declared.unwrap_or(0)),
            decoded: Vec::new(),
            decoded_channels: None,
            byte_len: 0,
            exhausted: false,
            short_reported: false,
        };

        // The first decoded buffer is what gets interleaved, so it decides
        // the channel count.
        this.decode_packet()?;
        let channels = stream_channels(this.decoded_channels, declared)
            .ok_or_else(|| unsupported("unknown channel count".into()))?;
        if declared.is_some_and(|d| d != channels) {
            log::warn!(
                "{:?} declares {:?} channels but decodes {}",
                path_ref,
                declared,
                channels
            );
        }
        this.format = PcmFormat::float32(sample_rate, channels);
        let format = this.format;

        match codec_params.n_frames {
            Some(frames) => this.byte_len = frames * format.block_align() as u64,
            None => {
                // Length is not declared up front; decode everything to learn it.
                while this.decode_packet()? {}
                this.byte_len = this.decoded.len() as u64;
            }
        }

        log::info!(
            "Opened {:?}: {} Hz, {} ch, {:.2}s",
            path_ref,
            sample_rate,
            channels,
            format.duration_secs(this.byte_len)
        );
        Ok(this)
    }

    /// Decodes the next packet of our track into `decoded`.
    /// Returns false once the container has no more packets.
    fn decode_packet(&mut self) -> EngineResult<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(ref err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    self.exhausted = true;
                    return Ok(false);
                }
                Err(Error::ResetRequired) => {
                    self.exhausted = true;
                    return Ok(false);
                }
                Err(err) => return Err(EngineError::Decode(err.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(audio_buf) => {
                    let spec = *audio_buf.spec();
                    self.decoded_channels
                        .get_or_insert(spec.channels.count() as u16);
                    let mut sample_buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
                    sample_buf.copy_interleaved_ref(audio_buf);
                    self.decoded
                        .extend(sample_buf.samples().iter().flat_map(|s| s.to_le_bytes()));
                    return Ok(true);
                }
                Err(Error::DecodeError(err)) => {
                    log::warn!("Skipping undecodable packet: {}", err);
                    continue;
                }
                Err(err) => return Err(EngineError::Decode(err.to_string())),
            }
        }
    }

    /// True once decoding has ended short of the length the container
    /// declared.
    pub fn is_truncated(&self) -> bool {
        self.exhausted && (self.decoded.len() as u64) < self.byte_len
    }
}

/// Channel count of the decoded PCM: what the decoder produced, falling
/// back to what the container declared when nothing decoded.
fn stream_channels(decoded: Option<u16>, declared: Option<u16>) -> Option<u16> {
    decoded.or(declared).filter(|&c| c > 0)
}

impl PcmStream for SymphoniaDecoder {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn byte_len(&self) -> u64 {
        self.byte_len
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize> {
        let end = offset.saturating_add(buf.len() as u64).min(self.byte_len);
        if offset >= end {
            return Ok(0);
        }

        while (self.decoded.len() as u64) < end && !self.exhausted {
            self.decode_packet()?;
        }
        if self.is_truncated() && !self.short_reported {
            self.short_reported = true;
            log::warn!(
                "Decoder ran out after {} of {} declared bytes; the file looks truncated",
                self.decoded.len(),
                self.byte_len
            );
        }

        let available = (self.decoded.len() as u64).min(end);
        if offset >= available {
            return Ok(0);
        }
        let start = offset as usize;
        let n = (available - offset) as usize;
        buf[..n].copy_from_slice(&self.decoded[start..start + n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Minimal 16-bit PCM RIFF/WAVE file.
    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        bytes.extend_from_slice(&block_align.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        let mut file = File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = SymphoniaDecoder::open(dir.path().join("absent.wav"));
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn garbage_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(
            SymphoniaDecoder::open(&path),
            Err(EngineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn decodes_wav_as_float() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let samples: Vec<i16> = (0..2000).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        write_wav(&path, 22050, 2, &samples);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        assert_eq!(decoder.format(), PcmFormat::float32(22050, 2));
        assert_eq!(decoder.byte_len(), 2000 * 4);

        let mut buf = vec![0u8; 8];
        assert_eq!(decoder.read(8, &mut buf).unwrap(), 8);
        let left = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let right = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert!((left - 0.5).abs() < 1e-3);
        assert!((right + 0.5).abs() < 1e-3);

        // Past the end reads nothing.
        assert_eq!(decoder.read(8000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn reads_near_u64_max_return_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 44100, 1, &[100; 64]);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        let mut buf = vec![0u8; 16];
        assert_eq!(decoder.read(u64::MAX - 4, &mut buf).unwrap(), 0);
        assert_eq!(decoder.read(u64::MAX, &mut buf).unwrap(), 0);
    }

    #[test]
    fn channel_count_follows_decoded_buffers() {
        assert_eq!(stream_channels(Some(1), Some(2)), Some(1));
        assert_eq!(stream_channels(None, Some(2)), Some(2));
        assert_eq!(stream_channels(None, None), None);
        assert_eq!(stream_channels(Some(0), None), None);
    }

    #[test]
    fn mono_wav_opens_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav(&path, 44100, 1, &[1000; 500]);

        let decoder = SymphoniaDecoder::open(&path).unwrap();
        assert_eq!(decoder.format(), PcmFormat::float32(44100, 1));
        assert_eq!(decoder.byte_len(), 500 * 4);
    }

    #[test]
    fn truncated_data_chunk_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.wav");
        let samples = vec![2000i16; 4410 * 2];
        write_wav(&path, 44100, 2, &samples);
        // Keep the header but only half of the declared frames.
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(44 + 4410 * 2).unwrap();
        drop(file);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        assert_eq!(decoder.byte_len(), 4410 * 8);

        let mut buf = vec![0u8; 2048];
        let mut total = 0u64;
        loop {
            let n = decoder.read(total, &mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n as u64;
        }
        assert!(total < decoder.byte_len());
        assert!(decoder.is_truncated());
    }
}
