//! Decoded PCM streams
//!
//! Everything the registry hands out as a "stream" (file readers, channels,
//! mixers, filtered buffers) implements [`PcmStream`]: a fixed-length,
//! randomly addressable sequence of interleaved PCM bytes.

pub mod channel;
pub mod mixer;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::engine::error::EngineResult;
use crate::engine::format::PcmFormat;

pub use channel::Channel;
pub use mixer::Mixer;

pub trait PcmStream: Send {
    /// Layout of the bytes returned by [`read`](PcmStream::read).
    fn format(&self) -> PcmFormat;

    /// Total length of the stream in bytes.
    fn byte_len(&self) -> u64;

    /// Copies bytes starting at `offset` into `buf` and returns how many were
    /// written. Returns 0 at or past the end of the stream. May return fewer
    /// bytes than requested.
    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize>;

    fn duration_secs(&self) -> f64 {
        self.format().duration_secs(self.byte_len())
    }
}

/// A stream shared between the registry and whatever wraps it.
pub type SharedStream = Arc<Mutex<dyn PcmStream>>;

/// Wraps a stream for sharing.
pub fn share<S: PcmStream + 'static>(stream: S) -> SharedStream {
    Arc::new(Mutex::new(stream))
}

impl<T: PcmStream + ?Sized> PcmStream for Arc<Mutex<T>> {
    fn format(&self) -> PcmFormat {
        lock(self).format()
    }

    fn byte_len(&self) -> u64 {
        lock(self).byte_len()
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize> {
        lock(self).read(offset, buf)
    }
}

impl<T: PcmStream + ?Sized> PcmStream for Box<T> {
    fn format(&self) -> PcmFormat {
        (**self).format()
    }

    fn byte_len(&self) -> u64 {
        (**self).byte_len()
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize> {
        (**self).read(offset, buf)
    }
}

/// Locks a stream, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reads until `buf` is full or the stream runs dry.
pub fn fill_from<S: PcmStream + ?Sized>(
    stream: &mut S,
    offset: u64,
    buf: &mut [u8],
) -> EngineResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(offset + filled as u64, &mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decoder::MemorySource;

    #[test]
    fn shared_stream_delegates() {
        let mut shared = share(MemorySource::from_samples(44100, 1, &[0.1, 0.2, 0.3]));
        assert_eq!(shared.byte_len(), 12);
        assert_eq!(shared.format(), PcmFormat::float32(44100, 1));

        let mut buf = [0u8; 4];
        assert_eq!(shared.read(4, &mut buf).unwrap(), 4);
        assert_eq!(f32::from_le_bytes(buf), 0.2);
    }

    #[test]
    fn fill_from_stops_at_end() {
        let mut src = MemorySource::from_samples(44100, 1, &[1.0, 2.0]);
        let mut buf = [0u8; 16];
        assert_eq!(fill_from(&mut src, 4, &mut buf).unwrap(), 4);
    }
}
