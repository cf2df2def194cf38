use std::sync::{Arc, Mutex};

use crate::engine::clock::{Clock, PlaybackState};
use crate::engine::error::EngineResult;
use crate::engine::format::PcmFormat;
use crate::engine::output::{OutputBackend, PlaybackSink};
use crate::engine::stream::{fill_from, lock, PcmStream, SharedStream};

/// Bytes one sink played, in the provider's format.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedOutput {
    pub format: PcmFormat,
    pub data: Vec<u8>,
}

/// Backend that "plays" by copying the provider into memory.
///
/// Used by the offline demo mode and by tests that have no audio device.
/// Clones share the same capture list.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    captured: Arc<Mutex<Vec<CapturedOutput>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything played so far, in start order.
    pub fn captured(&self) -> Vec<CapturedOutput> {
        lock(&self.captured).clone()
    }
}

impl OutputBackend for MemoryBackend {
    fn open(&self, provider: SharedStream) -> EngineResult<Box<dyn PlaybackSink>> {
        let format = provider.format();
        format.validate()?;
        Ok(Box::new(MemorySink {
            provider,
            clock: Arc::new(Clock::new(format.sample_rate, format.channels)),
            captured: self.captured.clone(),
            done: false,
        }))
    }
}

/// Plays its whole provider the moment it starts.
pub struct MemorySink {
    provider: SharedStream,
    clock: Arc<Clock>,
    captured: Arc<Mutex<Vec<CapturedOutput>>>,
    done: bool,
}

impl PlaybackSink for MemorySink {
    fn start(&mut self) -> EngineResult<()> {
        if self.done {
            return Ok(());
        }

        let format = self.provider.format();
        let mut data = vec![0u8; self.provider.byte_len() as usize];
        let n = fill_from(&mut self.provider, 0, &mut data)?;
        data.truncate(n);

        self.clock.set_state(PlaybackState::Playing);
        self.clock.advance((n / format.block_align()) as u64);
        self.clock.mark_end_of_stream();
        self.clock.set_state(PlaybackState::Stopped);
        self.done = true;

        lock(&self.captured).push(CapturedOutput { format, data });
        Ok(())
    }

    fn pause(&mut self) -> EngineResult<()> {
        if !self.done {
            self.clock.set_state(PlaybackState::Paused);
        }
        Ok(())
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.done = true;
        self.clock.set_state(PlaybackState::Stopped);
        Ok(())
    }

    fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }
}
