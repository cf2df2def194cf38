//! Audio resource registry
//!
//! Owns every live reader, channel, mixer and output sink, keyed by a
//! random [`SessionId`]. All tables sit behind one lock: builders take it
//! for writing, lookups for reading. Nothing is evicted implicitly; a
//! handle stays alive until [`AudioRegistry::release`] or
//! [`AudioRegistry::stop_all`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::engine::clock::PlaybackState;
use crate::engine::config::EngineConfig;
use crate::engine::decoder::{AudioDecoder, SymphoniaBackend};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::output::{CpalBackend, OutputBackend, PlaybackSink};
use crate::engine::session::SessionId;
use crate::engine::stream::{lock, share, Channel, Mixer, SharedStream};

/// Entry counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryCounts {
    pub readers: usize,
    pub channels: usize,
    pub mixers: usize,
    pub outputs: usize,
}

struct OutputEntry {
    sink: Mutex<Box<dyn PlaybackSink>>,
}

#[derive(Default)]
struct Tables {
    readers: HashMap<SessionId, SharedStream>,
    channels: HashMap<SessionId, Arc<Mutex<Channel>>>,
    mixers: HashMap<SessionId, SharedStream>,
    outputs: HashMap<SessionId, OutputEntry>,
}

impl Tables {
    fn contains(&self, id: &SessionId) -> bool {
        self.readers.contains_key(id)
            || self.channels.contains_key(id)
            || self.mixers.contains_key(id)
            || self.outputs.contains_key(id)
    }

    /// Any stream-like entry: reader, channel or mixer.
    fn stream(&self, id: &SessionId) -> Option<SharedStream> {
        if let Some(s) = self.readers.get(id) {
            return Some(s.clone());
        }
        if let Some(c) = self.channels.get(id) {
            return Some(c.clone() as SharedStream);
        }
        self.mixers.get(id).cloned()
    }

    fn fresh_id(&self) -> SessionId {
        loop {
            let id = SessionId::generate();
            if !self.contains(&id) {
                return id;
            }
        }
    }
}

pub struct AudioRegistry {
    tables: RwLock<Tables>,
    backend: Box<dyn OutputBackend>,
    decoder: Box<dyn AudioDecoder>,
}

impl AudioRegistry {
    pub fn new(backend: Box<dyn OutputBackend>, decoder: Box<dyn AudioDecoder>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            backend,
            decoder,
        }
    }

    /// Registry playing through the default output device and decoding
    /// with symphonia.
    pub fn with_cpal(config: EngineConfig) -> Self {
        Self::new(Box::new(CpalBackend::new(config)), Box::new(SymphoniaBackend))
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a decodable file. Nothing is registered on failure.
    pub fn open_reader<P: AsRef<Path>>(&self, path: P) -> EngineResult<SessionId> {
        let path = path.as_ref();
        let stream = self.decoder.open(path)?;
        let id = self.insert_reader(share(stream));
        log::info!("Registry: reader {} opened for {:?}", id, path);
        Ok(id)
    }

    /// Registers an already-open stream as a reader.
    pub fn insert_reader(&self, stream: SharedStream) -> SessionId {
        let mut tables = self.write();
        let id = tables.fresh_id();
        tables.readers.insert(id, stream);
        id
    }

    /// Wraps a reader, channel or mixer in a volume/pan channel.
    pub fn wrap_channel(&self, source: SessionId) -> EngineResult<SessionId> {
        let mut tables = self.write();
        let stream = tables
            .stream(&source)
            .ok_or_else(|| EngineError::NotFound(format!("stream {}", source)))?;
        let channel = Channel::new(stream)?;
        let id = tables.fresh_id();
        tables.channels.insert(id, Arc::new(Mutex::new(channel)));
        log::debug!("Registry: channel {} wraps {}", id, source);
        Ok(id)
    }

    /// Sums several streams. With `auto_stop` the mixer ends when every
    /// input has ended; otherwise it pads with silence.
    pub fn mix_streams(&self, inputs: &[SessionId], auto_stop: bool) -> EngineResult<SessionId> {
        let mut tables = self.write();
        let streams = inputs
            .iter()
            .map(|id| {
                tables
                    .stream(id)
                    .ok_or_else(|| EngineError::NotFound(format!("stream {}", id)))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let mixer = Mixer::new(streams, auto_stop)?;
        let id = tables.fresh_id();
        tables.mixers.insert(id, share(mixer));
        log::debug!("Registry: mixer {} over {} inputs", id, inputs.len());
        Ok(id)
    }

    /// Plays a registered stream on a new output sink. Playback has begun
    /// by the time this returns.
    pub fn open_output(&self, provider: SessionId) -> EngineResult<SessionId> {
        let stream = self
            .read()
            .stream(&provider)
            .ok_or_else(|| EngineError::NotFound(format!("stream {}", provider)))?;
        self.open_output_stream(stream)
    }

    /// Plays an unregistered provider on a new output sink.
    pub fn open_output_stream(&self, provider: SharedStream) -> EngineResult<SessionId> {
        let mut sink = self.backend.open(provider)?;
        sink.start()?;

        let mut tables = self.write();
        let id = tables.fresh_id();
        tables.outputs.insert(
            id,
            OutputEntry {
                sink: Mutex::new(sink),
            },
        );
        log::info!("Registry: output {} started", id);
        Ok(id)
    }

    fn with_output<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut dyn PlaybackSink) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let tables = self.read();
        let entry = tables
            .outputs
            .get(&id)
            .ok_or_else(|| EngineError::NotFound(format!("output {}", id)))?;
        let mut sink = lock(&entry.sink);
        f(&mut **sink)
    }

    pub fn pause_output(&self, id: SessionId) -> EngineResult<()> {
        self.with_output(id, |sink| sink.pause())
    }

    pub fn resume_output(&self, id: SessionId) -> EngineResult<()> {
        self.with_output(id, |sink| sink.start())
    }

    /// Stops an output. The entry stays registered until released.
    pub fn stop_output(&self, id: SessionId) -> EngineResult<()> {
        self.with_output(id, |sink| sink.stop())
    }

    /// Seconds played by an output.
    pub fn elapsed_secs(&self, id: SessionId) -> EngineResult<f64> {
        self.with_output(id, |sink| Ok(sink.clock().elapsed_secs()))
    }

    pub fn playback_state(&self, id: SessionId) -> EngineResult<PlaybackState> {
        self.with_output(id, |sink| Ok(sink.clock().state()))
    }

    fn with_channel<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut Channel) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let channel = self
            .read()
            .channels
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("channel {}", id)))?;
        let mut channel = lock(&channel);
        f(&mut channel)
    }

    pub fn set_volume(&self, id: SessionId, volume: f32) -> EngineResult<()> {
        self.with_channel(id, |c| c.set_volume(volume))
    }

    pub fn set_pan(&self, id: SessionId, pan: f32) -> EngineResult<()> {
        self.with_channel(id, |c| c.set_pan(pan))
    }

    /// The stream registered under `id`, if it is a reader, channel or mixer.
    pub fn stream(&self, id: SessionId) -> Option<SharedStream> {
        self.read().stream(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.read().contains(&id)
    }

    pub fn counts(&self) -> RegistryCounts {
        let tables = self.read();
        RegistryCounts {
            readers: tables.readers.len(),
            channels: tables.channels.len(),
            mixers: tables.mixers.len(),
            outputs: tables.outputs.len(),
        }
    }

    /// Removes an entry, stopping it first if it is an output. Streams
    /// still wrapped by a channel, mixer or output stay alive through
    /// those holders.
    pub fn release(&self, id: SessionId) -> EngineResult<()> {
        let mut tables = self.write();
        let output = tables.outputs.remove(&id);
        if let Some(entry) = output {
            drop(tables);
            let mut sink = entry.sink.into_inner().unwrap_or_else(PoisonError::into_inner);
            sink.stop()?;
            log::info!("Registry: output {} released", id);
            return Ok(());
        }

        let removed = tables.readers.remove(&id).is_some()
            || tables.channels.remove(&id).is_some()
            || tables.mixers.remove(&id).is_some();
        if removed {
            log::debug!("Registry: {} released", id);
            Ok(())
        } else {
            Err(EngineError::NotFound(format!("session {}", id)))
        }
    }

    /// Stops and removes every output. Readers, channels and mixers stay.
    pub fn stop_all(&self) {
        let outputs: Vec<_> = self.write().outputs.drain().collect();
        if outputs.is_empty() {
            return;
        }
        log::info!("Registry: stopping {} outputs", outputs.len());
        for (id, entry) in outputs {
            let mut sink = entry.sink.into_inner().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = sink.stop() {
                log::warn!("Registry: output {} failed to stop: {}", id, e);
            }
        }
    }
}

impl Drop for AudioRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}
