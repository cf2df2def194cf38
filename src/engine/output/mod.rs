//! Playback sinks
//!
//! A sink binds one provider stream to an output device. Opening a sink
//! does not start it; the registry calls [`PlaybackSink::start`] straight
//! after a successful open.

pub mod cpal_backend;
pub mod memory;

use std::sync::Arc;

use crate::engine::clock::Clock;
use crate::engine::error::EngineResult;
use crate::engine::stream::SharedStream;

pub use cpal_backend::{CpalBackend, CpalSink};
pub use memory::{CapturedOutput, MemoryBackend, MemorySink};

pub trait PlaybackSink: Send {
    /// Starts (or resumes) audible playback.
    fn start(&mut self) -> EngineResult<()>;

    /// Pauses playback, keeping the position.
    fn pause(&mut self) -> EngineResult<()>;

    /// Stops playback and releases the device. A stopped sink cannot be
    /// restarted.
    fn stop(&mut self) -> EngineResult<()>;

    /// Position and state of this sink.
    fn clock(&self) -> &Arc<Clock>;
}

/// Opens playback sinks over provider streams.
pub trait OutputBackend: Send + Sync {
    fn open(&self, provider: SharedStream) -> EngineResult<Box<dyn PlaybackSink>>;
}
