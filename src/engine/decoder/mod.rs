pub mod memory;
pub mod symphonia_decoder;

use std::path::Path;

use crate::engine::error::EngineResult;
use crate::engine::stream::PcmStream;

pub use memory::MemorySource;
pub use symphonia_decoder::SymphoniaDecoder;

/// Opens files as decoded PCM streams.
pub trait AudioDecoder: Send + Sync {
    /// Opens `path` for chunked random-access reads. Fails with `NotFound` if
    /// the file is missing and `UnsupportedFormat` if it cannot be decoded.
    fn open(&self, path: &Path) -> EngineResult<Box<dyn PcmStream>>;
}

/// Decodes through symphonia's default codec and format registries.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaBackend;

impl AudioDecoder for SymphoniaBackend {
    fn open(&self, path: &Path) -> EngineResult<Box<dyn PcmStream>> {
        Ok(Box::new(SymphoniaDecoder::open(path)?))
    }
}
