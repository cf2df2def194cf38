//! Engine error types

use thiserror::Error;

/// Errors surfaced by the audio pipeline, the registry and the DSP constructors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad sample rate, frequency, Q, gain or band configuration
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No stream or filter bank was handed to the pipeline
    #[error("No {0} supplied to the pipeline")]
    MissingSource(&'static str),

    /// A chunk request fell outside the declared stream length
    #[error("Read of {count} bytes at offset {offset} is out of range for a {len}-byte stream")]
    OutOfRange { offset: u64, count: usize, len: u64 },

    /// The pipeline was re-entered while a run was still in flight
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Filtering was requested before the working buffer was loaded
    #[error("Filter stage invoked before the working buffer was loaded")]
    NullBuffer,

    /// A path or session identifier does not refer to anything
    #[error("Audio resource not found: {0}")]
    NotFound(String),

    /// The source cannot be decoded or has an unsupported sample layout
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The source stopped producing bytes before its declared length
    #[error("Source ended after {read} of {expected} bytes")]
    UnexpectedEof { read: u64, expected: u64 },

    /// A run was cancelled through its cancel token
    #[error("Pipeline run cancelled")]
    Cancelled,

    /// Decoding failed after the source was opened
    #[error("Decode error: {0}")]
    Decode(String),

    /// Sample rate conversion failed
    #[error("Resampler error: {0}")]
    Resample(String),

    /// The playback device could not be opened or driven
    #[error("Audio device error: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
