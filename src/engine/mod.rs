pub mod buffer;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod stream;
