//! Buffered transform pipeline
//!
//! Pulls a whole stream into memory in fixed-size chunks, runs every sample
//! through an equalizer bank and hands the result to the registry as a new
//! output. A pipeline runs one job at a time:
//!
//! `Idle -> Loading -> Filtering -> Delivering -> Idle`
//!
//! All buffers and filter state belong to the [`RunContext`] of a single
//! run, so separate pipelines (one per deck) never share anything but the
//! registry.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::engine::config::EngineConfig;
use crate::engine::decoder::MemorySource;
use crate::engine::dsp::eq::EqualizerBank;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::format::PcmFormat;
use crate::engine::registry::AudioRegistry;
use crate::engine::session::SessionId;
use crate::engine::stream::{share, PcmStream, SharedStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Loading = 1,
    Filtering = 2,
    Delivering = 3,
}

impl From<u8> for PipelineState {
    fn from(value: u8) -> Self {
        match value {
            1 => PipelineState::Loading,
            2 => PipelineState::Filtering,
            3 => PipelineState::Delivering,
            _ => PipelineState::Idle,
        }
    }
}

/// Cooperative cancellation flag, checked between chunks and between
/// filter batches.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> EngineResult<()> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Output session playing the filtered audio. `None` for an empty source.
    pub output: Option<SessionId>,
    pub bytes_processed: u64,
}

/// Everything one run owns: the source, its working and output buffers,
/// and a filter bank per interleaved channel.
pub struct RunContext {
    source: SharedStream,
    format: PcmFormat,
    len: u64,
    banks: Vec<EqualizerBank>,
    working: Option<Vec<u8>>,
    output: Option<Vec<u8>>,
    chunk_size: usize,
    batch_bytes: usize,
    cancel: CancelToken,
}

impl RunContext {
    pub fn new(
        source: Option<SharedStream>,
        bank: Option<&EqualizerBank>,
        config: &EngineConfig,
        cancel: CancelToken,
    ) -> EngineResult<Self> {
        let source = source.ok_or(EngineError::MissingSource("stream"))?;
        let bank = bank.ok_or(EngineError::MissingSource("filter bank"))?;

        let format = source.format();
        format.validate()?;
        if !bank.is_empty() && bank.sample_rate() != format.sample_rate as f32 {
            return Err(EngineError::InvalidParameter(format!(
                "filter bank designed for {} Hz cannot process a {} Hz stream",
                bank.sample_rate(),
                format.sample_rate
            )));
        }

        let batch_bytes = config
            .filter_batch_frames
            .max(1)
            .checked_mul(format.block_align())
            .ok_or_else(|| {
                EngineError::InvalidParameter(format!(
                    "filter batch of {} frames is too large",
                    config.filter_batch_frames
                ))
            })?;

        let mut channel_bank = bank.clone();
        channel_bank.reset();
        let banks = vec![channel_bank; format.channels as usize];

        Ok(Self {
            len: source.byte_len(),
            source,
            format,
            banks,
            working: None,
            output: None,
            chunk_size: config.chunk_size.max(1),
            batch_bytes,
            cancel,
        })
    }

    pub fn byte_len(&self) -> u64 {
        self.len
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Reads up to `count` bytes at `offset` into the working buffer and
    /// returns how many arrived.
    pub fn load_chunk(&mut self, offset: u64, count: usize) -> EngineResult<usize> {
        let len = self.len;
        let in_range = count > 0
            && offset
                .checked_add(count as u64)
                .map_or(false, |end| end <= len);
        if !in_range {
            return Err(EngineError::OutOfRange { offset, count, len });
        }

        let working = self.working.get_or_insert_with(|| vec![0u8; len as usize]);
        let start = offset as usize;
        self.source.read(offset, &mut working[start..start + count])
    }

    /// Loading: sequential chunk reads until the declared length is in.
    pub fn load(&mut self) -> EngineResult<()> {
        self.working = Some(vec![0u8; self.len as usize]);

        let mut offset = 0u64;
        while offset < self.len {
            self.cancel.check()?;
            let count = (self.len - offset).min(self.chunk_size as u64) as usize;
            let n = self.load_chunk(offset, count)?;
            if n == 0 {
                return Err(EngineError::UnexpectedEof {
                    read: offset,
                    expected: self.len,
                });
            }
            offset += n as u64;
        }

        log::debug!("Pipeline: loaded {} bytes", offset);
        Ok(())
    }

    /// Filtering: decode, cascade, re-encode, sample by sample.
    pub fn filter(&mut self) -> EngineResult<()> {
        let working = self.working.as_ref().ok_or(EngineError::NullBuffer)?;

        let bytes_per_sample = self.format.bytes_per_sample();
        let channels = self.format.channels as usize;
        let whole = working.len() - working.len() % bytes_per_sample;
        let batch_bytes = self.batch_bytes;

        let mut output = vec![0u8; working.len()];
        let mut sample_index = 0usize;

        for (src, dst) in working[..whole]
            .chunks(batch_bytes)
            .zip(output[..whole].chunks_mut(batch_bytes))
        {
            self.cancel.check()?;
            for (s, d) in src
                .chunks_exact(bytes_per_sample)
                .zip(dst.chunks_exact_mut(bytes_per_sample))
            {
                let bank = &mut self.banks[sample_index % channels];
                let y = bank.transform(self.format.decode_sample(s));
                self.format.encode_sample(y, d);
                sample_index += 1;
            }
            thread::yield_now();
        }

        if whole < working.len() {
            log::warn!(
                "Pipeline: {} trailing bytes do not form a sample, copied unfiltered",
                working.len() - whole
            );
            output[whole..].copy_from_slice(&working[whole..]);
        }

        self.output = Some(output);
        Ok(())
    }

    /// Delivering: registers the filtered buffer as a new output, which
    /// starts playing at once. An empty buffer registers nothing.
    pub fn deliver(&mut self, registry: &AudioRegistry) -> EngineResult<Option<SessionId>> {
        let output = self.output.take().ok_or(EngineError::NullBuffer)?;
        if output.is_empty() {
            return Ok(None);
        }
        self.cancel.check()?;

        let provider = share(MemorySource::new(self.format, output));
        registry.open_output_stream(provider).map(Some)
    }

    /// Filtered bytes, once filtering has run.
    pub fn into_output(self) -> Option<Vec<u8>> {
        self.output
    }
}

/// Resets the pipeline to `Idle` however the run ends.
struct RunGuard {
    state: Arc<AtomicU8>,
}

impl RunGuard {
    fn enter(&self, state: PipelineState) {
        log::debug!("Pipeline: -> {:?}", state);
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.store(PipelineState::Idle as u8, Ordering::SeqCst);
    }
}

/// A pipeline bound to a registry. One run at a time; use one pipeline
/// per deck for concurrent runs.
pub struct EqualizerPipeline {
    registry: Arc<AudioRegistry>,
    config: EngineConfig,
    state: Arc<AtomicU8>,
}

impl EqualizerPipeline {
    pub fn new(registry: Arc<AudioRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            state: Arc::new(AtomicU8::new(PipelineState::Idle as u8)),
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_busy(&self) -> bool {
        self.state() != PipelineState::Idle
    }

    /// Filters `source` through `bank` and starts playing the result.
    /// Blocks until the run has been delivered.
    pub fn apply_equalizer(
        &self,
        source: Option<SharedStream>,
        bank: Option<&EqualizerBank>,
    ) -> EngineResult<RunOutcome> {
        self.apply_equalizer_with_cancel(source, bank, CancelToken::new())
    }

    pub fn apply_equalizer_with_cancel(
        &self,
        source: Option<SharedStream>,
        bank: Option<&EqualizerBank>,
        cancel: CancelToken,
    ) -> EngineResult<RunOutcome> {
        let ctx = RunContext::new(source, bank, &self.config, cancel)?;
        let guard = self.claim()?;
        execute(ctx, &guard, &self.registry)
    }

    /// Runs on a background thread. A busy pipeline is reported here, not
    /// through the handle.
    pub fn spawn(&self, source: Option<SharedStream>, bank: Option<&EqualizerBank>) -> EngineResult<RunHandle> {
        let cancel = CancelToken::new();
        let ctx = RunContext::new(source, bank, &self.config, cancel.clone())?;
        let guard = self.claim()?;
        let registry = self.registry.clone();

        let thread = thread::spawn(move || {
            let result = execute(ctx, &guard, &registry);
            if let Err(e) = &result {
                log::warn!("Pipeline: background run failed: {}", e);
            }
            result
        });

        Ok(RunHandle { cancel, thread })
    }

    fn claim(&self) -> EngineResult<RunGuard> {
        self.state
            .compare_exchange(
                PipelineState::Idle as u8,
                PipelineState::Loading as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|current| {
                EngineError::InvalidState(format!(
                    "pipeline is busy ({:?})",
                    PipelineState::from(current)
                ))
            })?;
        Ok(RunGuard {
            state: self.state.clone(),
        })
    }
}

fn execute(mut ctx: RunContext, guard: &RunGuard, registry: &AudioRegistry) -> EngineResult<RunOutcome> {
    log::info!(
        "Pipeline: run started over {} bytes ({} Hz, {} ch)",
        ctx.byte_len(),
        ctx.format().sample_rate,
        ctx.format().channels
    );

    guard.enter(PipelineState::Loading);
    ctx.load()?;

    guard.enter(PipelineState::Filtering);
    ctx.filter()?;

    guard.enter(PipelineState::Delivering);
    let output = ctx.deliver(registry)?;

    match output {
        Some(id) => log::info!("Pipeline: run delivered to output {}", id),
        None => log::info!("Pipeline: empty source, nothing delivered"),
    }
    Ok(RunOutcome {
        output,
        bytes_processed: ctx.byte_len(),
    })
}

/// A run in flight on its own thread.
pub struct RunHandle {
    cancel: CancelToken,
    thread: JoinHandle<EngineResult<RunOutcome>>,
}

impl RunHandle {
    /// Asks the run to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn join(self) -> EngineResult<RunOutcome> {
        self.thread
            .join()
            .map_err(|_| EngineError::InvalidState("pipeline thread panicked".into()))?
    }
}
