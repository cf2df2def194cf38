use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, Stream, StreamConfig};

use crate::engine::buffer::{sample_ring, SampleConsumer, SampleProducer};
use crate::engine::clock::{Clock, PlaybackState};
use crate::engine::config::EngineConfig;
use crate::engine::dsp::resampler::Resampler;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::format::PcmFormat;
use crate::engine::output::{OutputBackend, PlaybackSink};
use crate::engine::stream::{fill_from, PcmStream, SharedStream};

enum SinkCommand {
    Play,
    Pause,
    Stop,
}

/// Opens sinks on the host's default output device.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    config: EngineConfig,
}

impl CpalBackend {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl OutputBackend for CpalBackend {
    fn open(&self, provider: SharedStream) -> EngineResult<Box<dyn PlaybackSink>> {
        Ok(Box::new(CpalSink::open(provider, &self.config)?))
    }
}

/// A provider playing on the default output device.
///
/// The cpal stream lives on its own device thread and is driven through
/// commands. A feeder thread decodes the provider, converts it to the
/// device layout and keeps the ring topped up.
pub struct CpalSink {
    clock: Arc<Clock>,
    commands: Sender<SinkCommand>,
    running: Arc<AtomicBool>,
    device_thread: Option<JoinHandle<()>>,
    feeder_thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    pub fn open(provider: SharedStream, config: &EngineConfig) -> EngineResult<Self> {
        let format = provider.format();
        format.validate()?;

        let clock = Arc::new(Clock::new(format.sample_rate, format.channels));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let device_clock = clock.clone();
        let buffer_secs = config.output_buffer_secs;
        let device_thread = thread::spawn(move || {
            run_device(device_clock, buffer_secs, command_rx, ready_tx);
        });

        let producer = match ready_rx.recv() {
            Ok(Ok(producer)) => producer,
            Ok(Err(e)) => {
                let _ = device_thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = device_thread.join();
                return Err(EngineError::Device("device thread exited during open".into()));
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let feeder = Feeder {
            provider,
            format,
            producer,
            clock: clock.clone(),
            running: running.clone(),
            chunk_frames: config.resample_chunk_frames,
        };
        let feeder_thread = thread::spawn(move || feeder.run());

        log::info!(
            "Output opened: {}Hz/{}ch provider on {}Hz/{}ch device",
            format.sample_rate,
            format.channels,
            clock.sample_rate(),
            clock.channels()
        );

        Ok(Self {
            clock,
            commands: command_tx,
            running,
            device_thread: Some(device_thread),
            feeder_thread: Some(feeder_thread),
        })
    }

    fn send(&self, command: SinkCommand) -> EngineResult<()> {
        self.commands
            .send(command)
            .map_err(|_| EngineError::Device("output device thread has exited".into()))
    }
}

impl PlaybackSink for CpalSink {
    fn start(&mut self) -> EngineResult<()> {
        self.clock.set_state(PlaybackState::Playing);
        self.send(SinkCommand::Play)
    }

    fn pause(&mut self) -> EngineResult<()> {
        self.clock.set_state(PlaybackState::Paused);
        self.send(SinkCommand::Pause)
    }

    fn stop(&mut self) -> EngineResult<()> {
        self.clock.set_state(PlaybackState::Stopped);
        self.running.store(false, Ordering::SeqCst);
        let _ = self.commands.send(SinkCommand::Stop);

        if let Some(handle) = self.feeder_thread.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.device_thread.take() {
            let _ = handle.join();
        }
        Ok(())
    }

    fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Owns the cpal stream for its whole life.
fn run_device(
    clock: Arc<Clock>,
    buffer_secs: f32,
    commands: Receiver<SinkCommand>,
    ready: Sender<EngineResult<SampleProducer>>,
) {
    let (stream, producer) = match build_stream(&clock, buffer_secs) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok(producer)).is_err() {
        return;
    }

    while let Ok(command) = commands.recv() {
        let result = match command {
            SinkCommand::Play => stream.play().map_err(|e| e.to_string()),
            SinkCommand::Pause => stream.pause().map_err(|e| e.to_string()),
            SinkCommand::Stop => break,
        };
        if let Err(e) = result {
            log::warn!("Output device command failed: {}", e);
        }
    }

    let _ = stream.pause();
}

fn build_stream(clock: &Arc<Clock>, buffer_secs: f32) -> EngineResult<(Stream, SampleProducer)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| EngineError::Device("no output device available".into()))?;

    let supported = device
        .default_output_config()
        .map_err(|e| EngineError::Device(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    clock.set_sample_rate(config.sample_rate);
    clock.set_channels(config.channels);

    let capacity = (config.sample_rate as f32 * config.channels as f32 * buffer_secs) as usize;
    let (producer, consumer) = sample_ring(capacity);

    let err_fn = |err: cpal::StreamError| log::error!("Output stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => build_typed::<f32, _>(&device, &config, consumer, clock.clone(), err_fn),
        SampleFormat::I16 => build_typed::<i16, _>(&device, &config, consumer, clock.clone(), err_fn),
        SampleFormat::U16 => build_typed::<u16, _>(&device, &config, consumer, clock.clone(), err_fn),
        other => {
            return Err(EngineError::Device(format!(
                "unsupported device sample format {:?}",
                other
            )))
        }
    }?;

    Ok((stream, producer))
}

fn build_typed<T, E>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: SampleConsumer,
    clock: Arc<Clock>,
    err_fn: E,
) -> EngineResult<Stream>
where
    T: cpal::SizedSample + FromSample<f32>,
    E: FnMut(cpal::StreamError) + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| render(data, &mut consumer, &clock, channels),
            err_fn,
            None,
        )
        .map_err(|e| EngineError::Device(e.to_string()))
}

fn render<T: Sample + FromSample<f32>>(
    data: &mut [T],
    consumer: &mut SampleConsumer,
    clock: &Clock,
    channels: usize,
) {
    if clock.state() != PlaybackState::Playing {
        data.fill(T::from_sample(0.0f32));
        return;
    }

    let taken = consumer.pop_into(data);
    clock.advance((taken / channels) as u64);

    if taken == 0 && clock.is_end_of_stream() {
        clock.set_state(PlaybackState::Stopped);
    }
}

/// Pulls the provider into the ring at the device layout.
struct Feeder {
    provider: SharedStream,
    format: PcmFormat,
    producer: SampleProducer,
    clock: Arc<Clock>,
    running: Arc<AtomicBool>,
    chunk_frames: usize,
}

impl Feeder {
    fn run(mut self) {
        if let Err(e) = self.feed() {
            log::error!("Output feeder stopped: {}", e);
        }
        self.clock.mark_end_of_stream();
    }

    fn feed(&mut self) -> EngineResult<()> {
        let device_rate = self.clock.sample_rate();
        let device_channels = self.clock.channels().max(1) as usize;

        let mut resampler = if device_rate != self.format.sample_rate {
            Some(Resampler::new(
                self.format.sample_rate,
                device_rate,
                device_channels,
                self.chunk_frames,
            )?)
        } else {
            None
        };

        let block_align = self.format.block_align();
        let bytes_per_sample = self.format.bytes_per_sample();
        let mut raw = vec![0u8; self.chunk_frames.max(1) * block_align];
        let mut offset = 0u64;

        loop {
            if !self.running.load(Ordering::Relaxed) {
                return Ok(());
            }

            let n = fill_from(&mut self.provider, offset, &mut raw)?;
            let whole = n - n % block_align;
            if whole == 0 {
                break;
            }
            offset += whole as u64;

            let source: Vec<f32> = raw[..whole]
                .chunks_exact(bytes_per_sample)
                .map(|b| self.format.decode_sample(b))
                .collect();
            let mapped = map_channels(&source, self.format.channels as usize, device_channels);

            let out = match resampler.as_mut() {
                Some(r) => r.process(&mapped)?,
                None => mapped,
            };
            if !self.push(&out) {
                return Ok(());
            }
        }

        if let Some(r) = resampler.as_mut() {
            let tail = r.flush()?;
            self.push(&tail);
        }
        log::debug!("Output feeder drained {} provider bytes", offset);
        Ok(())
    }

    /// Blocks until `samples` are in the ring. False if the sink stopped.
    fn push(&mut self, samples: &[f32]) -> bool {
        let mut pushed = 0;
        while pushed < samples.len() {
            if !self.running.load(Ordering::Relaxed) {
                return false;
            }
            pushed += self.producer.push_slice(&samples[pushed..]);
            if pushed < samples.len() {
                thread::sleep(Duration::from_millis(5));
            }
        }
        true
    }
}

/// Re-lays interleaved frames from `from` channels to `to` channels.
/// Extra output channels repeat the last input channel; fewer output
/// channels get the average of all inputs.
fn map_channels(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to {
        return samples.to_vec();
    }

    let frames = samples.len() / from;
    let mut out = Vec::with_capacity(frames * to);
    for frame in samples.chunks_exact(from) {
        if to > from {
            for ch in 0..to {
                out.push(frame[ch.min(from - 1)]);
            }
        } else {
            let mix = frame.iter().sum::<f32>() / from as f32;
            out.extend(std::iter::repeat(mix).take(to));
        }
    }
    out
}
