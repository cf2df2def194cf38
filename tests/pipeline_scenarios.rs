use std::fs;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use deckeq::engine::decoder::{MemorySource, SymphoniaBackend};
use deckeq::engine::format::PcmFormat;
use deckeq::engine::output::MemoryBackend;
use deckeq::engine::stream::{share, PcmStream};
use deckeq::{
    AudioEngine, AudioRegistry, EngineConfig, EngineError, EngineResult, EqualizerBank,
    EqualizerPipeline, PipelineState,
};

fn offline_registry() -> (Arc<AudioRegistry>, MemoryBackend) {
    let backend = MemoryBackend::new();
    let registry = AudioRegistry::new(Box::new(backend.clone()), Box::new(SymphoniaBackend));
    (Arc::new(registry), backend)
}

fn to_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Filters interleaved stereo the slow way, one bank per side.
fn reference(bank: &EqualizerBank, interleaved: &[f32]) -> Vec<f32> {
    let mut left = bank.clone();
    let mut right = bank.clone();
    left.reset();
    right.reset();
    interleaved
        .chunks_exact(2)
        .flat_map(|f| [left.transform(f[0]), right.transform(f[1])])
        .collect()
}

/// Blocks its first read until the test lets it through.
struct GatedSource {
    inner: MemorySource,
    gate: Option<Receiver<()>>,
}

impl GatedSource {
    fn new(inner: MemorySource) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                inner,
                gate: Some(rx),
            },
            tx,
        )
    }
}

impl PcmStream for GatedSource {
    fn format(&self) -> PcmFormat {
        self.inner.format()
    }

    fn byte_len(&self) -> u64 {
        self.inner.byte_len()
    }

    fn read(&mut self, offset: u64, buf: &mut [u8]) -> EngineResult<usize> {
        if let Some(gate) = self.gate.take() {
            let _ = gate.recv();
        }
        self.inner.read(offset, buf)
    }
}

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
    fs::write(path, bytes).unwrap();
}

#[test]
fn concurrent_decks_do_not_cross_talk() {
    let (registry, backend) = offline_registry();
    let config = EngineConfig::default();
    let deck_a = EqualizerPipeline::new(registry.clone(), config.clone());
    let deck_b = EqualizerPipeline::new(registry.clone(), config);

    let input_a: Vec<f32> = (0..20_000).map(|i| ((i * 13) % 97) as f32 / 97.0 - 0.5).collect();
    let input_b: Vec<f32> = (0..30_000).map(|i| ((i * 29) % 53) as f32 / 106.0).collect();
    let bank_a = EqualizerBank::graphic_3(44100.0, &[9.0, -3.0, 6.0]).unwrap();
    let bank_b = EqualizerBank::graphic_10(44100.0, &[-12.0, 4.0, 0.0, 2.0]).unwrap();

    let run_a = deck_a
        .spawn(
            Some(share(MemorySource::from_samples(44100, 2, &input_a))),
            Some(&bank_a),
        )
        .unwrap();
    let run_b = deck_b
        .spawn(
            Some(share(MemorySource::from_samples(44100, 2, &input_b))),
            Some(&bank_b),
        )
        .unwrap();

    let out_a = run_a.join().unwrap();
    let out_b = run_b.join().unwrap();
    assert!(out_a.output.is_some());
    assert!(out_b.output.is_some());
    assert_ne!(out_a.output, out_b.output);

    let captured = backend.captured();
    assert_eq!(captured.len(), 2);
    let played_a = captured.iter().find(|c| c.data.len() == input_a.len() * 4).unwrap();
    let played_b = captured.iter().find(|c| c.data.len() == input_b.len() * 4).unwrap();

    assert_eq!(to_samples(&played_a.data), reference(&bank_a, &input_a));
    assert_eq!(to_samples(&played_b.data), reference(&bank_b, &input_b));
}

#[test]
fn empty_stream_registers_nothing() {
    let (registry, backend) = offline_registry();
    let pipeline = EqualizerPipeline::new(registry.clone(), EngineConfig::default());
    let bank = EqualizerBank::graphic_7(44100.0, &[3.0; 7]).unwrap();

    let outcome = pipeline
        .apply_equalizer(Some(share(MemorySource::from_samples(44100, 2, &[]))), Some(&bank))
        .unwrap();

    assert!(outcome.output.is_none());
    assert_eq!(outcome.bytes_processed, 0);
    assert_eq!(registry.counts().outputs, 0);
    assert!(backend.captured().is_empty());
}

#[test]
fn missing_file_leaves_readers_untouched() {
    let (registry, _) = offline_registry();
    let dir = tempfile::tempdir().unwrap();
    let before = registry.counts().readers;

    let result = registry.open_reader(dir.path().join("no-such-track.mp3"));

    assert!(matches!(result, Err(EngineError::NotFound(_))));
    assert_eq!(registry.counts().readers, before);
}

#[test]
fn busy_pipeline_rejects_a_second_run() {
    let (registry, _) = offline_registry();
    let pipeline = EqualizerPipeline::new(registry.clone(), EngineConfig::default());
    let bank = EqualizerBank::graphic_3(44100.0, &[1.0, 2.0, 3.0]).unwrap();

    let (gated, gate) = GatedSource::new(MemorySource::from_samples(44100, 2, &[0.1; 4096]));
    let first = pipeline.spawn(Some(share(gated)), Some(&bank)).unwrap();
    assert!(pipeline.is_busy());

    let second = pipeline.apply_equalizer(
        Some(share(MemorySource::from_samples(44100, 2, &[0.1; 64]))),
        Some(&bank),
    );
    assert!(matches!(second, Err(EngineError::InvalidState(_))));

    gate.send(()).unwrap();
    assert!(first.join().unwrap().output.is_some());
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn cancelled_run_registers_nothing() {
    let (registry, backend) = offline_registry();
    let pipeline = EqualizerPipeline::new(registry.clone(), EngineConfig::default());
    let bank = EqualizerBank::graphic_3(44100.0, &[6.0, 6.0, 6.0]).unwrap();

    // Several chunks, so the loader reaches a checkpoint after the gate.
    let (gated, gate) = GatedSource::new(MemorySource::from_samples(44100, 2, &[0.3; 8192]));
    let run = pipeline.spawn(Some(share(gated)), Some(&bank)).unwrap();
    run.cancel();
    // The run may already have stopped and dropped the gate.
    let _ = gate.send(());

    assert!(matches!(run.join(), Err(EngineError::Cancelled)));
    assert_eq!(registry.counts().outputs, 0);
    assert!(backend.captured().is_empty());
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn decoded_track_through_a_flat_equalizer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("track.wav");
    let pcm: Vec<i16> = (0..8820).map(|i| ((i % 200) as i16 - 100) * 100).collect();
    write_wav(&path, 44100, 2, &pcm);

    let backend = MemoryBackend::new();
    let registry = AudioRegistry::new(Box::new(backend.clone()), Box::new(SymphoniaBackend));
    let engine = AudioEngine::with_registry(Arc::new(registry), EngineConfig::default());

    let track = engine.load(&path).unwrap();
    let layout = engine.layout(10).unwrap();
    let outcome = engine
        .equalize(0, track, &layout, &[0.0; 10])
        .unwrap()
        .join()
        .unwrap();

    let output = outcome.output.unwrap();
    assert!((engine.elapsed_secs(output).unwrap() - 0.1).abs() < 1e-9);

    let played = to_samples(&backend.captured()[0].data);
    assert_eq!(played.len(), pcm.len());
    for (out, &raw) in played.iter().zip(&pcm) {
        assert!((out - raw as f32 / 32768.0).abs() < 1e-3);
    }
}

#[test]
fn channel_and_mixer_feed_an_output() {
    let (registry, backend) = offline_registry();
    let a = registry.insert_reader(share(MemorySource::from_samples(44100, 2, &[0.5; 8])));
    let b = registry.insert_reader(share(MemorySource::from_samples(44100, 2, &[0.25; 4])));

    let quiet = registry.wrap_channel(a).unwrap();
    registry.set_volume(quiet, 0.5).unwrap();
    let mix = registry.mix_streams(&[quiet, b], true).unwrap();
    registry.open_output(mix).unwrap();

    let played = to_samples(&backend.captured()[0].data);
    assert_eq!(played.len(), 8);
    for &s in &played[..4] {
        assert!((s - 0.5).abs() < 1e-6);
    }
    for &s in &played[4..] {
        assert!((s - 0.25).abs() < 1e-6);
    }
}
