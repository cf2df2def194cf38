//! deckeq demo: equalize one track and play it
//!
//! ```text
//! deckeq <file> [gain_db ...] [--bands 3|7|10] [--offline] [--config engine.yaml]
//! ```
//!
//! Gains are paired with the bands from the lowest up; missing gains leave
//! their bands out. `--offline` renders into memory instead of opening the
//! sound card.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use deckeq::engine::clock::PlaybackState;
use deckeq::engine::decoder::SymphoniaBackend;
use deckeq::engine::output::MemoryBackend;
use deckeq::{AudioEngine, AudioRegistry, EngineConfig};

struct Args {
    path: PathBuf,
    gains_db: Vec<f32>,
    bands: usize,
    offline: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut path = None;
    let mut gains_db = Vec::new();
    let mut bands = 3;
    let mut offline = false;
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--offline" => offline = true,
            "--bands" => {
                let value = args.next().ok_or("--bands needs a value")?;
                bands = value.parse().map_err(|_| format!("bad band count: {}", value))?;
            }
            "--config" => {
                config = Some(PathBuf::from(args.next().ok_or("--config needs a path")?));
            }
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => gains_db.push(arg.parse().map_err(|_| format!("bad gain: {}", arg))?),
        }
    }

    Ok(Args {
        path: path.ok_or("usage: deckeq <file> [gain_db ...] [--bands 3|7|10] [--offline] [--config engine.yaml]")?,
        gains_db,
        bands,
        offline,
        config,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => EngineConfig::load(path),
        None => EngineConfig::default(),
    };

    let memory = MemoryBackend::new();
    let engine = if args.offline {
        let registry = AudioRegistry::new(Box::new(memory.clone()), Box::new(SymphoniaBackend));
        AudioEngine::with_registry(Arc::new(registry), config)
    } else {
        AudioEngine::new(config)?
    };

    let track = engine.load(&args.path)?;
    let layout = engine.layout(args.bands)?;
    let gains = engine.clamp_gains(&args.gains_db);

    println!("Bands:");
    for (freq, label) in layout.frequencies().iter().zip(engine.gain_labels(&gains)) {
        println!("  {:>7.0} Hz  {}", freq, label);
    }

    let outcome = engine.equalize(0, track, &layout, &gains)?.join()?;
    let output = match outcome.output {
        Some(id) => id,
        None => {
            println!("Track is empty, nothing to play.");
            return Ok(());
        }
    };

    if args.offline {
        let bytes: usize = memory.captured().iter().map(|c| c.data.len()).sum();
        println!(
            "Rendered {} bytes ({:.2} s) offline.",
            bytes,
            engine.elapsed_secs(output)?
        );
        return Ok(());
    }

    println!("Playing output {}.", output);
    while engine.playback_state(output)? == PlaybackState::Playing {
        print!("\rPlayback time: {:.2} seconds", engine.elapsed_secs(output)?);
        std::io::stdout().flush()?;
        thread::sleep(Duration::from_millis(250));
    }
    println!();

    engine.stop(output)?;
    println!("Done.");
    Ok(())
}
