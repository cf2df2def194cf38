use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Playback state of a single output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl From<u8> for PlaybackState {
    fn from(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }
}

/// Position and state of one output device.
///
/// Written by the device callback, read by the UI through the registry.
/// Every field is atomic so neither side ever blocks the other.
pub struct Clock {
    /// Frames handed to the device so far.
    frames_played: AtomicU64,
    /// Device rate in Hz.
    sample_rate: AtomicU32,
    /// Device channel count.
    channels: AtomicU16,
    state: AtomicU8,
    /// Set by the feeder once the provider has nothing left to give.
    end_of_stream: AtomicBool,
}

impl Clock {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            frames_played: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            channels: AtomicU16::new(channels),
            state: AtomicU8::new(PlaybackState::Stopped as u8),
            end_of_stream: AtomicBool::new(false),
        }
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    /// Advances the position. Ignored unless playing.
    pub fn advance(&self, frames: u64) {
        if self.state() == PlaybackState::Playing {
            self.frames_played.fetch_add(frames, Ordering::Relaxed);
        }
    }

    /// Elapsed playback time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        let rate = self.sample_rate() as f64;
        if rate > 0.0 {
            self.frames_played() as f64 / rate
        } else {
            0.0
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: PlaybackState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn set_sample_rate(&self, rate: u32) {
        self.sample_rate.store(rate, Ordering::SeqCst);
    }

    pub fn channels(&self) -> u16 {
        self.channels.load(Ordering::Relaxed)
    }

    pub fn set_channels(&self, channels: u16) {
        self.channels.store(channels, Ordering::SeqCst);
    }

    pub fn mark_end_of_stream(&self) {
        self.end_of_stream.store(true, Ordering::SeqCst);
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.end_of_stream.load(Ordering::Relaxed)
    }
}
