//! In-memory microphone for engine and driver tests

use crate::artifact::RecordedAudio;
use crate::audio::{CaptureConfig, CaptureDevice, CaptureError, MicrophoneProvider};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) const FAKE_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Signal {
    Silence,
    Tone { hz: f32, amplitude: f32 },
}

#[derive(Debug, Default)]
struct Counters {
    denied: AtomicBool,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

/// Provider that either hands out a synthetic device or refuses every request
#[derive(Clone)]
pub(crate) struct FakeMicrophone {
    signal: Signal,
    counters: Arc<Counters>,
}

impl FakeMicrophone {
    pub(crate) fn tone(hz: f32, amplitude: f32) -> Self {
        Self {
            signal: Signal::Tone { hz, amplitude },
            counters: Arc::default(),
        }
    }

    pub(crate) fn silent() -> Self {
        Self {
            signal: Signal::Silence,
            counters: Arc::default(),
        }
    }

    pub(crate) fn denied() -> Self {
        let mic = Self::silent();
        mic.set_denied(true);
        mic
    }

    /// Refuse (or allow) every later request, shared by all clones
    pub(crate) fn set_denied(&self, denied: bool) {
        self.counters.denied.store(denied, Ordering::SeqCst);
    }

    pub(crate) fn acquisitions(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }
}

impl MicrophoneProvider for FakeMicrophone {
    type Device = FakeDevice;

    async fn acquire(&self, _config: &CaptureConfig) -> Result<FakeDevice, CaptureError> {
        if self.counters.denied.load(Ordering::SeqCst) {
            return Err(CaptureError::ConfigError("permission denied".to_string()));
        }
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(FakeDevice {
            signal: self.signal,
            held: true,
            paused: false,
            counters: self.counters.clone(),
        })
    }
}

pub(crate) struct FakeDevice {
    signal: Signal,
    held: bool,
    paused: bool,
    counters: Arc<Counters>,
}

impl CaptureDevice for FakeDevice {
    fn sample_rate(&self) -> u32 {
        FAKE_SAMPLE_RATE
    }

    fn latest_samples(&self, count: usize) -> Vec<f32> {
        match self.signal {
            Signal::Tone { hz, amplitude } if self.held && !self.paused => (0..count)
                .map(|i| {
                    let t = i as f32 / FAKE_SAMPLE_RATE as f32;
                    amplitude * (2.0 * std::f32::consts::PI * hz * t).sin()
                })
                .collect(),
            _ => vec![0.0; count],
        }
    }

    fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    fn release(&mut self) -> Option<RecordedAudio> {
        if !self.held {
            return None;
        }
        self.held = false;
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        Some(RecordedAudio::new(FAKE_SAMPLE_RATE, vec![0; 4410]))
    }
}
