//! Audio capture and per-tick analysis

mod capture;
mod fft;
mod sources;
pub mod pitch;
pub mod volume;

pub use capture::{
    AudioBuffer, CaptureConfig, CaptureDevice, CaptureError, CpalMicrophone, MicrophoneCapture,
    MicrophoneProvider,
};
pub use fft::ByteSpectrumAnalyzer;
pub use pitch::{cents_deviation, detect_pitch, SustainedMatch};
pub use sources::{list_microphones, Microphone, SourceError};
pub use volume::normalized_volume;

use serde::{Deserialize, Serialize};

/// Analysis tick configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Interval between analysis ticks in milliseconds
    pub tick_interval_ms: u64,

    /// FFT window size; the analyser yields `fft_size / 2` bins
    pub fft_size: usize,

    /// Number of time-domain samples handed to the pitch detector
    pub pitch_frame_size: usize,

    /// Magnitude (dB) mapped to byte value 0
    pub min_decibels: f32,

    /// Magnitude (dB) mapped to byte value 255
    pub max_decibels: f32,

    /// Blend factor with the previous spectrum (0-1)
    pub smoothing_time_constant: f32,

    /// Headroom multiplier applied to the mean bin level
    pub volume_gain: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            fft_size: 2048,
            pitch_frame_size: 2048,
            min_decibels: -100.0,
            max_decibels: -30.0,
            smoothing_time_constant: 0.8,
            volume_gain: 2.0,
        }
    }
}

impl AnalysisConfig {
    /// Number of frequency bins produced per frame
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Samples the capture buffer must hold to serve both analysers
    pub fn frame_len(&self) -> usize {
        self.fft_size.max(self.pitch_frame_size)
    }
}
