//! Byte-scaled frequency analysis
//!
//! Mirrors what a browser analyser node hands back from
//! `getByteFrequencyData`: Blackman-windowed FFT magnitudes, smoothed over
//! time, converted to decibels and mapped from `[min_decibels, max_decibels]`
//! onto `0..=255`. The volume analyzer consumes these bins.

use super::AnalysisConfig;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// FFT analyzer producing `fft_size / 2` byte bins per frame
pub struct ByteSpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    min_decibels: f32,
    max_decibels: f32,
    smoothing: f32,

    // Smoothed linear magnitudes from the previous frame
    smoothed: Vec<f32>,
}

impl ByteSpectrumAnalyzer {
    /// Create new analyzer
    pub fn new(config: &AnalysisConfig) -> Self {
        let fft_size = config.fft_size.max(2);

        // Blackman window
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                let x = 2.0 * std::f32::consts::PI * i as f32 / fft_size as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft,
            fft_size,
            window,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            smoothing: config.smoothing_time_constant.clamp(0.0, 1.0),
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    /// Number of bins returned by [`analyze`](Self::analyze)
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyze the most recent `fft_size` samples of `samples`.
    ///
    /// Short input is zero-padded at the front so the newest sample always
    /// sits at the end of the window.
    pub fn analyze(&mut self, samples: &[f32]) -> Vec<u8> {
        let take = samples.len().min(self.fft_size);
        let pad = self.fft_size - take;
        let recent = &samples[samples.len() - take..];

        let mut buffer: Vec<Complex<f32>> = std::iter::repeat(0.0)
            .take(pad)
            .chain(recent.iter().copied())
            .zip(self.window.iter())
            .map(|(s, &w)| Complex::new(s * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        let norm = 1.0 / self.fft_size as f32;
        let range = (self.max_decibels - self.min_decibels).max(f32::EPSILON);
        let scale = 255.0 / range;

        buffer
            .iter()
            .take(self.bin_count())
            .zip(self.smoothed.iter_mut())
            .map(|(c, prev)| {
                let magnitude = c.norm() * norm;
                *prev = self.smoothing * *prev + (1.0 - self.smoothing) * magnitude;

                if *prev <= 0.0 {
                    return 0;
                }
                let db = 20.0 * prev.log10();
                (scale * (db - self.min_decibels)).floor().clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}
