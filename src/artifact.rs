//! Captured audio handed to the caller when a session completes
//!
//! Scorers never look inside the recording; it travels alongside the score
//! so the lesson layer can play it back or store it.

use hound::{SampleFormat, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Artifact errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Recording is empty")]
    Empty,
}

/// Mono 16-bit PCM captured by the recorder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedAudio {
    pub sample_rate: u32,

    #[serde(skip)]
    pub samples: Vec<i16>,
}

impl RecordedAudio {
    pub fn new(sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            sample_rate,
            samples,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length of the recording
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Write the recording as a mono 16-bit WAV file
    pub fn write_wav<P: AsRef<Path>>(&self, output_path: P) -> Result<(), ArtifactError> {
        if self.samples.is_empty() {
            return Err(ArtifactError::Empty);
        }

        let spec = WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };

        let mut writer = WavWriter::create(output_path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

/// Everything a finished session leaves behind besides its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionArtifact {
    /// Recorder output, absent when the device produced nothing
    pub audio: Option<RecordedAudio>,

    /// Raw per-tick volume readings
    pub volume_history: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_follows_sample_rate() {
        let audio = RecordedAudio::new(16000, vec![0; 8000]);
        assert_eq!(audio.duration(), Duration::from_millis(500));
        assert_eq!(RecordedAudio::new(0, vec![1, 2]).duration(), Duration::ZERO);
    }

    #[test]
    fn write_wav_round_trips_through_hound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let audio = RecordedAudio::new(22050, vec![0, 1000, -1000, i16::MAX]);

        audio.write_wav(&path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 22050);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, audio.samples);
    }

    #[test]
    fn empty_recording_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let result = RecordedAudio::new(16000, Vec::new()).write_wav(dir.path().join("x.wav"));
        assert!(matches!(result, Err(ArtifactError::Empty)));
    }
}
