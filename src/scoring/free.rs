//! Free recording: no target length, reward a loud and steady voice

use super::Assessment;
use crate::audio::volume::{average, variance};

/// Average volume that earns full loudness credit
pub const FULL_LOUDNESS_VOLUME: f64 = 60.0;

const LOUDNESS_WEIGHT: f64 = 0.6;
const STABILITY_WEIGHT: f64 = 0.4;

/// 0-100 credit for how loud the attempt was on average
pub fn loudness(volumes: &[f32]) -> f64 {
    (average(volumes) as f64 / FULL_LOUDNESS_VOLUME * 100.0).min(100.0)
}

/// 0-100 credit for a steady envelope; every point of standard deviation costs 5
pub fn stability(volumes: &[f32]) -> f64 {
    (100.0 - (variance(volumes) as f64).sqrt() * 5.0).max(0.0)
}

/// Score a free recording. A session without any ticks scores zero.
pub fn score(volumes: &[f32], pass_score: u8) -> Assessment {
    if volumes.is_empty() {
        return Assessment::from_score(0, pass_score);
    }

    let blended = loudness(volumes) * LOUDNESS_WEIGHT + stability(volumes) * STABILITY_WEIGHT;
    let score = blended.floor().clamp(0.0, 100.0) as u8;

    Assessment::from_score(score, pass_score)
}
