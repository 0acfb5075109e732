//! Echo exercise: repeat a prompt at a similar loudness and length
//!
//! Up to 60 points for volume and 40 for matching the prompt's duration.

use super::Assessment;
use crate::audio::volume::average;

/// Maximum points from loudness
pub const VOLUME_POINTS: f64 = 60.0;

/// Maximum points from duration match
pub const DURATION_POINTS: f64 = 40.0;

/// Loudness credit: linear in average volume, capped at [`VOLUME_POINTS`].
/// Below the minimum threshold the credit shrinks further by `avg / threshold`.
pub fn volume_points(average_volume: f64, min_volume_threshold: f64) -> f64 {
    let avg = average_volume.max(0.0);
    let points = (avg / 100.0 * VOLUME_POINTS).min(VOLUME_POINTS);

    if min_volume_threshold > 0.0 && avg < min_volume_threshold {
        points * (avg / min_volume_threshold)
    } else {
        points
    }
}

/// Duration credit: full within half a second, then 30/20/10 through the
/// next three half-second bands, then losing 10 points per second beyond 2 s
pub fn duration_points(actual_seconds: f64, target_seconds: f64) -> f64 {
    let error = (actual_seconds - target_seconds).abs();

    if error <= 0.5 {
        DURATION_POINTS
    } else if error <= 1.0 {
        30.0
    } else if error <= 1.5 {
        20.0
    } else if error <= 2.0 {
        10.0
    } else {
        (10.0 - (error - 2.0) * 10.0).max(0.0)
    }
}

/// Score an echo attempt
pub fn score(
    volumes: &[f32],
    elapsed_seconds: f64,
    min_volume_threshold: f32,
    target_duration_seconds: f64,
    pass_score: u8,
) -> Assessment {
    let avg = average(volumes) as f64;
    let total = volume_points(avg, min_volume_threshold as f64)
        + duration_points(elapsed_seconds, target_duration_seconds);

    let score = total.clamp(0.0, 100.0).round() as u8;
    log::debug!(
        "Echo score {} (avg volume {:.1}, {:.2}s of {:.2}s)",
        score,
        avg,
        elapsed_seconds,
        target_duration_seconds
    );
    Assessment::from_score(score, pass_score)
}
