//! Pitch-match scoring: hold the target note for the sustain window

use super::Assessment;
use crate::audio::pitch::SustainedMatch;

/// Score a pitch-match attempt from its per-tick pitch history.
///
/// The score is the longest unbroken in-tune run as a share of the sustain
/// window, capped at 100. Passing requires one run that reaches the window.
pub fn score(
    pitches: &[Option<f32>],
    tick_ms: u64,
    target_hz: f32,
    tolerance_cents: f32,
    sustain_ms: u64,
) -> Assessment {
    let mut tracker = SustainedMatch::new(target_hz, tolerance_cents, sustain_ms);
    for pitch in pitches {
        tracker.observe(*pitch, tick_ms);
    }

    let ratio = tracker.longest_ms() as f64 / sustain_ms.max(1) as f64;
    let score = (ratio * 100.0).floor().clamp(0.0, 100.0) as u8;

    log::debug!(
        "Pitch match score {}: longest run {} ms of {} ms",
        score,
        tracker.longest_ms(),
        sustain_ms
    );
    Assessment {
        score,
        passed: tracker.is_matched(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_seconds_in_tune_passes() {
        let pitches = vec![Some(442.0); 20];
        let result = score(&pitches, 100, 440.0, 50.0, 2000);

        assert_eq!(result.score, 100);
        assert!(result.passed);
    }

    #[test]
    fn interrupted_runs_do_not_add_up() {
        let mut pitches = vec![Some(440.0); 15];
        pitches.push(None);
        pitches.extend(vec![Some(440.0); 15]);

        let result = score(&pitches, 100, 440.0, 50.0, 2000);
        assert_eq!(result.score, 75);
        assert!(!result.passed);
    }

    #[test]
    fn a_semitone_off_earns_nothing() {
        let pitches = vec![Some(466.16); 40];
        let result = score(&pitches, 100, 440.0, 50.0, 2000);

        assert_eq!(result.score, 0);
        assert!(!result.passed);
    }

    #[test]
    fn wider_tolerance_accepts_a_semitone() {
        let pitches = vec![Some(466.16); 40];
        assert!(score(&pitches, 100, 440.0, 120.0, 2000).passed);
    }
}
