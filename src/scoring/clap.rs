//! Clap-pattern scoring
//!
//! Each expected clap can be satisfied by at most one observed clap within
//! the tolerance. Observed claps arrive in any order. Claps that satisfy
//! nothing cost a fixed penalty each; resting correctly earns nothing.

use super::Assessment;
use crate::rhythm::{expected_claps, BeatEvent, BeatToken};

/// Outcome of reconciling observed claps against a pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClapTally {
    pub expected: usize,
    pub matched: usize,
    pub extra: usize,
}

impl ClapTally {
    /// Share of expected claps that were hit, 0-100.
    /// A pattern of only rests counts as fully hit.
    pub fn accuracy(&self) -> f64 {
        if self.expected == 0 {
            return 100.0;
        }
        self.matched as f64 / self.expected as f64 * 100.0
    }
}

/// Pair observed claps with the pattern's expected claps
pub fn tally(pattern: &[BeatToken], observed: &[BeatEvent], tolerance_beats: f64) -> ClapTally {
    let expected = expected_claps(pattern);

    let mut beats: Vec<f64> = observed.iter().map(|e| e.beat).collect();
    beats.sort_by(|a, b| a.total_cmp(b));
    let mut used = vec![false; beats.len()];

    let mut matched = 0;
    for target in &expected {
        let hit = beats
            .iter()
            .enumerate()
            .find(|(i, beat)| !used[*i] && (*beat - target.beat).abs() <= tolerance_beats)
            .map(|(i, _)| i);

        if let Some(i) = hit {
            used[i] = true;
            matched += 1;
        }
    }

    ClapTally {
        expected: expected.len(),
        matched,
        extra: beats.len() - matched,
    }
}

/// Score a clapping attempt: `max(0, floor(accuracy - penalty * extra))`
pub fn score(
    pattern: &[BeatToken],
    observed: &[BeatEvent],
    tolerance_beats: f64,
    extra_clap_penalty: f64,
    pass_score: u8,
) -> Assessment {
    let tally = tally(pattern, observed, tolerance_beats);
    let raw = tally.accuracy() - extra_clap_penalty * tally.extra as f64;
    let score = raw.floor().clamp(0.0, 100.0) as u8;

    log::debug!(
        "Clap score {}: {}/{} matched, {} extra",
        score,
        tally.matched,
        tally.expected,
        tally.extra
    );
    Assessment::from_score(score, pass_score)
}
