//! Fixed-tempo beat timer for clapping exercises
//!
//! The timer is pure timing: it knows the tempo and the clap/rest pattern and
//! turns elapsed recording time into beat indices. It never touches audio.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One step of a clapping pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatToken {
    Clap,
    Rest,
}

/// Whether a beat event was scheduled or performed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeatEventKind {
    Expected,
    Observed,
}

/// A clap, positioned in beat-units from the start of the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatEvent {
    pub kind: BeatEventKind,
    pub beat: f64,
}

impl BeatEvent {
    pub fn expected(beat: f64) -> Self {
        Self {
            kind: BeatEventKind::Expected,
            beat,
        }
    }

    pub fn observed(beat: f64) -> Self {
        Self {
            kind: BeatEventKind::Observed,
            beat,
        }
    }
}

/// Beat timer errors
#[derive(Error, Debug, PartialEq)]
pub enum RhythmError {
    #[error("Tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f64),

    #[error("Clap pattern is empty")]
    EmptyPattern,
}

/// Walks a clap/rest pattern at a fixed tempo
#[derive(Debug, Clone)]
pub struct BeatTimer {
    bpm: f64,
    pattern: Vec<BeatToken>,
    current: usize,
}

impl BeatTimer {
    pub fn new(bpm: f64, pattern: Vec<BeatToken>) -> Result<Self, RhythmError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(RhythmError::InvalidTempo(bpm));
        }
        if pattern.is_empty() {
            return Err(RhythmError::EmptyPattern);
        }
        Ok(Self {
            bpm,
            pattern,
            current: 0,
        })
    }

    /// Length of one beat in milliseconds
    pub fn beat_duration_ms(&self) -> f64 {
        60_000.0 / self.bpm
    }

    /// Index of the beat currently expected
    pub fn current_beat(&self) -> usize {
        self.current
    }

    /// Token at the current beat, `None` once the pattern has run out
    pub fn current_token(&self) -> Option<BeatToken> {
        self.pattern.get(self.current).copied()
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.pattern.len()
    }

    /// Advance by one beat. Returns the new beat index while inside the pattern.
    pub fn step(&mut self) -> Option<usize> {
        if self.is_finished() {
            return None;
        }
        self.current += 1;
        (!self.is_finished()).then_some(self.current)
    }

    /// Step forward until the timer reaches the beat containing `elapsed_ms`.
    /// Returns how many beats were crossed.
    pub fn advance_to(&mut self, elapsed_ms: f64) -> usize {
        let target = self.beat_index_at(elapsed_ms).min(self.pattern.len());
        let mut crossed = 0;
        while self.current < target {
            self.step();
            crossed += 1;
        }
        crossed
    }

    /// Beat window that `elapsed_ms` falls in
    pub fn beat_index_at(&self, elapsed_ms: f64) -> usize {
        (elapsed_ms.max(0.0) / self.beat_duration_ms()).floor() as usize
    }

    /// Record a user clap at `elapsed_ms`, attributed to its beat window
    pub fn observe(&self, elapsed_ms: f64) -> BeatEvent {
        BeatEvent::observed(self.beat_index_at(elapsed_ms) as f64)
    }
}

/// Beat indices of every `Clap` token in a pattern
pub fn expected_claps(pattern: &[BeatToken]) -> Vec<BeatEvent> {
    pattern
        .iter()
        .enumerate()
        .filter(|(_, token)| **token == BeatToken::Clap)
        .map(|(i, _)| BeatEvent::expected(i as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use BeatToken::{Clap, Rest};

    #[test]
    fn beat_duration_follows_tempo() {
        let timer = BeatTimer::new(100.0, vec![Clap]).unwrap();
        assert_eq!(timer.beat_duration_ms(), 600.0);

        let timer = BeatTimer::new(120.0, vec![Clap, Rest]).unwrap();
        assert_eq!(timer.beat_duration_ms(), 500.0);
    }

    #[test]
    fn rejects_bad_tempo_and_empty_pattern() {
        assert_eq!(
            BeatTimer::new(0.0, vec![Clap]).unwrap_err(),
            RhythmError::InvalidTempo(0.0)
        );
        assert!(BeatTimer::new(-60.0, vec![Clap]).is_err());
        assert!(BeatTimer::new(f64::NAN, vec![Clap]).is_err());
        assert_eq!(
            BeatTimer::new(90.0, vec![]).unwrap_err(),
            RhythmError::EmptyPattern
        );
    }

    #[test]
    fn claps_are_floored_into_their_beat_window() {
        let timer = BeatTimer::new(100.0, vec![Clap, Clap, Rest, Clap]).unwrap();

        assert_eq!(timer.observe(0.0).beat, 0.0);
        assert_eq!(timer.observe(599.0).beat, 0.0);
        assert_eq!(timer.observe(600.0).beat, 1.0);
        assert_eq!(timer.observe(1850.0).beat, 3.0);
        assert_eq!(timer.observe(1850.0).kind, BeatEventKind::Observed);
    }

    #[test]
    fn step_walks_the_pattern_once() {
        let mut timer = BeatTimer::new(60.0, vec![Clap, Rest, Clap]).unwrap();

        assert_eq!(timer.current_token(), Some(Clap));
        assert_eq!(timer.step(), Some(1));
        assert_eq!(timer.current_token(), Some(Rest));
        assert_eq!(timer.step(), Some(2));
        assert_eq!(timer.step(), None);
        assert!(timer.is_finished());
        assert_eq!(timer.step(), None);
        assert_eq!(timer.current_token(), None);
    }

    #[test]
    fn advance_to_crosses_whole_beats_only() {
        let mut timer = BeatTimer::new(120.0, vec![Clap; 8]).unwrap();

        assert_eq!(timer.advance_to(400.0), 0);
        assert_eq!(timer.advance_to(1100.0), 2);
        assert_eq!(timer.current_beat(), 2);
        // Past the end the timer parks on the final position
        timer.advance_to(60_000.0);
        assert!(timer.is_finished());
    }

    #[test]
    fn expected_claps_skip_rests() {
        let events = expected_claps(&[Clap, Clap, Rest, Clap]);
        let beats: Vec<f64> = events.iter().map(|e| e.beat).collect();

        assert_eq!(beats, vec![0.0, 1.0, 3.0]);
        assert!(events.iter().all(|e| e.kind == BeatEventKind::Expected));
    }
}
