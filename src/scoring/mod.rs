//! Exercise targets and scoring
//!
//! Every scorer is a pure function over a finished session's samples; none of
//! them touch hardware. [`score`] dispatches on the exercise kind.

pub mod clap;
pub mod echo;
pub mod free;
pub mod pitch_match;

use crate::artifact::SessionArtifact;
use crate::audio::pitch::{DEFAULT_SUSTAIN_MS, DEFAULT_TOLERANCE_CENTS};
use crate::rhythm::{BeatEvent, BeatTimer, BeatToken};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Score at or above which an attempt counts as passed
pub const DEFAULT_PASS_SCORE: u8 = 70;

/// Quarter of a beat either side of the expected clap
pub const DEFAULT_CLAP_TOLERANCE_BEATS: f64 = 0.25;

/// Points removed per clap that matched nothing
pub const DEFAULT_EXTRA_CLAP_PENALTY: f64 = 10.0;

/// Average volume below which echo volume credit is scaled down
pub const DEFAULT_MIN_VOLUME_THRESHOLD: f32 = 30.0;

fn default_min_volume_threshold() -> f32 {
    DEFAULT_MIN_VOLUME_THRESHOLD
}

fn default_clap_tolerance() -> f64 {
    DEFAULT_CLAP_TOLERANCE_BEATS
}

fn default_extra_clap_penalty() -> f64 {
    DEFAULT_EXTRA_CLAP_PENALTY
}

fn default_tolerance_cents() -> f32 {
    DEFAULT_TOLERANCE_CENTS
}

fn default_sustain_ms() -> u64 {
    DEFAULT_SUSTAIN_MS
}

/// What a session is measured against, one variant per exercise kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExerciseTarget {
    /// Listen to a prompt, then repeat it at a similar length
    Echo {
        #[serde(default = "default_min_volume_threshold")]
        min_volume_threshold: f32,
        target_duration_seconds: f64,
    },

    /// Sing or speak freely; loudness and steadiness are rewarded
    FreeRecording,

    /// Clap along to a pattern at a fixed tempo
    ClapPattern {
        bpm: f64,
        pattern: Vec<BeatToken>,
        #[serde(default = "default_clap_tolerance")]
        tolerance_beats: f64,
        #[serde(default = "default_extra_clap_penalty")]
        extra_clap_penalty: f64,
    },

    /// Hold a note within a cents window for a sustained stretch
    PitchMatch {
        target_hz: f32,
        #[serde(default = "default_tolerance_cents")]
        tolerance_cents: f32,
        #[serde(default = "default_sustain_ms")]
        sustain_ms: u64,
    },
}

impl ExerciseTarget {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ExerciseTarget::Echo { .. } => "echo",
            ExerciseTarget::FreeRecording => "free_recording",
            ExerciseTarget::ClapPattern { .. } => "clap_pattern",
            ExerciseTarget::PitchMatch { .. } => "pitch_match",
        }
    }

    /// Reject malformed parameters before any hardware is touched
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ExerciseTarget::Echo {
                min_volume_threshold,
                target_duration_seconds,
            } => {
                if !min_volume_threshold.is_finite() || *min_volume_threshold < 0.0 {
                    return Err(format!(
                        "minimum volume threshold must be non-negative, got {min_volume_threshold}"
                    ));
                }
                if !target_duration_seconds.is_finite() || *target_duration_seconds <= 0.0 {
                    return Err(format!(
                        "target duration must be positive, got {target_duration_seconds}"
                    ));
                }
                Ok(())
            }
            ExerciseTarget::FreeRecording => Ok(()),
            ExerciseTarget::ClapPattern {
                bpm,
                pattern,
                tolerance_beats,
                extra_clap_penalty,
            } => {
                BeatTimer::new(*bpm, pattern.clone()).map_err(|e| e.to_string())?;
                if !tolerance_beats.is_finite() || *tolerance_beats < 0.0 {
                    return Err(format!(
                        "clap tolerance must be non-negative, got {tolerance_beats}"
                    ));
                }
                if !extra_clap_penalty.is_finite() || *extra_clap_penalty < 0.0 {
                    return Err(format!(
                        "extra clap penalty must be non-negative, got {extra_clap_penalty}"
                    ));
                }
                Ok(())
            }
            ExerciseTarget::PitchMatch {
                target_hz,
                tolerance_cents,
                sustain_ms,
            } => {
                if !target_hz.is_finite() || *target_hz <= 0.0 {
                    return Err(format!("target pitch must be positive, got {target_hz}"));
                }
                if !tolerance_cents.is_finite() || *tolerance_cents <= 0.0 {
                    return Err(format!(
                        "pitch tolerance must be positive, got {tolerance_cents}"
                    ));
                }
                if *sustain_ms == 0 {
                    return Err("sustain window must be longer than zero".to_string());
                }
                Ok(())
            }
        }
    }
}

/// An exercise definition supplied by the lesson content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub target: ExerciseTarget,
    pub max_duration_seconds: f64,
}

impl Exercise {
    pub fn new(target: ExerciseTarget, max_duration_seconds: f64) -> Self {
        Self {
            target,
            max_duration_seconds,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.max_duration_seconds.is_finite() || self.max_duration_seconds <= 0.0 {
            return Err(format!(
                "maximum duration must be positive, got {}",
                self.max_duration_seconds
            ));
        }
        if Duration::try_from_secs_f64(self.max_duration_seconds).is_err() {
            return Err(format!(
                "maximum duration is out of range, got {}",
                self.max_duration_seconds
            ));
        }
        self.target.validate()
    }

    /// Recording ceiling. Values no `Duration` can hold saturate.
    pub fn max_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_duration_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// A scorer's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: u8,
    pub passed: bool,
}

impl Assessment {
    /// Pass/fail by threshold
    pub fn from_score(score: u8, pass_score: u8) -> Self {
        Self {
            score,
            passed: score >= pass_score,
        }
    }
}

/// Final output of a session; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u8,
    pub passed: bool,
    pub artifact: Option<SessionArtifact>,
}

impl ScoreResult {
    pub fn new(assessment: Assessment, artifact: Option<SessionArtifact>) -> Self {
        Self {
            score: assessment.score,
            passed: assessment.passed,
            artifact,
        }
    }
}

/// Everything a scorer may look at from a finished session
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub volumes: &'a [f32],
    pub pitches: &'a [Option<f32>],
    pub claps: &'a [BeatEvent],
    pub elapsed: Duration,
    pub tick_ms: u64,
}

/// Score a finished session against its exercise target
pub fn score(target: &ExerciseTarget, input: &ScoringInput<'_>, pass_score: u8) -> Assessment {
    match target {
        ExerciseTarget::Echo {
            min_volume_threshold,
            target_duration_seconds,
        } => echo::score(
            input.volumes,
            input.elapsed.as_secs_f64(),
            *min_volume_threshold,
            *target_duration_seconds,
            pass_score,
        ),
        ExerciseTarget::FreeRecording => free::score(input.volumes, pass_score),
        ExerciseTarget::ClapPattern {
            pattern,
            tolerance_beats,
            extra_clap_penalty,
            ..
        } => clap::score(
            pattern,
            input.claps,
            *tolerance_beats,
            *extra_clap_penalty,
            pass_score,
        ),
        ExerciseTarget::PitchMatch {
            target_hz,
            tolerance_cents,
            sustain_ms,
        } => pitch_match::score(
            input.pitches,
            input.tick_ms,
            *target_hz,
            *tolerance_cents,
            *sustain_ms,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BeatToken::{Clap, Rest};

    #[test]
    fn exercise_json_fills_defaults() {
        let exercise: Exercise = serde_json::from_str(
            r#"{
                "target": { "kind": "pitch_match", "target_hz": 440.0 },
                "max_duration_seconds": 10
            }"#,
        )
        .unwrap();

        assert_eq!(
            exercise.target,
            ExerciseTarget::PitchMatch {
                target_hz: 440.0,
                tolerance_cents: 50.0,
                sustain_ms: 2000,
            }
        );
        assert_eq!(exercise.max_duration(), Duration::from_secs(10));
    }

    #[test]
    fn clap_pattern_json_uses_snake_case_tokens() {
        let target: ExerciseTarget = serde_json::from_str(
            r#"{ "kind": "clap_pattern", "bpm": 100, "pattern": ["clap", "clap", "rest", "clap"] }"#,
        )
        .unwrap();

        match target {
            ExerciseTarget::ClapPattern {
                pattern,
                tolerance_beats,
                extra_clap_penalty,
                ..
            } => {
                assert_eq!(pattern, vec![Clap, Clap, Rest, Clap]);
                assert_eq!(tolerance_beats, 0.25);
                assert_eq!(extra_clap_penalty, 10.0);
            }
            other => panic!("unexpected target {other:?}"),
        }

        let free: ExerciseTarget = serde_json::from_str(r#"{ "kind": "free_recording" }"#).unwrap();
        assert_eq!(free, ExerciseTarget::FreeRecording);
    }

    #[test]
    fn validate_rejects_malformed_targets() {
        let bad = [
            ExerciseTarget::ClapPattern {
                bpm: 0.0,
                pattern: vec![Clap],
                tolerance_beats: 0.25,
                extra_clap_penalty: 10.0,
            },
            ExerciseTarget::ClapPattern {
                bpm: 100.0,
                pattern: vec![],
                tolerance_beats: 0.25,
                extra_clap_penalty: 10.0,
            },
            ExerciseTarget::Echo {
                min_volume_threshold: 30.0,
                target_duration_seconds: 0.0,
            },
            ExerciseTarget::PitchMatch {
                target_hz: -1.0,
                tolerance_cents: 50.0,
                sustain_ms: 2000,
            },
            ExerciseTarget::PitchMatch {
                target_hz: 440.0,
                tolerance_cents: 50.0,
                sustain_ms: 0,
            },
        ];

        for target in bad {
            assert!(target.validate().is_err(), "{target:?} should be rejected");
        }
        assert!(ExerciseTarget::FreeRecording.validate().is_ok());
        assert!(Exercise::new(ExerciseTarget::FreeRecording, 0.0)
            .validate()
            .is_err());
        assert!(Exercise::new(ExerciseTarget::FreeRecording, 1e20)
            .validate()
            .is_err());
        assert_eq!(
            Exercise::new(ExerciseTarget::FreeRecording, 1e20).max_duration(),
            Duration::MAX
        );
    }

    #[test]
    fn dispatch_reaches_each_scorer() {
        let volumes = vec![50.0; 30];
        let pitches = vec![Some(440.0); 30];
        let claps = [
            BeatEvent::observed(0.0),
            BeatEvent::observed(1.0),
            BeatEvent::observed(3.0),
        ];
        let input = ScoringInput {
            volumes: &volumes,
            pitches: &pitches,
            claps: &claps,
            elapsed: Duration::from_secs(3),
            tick_ms: 100,
        };

        let echo = score(
            &ExerciseTarget::Echo {
                min_volume_threshold: 30.0,
                target_duration_seconds: 3.0,
            },
            &input,
            DEFAULT_PASS_SCORE,
        );
        assert_eq!(echo.score, 70);

        let clap = score(
            &ExerciseTarget::ClapPattern {
                bpm: 100.0,
                pattern: vec![Clap, Clap, Rest, Clap],
                tolerance_beats: 0.25,
                extra_clap_penalty: 10.0,
            },
            &input,
            DEFAULT_PASS_SCORE,
        );
        assert_eq!(clap.score, 100);

        let pitch = score(
            &ExerciseTarget::PitchMatch {
                target_hz: 440.0,
                tolerance_cents: 50.0,
                sustain_ms: 2000,
            },
            &input,
            DEFAULT_PASS_SCORE,
        );
        assert!(pitch.passed);

        let steady = vec![60.0; 30];
        let free = score(
            &ExerciseTarget::FreeRecording,
            &ScoringInput {
                volumes: &steady,
                ..input
            },
            DEFAULT_PASS_SCORE,
        );
        assert_eq!(free.score, 100);
        assert!(free.passed);
    }
}
