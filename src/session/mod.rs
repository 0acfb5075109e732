//! Recording session state machine
//!
//! A [`VocalEngine`] owns at most one live microphone at a time. It moves
//! through `idle -> recording <-> paused -> stopped -> reviewing`, samples
//! volume and pitch once per tick, and scores the attempt when it stops.
//! Any state can go back to `idle` through [`VocalEngine::reset`].

mod clock;
mod driver;
#[cfg(test)]
pub(crate) mod fake;

pub use clock::RecordingClock;
pub use driver::{run_exercise, SessionCommand};

use crate::artifact::SessionArtifact;
use crate::audio::{
    detect_pitch, normalized_volume, AnalysisConfig, ByteSpectrumAnalyzer, CaptureConfig,
    CaptureDevice, CaptureError, MicrophoneProvider, SustainedMatch,
};
use crate::rhythm::{BeatEvent, BeatTimer, BeatToken};
use crate::scoring::{
    self, Assessment, Exercise, ExerciseTarget, ScoreResult, ScoringInput, DEFAULT_PASS_SCORE,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Where an engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
    Stopped,
    Reviewing,
}

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Microphone unavailable: {0}")]
    DeviceUnavailable(#[from] CaptureError),

    #[error("Invalid exercise target: {0}")]
    InvalidExerciseTarget(String),

    #[error("A session is already active")]
    AlreadyActive,

    #[error("No recording in progress (state: {0:?})")]
    NotRecording(SessionState),

    #[error("Exercise has no beat pattern to clap along to")]
    NoBeatPattern,

    #[error("Session cancelled")]
    Cancelled,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub capture: CaptureConfig,

    /// Score at or above which echo, free and clap attempts pass
    pub pass_score: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            capture: CaptureConfig::default(),
            pass_score: DEFAULT_PASS_SCORE,
        }
    }
}

/// One loudness reading, 0-100
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeSample {
    pub tick: u64,
    pub value: f32,
}

/// One pitch estimate; `hz` is `None` when nothing usable was heard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSample {
    pub tick: u64,
    pub hz: Option<f32>,
}

/// Append-only per-tick history. Both sequences grow together.
#[derive(Debug, Clone, Default)]
pub struct SampleHistory {
    volume: Vec<VolumeSample>,
    pitch: Vec<PitchSample>,
}

impl SampleHistory {
    /// Record one tick and return its index
    pub fn push(&mut self, volume: f32, pitch_hz: Option<f32>) -> u64 {
        let tick = self.volume.len() as u64;
        self.volume.push(VolumeSample {
            tick,
            value: volume,
        });
        self.pitch.push(PitchSample { tick, hz: pitch_hz });
        tick
    }

    pub fn len(&self) -> usize {
        self.volume.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_empty()
    }

    pub fn volume_samples(&self) -> &[VolumeSample] {
        &self.volume
    }

    pub fn pitch_samples(&self) -> &[PitchSample] {
        &self.pitch
    }

    pub fn volumes(&self) -> Vec<f32> {
        self.volume.iter().map(|s| s.value).collect()
    }

    pub fn pitches(&self) -> Vec<Option<f32>> {
        self.pitch.iter().map(|s| s.hz).collect()
    }

    pub fn clear(&mut self) {
        self.volume.clear();
        self.pitch.clear();
    }
}

/// Per-tick reading for on-screen meters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveFeedback {
    pub tick: u64,
    pub volume: f32,
    pub pitch_hz: Option<f32>,

    /// Deviation from the target note (pitch-match only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cents: Option<f32>,

    /// Current unbroken in-tune run (pitch-match only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_ms: Option<u64>,

    /// Beat the pattern is on (clap exercises only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beat: Option<usize>,

    /// Whether that beat wants a clap; `None` once the pattern has run out
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<BeatToken>,
}

/// Notifications for anyone following the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Tick(LiveFeedback),
    Clap(BeatEvent),
    Completed(Assessment),
}

/// A live capture attempt. Dropping it releases the device.
struct AudioSession<D: CaptureDevice> {
    exercise: Exercise,
    device: D,
    sample_rate: u32,
    clock: RecordingClock,
    spectrum: ByteSpectrumAnalyzer,
    beat_timer: Option<BeatTimer>,
    pitch_tracker: Option<SustainedMatch>,
    claps: Vec<BeatEvent>,
}

impl<D: CaptureDevice> AudioSession<D> {
    fn new(exercise: Exercise, device: D, analysis: &AnalysisConfig) -> Self {
        let beat_timer = match &exercise.target {
            ExerciseTarget::ClapPattern { bpm, pattern, .. } => {
                BeatTimer::new(*bpm, pattern.clone()).ok()
            }
            _ => None,
        };
        let pitch_tracker = match &exercise.target {
            ExerciseTarget::PitchMatch {
                target_hz,
                tolerance_cents,
                sustain_ms,
            } => Some(SustainedMatch::new(*target_hz, *tolerance_cents, *sustain_ms)),
            _ => None,
        };

        Self {
            sample_rate: device.sample_rate(),
            exercise,
            device,
            clock: RecordingClock::started(),
            spectrum: ByteSpectrumAnalyzer::new(analysis),
            beat_timer,
            pitch_tracker,
            claps: Vec::new(),
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.clock.elapsed().as_secs_f64() * 1000.0
    }
}

impl<D: CaptureDevice> Drop for AudioSession<D> {
    fn drop(&mut self) {
        self.device.release();
    }
}

/// One learner's exercise attempts on one microphone provider
pub struct VocalEngine<P: MicrophoneProvider> {
    provider: P,
    config: EngineConfig,
    state: SessionState,
    session: Option<AudioSession<P::Device>>,
    history: SampleHistory,
    result: Option<ScoreResult>,
    events: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl<P: MicrophoneProvider> VocalEngine<P> {
    pub fn new(provider: P, config: EngineConfig) -> Self {
        Self {
            provider,
            config,
            state: SessionState::Idle,
            session: None,
            history: SampleHistory::default(),
            result: None,
            events: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn history(&self) -> &SampleHistory {
        &self.history
    }

    /// Result of the last finished attempt, kept while reviewing
    pub fn result(&self) -> Option<&ScoreResult> {
        self.result.as_ref()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.analysis.tick_interval_ms.max(1))
    }

    /// Recorded time of the current attempt, excluding pauses
    pub fn elapsed(&self) -> Duration {
        self.session
            .as_ref()
            .map(|s| s.clock.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Follow state changes, ticks and claps. A new subscriber replaces the old one.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EngineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Validate the exercise, acquire the microphone and start recording.
    ///
    /// On failure the engine stays where it was and nothing is retried. A
    /// result under review is only discarded once the new microphone is live.
    pub async fn start(&mut self, exercise: Exercise) -> Result<(), SessionError> {
        match self.state {
            SessionState::Recording | SessionState::Paused | SessionState::Stopped => {
                return Err(SessionError::AlreadyActive)
            }
            SessionState::Idle | SessionState::Reviewing => {}
        }

        exercise
            .validate()
            .map_err(SessionError::InvalidExerciseTarget)?;

        let device = match self.provider.acquire(&self.config.capture).await {
            Ok(device) => device,
            Err(e) => {
                log::warn!("Could not start {} exercise: {}", exercise.target.kind(), e);
                return Err(SessionError::DeviceUnavailable(e));
            }
        };

        if self.state == SessionState::Reviewing {
            self.reset();
        }

        log::info!(
            "Starting {} exercise (max {:.1}s)",
            exercise.target.kind(),
            exercise.max_duration_seconds
        );
        self.history.clear();
        self.result = None;
        self.session = Some(AudioSession::new(exercise, device, &self.config.analysis));
        self.transition(SessionState::Recording);
        Ok(())
    }

    /// Pause a recording or resume a paused one. Returns the new state.
    pub fn toggle_pause(&mut self) -> Result<SessionState, SessionError> {
        let next = match self.state {
            SessionState::Recording => SessionState::Paused,
            SessionState::Paused => SessionState::Recording,
            other => return Err(SessionError::NotRecording(other)),
        };

        if let Some(session) = self.session.as_mut() {
            let paused = next == SessionState::Paused;
            session.device.set_paused(paused);
            if paused {
                session.clock.pause();
            } else {
                session.clock.resume();
            }
        }
        self.transition(next);
        Ok(next)
    }

    /// Run one analysis step. Does nothing unless recording.
    ///
    /// Once the maximum duration is used up the tick stops and scores the
    /// attempt instead of sampling. The score is then in [`result`](Self::result)
    /// and goes out as [`EngineEvent::Completed`].
    pub fn tick(&mut self) -> Option<LiveFeedback> {
        if self.state != SessionState::Recording {
            return None;
        }
        if self.enforce_deadline().is_some() {
            return None;
        }
        let session = self.session.as_mut()?;
        let analysis = &self.config.analysis;

        let frame = session.device.latest_samples(analysis.frame_len());
        let bins = session.spectrum.analyze(&frame);
        let volume = normalized_volume(&bins, analysis.volume_gain);

        let pitch_len = analysis.pitch_frame_size.min(frame.len());
        let pitch_hz = detect_pitch(&frame[frame.len() - pitch_len..], session.sample_rate);

        let tick = self.history.push(volume, pitch_hz);

        let (cents, matched_ms) = match session.pitch_tracker.as_mut() {
            Some(tracker) => {
                tracker.observe(pitch_hz, analysis.tick_interval_ms);
                (tracker.cents(pitch_hz), Some(tracker.matched_ms()))
            }
            None => (None, None),
        };

        let elapsed_ms = session.elapsed_ms();
        let (beat, token) = match session.beat_timer.as_mut() {
            Some(timer) => {
                timer.advance_to(elapsed_ms);
                (Some(timer.current_beat()), timer.current_token())
            }
            None => (None, None),
        };

        let feedback = LiveFeedback {
            tick,
            volume,
            pitch_hz,
            cents,
            matched_ms,
            beat,
            token,
        };
        log::trace!("Tick {}: volume {:.1}, pitch {:?}", tick, volume, pitch_hz);
        self.emit(EngineEvent::Tick(feedback.clone()));
        Some(feedback)
    }

    /// Stop the attempt if it has used up its maximum duration
    pub fn enforce_deadline(&mut self) -> Option<ScoreResult> {
        let session = self.session.as_ref()?;
        if !matches!(self.state, SessionState::Recording | SessionState::Paused) {
            return None;
        }
        if session.clock.elapsed() < session.exercise.max_duration() {
            return None;
        }

        log::info!(
            "Maximum duration of {:.1}s reached, stopping",
            session.exercise.max_duration_seconds
        );
        Some(self.finish())
    }

    /// Record a user clap in the current beat window
    pub fn clap(&mut self) -> Result<BeatEvent, SessionError> {
        if self.state != SessionState::Recording {
            return Err(SessionError::NotRecording(self.state));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(SessionError::NotRecording(self.state));
        };
        let elapsed_ms = session.elapsed_ms();
        let Some(timer) = session.beat_timer.as_ref() else {
            return Err(SessionError::NoBeatPattern);
        };

        let event = timer.observe(elapsed_ms);
        session.claps.push(event);
        log::debug!("Clap at {:.0} ms -> beat {}", elapsed_ms, event.beat);
        self.emit(EngineEvent::Clap(event));
        Ok(event)
    }

    /// Beat the pattern is currently on (clap exercises only)
    pub fn expected_beat(&self) -> Option<usize> {
        self.session
            .as_ref()
            .and_then(|s| s.beat_timer.as_ref())
            .map(|timer| timer.current_beat())
    }

    /// Stop recording, release the microphone and score the attempt
    pub fn stop(&mut self) -> Result<ScoreResult, SessionError> {
        match self.state {
            SessionState::Recording | SessionState::Paused => Ok(self.finish()),
            other => Err(SessionError::NotRecording(other)),
        }
    }

    /// Discard everything and return to idle, releasing any held device
    pub fn reset(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.device.release();
            log::info!("Session reset, microphone released");
        }
        self.history.clear();
        self.result = None;
        if self.state != SessionState::Idle {
            self.transition(SessionState::Idle);
        }
    }

    fn finish(&mut self) -> ScoreResult {
        self.transition(SessionState::Stopped);

        let (exercise, audio, claps, elapsed) = match self.session.take() {
            Some(mut session) => {
                let audio = session.device.release();
                let elapsed = session.clock.elapsed();
                let claps = std::mem::take(&mut session.claps);
                (session.exercise.clone(), audio, claps, elapsed)
            }
            None => {
                log::warn!("Stopping without a live session");
                (
                    Exercise::new(ExerciseTarget::FreeRecording, 0.0),
                    None,
                    Vec::new(),
                    Duration::ZERO,
                )
            }
        };

        let volumes = self.history.volumes();
        let pitches = self.history.pitches();
        let input = ScoringInput {
            volumes: &volumes,
            pitches: &pitches,
            claps: &claps,
            elapsed,
            tick_ms: self.config.analysis.tick_interval_ms,
        };
        let assessment = scoring::score(&exercise.target, &input, self.config.pass_score);

        log::info!(
            "{} exercise scored {} ({}) after {:.2}s, {} ticks",
            exercise.target.kind(),
            assessment.score,
            if assessment.passed { "passed" } else { "not passed" },
            elapsed.as_secs_f64(),
            volumes.len()
        );

        let artifact = SessionArtifact {
            audio: audio.filter(|a| !a.is_empty()),
            volume_history: volumes,
        };
        let result = ScoreResult::new(assessment, Some(artifact));

        self.emit(EngineEvent::Completed(assessment));
        self.result = Some(result.clone());
        self.transition(SessionState::Reviewing);
        result
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        log::debug!("Session {:?} -> {:?}", from, to);
        self.emit(EngineEvent::StateChanged { from, to });
    }

    fn emit(&mut self, event: EngineEvent) {
        let closed = match &self.events {
            Some(tx) => tx.send(event).is_err(),
            None => false,
        };
        if closed {
            self.events = None;
        }
    }
}
