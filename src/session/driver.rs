//! Cooperative tick loop for one exercise attempt

use super::{SessionError, VocalEngine};
use crate::audio::MicrophoneProvider;
use crate::scoring::{Exercise, ScoreResult};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Input from whoever is presenting the exercise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    TogglePause,
    Clap,
    Stop,
}

/// Start `exercise` and drive it to a score.
///
/// Ticks at the configured cadence until a `Stop` arrives or the maximum
/// duration runs out. Dropping every command sender tears the session down
/// and returns [`SessionError::Cancelled`].
pub async fn run_exercise<P: MicrophoneProvider>(
    engine: &mut VocalEngine<P>,
    exercise: Exercise,
    mut commands: mpsc::Receiver<SessionCommand>,
) -> Result<ScoreResult, SessionError> {
    engine.start(exercise).await?;

    let mut interval = tokio::time::interval(engine.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(SessionCommand::TogglePause) => {
                    engine.toggle_pause()?;
                }
                Some(SessionCommand::Clap) => {
                    if let Err(e) = engine.clap() {
                        log::warn!("Ignoring clap: {}", e);
                    }
                }
                Some(SessionCommand::Stop) => return engine.stop(),
                None => {
                    log::info!("Command channel closed, tearing session down");
                    engine.reset();
                    return Err(SessionError::Cancelled);
                }
            },
            _ = interval.tick() => {
                if engine.tick().is_none() {
                    // A recording tick past the deadline scores the attempt
                    if let Some(result) = engine.result() {
                        return Ok(result.clone());
                    }
                }
            }
        }
    }
}
