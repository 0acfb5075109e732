//! Vocal Coach Library
//!
//! Real-time vocal exercise assessment: captures a microphone, samples
//! loudness and pitch ten times a second, and scores echo, free-recording,
//! clapping and pitch-matching attempts.

pub mod artifact;
pub mod audio;
pub mod rhythm;
pub mod scoring;
pub mod session;

use artifact::ArtifactError;
use audio::{list_microphones, CpalMicrophone, SourceError};
use clap::{Parser, Subcommand};
use scoring::Exercise;
use session::{run_exercise, EngineConfig, EngineEvent, SessionCommand, SessionError, VocalEngine};

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Command-line errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Vocal exercise recorder and scorer
#[derive(Parser)]
#[command(name = "vocal-coach")]
#[command(about = "Record and score a vocal exercise from the microphone")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one exercise and print its score as JSON
    ///
    /// While recording, type `p` to pause or resume, `c` to clap and
    /// `stop` (or an empty line) to finish early.
    Run {
        /// Exercise definition (JSON)
        exercise: PathBuf,

        /// Engine configuration overrides (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Input device name, see `devices`
        #[arg(long)]
        device: Option<String>,

        /// Save the recording as a WAV file
        #[arg(long)]
        wav: Option<PathBuf>,
    },

    /// List available microphones
    Devices,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn parse_command(line: &str) -> Option<SessionCommand> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" | "resume" => Some(SessionCommand::TogglePause),
        "c" | "clap" => Some(SessionCommand::Clap),
        "" | "s" | "stop" => Some(SessionCommand::Stop),
        _ => None,
    }
}

/// Turn stdin lines into session commands
async fn forward_stdin(commands: mpsc::Sender<SessionCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        match parse_command(&line) {
            Some(command) => {
                if commands.send(command).await.is_err() {
                    return;
                }
            }
            None => log::warn!("Unknown command '{}' (use p, c or stop)", line.trim()),
        }
    }

    // Stdin closed: let the session run to its deadline
    commands.closed().await;
}

/// Log live feedback as it arrives
async fn log_events(mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Tick(feedback) => match feedback.cents {
                Some(cents) => log::info!(
                    "volume {:5.1}  pitch {:>7}  {:+6.1} cents",
                    feedback.volume,
                    feedback
                        .pitch_hz
                        .map(|hz| format!("{hz:.1}"))
                        .unwrap_or_else(|| "-".to_string()),
                    cents
                ),
                None => log::info!(
                    "volume {:5.1}  pitch {:>7}",
                    feedback.volume,
                    feedback
                        .pitch_hz
                        .map(|hz| format!("{hz:.1}"))
                        .unwrap_or_else(|| "-".to_string())
                ),
            },
            EngineEvent::Clap(event) => log::info!("Clap on beat {}", event.beat),
            EngineEvent::StateChanged { to, .. } => log::info!("Session {:?}", to),
            EngineEvent::Completed(assessment) => {
                log::info!("Score {} (passed: {})", assessment.score, assessment.passed)
            }
        }
    }
}

async fn record_exercise(
    exercise_path: PathBuf,
    config_path: Option<PathBuf>,
    device: Option<String>,
    wav_path: Option<PathBuf>,
) -> Result<(), AppError> {
    let exercise: Exercise = read_json(&exercise_path)?;
    let mut config: EngineConfig = match &config_path {
        Some(path) => read_json(path)?,
        None => EngineConfig::default(),
    };
    if device.is_some() {
        config.capture.device_name = device;
    }

    let mut engine = VocalEngine::new(CpalMicrophone, config);
    tokio::spawn(log_events(engine.subscribe()));

    let (command_tx, command_rx) = mpsc::channel(16);
    tokio::spawn(forward_stdin(command_tx));

    let result = run_exercise(&mut engine, exercise, command_rx).await?;

    if let Some(path) = &wav_path {
        match result.artifact.as_ref().and_then(|a| a.audio.as_ref()) {
            Some(audio) => {
                audio.write_wav(path)?;
                log::info!(
                    "Saved {:.1}s recording to {}",
                    audio.duration().as_secs_f64(),
                    path.display()
                );
            }
            None => log::warn!("Nothing was recorded, skipping {}", path.display()),
        }
    }

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub fn run() -> Result<(), AppError> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            for mic in list_microphones()? {
                let marker = if mic.is_default { " (default)" } else { "" };
                println!("{}{}", mic.name, marker);
            }
            Ok(())
        }
        Commands::Run {
            exercise,
            config,
            device,
            wav,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            let outcome = runtime.block_on(record_exercise(exercise, config, device, wav));
            // Stdin reads block a runtime thread; do not wait for them
            runtime.shutdown_background();
            outcome
        }
    }
}
