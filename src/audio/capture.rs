//! Microphone capture on a dedicated thread
//!
//! cpal streams are not `Send`, so the stream lives on an `audio-capture`
//! thread for its whole life. The handle only holds a command channel, the
//! shared analysis buffer and the recorder output. Dropping the handle tears
//! the stream down.

use crate::artifact::RecordedAudio;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::oneshot;

/// Audio capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No microphone available")]
    NoInputDevice,

    #[error("Microphone not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    ConfigError(String),

    #[error("Failed to build audio stream: {0}")]
    StreamError(String),

    #[error("Failed to start stream: {0}")]
    PlayError(String),

    #[error("Thread error: {0}")]
    ThreadError(String),
}

/// Microphone selection and buffering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name; `None` uses the host default
    pub device_name: Option<String>,

    /// Seconds of audio kept in the analysis ring buffer
    pub buffer_seconds: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            buffer_seconds: 2,
        }
    }
}

/// A live microphone owned by one recording session.
///
/// Exactly one of these exists between a successful acquire and `release`.
pub trait CaptureDevice {
    /// Sample rate of the mono signal in Hz
    fn sample_rate(&self) -> u32;

    /// Most recent `count` mono samples, oldest first
    fn latest_samples(&self, count: usize) -> Vec<f32>;

    /// Suspend or resume the hardware stream and recorder without releasing it
    fn set_paused(&mut self, paused: bool);

    /// Tear the device down and hand back what was recorded.
    ///
    /// Safe to call more than once; later calls return `None`.
    fn release(&mut self) -> Option<RecordedAudio>;
}

/// Source of microphone devices
#[allow(async_fn_in_trait)]
pub trait MicrophoneProvider {
    type Device: CaptureDevice;

    /// Request the microphone. Resolves once the stream is running or has
    /// failed; this is the only await point in a session.
    async fn acquire(&self, config: &CaptureConfig) -> Result<Self::Device, CaptureError>;
}

/// Provider backed by the host's default cpal audio host
#[derive(Debug, Clone, Copy, Default)]
pub struct CpalMicrophone;

impl MicrophoneProvider for CpalMicrophone {
    type Device = MicrophoneCapture;

    async fn acquire(&self, config: &CaptureConfig) -> Result<MicrophoneCapture, CaptureError> {
        MicrophoneCapture::open(config.clone()).await
    }
}

/// Commands sent to the capture thread
enum CaptureCommand {
    Pause,
    Resume,
    Stop,
}

/// State shared between the stream callback and the handle
#[derive(Clone)]
struct SharedCapture {
    buffer: Arc<Mutex<AudioBuffer>>,
    recording: Arc<Mutex<Vec<i16>>>,
    recorder_enabled: Arc<AtomicBool>,
}

/// Handle to a running microphone stream
pub struct MicrophoneCapture {
    /// Command sender to control the capture thread
    command_tx: mpsc::Sender<CaptureCommand>,

    /// Handle to the capture thread; `None` once released
    thread_handle: Option<JoinHandle<()>>,

    shared: SharedCapture,

    sample_rate: u32,
}

impl MicrophoneCapture {
    /// Spawn the capture thread and wait until the stream is live
    pub async fn open(config: CaptureConfig) -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        // Resized by the capture thread once the device rate is known
        let shared = SharedCapture {
            buffer: Arc::new(Mutex::new(AudioBuffer::new(1))),
            recording: Arc::new(Mutex::new(Vec::new())),
            recorder_enabled: Arc::new(AtomicBool::new(true)),
        };
        let thread_shared = shared.clone();

        let thread_handle = thread::Builder::new()
            .name("audio-capture".to_string())
            .spawn(move || run_capture_thread(config, command_rx, ready_tx, thread_shared))
            .map_err(|e| CaptureError::ThreadError(e.to_string()))?;

        let outcome = match ready_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(CaptureError::ThreadError(
                "capture thread exited before reporting".to_string(),
            )),
        };

        match outcome {
            Ok(sample_rate) => Ok(Self {
                command_tx,
                thread_handle: Some(thread_handle),
                shared,
                sample_rate,
            }),
            Err(e) => {
                let _ = thread_handle.join();
                Err(e)
            }
        }
    }

    /// Whether the stream is still held
    pub fn is_active(&self) -> bool {
        self.thread_handle.is_some()
    }
}

impl CaptureDevice for MicrophoneCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn latest_samples(&self, count: usize) -> Vec<f32> {
        self.shared.buffer.lock().get_latest(count)
    }

    fn set_paused(&mut self, paused: bool) {
        if !self.is_active() {
            return;
        }
        self.shared.recorder_enabled.store(!paused, Ordering::Release);
        let command = if paused {
            CaptureCommand::Pause
        } else {
            CaptureCommand::Resume
        };
        if self.command_tx.send(command).is_err() {
            log::warn!("Capture thread gone while toggling pause");
        }
    }

    fn release(&mut self) -> Option<RecordedAudio> {
        let handle = self.thread_handle.take()?;

        self.shared.recorder_enabled.store(false, Ordering::Release);
        let _ = self.command_tx.send(CaptureCommand::Stop);
        if handle.join().is_err() {
            log::warn!("Capture thread panicked during shutdown");
        }

        let samples = std::mem::take(&mut *self.shared.recording.lock());
        self.shared.buffer.lock().clear();
        log::info!("Microphone released ({} samples recorded)", samples.len());

        Some(RecordedAudio::new(self.sample_rate, samples))
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.release();
    }
}

/// Circular audio buffer
pub struct AudioBuffer {
    samples: Vec<f32>,
    write_pos: usize,
    capacity: usize,
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: vec![0.0; capacity],
            write_pos: 0,
            capacity,
        }
    }

    pub fn push_samples(&mut self, data: &[f32]) {
        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    /// Latest `count` samples in time order. Slots never written read as silence.
    pub fn get_latest(&self, count: usize) -> Vec<f32> {
        let count = count.min(self.capacity);
        let start = (self.write_pos + self.capacity - count) % self.capacity;

        (0..count)
            .map(|i| self.samples[(start + i) % self.capacity])
            .collect()
    }

    pub fn clear(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0.0);
        self.write_pos = 0;
    }
}

fn find_input_device(name: Option<&str>) -> Result<Device, CaptureError> {
    let host = cpal::default_host();

    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| CaptureError::ConfigError(e.to_string()))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string())),
        None => host.default_input_device().ok_or(CaptureError::NoInputDevice),
    }
}

/// Open the device, report readiness, then serve commands until stopped
fn run_capture_thread(
    config: CaptureConfig,
    command_rx: mpsc::Receiver<CaptureCommand>,
    ready_tx: oneshot::Sender<Result<u32, CaptureError>>,
    shared: SharedCapture,
) {
    let stream = match open_stream(&config, &shared) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            log::warn!("Microphone unavailable: {}", e);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    loop {
        match command_rx.recv() {
            Ok(CaptureCommand::Pause) => {
                if let Err(e) = stream.pause() {
                    log::warn!("Failed to pause stream: {}", e);
                }
                log::debug!("Microphone paused");
            }
            Ok(CaptureCommand::Resume) => {
                if let Err(e) = stream.play() {
                    log::warn!("Failed to resume stream: {}", e);
                }
                log::debug!("Microphone resumed");
            }
            Ok(CaptureCommand::Stop) => {
                log::info!("Audio capture stopping");
                break;
            }
            Err(_) => {
                log::info!("Audio capture channel disconnected");
                break;
            }
        }
    }

    drop(stream);
}

fn open_stream(
    config: &CaptureConfig,
    shared: &SharedCapture,
) -> Result<(cpal::Stream, u32), CaptureError> {
    let device = find_input_device(config.device_name.as_deref())?;
    let supported = device
        .default_input_config()
        .map_err(|e| CaptureError::ConfigError(e.to_string()))?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let stream_config: StreamConfig = supported.config();

    log::info!(
        "Microphone '{}': {} Hz, {} channels",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels
    );

    *shared.buffer.lock() =
        AudioBuffer::new(sample_rate as usize * config.buffer_seconds.max(1) as usize);

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, shared.clone(), channels),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, shared.clone(), channels),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, shared.clone(), channels),
        other => {
            return Err(CaptureError::ConfigError(format!(
                "Unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| CaptureError::StreamError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| CaptureError::PlayError(e.to_string()))?;

    log::info!("Audio capture started");
    Ok((stream, sample_rate))
}

/// Build input stream for given sample type
fn build_stream<T: cpal::Sample + cpal::SizedSample>(
    device: &Device,
    config: &StreamConfig,
    shared: SharedCapture,
    channels: usize,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let mono: Vec<f32> = data
                .chunks(channels)
                .map(|frame| {
                    let sum: f32 = frame
                        .iter()
                        .map(|s| -> f32 { cpal::Sample::from_sample(*s) })
                        .sum();
                    sum / channels as f32
                })
                .collect();

            shared.buffer.lock().push_samples(&mono);

            if shared.recorder_enabled.load(Ordering::Acquire) {
                shared
                    .recording
                    .lock()
                    .extend(mono.iter().map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16));
            }
        },
        |err| {
            log::error!("Audio stream error: {}", err);
        },
        None,
    )
}
