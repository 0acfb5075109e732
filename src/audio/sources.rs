//! Microphone enumeration

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input device information
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Microphone {
    /// Device name, usable as `CaptureConfig::device_name`
    pub name: String,

    /// Whether this is the host's default input
    pub is_default: bool,
}

/// Microphone enumeration errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to enumerate devices: {0}")]
    EnumerationError(String),
}

/// List available microphones, default first
pub fn list_microphones() -> Result<Vec<Microphone>, SourceError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| SourceError::EnumerationError(e.to_string()))?;

    let mut microphones: Vec<Microphone> = devices
        .filter_map(|device| match device.name() {
            Ok(name) => Some(name),
            Err(e) => {
                log::warn!("Skipping input device without a name: {}", e);
                None
            }
        })
        .map(|name| Microphone {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
        })
        .collect();

    sort_default_first(&mut microphones);
    Ok(microphones)
}

fn sort_default_first(microphones: &mut [Microphone]) {
    microphones.sort_by_key(|m| !m.is_default);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_microphone_is_listed_first() {
        let mut mics = vec![
            Microphone {
                name: "USB Headset".to_string(),
                is_default: false,
            },
            Microphone {
                name: "Built-in".to_string(),
                is_default: true,
            },
        ];

        sort_default_first(&mut mics);

        assert_eq!(mics[0].name, "Built-in");
        assert_eq!(mics[1].name, "USB Headset");
    }
}
