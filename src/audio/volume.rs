//! Loudness normalization for one analysis tick

/// Upper bound of a normalized volume reading
pub const MAX_VOLUME: f32 = 100.0;

/// Convert byte-scaled frequency bins into a 0-100 loudness value.
///
/// `min(100, mean(bins) / 255 * gain * 100)`. With the default gain of 2 an
/// ordinary singing voice lands around 40-80 instead of hugging the bottom of
/// the range. An empty frame reads as silence.
pub fn normalized_volume(bins: &[u8], gain: f32) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }

    let sum: u64 = bins.iter().map(|&b| b as u64).sum();
    let mean = sum as f32 / bins.len() as f32;

    ((mean / 255.0) * gain * 100.0).clamp(0.0, MAX_VOLUME)
}

/// Arithmetic mean of a volume history, 0 when empty
pub fn average(volumes: &[f32]) -> f32 {
    if volumes.is_empty() {
        return 0.0;
    }
    volumes.iter().sum::<f32>() / volumes.len() as f32
}

/// Population variance of a volume history, 0 when empty
pub fn variance(volumes: &[f32]) -> f32 {
    if volumes.is_empty() {
        return 0.0;
    }
    let mean = average(volumes);
    volumes
        .iter()
        .map(|v| {
            let d = *v - mean;
            d * d
        })
        .sum::<f32>()
        / volumes.len() as f32
}
