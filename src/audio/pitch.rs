//! Autocorrelation pitch detection
//!
//! A deliberately cheap time-domain estimator: good enough to follow a child
//! holding a long tone, not a studio pitch tracker. Frames whose RMS falls
//! below [`RMS_FLOOR`] or whose best self-similarity stays under
//! [`CORRELATION_THRESHOLD`] report no pitch (`None`) instead of a guess.

/// Frames quieter than this never produce a pitch
pub const RMS_FLOOR: f32 = 0.01;

/// Minimum self-similarity required to trust a lag
pub const CORRELATION_THRESHOLD: f32 = 0.9;

/// Smallest lag examined, in samples
pub const MIN_LAG: usize = 50;

/// Default in-tune window in cents
pub const DEFAULT_TOLERANCE_CENTS: f32 = 50.0;

/// Default time a note must be held in tune, in milliseconds
pub const DEFAULT_SUSTAIN_MS: u64 = 2000;

/// Root mean square of a frame
pub fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// `1 - mean(|x[i] - x[i + lag]|)` over the first `half` samples
fn similarity(frame: &[f32], lag: usize, half: usize) -> f32 {
    let diff: f32 = frame[..half]
        .iter()
        .zip(&frame[lag..lag + half])
        .map(|(a, b)| (a - b).abs())
        .sum();
    1.0 - diff / half as f32
}

/// Estimate the fundamental frequency of `frame` in Hz.
///
/// Lags from [`MIN_LAG`] up to half the frame length are scored with
/// `similarity`. Lags on the falling slope after zero are skipped; the first
/// peak past that dip which clears the threshold wins over its multiples. The
/// lag just below [`MIN_LAG`] seeds the slope, so a period sitting right at
/// the bottom of the range still counts as a peak.
pub fn detect_pitch(frame: &[f32], sample_rate: u32) -> Option<f32> {
    if rms(frame) < RMS_FLOOR {
        return None;
    }

    let half = frame.len() / 2;
    if half <= MIN_LAG {
        return None;
    }

    let mut best_offset = 0usize;
    let mut best_correlation = 0.0f32;
    let mut previous = similarity(frame, MIN_LAG - 1, half);
    let mut past_first_dip = false;

    for offset in MIN_LAG..half {
        let correlation = similarity(frame, offset, half);

        if !past_first_dip {
            past_first_dip = correlation > previous;
            previous = correlation;
            if !past_first_dip {
                continue;
            }
        }

        if correlation > best_correlation {
            best_correlation = correlation;
            best_offset = offset;
        } else if best_correlation > CORRELATION_THRESHOLD {
            break;
        }
    }

    if best_correlation > CORRELATION_THRESHOLD && best_offset > 0 {
        Some(sample_rate as f32 / best_offset as f32)
    } else {
        None
    }
}

/// Deviation of `detected_hz` from `target_hz` in cents (100 cents = 1 semitone)
pub fn cents_deviation(detected_hz: f32, target_hz: f32) -> f32 {
    1200.0 * (detected_hz / target_hz).log2()
}

/// Whether a tick's pitch lies within `tolerance_cents` of the target.
/// A tick without a pitch is never in tune.
pub fn is_in_tune(pitch_hz: Option<f32>, target_hz: f32, tolerance_cents: f32) -> bool {
    match pitch_hz {
        Some(hz) if hz > 0.0 && target_hz > 0.0 => {
            cents_deviation(hz, target_hz).abs() <= tolerance_cents
        }
        _ => false,
    }
}

/// Tracks how long a target note has been held continuously in tune.
///
/// Any out-of-tolerance (or silent) tick drops the running total back to
/// zero; nothing carries across an interruption.
#[derive(Debug, Clone)]
pub struct SustainedMatch {
    target_hz: f32,
    tolerance_cents: f32,
    required_ms: u64,
    current_ms: u64,
    longest_ms: u64,
}

impl SustainedMatch {
    pub fn new(target_hz: f32, tolerance_cents: f32, required_ms: u64) -> Self {
        Self {
            target_hz,
            tolerance_cents,
            required_ms,
            current_ms: 0,
            longest_ms: 0,
        }
    }

    /// Feed one tick. Returns whether the tick was in tune.
    pub fn observe(&mut self, pitch_hz: Option<f32>, tick_ms: u64) -> bool {
        let in_tune = is_in_tune(pitch_hz, self.target_hz, self.tolerance_cents);
        if in_tune {
            self.current_ms += tick_ms;
            self.longest_ms = self.longest_ms.max(self.current_ms);
        } else {
            self.current_ms = 0;
        }
        in_tune
    }

    /// Length of the current in-tune run
    pub fn matched_ms(&self) -> u64 {
        self.current_ms
    }

    /// Longest in-tune run seen so far
    pub fn longest_ms(&self) -> u64 {
        self.longest_ms
    }

    /// True once any run has reached the required duration
    pub fn is_matched(&self) -> bool {
        self.longest_ms >= self.required_ms
    }

    /// Deviation of `pitch_hz` from this tracker's target
    pub fn cents(&self, pitch_hz: Option<f32>) -> Option<f32> {
        pitch_hz
            .filter(|hz| *hz > 0.0)
            .map(|hz| cents_deviation(hz, self.target_hz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f32, expected: f32, tolerance: f32) {
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected} +/- {tolerance}, got {actual}"
        );
    }

    fn sine(freq: f32, amplitude: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    /// Deterministic white noise in [-amplitude, amplitude]
    fn noise(amplitude: f32, len: usize) -> Vec<f32> {
        let mut state: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let unit = (state >> 8) as f32 / (1u32 << 24) as f32;
                (unit * 2.0 - 1.0) * amplitude
            })
            .collect()
    }

    #[test]
    fn silence_reports_no_pitch() {
        assert_eq!(detect_pitch(&vec![0.0; 2048], 44100), None);
    }

    #[test]
    fn quiet_frame_below_floor_reports_no_pitch() {
        // RMS of a sine is amplitude / sqrt(2): 0.012 / 1.414 < 0.01
        let frame = sine(440.0, 0.012, 44100, 2048);
        assert!(rms(&frame) < RMS_FLOOR);
        assert_eq!(detect_pitch(&frame, 44100), None);
    }

    #[test]
    fn detects_concert_a() {
        let frame = sine(440.0, 0.5, 44100, 2048);
        let hz = detect_pitch(&frame, 44100).expect("pitch");
        assert_approx(hz, 440.0, 5.0);
    }

    #[test]
    fn detects_low_sung_note_without_octave_error() {
        let frame = sine(220.0, 0.4, 44100, 2048);
        let hz = detect_pitch(&frame, 44100).expect("pitch");
        assert_approx(hz, 220.0, 3.0);
    }

    #[test]
    fn detects_quiet_low_note() {
        // Small lags already look similar at this level; the dip must be skipped
        let frame = sine(110.0, 0.05, 44100, 2048);
        let hz = detect_pitch(&frame, 44100).expect("pitch");
        assert_approx(hz, 110.0, 1.0);
    }

    #[test]
    fn detects_high_note_with_period_at_lag_floor() {
        // 880 Hz at 44.1 kHz repeats every ~50.1 samples
        let frame: Vec<f32> = sine(880.0, 0.4, 44100, 2048)
            .iter()
            .zip(sine(1760.0, 0.1, 44100, 2048))
            .map(|(a, b)| a + b)
            .collect();
        let hz = detect_pitch(&frame, 44100).expect("pitch");
        assert_approx(hz, 880.0, 5.0);
    }

    #[test]
    fn loud_noise_is_not_trusted() {
        let frame = noise(0.5, 2048);
        assert!(rms(&frame) > RMS_FLOOR);
        assert_eq!(detect_pitch(&frame, 44100), None);
    }

    #[test]
    fn short_frame_reports_no_pitch() {
        let frame = sine(440.0, 0.5, 44100, 64);
        assert_eq!(detect_pitch(&frame, 44100), None);
    }

    #[test]
    fn cents_zero_at_target() {
        assert_approx(cents_deviation(440.0, 440.0), 0.0, 1e-4);
    }

    #[test]
    fn cents_one_semitone_up() {
        assert_approx(cents_deviation(466.16, 440.0), 100.0, 1.0);
        assert_approx(cents_deviation(415.30, 440.0), -100.0, 1.0);
    }

    #[test]
    fn in_tune_respects_tolerance() {
        assert!(is_in_tune(Some(445.0), 440.0, 50.0));
        assert!(!is_in_tune(Some(466.16), 440.0, 50.0));
        assert!(!is_in_tune(None, 440.0, 50.0));
    }

    #[test]
    fn sustained_match_needs_unbroken_run() {
        let mut tracker = SustainedMatch::new(440.0, 50.0, 2000);

        for _ in 0..15 {
            tracker.observe(Some(441.0), 100);
        }
        assert_eq!(tracker.matched_ms(), 1500);
        assert!(!tracker.is_matched());

        // One sour tick wipes the run
        tracker.observe(Some(520.0), 100);
        assert_eq!(tracker.matched_ms(), 0);
        assert_eq!(tracker.longest_ms(), 1500);

        for _ in 0..20 {
            tracker.observe(Some(439.0), 100);
        }
        assert!(tracker.is_matched());
    }

    #[test]
    fn dropout_breaks_sustained_match() {
        let mut tracker = SustainedMatch::new(262.0, 50.0, 500);
        for _ in 0..4 {
            tracker.observe(Some(262.0), 100);
        }
        tracker.observe(None, 100);
        tracker.observe(Some(262.0), 100);

        assert_eq!(tracker.matched_ms(), 100);
        assert!(!tracker.is_matched());
    }
}
