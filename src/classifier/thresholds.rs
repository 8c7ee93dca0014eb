//! Decoder constants
//!
//! Every dwell length is expressed in samples and derived once from the
//! sample rate, so the per-sample path only compares integers.

use std::time::Duration;

/// Sample rate the decoder is tuned for (Hz, mono)
pub const SAMPLE_RATE: u32 = 44_100;

/// Samples at or below this value are "low"
pub const LOW_THRESHOLD: u8 = 4;

/// Samples at or above this value are "high"
pub const HIGH_THRESHOLD: u8 = 255;

/// Non-low samples below this value look like program audio
pub const AUDIO_CEILING: u8 = 100;

/// Low dwell needed to arm (0.15s scaled by 0.8)
const LOW_DWELL_MS: u64 = 120;

/// Full high dwell of a pulse (0.01s scaled by 0.8)
const HIGH_DWELL_MS: u64 = 8;

/// How long the armed classifier tolerates mid-band samples
const FALSE_ALARM_MS: u64 = 100;

/// Debounce interval grouping pulses into one chord
const CHORD_MS: u64 = 400;

/// Thresholds and dwell lengths used by the pulse classifier and chord
/// aggregator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Sample rate the lengths were derived from
    pub sample_rate: u32,
    /// Upper bound (inclusive) of a low sample
    pub low_threshold: u8,
    /// Lower bound (inclusive) of a high sample
    pub high_threshold: u8,
    /// Mid-band samples lie strictly between `low_threshold` and this
    pub audio_ceiling: u8,
    /// Low samples needed (exceeded) before the classifier arms
    pub low_len: u32,
    /// Full high dwell of a pulse
    pub high_len: u32,
    /// High samples needed (exceeded) to confirm the high segment
    pub high_confirm_len: u32,
    /// Low samples needed (exceeded) after the high segment
    pub return_len: u32,
    /// Samples spent armed after which a mid-band sample is a false alarm
    pub false_alarm_len: u32,
    /// Debounce interval between the first pulse of a chord and later ones
    pub chord_len: Duration,
}

impl Thresholds {
    /// Derive all dwell lengths for the given sample rate
    pub fn for_sample_rate(sample_rate: u32) -> Self {
        let low_len = samples_for(sample_rate, LOW_DWELL_MS);
        let high_len = samples_for(sample_rate, HIGH_DWELL_MS);

        Self {
            sample_rate,
            low_threshold: LOW_THRESHOLD,
            high_threshold: HIGH_THRESHOLD,
            audio_ceiling: AUDIO_CEILING,
            low_len,
            high_len,
            high_confirm_len: high_len / 8,
            return_len: low_len / 4,
            false_alarm_len: samples_for(sample_rate, FALSE_ALARM_MS),
            chord_len: Duration::from_millis(CHORD_MS),
        }
    }

    /// Wall-clock length of `samples` at this sample rate
    pub fn samples_to_duration(&self, samples: u64) -> Duration {
        let nanos = u128::from(samples) * 1_000_000_000 / u128::from(self.sample_rate.max(1));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Whether `sample` sits in the band that suggests program audio
    pub fn is_mid_band(&self, sample: u8) -> bool {
        sample > self.low_threshold && sample < self.audio_ceiling
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::for_sample_rate(SAMPLE_RATE)
    }
}

fn samples_for(sample_rate: u32, millis: u64) -> u32 {
    let samples = u64::from(sample_rate) * millis / 1000;
    u32::try_from(samples).unwrap_or(u32::MAX)
}
