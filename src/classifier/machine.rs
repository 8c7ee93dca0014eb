//! Per-sample pulse classifier
//!
//! Walks Idle -> HighHold -> Cooldown -> Idle, driven only by a run-length
//! counter and the sample thresholds. One call per sample, no allocation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::thresholds::Thresholds;

/// Phase of the pulse classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierState {
    /// Waiting for a long enough low dwell to arm
    #[default]
    Idle,
    /// Armed, waiting for the high segment of a pulse
    HighHold,
    /// High segment seen, waiting for the return to low
    Cooldown,
}

impl std::fmt::Display for ClassifierState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierState::Idle => write!(f, "Idle"),
            ClassifierState::HighHold => write!(f, "HighHold"),
            ClassifierState::Cooldown => write!(f, "Cooldown"),
        }
    }
}

/// A confirmed low -> high -> low pulse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseDetected {
    /// Index of the first sample of the final low run
    pub sample_index: u64,
}

/// Classifies a sample stream into pulses
#[derive(Debug, Clone)]
pub struct PulseClassifier {
    thresholds: Thresholds,
    state: ClassifierState,
    /// Qualifying samples counted in the current state
    run_count: u32,
    /// Samples spent in HighHold, qualifying or not
    armed_for: u32,
    /// Index where the current return-to-low run started
    run_start: u64,
    /// A grace-band sample interrupted the return-to-low run
    interrupted: bool,
}

impl PulseClassifier {
    /// Create a classifier in the Idle state
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: ClassifierState::Idle,
            run_count: 0,
            armed_for: 0,
            run_start: 0,
            interrupted: false,
        }
    }

    /// Get the current state
    pub fn state(&self) -> ClassifierState {
        self.state
    }

    /// Get the current run counter
    pub fn run_count(&self) -> u32 {
        self.run_count
    }

    /// Get the thresholds this classifier was built with
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Feed one sample, returning a pulse once its shape is confirmed
    pub fn feed(&mut self, sample: u8, sample_index: u64) -> Option<PulseDetected> {
        match self.state {
            ClassifierState::Idle => {
                self.feed_idle(sample);
                None
            }
            ClassifierState::HighHold => {
                self.feed_high_hold(sample);
                None
            }
            ClassifierState::Cooldown => self.feed_cooldown(sample, sample_index),
        }
    }

    /// Accumulate the low dwell; any non-low sample loses all credit
    fn feed_idle(&mut self, sample: u8) {
        if sample <= self.thresholds.low_threshold {
            self.bump();
            if self.run_count > self.thresholds.low_len {
                self.transition_to(ClassifierState::HighHold);
            }
        } else {
            self.run_count = 0;
        }
    }

    /// Count high samples; brief dips are tolerated, sustained audio is not
    fn feed_high_hold(&mut self, sample: u8) {
        self.armed_for = self.armed_for.saturating_add(1);

        if sample >= self.thresholds.high_threshold {
            self.bump();
            if self.run_count > self.thresholds.high_confirm_len {
                self.transition_to(ClassifierState::Cooldown);
            }
        } else if self.thresholds.is_mid_band(sample)
            && self.armed_for > self.thresholds.false_alarm_len
        {
            debug!(
                sample,
                armed_for = self.armed_for,
                "mid-band sample while armed, back to audio"
            );
            self.transition_to(ClassifierState::Idle);
        }
    }

    /// Count the return to low; samples above the low threshold are a grace
    /// band that neither counts nor resets, but the pulse is stamped at the
    /// low run that follows the last interruption
    fn feed_cooldown(&mut self, sample: u8, sample_index: u64) -> Option<PulseDetected> {
        if sample > self.thresholds.low_threshold {
            self.interrupted = true;
            return None;
        }

        if self.run_count == 0 || self.interrupted {
            self.run_start = sample_index;
            self.interrupted = false;
        }
        self.bump();

        if self.run_count > self.thresholds.return_len {
            let pulse = PulseDetected {
                sample_index: self.run_start,
            };
            self.transition_to(ClassifierState::Idle);
            return Some(pulse);
        }

        None
    }

    /// Increment the run counter; it saturates instead of wrapping
    fn bump(&mut self) {
        self.run_count = self.run_count.saturating_add(1);
    }

    fn transition_to(&mut self, new_state: ClassifierState) {
        self.state = new_state;
        self.run_count = 0;
        self.armed_for = 0;
        self.interrupted = false;
    }
}

impl Default for PulseClassifier {
    fn default() -> Self {
        Self::new(Thresholds::default())
    }
}
