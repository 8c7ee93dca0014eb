//! Chord aggregation
//!
//! Groups pulses that arrive within the debounce interval of the chord's
//! first pulse. The first pulse fires Play straight away; later pulses in
//! the same window fire Next and Previous on top of it. There is no undo
//! and no timer: a window only closes when a late pulse opens the next one.

use std::time::{Duration, Instant};

use tracing::debug;

use super::command::Command;
use crate::classifier::PulseDetected;

/// Aggregates pulses into chord commands
#[derive(Debug, Clone)]
pub struct ChordAggregator {
    chord_len: Duration,
    /// Start of the open window, if any
    chord_start: Option<Instant>,
    /// Pulses seen in the open window
    chord_presses: u8,
}

impl ChordAggregator {
    /// Create an aggregator with the given debounce interval
    pub fn new(chord_len: Duration) -> Self {
        Self {
            chord_len,
            chord_start: None,
            chord_presses: 0,
        }
    }

    /// Presses counted in the current window
    pub fn presses(&self) -> u8 {
        self.chord_presses
    }

    /// Handle a pulse that arrived at `now`
    pub fn on_pulse(&mut self, pulse: PulseDetected, now: Instant) -> Option<Command> {
        let in_window = self
            .chord_start
            .is_some_and(|start| now.saturating_duration_since(start) <= self.chord_len);

        if !in_window {
            self.chord_start = Some(now);
            self.chord_presses = 1;
            debug!(
                presses = self.chord_presses,
                sample_index = pulse.sample_index,
                "chord started"
            );
            return Some(Command::Play);
        }

        self.chord_presses = self.chord_presses.saturating_add(1);
        debug!(
            presses = self.chord_presses,
            sample_index = pulse.sample_index,
            "chord press"
        );

        match self.chord_presses {
            2 => Some(Command::Next),
            3 => Some(Command::Previous),
            _ => None,
        }
    }
}
