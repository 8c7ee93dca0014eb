//! Events module for decoder output
//!
//! Provides structured event types for classifier transitions, detected
//! pulses, chord commands and capture lifecycle, plus the non-blocking
//! publisher used from the capture callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::chord::Command;
use crate::classifier::ClassifierState;
use crate::sink::CommandSender;

/// Events emitted by the decoder and the sample sources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecoderEvent {
    /// The pulse classifier changed phase
    StateChanged {
        from: ClassifierState,
        to: ClassifierState,
        /// Sample that caused the transition
        sample_index: u64,
    },

    /// A full pulse shape was confirmed
    PulseDetected {
        /// First sample of the pulse's final low run
        sample_index: u64,
    },

    /// A chord produced a command
    CommandEmitted {
        command: Command,
        /// Presses in the chord so far
        presses: u8,
    },

    /// Sample delivery started
    CaptureStarted {
        /// Device name or replayed file
        source: String,
    },

    /// Sample delivery ended
    CaptureStopped,
}

impl std::fmt::Display for DecoderEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderEvent::StateChanged { from, to, .. } => {
                write!(f, "STATE_CHANGED ({} -> {})", from, to)
            }
            DecoderEvent::PulseDetected { sample_index } => {
                write!(f, "PULSE_DETECTED (@{})", sample_index)
            }
            DecoderEvent::CommandEmitted { command, presses } => {
                write!(f, "COMMAND_EMITTED ({} x{})", command, presses)
            }
            DecoderEvent::CaptureStarted { source } => {
                write!(f, "CAPTURE_STARTED ({})", source)
            }
            DecoderEvent::CaptureStopped => write!(f, "CAPTURE_STOPPED"),
        }
    }
}

/// Hands decoder events off the real-time path without blocking
///
/// When the queue is full the event is dropped and counted. Commands can
/// be routed straight to a command queue so a telemetry backlog never
/// loses a key press.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<DecoderEvent>,
    dropped: Arc<AtomicU64>,
    commands: Option<CommandSender>,
}

impl EventPublisher {
    /// Create a publisher and the receiving end of its bounded queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DecoderEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let publisher = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            commands: None,
        };
        (publisher, rx)
    }

    /// Also hand every emitted command to `commands`
    pub fn with_commands(mut self, commands: CommandSender) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Queue an event, never blocking
    pub fn publish(&self, event: DecoderEvent) {
        if let (DecoderEvent::CommandEmitted { command, .. }, Some(commands)) =
            (&event, &self.commands)
        {
            commands.submit(*command);
        }

        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(%event, dropped, "event queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    /// Shared count of events dropped because the queue was full
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}
