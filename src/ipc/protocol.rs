//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::chord::Command;
use crate::classifier::ClassifierState;
use crate::events::DecoderEvent;

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from clients to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to decoder event notifications
    Subscribe,
}

/// Responses from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A decoder event occurred
    Event { event: DecoderEvent },

    /// Notifications were skipped because the client fell behind
    Lagged { skipped: u64 },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Sample source description
    pub source: String,

    /// Whether samples are being delivered
    pub capture_active: bool,

    /// Current pulse classifier phase
    pub classifier_state: ClassifierState,

    /// Pulses confirmed since start
    pub pulses_detected: u64,

    /// Commands emitted since start
    pub commands_emitted: u64,

    /// Most recent command
    pub last_command: Option<Command>,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    /// Initial status for the given source
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            source: source.into(),
            capture_active: false,
            classifier_state: ClassifierState::Idle,
            pulses_detected: 0,
            commands_emitted: 0,
            last_command: None,
            uptime_secs: 0,
        }
    }

    /// Fold a decoder event into the snapshot
    pub fn apply(&mut self, event: &DecoderEvent) {
        match event {
            DecoderEvent::StateChanged { to, .. } => self.classifier_state = *to,
            DecoderEvent::PulseDetected { .. } => self.pulses_detected += 1,
            DecoderEvent::CommandEmitted { command, .. } => {
                self.commands_emitted += 1;
                self.last_command = Some(*command);
            }
            DecoderEvent::CaptureStarted { source } => {
                self.capture_active = true;
                self.source = source.clone();
            }
            DecoderEvent::CaptureStopped => self.capture_active = false,
        }
    }
}
