//! Command sinks
//!
//! Decoded commands leave the real-time path through a bounded queue and
//! are delivered on a dedicated thread. Delivery is fire-and-forget:
//! failures are logged and the next command is processed.

mod dispatcher;
mod keys;

pub use dispatcher::{CommandDispatcher, CommandSender};
pub use keys::KeySink;

use tracing::info;

use crate::chord::Command;

/// Performs the platform action for a command
pub trait CommandSink {
    fn deliver(&mut self, command: Command) -> Result<(), SinkError>;
}

/// Errors that can occur while delivering commands
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("failed to initialise key injection: {0}")]
    Init(String),

    #[error("failed to send {command}: {reason}")]
    Key { command: Command, reason: String },

    #[error("failed to spawn sink thread: {0}")]
    ThreadSpawn(String),
}

/// Logs commands instead of acting on them
#[derive(Debug, Default)]
pub struct LogSink {
    delivered: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandSink for LogSink {
    fn deliver(&mut self, command: Command) -> Result<(), SinkError> {
        self.delivered += 1;
        info!(%command, delivered = self.delivered, "command (dry run)");
        Ok(())
    }
}
