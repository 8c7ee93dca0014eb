//! Bounded handoff between the decoder and a command sink
//!
//! The sink is created on the dispatcher thread itself, so platform input
//! handles never cross threads.

use std::thread::{self, JoinHandle};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, info, warn};

use super::{CommandSink, LogSink, SinkError};
use crate::chord::Command;

/// Cloneable, non-blocking handle onto the command queue
///
/// Held by the capture callback so commands never wait behind telemetry.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    /// Create a sender and the receiving end of its bounded queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Queue a command without blocking; dropped if the queue is full
    pub fn submit(&self, command: Command) {
        match self.tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(command)) => {
                warn!(%command, "command queue full, dropping command");
            }
            Err(TrySendError::Closed(command)) => {
                warn!(%command, "command sink stopped, dropping command");
            }
        }
    }
}

/// Delivers commands to a sink on a dedicated thread
pub struct CommandDispatcher {
    sender: CommandSender,
    handle: Option<JoinHandle<u64>>,
}

impl CommandDispatcher {
    /// Start the dispatcher thread
    ///
    /// If `make_sink` fails, commands are logged instead of delivered.
    pub fn start<F>(make_sink: F, capacity: usize) -> Result<Self, SinkError>
    where
        F: FnOnce() -> Result<Box<dyn CommandSink>, SinkError> + Send + 'static,
    {
        let (sender, mut rx) = CommandSender::channel(capacity);

        let handle = thread::Builder::new()
            .name("command-sink".to_string())
            .spawn(move || {
                let mut sink = match make_sink() {
                    Ok(sink) => sink,
                    Err(e) => {
                        error!(%e, "failed to create command sink");
                        warn!("continuing without key injection - commands will only be logged");
                        Box::new(LogSink::new())
                    }
                };

                info!("command sink thread started");

                let mut delivered = 0u64;
                while let Some(command) = rx.blocking_recv() {
                    match sink.deliver(command) {
                        Ok(()) => delivered += 1,
                        Err(e) => warn!(%command, %e, "command delivery failed"),
                    }
                }

                info!(delivered, "command sink thread stopped");
                delivered
            })
            .map_err(|e| SinkError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Handle for queuing commands from other threads
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Drain queued commands and wait for the thread to finish
    ///
    /// The queue only closes once every `CommandSender` clone is gone.
    /// Returns the number of commands delivered successfully.
    pub fn stop(mut self) -> u64 {
        let handle = self.handle.take();
        drop(self);

        match handle.map(JoinHandle::join) {
            Some(Ok(delivered)) => delivered,
            Some(Err(_)) => {
                warn!("command sink thread panicked");
                0
            }
            None => 0,
        }
    }
}
