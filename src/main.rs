//! pulse-remote-daemon: decodes pulse chords on an audio line into media keys
//!
//! This daemon listens to an input device carrying short voltage pulses
//! and provides:
//! - Per-sample pulse classification inside the capture callback
//! - Chord aggregation (1/2/3 pulses -> Play/Next/Previous)
//! - Media key injection on a dedicated thread
//! - IPC server for status queries and event subscriptions

mod capture;
mod chord;
mod classifier;
mod config;
mod decoder;
mod events;
mod ipc;
mod lifecycle;
mod sink;

use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::capture::{CaptureListener, ReplaySource, SampleSource};
use crate::config::{Config, SinkKind, SourceKind};
use crate::decoder::Decoder;
use crate::events::{DecoderEvent, EventPublisher};
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::sink::{CommandDispatcher, CommandSink, KeySink, LogSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::load()?;

    if config.list_devices {
        for name in capture::input_device_names()? {
            println!("{}", name);
        }
        return Ok(());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "pulse-remote-daemon starting"
    );
    info!(?config.socket_path, ?config.source, ?config.sink, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Command sink thread
    let sink_kind = config.sink;
    let dispatcher = CommandDispatcher::start(
        move || -> Result<Box<dyn CommandSink>, sink::SinkError> {
            match sink_kind {
                SinkKind::Keys => Ok(Box::new(KeySink::new()?)),
                SinkKind::Log => Ok(Box::new(LogSink::new())),
            }
        },
        config.command_queue,
    )?;

    // Decoder (capture thread) -> event router; commands go straight to
    // the sink thread
    let (publisher, mut event_rx) = EventPublisher::channel(config.event_queue);
    let publisher = publisher.with_commands(dispatcher.sender());
    let dropped_events = publisher.dropped_counter();

    let mut source: Box<dyn SampleSource> = match &config.source {
        SourceKind::Device { name } => Box::new(CaptureListener::new(name.clone())),
        SourceKind::Replay { path } => Box::new(ReplaySource::new(path)),
    };

    // Create IPC server
    let server = Server::new(&config.socket_path, &source.describe())?;

    // Start delivering samples; the publisher moves into the source, so the
    // event stream closes once the source ends
    let decoder = Decoder::new(config.thresholds);
    source
        .start(decoder, publisher)
        .with_context(|| format!("failed to start {}", source.describe()))?;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Log decoder events and forward them to the IPC server
        _ = async {
            while let Some(event) = event_rx.recv().await {
                match &event {
                    DecoderEvent::CommandEmitted { command, presses } => {
                        info!(%command, presses, "chord command");
                    }
                    DecoderEvent::StateChanged { from, to, sample_index } => {
                        debug!(from = %from, to = %to, sample_index, "classifier transition");
                    }
                    DecoderEvent::PulseDetected { sample_index } => {
                        debug!(sample_index, "pulse detected");
                    }
                    DecoderEvent::CaptureStarted { .. } | DecoderEvent::CaptureStopped => {
                        info!(%event, "capture event");
                    }
                }
                server.record(&event).await;
            }
        } => {
            info!("sample source finished");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => error!(?e, "failed to register signal handlers"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    if source.is_running() {
        info!(source = %source.describe(), "stopping sample source");
    }
    source.stop();
    let delivered = dispatcher.stop();

    let status = server.status().await;
    info!(
        pulses = status.pulses_detected,
        commands = status.commands_emitted,
        delivered,
        dropped_events = dropped_events.load(Ordering::Relaxed),
        uptime_secs = status.uptime_secs,
        "session summary"
    );

    server.shutdown().await;

    info!("pulse-remote-daemon stopped");

    Ok(())
}
