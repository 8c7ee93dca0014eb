//! Configuration loading and management
//!
//! There is no configuration file: options come from the command line or
//! the matching `PULSE_REMOTE_*` environment variables. Decoder thresholds
//! are fixed constants.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::classifier::Thresholds;

/// Decode pulse chords on an audio line into media-key presses
#[derive(Debug, Parser)]
#[command(name = "pulse-remote-daemon", version, about)]
pub struct Args {
    /// Input device to listen on (case-insensitive substring of its name)
    #[arg(long, env = "PULSE_REMOTE_DEVICE")]
    pub device: Option<String>,

    /// Print the available input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Decode a recorded 44.1 kHz WAV file instead of a live device
    #[arg(long, env = "PULSE_REMOTE_REPLAY", conflicts_with = "device")]
    pub replay: Option<PathBuf>,

    /// Log commands instead of sending media keys
    #[arg(long, env = "PULSE_REMOTE_DRY_RUN")]
    pub dry_run: bool,

    /// Path of the status socket
    #[arg(long, env = "PULSE_REMOTE_SOCKET")]
    pub socket: Option<PathBuf>,
}

/// Where samples come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Live input device; `None` selects the last enumerated device
    Device { name: Option<String> },
    /// Recorded WAV file
    Replay { path: PathBuf },
}

/// Where commands go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Inject media key presses
    Keys,
    /// Only log commands
    Log,
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Sample source to decode
    pub source: SourceKind,

    /// Command sink to drive
    pub sink: SinkKind,

    /// Print input devices and exit
    pub list_devices: bool,

    /// Decoder thresholds
    pub thresholds: Thresholds,

    /// Capacity of the decoder event queue
    pub event_queue: usize,

    /// Capacity of the command queue
    pub command_queue: usize,
}

impl Config {
    /// Load configuration from the command line, environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let socket_path = match args.socket {
            Some(path) => path,
            None => default_socket_path()?,
        };

        let source = match args.replay {
            Some(path) => SourceKind::Replay { path },
            None => SourceKind::Device { name: args.device },
        };

        let sink = if args.dry_run {
            SinkKind::Log
        } else {
            SinkKind::Keys
        };

        Ok(Self {
            socket_path,
            source,
            sink,
            list_devices: args.list_devices,
            thresholds: Thresholds::default(),
            event_queue: 256,
            command_queue: 16,
        })
    }
}

fn default_socket_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set; pass --socket")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("pulse-remote")
        .join("daemon.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let argv = std::iter::once("pulse-remote-daemon").chain(args.iter().copied());
        let args = Args::try_parse_from(argv).unwrap();
        Config::from_args(args).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = parse(&["--socket", "/tmp/pulse.sock"]);
        assert_eq!(config.socket_path, PathBuf::from("/tmp/pulse.sock"));
        assert_eq!(config.source, SourceKind::Device { name: None });
        assert_eq!(config.sink, SinkKind::Keys);
        assert!(!config.list_devices);
        assert_eq!(config.thresholds, Thresholds::default());
    }

    #[test]
    fn test_config_load() {
        if std::env::var("HOME").is_err() {
            return;
        }
        let config = parse(&[]);
        assert!(config.socket_path.to_string_lossy().contains("pulse-remote"));
    }

    #[test]
    fn test_replay_and_dry_run() {
        let config = parse(&["--replay", "line.wav", "--dry-run", "--socket", "/tmp/p.sock"]);
        assert_eq!(
            config.source,
            SourceKind::Replay {
                path: PathBuf::from("line.wav")
            }
        );
        assert_eq!(config.sink, SinkKind::Log);
    }

    #[test]
    fn test_device_conflicts_with_replay() {
        let result = Args::try_parse_from([
            "pulse-remote-daemon",
            "--device",
            "usb",
            "--replay",
            "line.wav",
        ]);
        assert!(result.is_err());
    }
}
