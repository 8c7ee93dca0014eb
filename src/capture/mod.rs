//! Sample sources feeding the decoder
//!
//! Two sources are available:
//! - `CaptureListener`: live input device via cpal
//! - `ReplaySource`: a recorded WAV file, paced at real time
//!
//! Both run the decoder on their own thread and publish its events.

mod device;
mod replay;
mod stream;

pub use device::input_device_names;
pub use replay::ReplaySource;
pub use stream::CaptureListener;

use crate::decoder::Decoder;
use crate::events::EventPublisher;

/// Frames per batch, matching the buffer size of the capture callback
pub const BATCH_FRAMES: usize = 16_384;

/// A source of 8-bit mono samples delivered in order
pub trait SampleSource {
    /// Start delivering samples into `decoder`, publishing its events
    fn start(&mut self, decoder: Decoder, events: EventPublisher) -> Result<(), CaptureError>;

    /// Stop delivery and release the underlying resources
    fn stop(&mut self);

    /// Check if samples are currently being delivered
    fn is_running(&self) -> bool;

    /// Human readable name of the source
    fn describe(&self) -> String;
}

/// Errors that can occur while opening or running a sample source
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("sample source is already running")]
    AlreadyRunning,

    #[error("no audio input devices found")]
    NoDevices,

    #[error("no input device matching {0:?}")]
    DeviceNotFound(String),

    #[error("{device} cannot capture at {sample_rate} Hz")]
    UnsupportedRate { device: String, sample_rate: u32 },

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query device configs: {0}")]
    StreamConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to read recording: {0}")]
    Wav(#[from] hound::Error),

    #[error("failed to spawn source thread: {0}")]
    ThreadSpawn(String),

    #[error("source thread exited before reporting readiness")]
    ThreadExited,
}
