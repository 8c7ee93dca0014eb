//! Live capture from an input device using cpal
//!
//! The stream lives on a dedicated thread which blocks until `stop()` is
//! called. The decoder runs inside the cpal data callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use tracing::{error, info, warn};

use super::device::{capture_config, select_input_device};
use super::{CaptureError, SampleSource};
use crate::classifier::SAMPLE_RATE;
use crate::decoder::Decoder;
use crate::events::{DecoderEvent, EventPublisher};

/// Captures samples from an input device
pub struct CaptureListener {
    /// Device name filter; `None` selects the last enumerated device
    wanted: Option<String>,
    running: Arc<AtomicBool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    device_name: Option<String>,
}

impl CaptureListener {
    /// Create a listener for the device matching `wanted`
    pub fn new(wanted: Option<String>) -> Self {
        Self {
            wanted,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
            device_name: None,
        }
    }
}

impl SampleSource for CaptureListener {
    /// Start capturing
    ///
    /// This spawns a thread that opens the device and keeps the stream alive
    /// until `stop()` is called. Opening errors are returned here.
    fn start(&mut self, decoder: Decoder, events: EventPublisher) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let wanted = self.wanted.clone();
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<String, CaptureError>>(1);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let spawned = thread::Builder::new()
            .name("pulse-capture".to_string())
            .spawn(move || {
                info!("capture thread started");

                match open_stream(wanted.as_deref(), decoder, events.clone()) {
                    Ok((stream, name)) => {
                        events.publish(DecoderEvent::CaptureStarted {
                            source: name.clone(),
                        });
                        let _ = ready_tx.send(Ok(name));

                        // Blocks until stop() sends or drops the sender
                        let _ = stop_rx.recv();

                        drop(stream);
                        events.publish(DecoderEvent::CaptureStopped);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }

                running.store(false, Ordering::SeqCst);
                info!("capture thread stopped");
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CaptureError::ThreadSpawn(e.to_string()));
            }
        };

        let name = match ready_rx.recv() {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(CaptureError::ThreadExited);
            }
        };
        info!(device = %name, "listening for pulses");

        self.device_name = Some(name);
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);

        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("capture thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        match (&self.device_name, &self.wanted) {
            (Some(name), _) => name.clone(),
            (None, Some(wanted)) => format!("device matching {:?}", wanted),
            (None, None) => "last input device".to_string(),
        }
    }
}

/// Open the selected device and start its stream
fn open_stream(
    wanted: Option<&str>,
    decoder: Decoder,
    events: EventPublisher,
) -> Result<(cpal::Stream, String), CaptureError> {
    let host = cpal::default_host();
    let (name, device) = select_input_device(&host, wanted)?;
    let supported = capture_config(&device, &name, SAMPLE_RATE)?;
    let format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();

    info!(
        device = %name,
        channels = config.channels,
        sample_rate = config.sample_rate.0,
        ?format,
        "opening input stream"
    );

    let stream = match format {
        SampleFormat::U8 => build_stream::<u8>(&device, &config, decoder, events)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, decoder, events)?,
        SampleFormat::I32 => build_stream::<i32>(&device, &config, decoder, events)?,
        SampleFormat::F32 => build_stream::<f32>(&device, &config, decoder, events)?,
        other => return Err(CaptureError::UnsupportedFormat(format!("{:?}", other))),
    };

    stream.play()?;

    Ok((stream, name))
}

/// Build an input stream that converts frames to unsigned 8-bit mono
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut decoder: Decoder,
    events: EventPublisher,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    u8: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Real-time path: no allocation, no blocking
            let frames = data
                .chunks_exact(channels)
                .map(|frame| u8::from_sample(frame[0]));
            decoder.process(frames, |event| events.publish(event));
        },
        |err| error!(%err, "input stream error"),
        None,
    )?;

    Ok(stream)
}
