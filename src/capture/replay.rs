//! Replay of a recorded line capture
//!
//! Reads a WAV file with hound, keeps the first channel as unsigned 8-bit
//! samples and feeds it to the decoder in capture-sized batches, paced at
//! the rate the samples were recorded.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::{self, JoinHandle};

use cpal::Sample;
use hound::{SampleFormat, WavReader};
use tracing::{debug, info, warn};

use super::{CaptureError, SampleSource, BATCH_FRAMES};
use crate::classifier::{Thresholds, SAMPLE_RATE};
use crate::decoder::Decoder;
use crate::events::{DecoderEvent, EventPublisher};

/// Feeds a WAV recording through the decoder
pub struct ReplaySource {
    path: PathBuf,
    running: Arc<AtomicBool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            handle: None,
        }
    }
}

impl SampleSource for ReplaySource {
    /// Start the replay
    ///
    /// The file is decoded up front so format errors surface here; the
    /// thread then ends on its own once every batch has been fed.
    fn start(&mut self, mut decoder: Decoder, events: EventPublisher) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let samples = match load_samples(&self.path) {
            Ok(samples) => samples,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let source = self.describe();
        let running = Arc::clone(&self.running);
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let batch_len = Thresholds::default().samples_to_duration(BATCH_FRAMES as u64);

        info!(
            %source,
            samples = samples.len(),
            seconds = samples.len() as f64 / f64::from(SAMPLE_RATE),
            "replaying recording"
        );

        let spawned = thread::Builder::new()
            .name("pulse-replay".to_string())
            .spawn(move || {
                events.publish(DecoderEvent::CaptureStarted { source });

                for batch in samples.chunks(BATCH_FRAMES) {
                    // Wait out the time the batch would take to record
                    match stop_rx.recv_timeout(batch_len) {
                        Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                        _ => {
                            debug!("replay interrupted");
                            break;
                        }
                    }
                    decoder.process_batch(batch, |event| events.publish(event));
                }

                events.publish(DecoderEvent::CaptureStopped);
                running.store(false, Ordering::SeqCst);
                info!(
                    samples = decoder.samples_seen(),
                    state = %decoder.state(),
                    "replay finished"
                );
            });

        match spawned {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::ThreadSpawn(e.to_string()))
            }
        }
    }

    fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("replay thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.path.display())
    }
}

/// Decode the first channel of a WAV file into unsigned 8-bit samples
pub(crate) fn load_samples(path: &Path) -> Result<Vec<u8>, CaptureError> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.sample_rate != SAMPLE_RATE {
        return Err(CaptureError::UnsupportedRate {
            device: path.display().to_string(),
            sample_rate: SAMPLE_RATE,
        });
    }

    debug!(
        channels = spec.channels,
        bits = spec.bits_per_sample,
        format = ?spec.sample_format,
        "reading recording"
    );

    let channels = usize::from(spec.channels.max(1));

    match sample_layout(spec.sample_format, spec.bits_per_sample)? {
        SampleLayout::Float32 => first_channel::<f32>(reader, channels, |s| u8::from_sample(s)),
        SampleLayout::Int8 => first_channel::<i8>(reader, channels, |s| u8::from_sample(s)),
        SampleLayout::Int16 => first_channel::<i16>(reader, channels, |s| u8::from_sample(s)),
        SampleLayout::Int32 { shift } => {
            first_channel::<i32>(reader, channels, |s| u8::from_sample(s << shift))
        }
    }
}

/// How samples of a WAV file are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleLayout {
    Float32,
    Int8,
    Int16,
    /// 24 or 32-bit integers, left-aligned by `shift` so the full i32 range
    /// maps onto 0..=255
    Int32 { shift: u32 },
}

fn sample_layout(format: SampleFormat, bits: u16) -> Result<SampleLayout, CaptureError> {
    match (format, bits) {
        (SampleFormat::Float, 32) => Ok(SampleLayout::Float32),
        (SampleFormat::Int, 8) => Ok(SampleLayout::Int8),
        (SampleFormat::Int, 16) => Ok(SampleLayout::Int16),
        (SampleFormat::Int, bits @ (24 | 32)) => Ok(SampleLayout::Int32 {
            shift: 32 - u32::from(bits),
        }),
        (format, bits) => Err(CaptureError::UnsupportedFormat(format!(
            "{:?} {}-bit",
            format, bits
        ))),
    }
}

fn first_channel<T>(
    reader: WavReader<BufReader<File>>,
    channels: usize,
    convert: impl Fn(T) -> u8,
) -> Result<Vec<u8>, CaptureError>
where
    T: hound::Sample,
{
    reader
        .into_samples::<T>()
        .step_by(channels)
        .map(|sample| sample.map(&convert).map_err(CaptureError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::TempDir;

    fn write_wav<S>(dir: &TempDir, spec: WavSpec, samples: &[S]) -> PathBuf
    where
        S: hound::Sample + Copy,
    {
        let path = dir.path().join("line.wav");
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &sample in samples {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    fn mono(bits_per_sample: u16, sample_format: SampleFormat) -> WavSpec {
        WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample,
            sample_format,
        }
    }

    fn spec(channels: u16, sample_rate: u32) -> WavSpec {
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        }
    }

    #[test]
    fn test_load_first_channel() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(
            &dir,
            spec(2, SAMPLE_RATE),
            &[i16::MIN, 0, i16::MAX, 0, 0i16, i16::MAX],
        );

        let samples = load_samples(&path).unwrap();
        assert_eq!(samples, vec![0, 255, 128]);
    }

    #[test]
    fn test_load_8_bit() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, mono(8, SampleFormat::Int), &[i8::MIN, 0, i8::MAX]);

        assert_eq!(load_samples(&path).unwrap(), vec![0, 128, 255]);
    }

    #[test]
    fn test_load_24_bit() {
        let dir = TempDir::new().unwrap();
        let min = -(1i32 << 23);
        let max = (1i32 << 23) - 1;
        let path = write_wav(&dir, mono(24, SampleFormat::Int), &[min, 0, max]);

        assert_eq!(load_samples(&path).unwrap(), vec![0, 128, 255]);
    }

    #[test]
    fn test_load_float() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, mono(32, SampleFormat::Float), &[-1.0f32, 0.0, 1.0]);

        assert_eq!(load_samples(&path).unwrap(), vec![0, 128, 255]);
    }

    #[test]
    fn test_sample_layouts() {
        assert_eq!(
            sample_layout(SampleFormat::Int, 24).unwrap(),
            SampleLayout::Int32 { shift: 8 }
        );
        assert_eq!(
            sample_layout(SampleFormat::Int, 32).unwrap(),
            SampleLayout::Int32 { shift: 0 }
        );
        assert!(matches!(
            sample_layout(SampleFormat::Int, 12),
            Err(CaptureError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            sample_layout(SampleFormat::Float, 64),
            Err(CaptureError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rejects_other_sample_rates() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, spec(1, 48_000), &[0i16, 0]);

        let err = load_samples(&path).unwrap_err();
        assert!(matches!(err, CaptureError::UnsupportedRate { .. }));
    }

    #[test]
    fn test_missing_file() {
        let mut source = ReplaySource::new("/nonexistent/line.wav");
        let (publisher, _rx) = EventPublisher::channel(8);

        let err = source
            .start(Decoder::new(Thresholds::default()), publisher)
            .unwrap_err();
        assert!(matches!(err, CaptureError::Wav(_)));
        assert!(!source.is_running());
    }

    #[test]
    fn test_replay_publishes_lifecycle_events() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, spec(1, SAMPLE_RATE), &[0i16; 64]);
        let mut source = ReplaySource::new(&path);
        let (publisher, mut rx) = EventPublisher::channel(8);

        source
            .start(Decoder::new(Thresholds::default()), publisher)
            .unwrap();

        let started = rx.blocking_recv();
        assert!(matches!(started, Some(DecoderEvent::CaptureStarted { .. })));
        assert_eq!(rx.blocking_recv(), Some(DecoderEvent::CaptureStopped));
        assert_eq!(rx.blocking_recv(), None);

        source.stop();
        assert!(!source.is_running());
    }
}
