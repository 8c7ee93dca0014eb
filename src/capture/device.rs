//! Input device enumeration and stream configuration

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{SampleFormat, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};
use tracing::info;

use super::CaptureError;

/// Names of all input devices on the default host, in enumeration order
pub fn input_device_names() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    Ok(host.input_devices()?.map(|device| device_name(&device)).collect())
}

/// Pick a device: the first whose name contains `wanted` (case-insensitive),
/// or the last one enumerated when nothing was asked for
pub(crate) fn pick_device(names: &[String], wanted: Option<&str>) -> Option<usize> {
    match wanted {
        Some(wanted) => {
            let wanted = wanted.to_lowercase();
            names
                .iter()
                .position(|name| name.to_lowercase().contains(&wanted))
        }
        None => names.len().checked_sub(1),
    }
}

/// Enumerate input devices and select one
pub(crate) fn select_input_device(
    host: &cpal::Host,
    wanted: Option<&str>,
) -> Result<(String, cpal::Device), CaptureError> {
    let devices: Vec<(String, cpal::Device)> = host
        .input_devices()?
        .map(|device| (device_name(&device), device))
        .collect();

    for (name, _) in &devices {
        info!(device = %name, "found device");
    }

    if devices.is_empty() {
        return Err(CaptureError::NoDevices);
    }

    let names: Vec<String> = devices.iter().map(|(name, _)| name.clone()).collect();
    let index = pick_device(&names, wanted)
        .ok_or_else(|| CaptureError::DeviceNotFound(wanted.unwrap_or_default().to_string()))?;

    devices.into_iter().nth(index).ok_or(CaptureError::NoDevices)
}

/// Find a config capturing at `sample_rate`, preferring fewer channels and
/// formats closest to unsigned 8-bit
pub(crate) fn capture_config(
    device: &cpal::Device,
    device_name: &str,
    sample_rate: u32,
) -> Result<SupportedStreamConfig, CaptureError> {
    let rate = SampleRate(sample_rate);

    let mut candidates: Vec<SupportedStreamConfigRange> = device
        .supported_input_configs()?
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .filter(|range| format_rank(range.sample_format()).is_some())
        .collect();

    candidates.sort_by_key(|range| (range.channels(), format_rank(range.sample_format())));

    candidates
        .into_iter()
        .next()
        .map(|range| range.with_sample_rate(rate))
        .ok_or_else(|| CaptureError::UnsupportedRate {
            device: device_name.to_string(),
            sample_rate,
        })
}

fn format_rank(format: SampleFormat) -> Option<u8> {
    match format {
        SampleFormat::U8 => Some(0),
        SampleFormat::I16 => Some(1),
        SampleFormat::I32 => Some(2),
        SampleFormat::F32 => Some(3),
        _ => None,
    }
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "<unknown>".to_string())
}
