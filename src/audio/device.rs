//! Capture device enumeration and lookup

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::AudioError;

/// Summary of an input device as reported by the host
#[derive(Debug, Clone, PartialEq)]
pub struct InputDeviceInfo {
    pub name: String,
    pub is_default: bool,
    /// Whether the device advertises stereo S32 at `rate`
    pub supports_capture_format: bool,
}

/// List all input devices, flagging the ones that can deliver stereo S32 at `rate`
pub fn list_input_devices(rate: u32) -> Vec<InputDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = match host.input_devices() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            return Vec::new();
        }
    };

    devices
        .filter_map(|device| {
            let name = device.name().ok()?;
            Some(InputDeviceInfo {
                is_default: default_name.as_ref() == Some(&name),
                supports_capture_format: supports_capture_format(&device, rate),
                name,
            })
        })
        .collect()
}

fn supports_capture_format(device: &cpal::Device, rate: u32) -> bool {
    let rate = cpal::SampleRate(rate);
    device
        .supported_input_configs()
        .map(|mut configs| {
            configs.any(|c| {
                c.channels() == 2
                    && c.sample_format() == cpal::SampleFormat::I32
                    && rate >= c.min_sample_rate()
                    && rate <= c.max_sample_rate()
            })
        })
        .unwrap_or(false)
}

/// Find an input device by name; "default" picks the host default
pub fn find_input_device(name: &str) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();

    if name.is_empty() || name == "default" {
        return host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default input device".to_string()));
    }

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::DeviceNotFound(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(device);
            }
        }
    }

    Err(AudioError::DeviceNotFound(name.to_string()))
}
