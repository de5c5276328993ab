//! Input device enumeration and selection

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use serde::Serialize;
use tracing::debug;

use super::error::{AudioError, AudioResult};

/// An eligible audio input device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceHandle {
    pub id: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub is_default: bool,
}

impl DeviceHandle {
    /// Name clipped to at most `max_chars` characters, never splitting
    /// a multibyte character.
    pub fn clipped_name(&self, max_chars: usize) -> String {
        self.name.chars().take(max_chars).collect()
    }
}

/// Enumerate eligible input devices in a stable order.
///
/// A device is eligible when it exposes at least one input channel.
/// Devices whose name contains "Background Music" (a macOS loopback
/// app) are skipped.
fn eligible_devices() -> AudioResult<Vec<(Device, DeviceHandle)>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut eligible = Vec::new();
    for device in host.input_devices()? {
        let name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());
        if name.contains("Background Music") {
            debug!("skipping loopback device: {}", name);
            continue;
        }
        let max_input_channels = device
            .supported_input_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
            .unwrap_or(0);
        if max_input_channels == 0 {
            continue;
        }
        let is_default = default_name.as_deref() == Some(name.as_str());
        let handle = DeviceHandle {
            id: eligible.len(),
            name,
            max_input_channels,
            is_default,
        };
        eligible.push((device, handle));
    }
    Ok(eligible)
}

/// List eligible input devices for the `devices` subcommand.
pub fn list_input_devices() -> AudioResult<Vec<DeviceHandle>> {
    Ok(eligible_devices()?
        .into_iter()
        .map(|(_, handle)| handle)
        .collect())
}

/// Resolve a `--device` selector (index or exact name) to a device.
///
/// With no selector the default input device is used, falling back to
/// the first eligible device when the default is not eligible.
pub fn find_device(selector: Option<&str>) -> AudioResult<(Device, DeviceHandle)> {
    let mut eligible = eligible_devices()?;
    if eligible.is_empty() {
        return Err(AudioError::NoDevices);
    }

    let position = match selector {
        None => Some(
            eligible
                .iter()
                .position(|(_, h)| h.is_default)
                .unwrap_or(0),
        ),
        Some(sel) => match sel.parse::<usize>() {
            Ok(index) => eligible.iter().position(|(_, h)| h.id == index),
            Err(_) => eligible.iter().position(|(_, h)| h.name == sel),
        },
    };

    match position {
        Some(pos) => Ok(eligible.swap_remove(pos)),
        None => Err(AudioError::DeviceNotFound(
            selector.unwrap_or_default().to_string(),
        )),
    }
}
