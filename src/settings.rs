//! Session settings and validation
//!
//! All configuration is validated before any audio device is opened:
//! a bad session name or an impossible rate/block combination must
//! fail fast, not after hardware has been claimed.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use jiff::Zoned;
use serde::Serialize;
use thiserror::Error;

/// Amplitude scaling applied to spectral frames.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    /// Raw FFT magnitudes.
    Linear,
    /// Decibels relative to unit magnitude.
    Log,
}

impl Scaling {
    /// Lower edge of the heatmap display range (the darkest cell).
    pub fn display_floor(self) -> f32 {
        match self {
            Scaling::Linear => 0.0,
            Scaling::Log => -10.0,
        }
    }
}

impl fmt::Display for Scaling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scaling::Linear => write!(f, "linear"),
            Scaling::Log => write!(f, "log"),
        }
    }
}

/// Settings validation errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Invalid {what} {value:?}: must be usable as a file name")]
    InvalidName { what: &'static str, value: String },

    #[error("Block size must be greater than zero")]
    ZeroBlockSize,

    #[error("Sample rate must be greater than zero")]
    ZeroSampleRate,

    #[error("Sample rate {sample_rate} is not a whole multiple of block size {block_size}")]
    RateBlockMismatch { sample_rate: u32, block_size: usize },

    #[error("Frequency band {min_freq} Hz to {max_freq} Hz is empty")]
    EmptyBand { min_freq: f64, max_freq: f64 },

    #[error("Spectrogram window must be at least one second")]
    WindowTooShort,

    #[error("Recording gain must be positive")]
    NonPositiveGain,

    #[error("Session length must be at least one second")]
    ZeroDuration,
}

/// Validated session configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub block_size: usize,
    pub name: String,
    pub tag: Option<String>,
    pub max_amplitude: f32,
    pub min_freq: f64,
    pub max_freq: f64,
    pub scaling: Scaling,
    pub duration_secs: Option<u64>,
    pub gain: Option<f32>,
    pub window_secs: u32,
    pub output_root: PathBuf,
}

impl Settings {
    /// Check everything that can be checked before a device is opened.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !is_valid_filename(&self.name) {
            return Err(SettingsError::InvalidName {
                what: "session name",
                value: self.name.clone(),
            });
        }
        if let Some(tag) = &self.tag {
            if !is_valid_filename(tag) {
                return Err(SettingsError::InvalidName {
                    what: "session tag",
                    value: tag.clone(),
                });
            }
        }
        if self.block_size == 0 {
            return Err(SettingsError::ZeroBlockSize);
        }
        // 0 % block_size == 0, so the modulo check alone admits a zero rate.
        if self.sample_rate == 0 {
            return Err(SettingsError::ZeroSampleRate);
        }
        if self.sample_rate as u64 % self.block_size as u64 != 0 {
            return Err(SettingsError::RateBlockMismatch {
                sample_rate: self.sample_rate,
                block_size: self.block_size,
            });
        }
        if self.min_freq >= self.max_freq {
            return Err(SettingsError::EmptyBand {
                min_freq: self.min_freq,
                max_freq: self.max_freq,
            });
        }
        let (min_bin, max_bin) = self.bin_range();
        if min_bin >= max_bin {
            // The band sits between grid lines and selects no bins.
            return Err(SettingsError::EmptyBand {
                min_freq: self.min_freq,
                max_freq: self.max_freq,
            });
        }
        if self.window_secs < 1 {
            return Err(SettingsError::WindowTooShort);
        }
        if let Some(gain) = self.gain {
            if gain <= 0.0 {
                return Err(SettingsError::NonPositiveGain);
            }
        }
        if self.duration_secs == Some(0) {
            return Err(SettingsError::ZeroDuration);
        }
        Ok(())
    }

    /// Width of one FFT bin in Hz.
    pub fn bin_width(&self) -> f64 {
        self.sample_rate as f64 / self.block_size as f64
    }

    /// Duration of one block in seconds.
    pub fn block_duration(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }

    /// Blocks per second of audio. Exact once validated.
    pub fn blocks_per_second(&self) -> u32 {
        self.sample_rate / self.block_size.max(1) as u32
    }

    /// The displayed bin range `[min_bin, max_bin)`.
    ///
    /// Frequencies map onto the rFFT grid with
    /// `bin = ceil(freq / bin_width)`; the upper bound is capped at the
    /// number of real-input bins, `block_size / 2 + 1`.
    pub fn bin_range(&self) -> (usize, usize) {
        let bin_width = self.bin_width();
        let bins = self.block_size / 2 + 1;
        let min_bin = ((self.min_freq / bin_width).ceil() as usize).min(bins);
        let max_bin = ((self.max_freq / bin_width).ceil() as usize).min(bins);
        (min_bin, max_bin)
    }

    /// Session folder name: `{timestamp}_{name}[_{tag}]`, spaces as dashes.
    pub fn session_dir_name(&self, now: &Zoned) -> String {
        let stamp = now.strftime("%Y%m%d-%H%M%S");
        let mut dir = format!("{}_{}", stamp, self.name);
        if let Some(tag) = &self.tag {
            dir.push('_');
            dir.push_str(tag);
        }
        dir.replace(' ', "-")
    }

    /// Write the `session.json` sidecar describing this session.
    pub fn write_manifest(
        &self,
        dir: &Path,
        device_name: &str,
        started: &Zoned,
    ) -> anyhow::Result<()> {
        let manifest = SessionManifest {
            device: device_name,
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            scaling: self.scaling,
            min_freq: self.min_freq,
            max_freq: self.max_freq,
            max_amplitude: self.max_amplitude,
            window_secs: self.window_secs,
            duration_secs: self.duration_secs,
            gain: self.gain,
            started_at: started.strftime("%Y-%m-%d %H:%M:%S %Z").to_string(),
        };
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(dir.join("session.json"), json)?;
        Ok(())
    }
}

/// Configuration sidecar written into each session folder.
#[derive(Serialize)]
struct SessionManifest<'a> {
    device: &'a str,
    sample_rate: u32,
    block_size: usize,
    scaling: Scaling,
    min_freq: f64,
    max_freq: f64,
    max_amplitude: f32,
    window_secs: u32,
    duration_secs: Option<u64>,
    gain: Option<f32>,
    started_at: String,
}

/// Windows reserved device names, rejected case-insensitively.
const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// True when `name` is safe as a single path component on all
/// supported platforms.
pub fn is_valid_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    let has_invalid_char = name.chars().any(|c| {
        matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (c as u32) < 0x20
    });
    if has_invalid_char {
        return false;
    }
    !RESERVED_NAMES.contains(&name.to_uppercase().as_str())
}
