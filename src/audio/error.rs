//! Audio error types

use thiserror::Error;

/// Errors raised by device enumeration, capture, and recording.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No eligible audio input devices found")]
    NoDevices,

    #[error("Input device not found: {0}")]
    DeviceNotFound(String),

    #[error("Device does not support capture at {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("Failed to query device configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("Failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to start input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),
}

/// Result alias for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;
