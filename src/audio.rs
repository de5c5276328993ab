//! Audio capture, clock reconciliation, and recording
//!
//! Everything on the device side of the pipeline lives here:
//! - `device`: input device enumeration and selection
//! - `clock`: device-clock to wall-clock reconciliation
//! - `capture`: the cpal input stream, block assembly, and the
//!   forwarder feeding the transport channel
//! - `recorder`: streaming WAV persistence
//! - `error`: the audio error type

mod capture;
mod clock;
mod device;
mod error;
mod recorder;

pub use capture::CaptureEngine;
pub use device::{find_device, list_input_devices};
pub use recorder::{RecordingSession, WavRecorder};
