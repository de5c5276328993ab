//! Streaming WAV recording
//!
//! The recorder opens the container at session start and encodes each
//! block as it arrives, so memory stays bounded by one block. The file
//! is finalized exactly once; dropping the recorder finalizes it too,
//! so every exit path (completion, cancellation, error, panic unwind)
//! leaves a closed, readable container.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use hound::{WavSpec, WavWriter};
use tracing::warn;

use super::error::AudioResult;

pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Immutable description of one recording, fixed once the file is open.
#[derive(Debug, Clone)]
pub struct RecordingSession {
    pub sample_rate: u32,
    pub output_path: PathBuf,
    pub gain: Option<f32>,
}

/// Streaming mono 16-bit PCM WAV writer.
pub struct WavRecorder {
    writer: Option<WavWriter<BufWriter<File>>>,
    gain: f32,
    sample_rate: u32,
    samples_written: u64,
}

impl WavRecorder {
    /// Open the WAV container for the session.
    pub fn create(session: &RecordingSession) -> AudioResult<Self> {
        let spec = WavSpec {
            channels: CHANNELS,
            sample_rate: session.sample_rate,
            bits_per_sample: BITS_PER_SAMPLE,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = WavWriter::create(&session.output_path, spec)?;
        Ok(Self {
            writer: Some(writer),
            gain: session.gain.unwrap_or(1.0),
            sample_rate: session.sample_rate,
            samples_written: 0,
        })
    }

    /// Encode one block: gain multiply, round, clamp to the i16 range.
    ///
    /// Overdriven input saturates at full scale; it never wraps around.
    pub fn write_block(&mut self, samples: &[f32]) -> AudioResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            for &sample in samples {
                let scaled = sample * self.gain * i16::MAX as f32;
                let clamped = scaled.round().clamp(i16::MIN as f32, i16::MAX as f32);
                writer.write_sample(clamped as i16)?;
            }
            self.samples_written += samples.len() as u64;
        }
        Ok(())
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Seconds of audio written so far.
    pub fn recorded_seconds(&self) -> f64 {
        self.samples_written as f64 / self.sample_rate as f64
    }

    /// Flush and close the container. Calling again is a no-op.
    pub fn finalize(&mut self) -> AudioResult<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}

impl Drop for WavRecorder {
    fn drop(&mut self) {
        if self.writer.is_some() {
            if let Err(e) = self.finalize() {
                warn!("failed to finalize WAV file: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;
    use std::path::Path;

    fn session(dir: &Path, gain: Option<f32>) -> RecordingSession {
        RecordingSession {
            sample_rate: 48000,
            output_path: dir.join("output.wav"),
            gain,
        }
    }

    fn read_samples(path: &Path) -> Vec<i16> {
        let mut reader = WavReader::open(path).unwrap();
        reader.samples::<i16>().map(|s| s.unwrap()).collect()
    }

    #[test]
    fn test_known_values_round_trip_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), None);
        let values: Vec<i16> = vec![0, 1, -1, 1000, -1000, 123, -456, 32767, -32767];
        let samples: Vec<f32> = values
            .iter()
            .map(|&v| v as f32 / i16::MAX as f32)
            .collect();

        let mut recorder = WavRecorder::create(&session).unwrap();
        recorder.write_block(&samples).unwrap();
        recorder.finalize().unwrap();

        assert_eq!(read_samples(&session.output_path), values);
    }

    #[test]
    fn test_round_trip_within_quantization_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), None);
        let samples: Vec<f32> = (0..1200)
            .map(|n| (n as f32 * 0.13).sin() * 0.8)
            .collect();

        let mut recorder = WavRecorder::create(&session).unwrap();
        recorder.write_block(&samples).unwrap();
        recorder.finalize().unwrap();

        let decoded = read_samples(&session.output_path);
        assert_eq!(decoded.len(), samples.len());
        // Full scale spans 2.0, so one 16-bit step is 2.0 / 65536.
        let tolerance = 2.0 / 65536.0;
        for (&d, &s) in decoded.iter().zip(&samples) {
            let recovered = d as f32 / i16::MAX as f32;
            assert!((recovered - s).abs() <= tolerance);
        }
    }

    #[test]
    fn test_gain_clamps_never_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), Some(2.0));
        let mut recorder = WavRecorder::create(&session).unwrap();
        recorder.write_block(&[0.9, -0.9, 0.1]).unwrap();
        recorder.finalize().unwrap();

        let decoded = read_samples(&session.output_path);
        assert_eq!(decoded[0], i16::MAX);
        assert_eq!(decoded[1], i16::MIN);
        // In-range samples still get the gain applied.
        assert_eq!(decoded[2], (0.1f32 * 2.0 * i16::MAX as f32).round() as i16);
    }

    #[test]
    fn test_header_matches_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), None);
        let mut recorder = WavRecorder::create(&session).unwrap();
        recorder.write_block(&vec![0.0; 2400]).unwrap();
        recorder.finalize().unwrap();

        let reader = WavReader::open(&session.output_path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 48000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(spec.sample_format, hound::SampleFormat::Int);
        assert_eq!(reader.duration(), 2400);
    }

    #[test]
    fn test_drop_finalizes_container() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), None);
        {
            let mut recorder = WavRecorder::create(&session).unwrap();
            recorder.write_block(&[0.5; 100]).unwrap();
            // No explicit finalize; Drop must close the container.
        }
        assert_eq!(read_samples(&session.output_path).len(), 100);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), None);
        let mut recorder = WavRecorder::create(&session).unwrap();
        recorder.write_block(&[0.0; 10]).unwrap();
        recorder.finalize().unwrap();
        recorder.finalize().unwrap();
        assert_eq!(recorder.samples_written(), 10);
    }

    #[test]
    fn test_recorded_seconds_tracks_samples() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), None);
        let mut recorder = WavRecorder::create(&session).unwrap();
        for _ in 0..80 {
            recorder.write_block(&vec![0.0; 1200]).unwrap();
        }
        assert_eq!(recorder.samples_written(), 96000);
        assert!((recorder.recorded_seconds() - 2.0).abs() < 1e-9);
        recorder.finalize().unwrap();
    }
}
