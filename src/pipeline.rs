//! Session loop
//!
//! One cooperative loop owns the consumer side of the session: drain
//! whatever blocks the capture thread has queued, feed them to the
//! recorder and the spectral engine, redraw at the frame interval, and
//! let the sink's poll be the only place the loop sleeps. The recorder
//! is finalized on every exit path before the result is reported.

use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::TryRecvError;
use tracing::{error, info, warn};

use crate::audio::WavRecorder;
use crate::spectral::SpectralEngine;
use crate::transport::BlockReceiver;
use crate::viz::{SinkEvent, SpectrogramSink};

const FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// How the session loop came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The configured session length was reached.
    Completed,
    /// The user quit from the display.
    Cancelled,
    /// The capture side closed the channel before the session ended.
    TransportLost,
}

/// Summary of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub blocks_consumed: u64,
    pub recorded_seconds: f64,
    pub displayed_seconds: f64,
    pub snapshots_exported: u32,
}

enum LoopEnd {
    Outcome(SessionOutcome),
    Failed(anyhow::Error),
}

/// Run the consumer loop until the session ends, the user cancels, or
/// the transport drops.
///
/// The caller keeps the receiver alive until capture has shut down, so
/// a finished session does not read as a lost transport upstream.
pub fn run_session(
    rx: &BlockReceiver,
    mut engine: SpectralEngine,
    mut recorder: WavRecorder,
    sink: &mut dyn SpectrogramSink,
) -> Result<SessionReport> {
    let mut last_frame: Option<Instant> = None;
    let mut snapshots_exported = 0u32;

    let end = 'session: loop {
        // Drain every block already waiting so display lag never
        // accumulates in the channel.
        loop {
            match rx.try_recv() {
                Ok(block) => {
                    if let Err(e) = recorder.write_block(&block.samples) {
                        break 'session LoopEnd::Failed(e.into());
                    }
                    if let Some(index) = engine.ingest(&block) {
                        match sink.export_snapshot(&engine.view(), index) {
                            Ok(()) => snapshots_exported += 1,
                            Err(e) => warn!("snapshot {} failed: {}", index, e),
                        }
                    }
                    if engine.is_complete() {
                        info!("session reached its configured length");
                        break 'session LoopEnd::Outcome(SessionOutcome::Completed);
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    error!("audio transport closed before the session ended");
                    break 'session LoopEnd::Outcome(SessionOutcome::TransportLost);
                }
            }
        }

        if last_frame.is_none_or(|at| at.elapsed() >= FRAME_INTERVAL) {
            if let Err(e) = sink.render(&engine.view()) {
                break 'session LoopEnd::Failed(e);
            }
            last_frame = Some(Instant::now());
        }

        // The sink's poll is the only sleep in the loop; cap the wait
        // at the next frame deadline.
        let wait = match last_frame {
            Some(at) => FRAME_INTERVAL
                .saturating_sub(at.elapsed())
                .max(Duration::from_millis(1)),
            None => Duration::from_millis(1),
        };
        match sink.poll(wait) {
            Ok(SinkEvent::Continue) => {}
            Ok(SinkEvent::Cancelled) => {
                info!("session cancelled from the display");
                break 'session LoopEnd::Outcome(SessionOutcome::Cancelled);
            }
            Err(e) => break 'session LoopEnd::Failed(e),
        }
    };

    let finalized = recorder.finalize();
    match end {
        LoopEnd::Failed(e) => {
            if let Err(fe) = finalized {
                warn!("failed to finalize WAV file: {}", fe);
            }
            Err(e)
        }
        LoopEnd::Outcome(outcome) => {
            finalized?;
            info!(
                "session ended: {} blocks, {} samples, {:.2} s recorded",
                engine.blocks_consumed(),
                recorder.samples_written(),
                recorder.recorded_seconds()
            );
            Ok(SessionReport {
                outcome,
                blocks_consumed: engine.blocks_consumed(),
                recorded_seconds: recorder.recorded_seconds(),
                displayed_seconds: engine.displayed_seconds(),
                snapshots_exported,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::RecordingSession;
    use crate::settings::{Scaling, Settings};
    use crate::spectral::SpectrogramView;
    use crate::transport::{block_channel, TimestampedBlock};
    use crate::viz::NullSink;
    use hound::WavReader;
    use jiff::tz::TimeZone;
    use std::path::{Path, PathBuf};

    fn settings(duration_secs: Option<u64>) -> Settings {
        Settings {
            device: None,
            sample_rate: 48000,
            block_size: 1200,
            name: "experiment".to_string(),
            tag: None,
            max_amplitude: 10.0,
            min_freq: 0.0,
            max_freq: 24000.0,
            scaling: Scaling::Linear,
            duration_secs,
            gain: None,
            window_secs: 10,
            output_root: PathBuf::from("sessions"),
        }
    }

    fn recorder(dir: &Path) -> WavRecorder {
        WavRecorder::create(&RecordingSession {
            sample_rate: 48000,
            output_path: dir.join("output.wav"),
            gain: None,
        })
        .unwrap()
    }

    fn block(index: u64, base: f64) -> TimestampedBlock {
        TimestampedBlock {
            samples: vec![0.25; 1200],
            adjusted_time: base + index as f64 * 0.025,
        }
    }

    struct CancelAfter {
        polls_left: u32,
    }

    impl SpectrogramSink for CancelAfter {
        fn render(&mut self, _view: &SpectrogramView<'_>) -> Result<()> {
            Ok(())
        }

        fn export_snapshot(&mut self, _view: &SpectrogramView<'_>, _index: u32) -> Result<()> {
            Ok(())
        }

        fn poll(&mut self, _timeout: Duration) -> Result<SinkEvent> {
            if self.polls_left == 0 {
                return Ok(SinkEvent::Cancelled);
            }
            self.polls_left -= 1;
            Ok(SinkEvent::Continue)
        }
    }

    #[test]
    fn test_two_second_session_consumes_eighty_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(Some(2));
        let engine = SpectralEngine::new(&settings, TimeZone::UTC);
        let (tx, rx) = block_channel(200);
        // Queue more than the session needs; the loop must stop at the
        // configured length, not at channel exhaustion.
        for i in 0..100 {
            tx.send(block(i, 1000.0)).unwrap();
        }
        drop(tx);

        let mut sink = NullSink::new(None);
        let report = run_session(&rx, engine, recorder(dir.path()), &mut sink).unwrap();

        assert_eq!(report.outcome, SessionOutcome::Completed);
        assert_eq!(report.blocks_consumed, 80);
        assert!((report.recorded_seconds - 2.0).abs() < 1e-9);
        assert!((report.displayed_seconds - 2.0).abs() < 0.025 + 1e-9);
        // One snapshot falls inside a two second session.
        assert_eq!(report.snapshots_exported, 1);
        assert_eq!(sink.exported, vec![0]);

        let reader = WavReader::open(dir.path().join("output.wav")).unwrap();
        assert_eq!(reader.duration(), 96000);
    }

    #[test]
    fn test_cancellation_closes_recorder() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(None);
        let engine = SpectralEngine::new(&settings, TimeZone::UTC);
        let (tx, rx) = block_channel(64);
        for i in 0..5 {
            tx.send(block(i, 2000.0)).unwrap();
        }

        let mut sink = CancelAfter { polls_left: 2 };
        let report = run_session(&rx, engine, recorder(dir.path()), &mut sink).unwrap();
        drop(tx);

        assert_eq!(report.outcome, SessionOutcome::Cancelled);
        assert_eq!(report.blocks_consumed, 5);
        // The container must be closed and readable after a cancel.
        let reader = WavReader::open(dir.path().join("output.wav")).unwrap();
        assert_eq!(reader.duration(), 6000);
    }

    #[test]
    fn test_lost_transport_ends_live_session() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(None);
        let engine = SpectralEngine::new(&settings, TimeZone::UTC);
        let (tx, rx) = block_channel(64);
        for i in 0..5 {
            tx.send(block(i, 3000.0)).unwrap();
        }
        drop(tx);

        let mut sink = NullSink::new(None);
        let report = run_session(&rx, engine, recorder(dir.path()), &mut sink).unwrap();

        assert_eq!(report.outcome, SessionOutcome::TransportLost);
        assert_eq!(report.blocks_consumed, 5);
    }
}
