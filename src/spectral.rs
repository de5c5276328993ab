//! Streaming spectral analysis
//!
//! - `spectrum`: per-block FFT magnitudes with display scaling
//! - `spectrogram`: the fixed-width sliding matrix and time labels
//!
//! `SpectralEngine` drives both: each ingested block becomes one
//! spectral frame, one column shift, and a fresh set of time labels.
//! The engine also tracks session progress (captured samples, first
//! and last adjusted timestamps) and decides when periodic snapshot
//! exports are due.

mod spectrogram;
mod spectrum;

pub use spectrogram::{time_labels, SlidingSpectrogram};
pub use spectrum::SpectrumAnalyzer;

use jiff::tz::TimeZone;

use crate::settings::Settings;
use crate::transport::TimestampedBlock;

/// Read-only view of the current display state, handed to sinks.
pub struct SpectrogramView<'a> {
    pub matrix: &'a SlidingSpectrogram,
    pub labels: &'a [String],
    pub floor: f32,
    pub ceiling: f32,
    pub min_freq: f64,
    pub max_freq: f64,
}

/// Drives spectra, the sliding buffer, and the snapshot cadence.
pub struct SpectralEngine {
    analyzer: SpectrumAnalyzer,
    matrix: SlidingSpectrogram,
    labels: Vec<String>,
    tz: TimeZone,
    window_secs: u32,
    block_duration: f64,
    floor: f32,
    ceiling: f32,
    min_freq: f64,
    max_freq: f64,
    blocks_consumed: u64,
    samples_consumed: u64,
    samples_cap: Option<u64>,
    first_adjusted: Option<f64>,
    last_adjusted: Option<f64>,
    last_snapshot: Option<f64>,
    next_snapshot_index: u32,
}

impl SpectralEngine {
    pub fn new(settings: &Settings, tz: TimeZone) -> Self {
        let bin_range = settings.bin_range();
        let width = settings.window_secs as usize * settings.blocks_per_second() as usize;
        let height = bin_range.1 - bin_range.0;
        Self {
            analyzer: SpectrumAnalyzer::new(
                settings.block_size,
                bin_range,
                settings.scaling,
                settings.max_amplitude,
            ),
            matrix: SlidingSpectrogram::new(width, height),
            labels: Vec::new(),
            tz,
            window_secs: settings.window_secs,
            block_duration: settings.block_duration(),
            floor: settings.scaling.display_floor(),
            ceiling: settings.max_amplitude,
            min_freq: settings.min_freq,
            max_freq: settings.max_freq,
            blocks_consumed: 0,
            samples_consumed: 0,
            samples_cap: settings
                .duration_secs
                .map(|secs| secs * settings.sample_rate as u64),
            first_adjusted: None,
            last_adjusted: None,
            last_snapshot: None,
            next_snapshot_index: 0,
        }
    }

    /// Fold one block into the view. Returns a snapshot index when an
    /// export is due, at most once per elapsed second of adjusted time.
    pub fn ingest(&mut self, block: &TimestampedBlock) -> Option<u32> {
        let frame = self.analyzer.analyze(&block.samples);
        self.matrix.push(frame);
        self.labels = time_labels(block.adjusted_time, self.window_secs, &self.tz);

        self.blocks_consumed += 1;
        self.samples_consumed += block.samples.len() as u64;
        let t = block.adjusted_time;
        self.first_adjusted.get_or_insert(t);
        self.last_adjusted = Some(t);

        match self.last_snapshot {
            None => {
                self.last_snapshot = Some(t);
                None
            }
            Some(previous) if t - previous >= 1.0 => {
                self.last_snapshot = Some(t);
                let index = self.next_snapshot_index;
                self.next_snapshot_index += 1;
                Some(index)
            }
            Some(_) => None,
        }
    }

    /// True once the configured session length has been captured.
    pub fn is_complete(&self) -> bool {
        self.samples_cap
            .is_some_and(|cap| self.samples_consumed >= cap)
    }

    /// Wall-clock span covered by the session's blocks: time from the
    /// first block's start to the last block's end, 0 with no blocks.
    pub fn displayed_seconds(&self) -> f64 {
        match (self.first_adjusted, self.last_adjusted) {
            (Some(first), Some(last)) => last - first + self.block_duration,
            _ => 0.0,
        }
    }

    pub fn blocks_consumed(&self) -> u64 {
        self.blocks_consumed
    }

    pub fn view(&self) -> SpectrogramView<'_> {
        SpectrogramView {
            matrix: &self.matrix,
            labels: &self.labels,
            floor: self.floor,
            ceiling: self.ceiling,
            min_freq: self.min_freq,
            max_freq: self.max_freq,
        }
    }
}
