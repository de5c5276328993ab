//! Sliding spectrogram buffer and time-axis labels

use std::collections::VecDeque;

use jiff::tz::TimeZone;
use jiff::Timestamp;

/// Fixed-size sliding matrix of spectral frames.
///
/// Frames are columns; time runs left to right. The width never
/// changes: pushing a frame shifts every column left by one and the
/// oldest column falls off. Starts out filled with zero columns, the
/// spectrogram of silence.
#[derive(Debug, Clone)]
pub struct SlidingSpectrogram {
    columns: VecDeque<Vec<f32>>,
    width: usize,
    height: usize,
}

impl SlidingSpectrogram {
    pub fn new(width: usize, height: usize) -> Self {
        let mut columns = VecDeque::with_capacity(width);
        for _ in 0..width {
            columns.push_back(vec![0.0; height]);
        }
        Self {
            columns,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Insert `frame` as the newest (rightmost) column.
    pub fn push(&mut self, mut frame: Vec<f32>) {
        if self.width == 0 {
            return;
        }
        frame.resize(self.height, 0.0);
        self.columns.pop_front();
        self.columns.push_back(frame);
    }

    /// Column `index`, oldest first; `width - 1` is the newest.
    pub fn column(&self, index: usize) -> &[f32] {
        &self.columns[index]
    }
}

/// Time-axis labels for the trailing window ending at `anchor`.
///
/// One label per second, oldest first, covering `[t - window, t - 1]`,
/// formatted `%H:%M:%S` in `tz`.
pub fn time_labels(anchor_epoch_secs: f64, window_secs: u32, tz: &TimeZone) -> Vec<String> {
    let anchor = anchor_epoch_secs.floor() as i64;
    (1..=window_secs as i64)
        .rev()
        .map(|back| match Timestamp::from_second(anchor - back) {
            Ok(ts) => ts.to_zoned(tz.clone()).strftime("%H:%M:%S").to_string(),
            Err(_) => "--:--:--".to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_is_invariant_under_push() {
        let mut gram = SlidingSpectrogram::new(5, 3);
        assert_eq!(gram.width(), 5);
        for i in 0..12 {
            gram.push(vec![i as f32; 3]);
            assert_eq!(gram.width(), 5);
            assert_eq!(gram.column(4), &[i as f32; 3][..]);
        }
    }

    #[test]
    fn test_push_shifts_columns_left() {
        let mut gram = SlidingSpectrogram::new(3, 2);
        gram.push(vec![1.0, 1.0]);
        gram.push(vec![2.0, 2.0]);
        // A zero column still occupies the oldest slot.
        assert_eq!(gram.column(0), &[0.0, 0.0][..]);
        assert_eq!(gram.column(1), &[1.0, 1.0][..]);
        assert_eq!(gram.column(2), &[2.0, 2.0][..]);

        gram.push(vec![3.0, 3.0]);
        assert_eq!(gram.column(0), &[1.0, 1.0][..]);
        assert_eq!(gram.column(1), &[2.0, 2.0][..]);
        assert_eq!(gram.column(2), &[3.0, 3.0][..]);
    }

    #[test]
    fn test_short_frames_are_padded() {
        let mut gram = SlidingSpectrogram::new(2, 4);
        gram.push(vec![7.0]);
        assert_eq!(gram.column(1), &[7.0, 0.0, 0.0, 0.0][..]);
    }

    #[test]
    fn test_labels_cover_trailing_window() {
        // Anchor at 1970-01-01 00:05:30 UTC.
        let labels = time_labels(330.0, 10, &TimeZone::UTC);
        assert_eq!(labels.len(), 10);
        assert_eq!(labels[0], "00:05:20");
        assert_eq!(labels[9], "00:05:29");
    }

    #[test]
    fn test_labels_truncate_fractional_anchors() {
        let labels = time_labels(330.9, 2, &TimeZone::UTC);
        assert_eq!(labels, vec!["00:05:28", "00:05:29"]);
    }
}
