//! Per-block magnitude spectra

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use tracing::warn;

use crate::settings::Scaling;

/// Floor added before taking logs so silent bins stay finite.
const LOG_EPSILON: f32 = 1e-12;

/// Decibel scaling, bounded below for zero magnitudes.
fn to_decibels(magnitude: f32) -> f32 {
    10.0 * (magnitude + LOG_EPSILON).log10()
}

fn extremes(samples: &[f32]) -> (f32, f32) {
    samples
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        })
}

/// Computes the magnitude spectrum of fixed-size sample blocks.
///
/// Plain real-input FFT with no window function: magnitudes of bins
/// `0 ..= N/2`, restricted to the configured `[min_bin, max_bin)`.
/// Magnitudes are unnormalized, as the display ceiling is calibrated
/// against raw FFT output.
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f32>,
    block_size: usize,
    min_bin: usize,
    max_bin: usize,
    scaling: Scaling,
    max_amplitude: f32,
}

impl SpectrumAnalyzer {
    pub fn new(
        block_size: usize,
        bin_range: (usize, usize),
        scaling: Scaling,
        max_amplitude: f32,
    ) -> Self {
        Self {
            planner: FftPlanner::new(),
            block_size,
            min_bin: bin_range.0,
            max_bin: bin_range.1,
            scaling,
            max_amplitude,
        }
    }

    /// Number of bins per frame.
    pub fn frame_len(&self) -> usize {
        self.max_bin - self.min_bin
    }

    /// Magnitude spectrum of one block, scaled for display.
    pub fn analyze(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .take(self.block_size)
            .map(|&s| Complex::new(s, 0.0))
            .collect();
        buffer.resize(self.block_size, Complex::new(0.0, 0.0));

        let fft = self.planner.plan_fft_forward(self.block_size);
        fft.process(&mut buffer);

        let mut frame: Vec<f32> = buffer[self.min_bin..self.max_bin]
            .iter()
            .map(|c| c.norm())
            .collect();

        match self.scaling {
            Scaling::Linear => {
                let peak = frame.iter().cloned().fold(0.0f32, f32::max);
                if peak > self.max_amplitude {
                    let (lo, hi) = extremes(samples);
                    warn!(
                        "spectrum peak {:.2} exceeds display ceiling {:.2} (block min {:.4}, block max {:.4})",
                        peak, self.max_amplitude, lo, hi
                    );
                }
            }
            Scaling::Log => {
                for value in &mut frame {
                    *value = to_decibels(*value);
                }
            }
        }
        frame
    }
}
