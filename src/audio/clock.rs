//! Device-clock to wall-clock reconciliation
//!
//! The hardware reports capture times on its own clock, which starts at
//! an arbitrary origin. `ClockSync` freezes a single offset between
//! that clock and the Unix epoch on the first block of a session, so
//! every block carries a wall-clock timestamp that is consistent with
//! the device's sample spacing. The offset is deliberately never
//! re-measured: re-syncing mid-session would make adjusted timestamps
//! jump, and correcting oscillator drift over long sessions is out of
//! scope.

use cpal::StreamInstant;
use jiff::Timestamp;

/// Current wall-clock time as seconds since the Unix epoch.
pub fn wall_clock_seconds() -> f64 {
    Timestamp::now().as_nanosecond() as f64 * 1e-9
}

/// One-shot offset between the device clock and wall-clock time.
///
/// The offset is frozen on the first call to [`ClockSync::adjust`];
/// every later call reuses it, so `adjusted - device_time` is the same
/// constant for the whole session.
#[derive(Debug, Default)]
pub struct ClockSync {
    offset: Option<f64>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self { offset: None }
    }

    /// Map a device-clock reading (seconds) onto the wall clock.
    pub fn adjust(&mut self, device_time: f64) -> f64 {
        self.adjust_at(device_time, wall_clock_seconds())
    }

    fn adjust_at(&mut self, device_time: f64, wall_now: f64) -> f64 {
        let offset = *self.offset.get_or_insert(wall_now - device_time);
        device_time + offset
    }

    /// The frozen offset, once the first block has been seen.
    pub fn offset(&self) -> Option<f64> {
        self.offset
    }
}

/// Maps cpal's opaque stream instants onto monotonic device seconds.
///
/// cpal reports capture times as `StreamInstant`s that only support
/// relative comparison. Anchoring them at the first observed instant
/// yields plain `f64` seconds, which keeps [`ClockSync`] free of any
/// cpal types.
#[derive(Debug, Default)]
pub struct StreamClock {
    origin: Option<StreamInstant>,
}

impl StreamClock {
    pub fn new() -> Self {
        Self { origin: None }
    }

    /// Seconds elapsed on the device clock since the first instant seen.
    pub fn device_seconds(&mut self, instant: StreamInstant) -> f64 {
        let origin = *self.origin.get_or_insert(instant);
        instant
            .duration_since(&origin)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_frozen_on_first_block() {
        let mut sync = ClockSync::new();
        // First block: device clock at 5.0 s, wall clock at 1000.0 s.
        let first = sync.adjust_at(5.0, 1000.0);
        assert_eq!(first, 1000.0);
        assert_eq!(sync.offset(), Some(995.0));

        // The wall clock drifts but the offset must not move.
        for i in 1..=10 {
            let device = 5.0 + i as f64 * 0.025;
            let wall = 1000.0 + i as f64 * 0.026; // jittery wall clock
            let adjusted = sync.adjust_at(device, wall);
            assert!((adjusted - device - 995.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_adjusted_preserves_device_spacing() {
        let mut sync = ClockSync::new();
        let a = sync.adjust_at(0.0, 1234.5);
        let b = sync.adjust_at(0.025, 9999.9);
        assert!((b - a - 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_no_offset_before_first_block() {
        let sync = ClockSync::new();
        assert_eq!(sync.offset(), None);
    }
}
