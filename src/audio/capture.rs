//! Live capture engine
//!
//! Builds a mono cpal input stream and turns whatever the driver
//! delivers into fixed-size timestamped blocks. The hardware callback
//! performs only bounded work: timestamp, convert, rechunk, try_send
//! into a local hand-off queue. A dedicated forwarder thread drains
//! that queue onto the transport channel and absorbs its backpressure,
//! so the callback can never block. When the hand-off queue is full
//! the block is dropped and counted; the gap stays a gap and is
//! reported in the end-of-session summary.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use crate::settings::Settings;
use crate::transport::{BlockSender, TimestampedBlock};

use super::clock::{ClockSync, StreamClock};
use super::error::{AudioError, AudioResult};

/// Blocks the callback may stage before the forwarder catches up.
const HANDOFF_CAPACITY: usize = 64;

/// How long the forwarder waits on a full transport channel before it
/// re-checks the shutdown flag.
const FORWARD_RETRY: Duration = Duration::from_millis(250);

/// Rechunks driver deliveries into blocks of exactly `block_size`.
///
/// Drivers are not obliged to honor the requested fixed buffer size.
/// Each assembled block carries the adjusted time of its own first
/// sample, extrapolated from the delivery timestamp by sample offset.
/// When the driver does deliver fixed-size buffers this degenerates to
/// one block per callback.
pub struct BlockAssembler {
    pending: Vec<f32>,
    pending_time: f64,
    block_size: usize,
    sample_period: f64,
}

impl BlockAssembler {
    pub fn new(block_size: usize, sample_rate: u32) -> Self {
        Self {
            pending: Vec::with_capacity(block_size),
            pending_time: 0.0,
            block_size,
            sample_period: 1.0 / sample_rate as f64,
        }
    }

    /// Feed one delivery; `start_time` is the adjusted time of `data[0]`.
    pub fn push<T>(&mut self, data: &[T], start_time: f64, mut emit: impl FnMut(TimestampedBlock))
    where
        T: cpal::SizedSample,
        f32: cpal::FromSample<T>,
    {
        for (i, &raw) in data.iter().enumerate() {
            if self.pending.is_empty() {
                self.pending_time = start_time + i as f64 * self.sample_period;
            }
            let sample: f32 = cpal::Sample::from_sample(raw);
            self.pending.push(sample);
            if self.pending.len() == self.block_size {
                let samples =
                    std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                emit(TimestampedBlock {
                    samples,
                    adjusted_time: self.pending_time,
                });
            }
        }
    }
}

/// A configured, not-yet-running capture stream.
pub struct CaptureEngine {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    sample_rate: u32,
    block_size: usize,
}

impl CaptureEngine {
    /// Prepare a mono input stream on `device` per the settings.
    pub fn open(device: Device, settings: &Settings) -> AudioResult<Self> {
        let sample_format = pick_sample_format(&device, settings.sample_rate)?;
        let config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: BufferSize::Fixed(settings.block_size as u32),
        };
        let name = device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string());
        info!(
            "capturing from {} at {} Hz, {} samples per block ({})",
            name, settings.sample_rate, settings.block_size, sample_format
        );
        Ok(Self {
            device,
            config,
            sample_format,
            sample_rate: settings.sample_rate,
            block_size: settings.block_size,
        })
    }

    /// Start the stream and the forwarder thread; blocks begin flowing
    /// into `transport` immediately.
    pub fn start(self, transport: BlockSender) -> AudioResult<CaptureHandle> {
        let (handoff_tx, handoff_rx) = crossbeam_channel::bounded(HANDOFF_CAPACITY);
        let dropped = Arc::new(AtomicU64::new(0));

        let stream = match self.sample_format {
            SampleFormat::I16 => self.build_stream::<i16>(handoff_tx, Arc::clone(&dropped))?,
            SampleFormat::U16 => self.build_stream::<u16>(handoff_tx, Arc::clone(&dropped))?,
            _ => self.build_stream::<f32>(handoff_tx, Arc::clone(&dropped))?,
        };
        stream.play()?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let forwarder = thread::spawn({
            let shutdown = Arc::clone(&shutdown);
            move || forward_blocks(handoff_rx, transport, shutdown)
        });

        Ok(CaptureHandle {
            stream: Some(stream),
            forwarder: Some(forwarder),
            shutdown,
            dropped,
        })
    }

    fn build_stream<T>(
        &self,
        handoff: Sender<TimestampedBlock>,
        dropped: Arc<AtomicU64>,
    ) -> AudioResult<Stream>
    where
        T: cpal::SizedSample + Send + 'static,
        f32: cpal::FromSample<T>,
    {
        let mut assembler = BlockAssembler::new(self.block_size, self.sample_rate);
        let mut device_clock = StreamClock::new();
        let mut wall_sync = ClockSync::new();
        let mut offset_logged = false;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[T], info: &cpal::InputCallbackInfo| {
                let device_time = device_clock.device_seconds(info.timestamp().capture);
                let adjusted = wall_sync.adjust(device_time);
                if !offset_logged {
                    if let Some(offset) = wall_sync.offset() {
                        debug!("clock offset frozen at {:.3} s", offset);
                        offset_logged = true;
                    }
                }
                assembler.push(data, adjusted, |block| {
                    if handoff.try_send(block).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                });
            },
            move |err| warn!("input stream error: {}", err),
            None,
        )?;
        Ok(stream)
    }
}

/// A running capture stream plus its forwarder thread.
///
/// Stopping is best-effort daemon teardown: the stream is dropped
/// first, then the forwarder is signalled and joined. Blocks still in
/// flight at that point are not guaranteed to reach the transport.
pub struct CaptureHandle {
    stream: Option<Stream>,
    forwarder: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl CaptureHandle {
    /// Stop the stream, join the forwarder, and report how many blocks
    /// were dropped at the hand-off queue.
    pub fn stop(mut self) -> u64 {
        self.shut_down();
        self.dropped.load(Ordering::Relaxed)
    }

    fn shut_down(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        if let Some(forwarder) = self.forwarder.take() {
            if forwarder.join().is_err() {
                warn!("capture forwarder thread panicked");
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// Drain the hand-off queue onto the transport channel.
///
/// Blocks are republished in arrival order. On a full transport the
/// thread waits in short slices, re-checking the shutdown flag between
/// them. A disconnected transport while the session is still live is a
/// fatal condition for forwarding: it is logged and the thread exits
/// instead of stalling silently.
fn forward_blocks(
    handoff: Receiver<TimestampedBlock>,
    transport: BlockSender,
    shutdown: Arc<AtomicBool>,
) {
    'forward: for block in handoff.iter() {
        let mut pending = block;
        loop {
            match transport.send_timeout(pending, FORWARD_RETRY) {
                Ok(()) => continue 'forward,
                Err(SendTimeoutError::Timeout(back)) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break 'forward;
                    }
                    pending = back;
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    error!("transport channel closed while capturing; forwarding stopped");
                    break 'forward;
                }
            }
        }
    }
    debug!("block forwarder finished");
}

/// Choose a supported sample format for the requested rate, preferring
/// f32 over the integer formats.
fn pick_sample_format(device: &Device, sample_rate: u32) -> AudioResult<SampleFormat> {
    let mut fallback = None;
    for range in device.supported_input_configs()? {
        let format = range.sample_format();
        if !matches!(
            format,
            SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16
        ) {
            continue;
        }
        if range.min_sample_rate().0 <= sample_rate && sample_rate <= range.max_sample_rate().0 {
            if format == SampleFormat::F32 {
                return Ok(SampleFormat::F32);
            }
            fallback.get_or_insert(format);
        }
    }
    fallback.ok_or(AudioError::UnsupportedSampleRate(sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_size_delivery_is_one_block_per_callback() {
        let mut assembler = BlockAssembler::new(4, 1000);
        let mut blocks = Vec::new();
        assembler.push(&[0.1f32, 0.2, 0.3, 0.4], 10.0, |b| blocks.push(b));
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].samples, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(blocks[0].adjusted_time, 10.0);
    }

    #[test]
    fn test_odd_deliveries_rechunk_with_extrapolated_times() {
        // 1000 Hz sampling with 600-sample blocks, delivered in runs of
        // 500. Blocks must start exactly at samples 0 and 600.
        let mut assembler = BlockAssembler::new(600, 1000);
        let mut blocks = Vec::new();
        let run: Vec<f32> = (0..500).map(|n| n as f32).collect();

        assembler.push(&run, 0.0, |b| blocks.push(b));
        assert!(blocks.is_empty());
        assembler.push(&run, 0.5, |b| blocks.push(b));
        assembler.push(&run, 1.0, |b| blocks.push(b));

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].samples.len(), 600);
        assert_eq!(blocks[1].samples.len(), 600);
        // Sample 600 sits 100 samples into the second delivery.
        assert!((blocks[0].adjusted_time - 0.0).abs() < 1e-9);
        assert!((blocks[1].adjusted_time - 0.6).abs() < 1e-9);
        // Continuity across the chunk boundary.
        assert_eq!(blocks[0].samples[599], 99.0);
        assert_eq!(blocks[1].samples[0], 100.0);
    }

    #[test]
    fn test_integer_samples_are_normalized() {
        let mut assembler = BlockAssembler::new(2, 1000);
        let mut blocks = Vec::new();
        assembler.push(&[i16::MAX, i16::MIN], 0.0, |b| blocks.push(b));
        assert_eq!(blocks.len(), 1);
        assert!((blocks[0].samples[0] - 1.0).abs() < 1e-3);
        assert!((blocks[0].samples[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_forwarder_preserves_order_and_exits_on_disconnect() {
        let (handoff_tx, handoff_rx) = crossbeam_channel::bounded(8);
        let (transport_tx, transport_rx) = crate::transport::block_channel(8);
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = thread::spawn({
            let shutdown = Arc::clone(&shutdown);
            move || forward_blocks(handoff_rx, transport_tx, shutdown)
        });

        for i in 0..4 {
            handoff_tx
                .send(TimestampedBlock {
                    samples: vec![i as f32],
                    adjusted_time: i as f64,
                })
                .unwrap();
        }
        for i in 0..4 {
            assert_eq!(transport_rx.recv().unwrap().adjusted_time, i as f64);
        }

        // Consumer goes away; the forwarder must terminate on its own.
        drop(transport_rx);
        handoff_tx
            .send(TimestampedBlock {
                samples: vec![0.0],
                adjusted_time: 99.0,
            })
            .unwrap();
        drop(handoff_tx);
        worker.join().unwrap();
    }
}
