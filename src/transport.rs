//! Transport channel between the capture side and the consumer loop
//!
//! A single-producer/single-consumer FIFO of timestamped audio blocks.
//! The channel is bounded: on a full channel the capture-side forwarder
//! blocks in short retry slices instead of queueing without limit, so
//! sustained overrun shows up as counted drops at the capture hand-off
//! queue rather than as unbounded memory growth. Delivery is strict
//! FIFO with no acknowledgement and no redelivery.

use crossbeam_channel::{bounded, Receiver, Sender};

/// One block of mono samples stamped with its wall-clock capture time.
///
/// `adjusted_time` is seconds since the Unix epoch: the device clock
/// reading for the first sample of the block plus the session's frozen
/// clock offset. Blocks are created once per hardware callback and are
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedBlock {
    pub samples: Vec<f32>,
    pub adjusted_time: f64,
}

/// Sending half of the block channel (capture side).
pub type BlockSender = Sender<TimestampedBlock>;

/// Receiving half of the block channel (consumer side).
pub type BlockReceiver = Receiver<TimestampedBlock>;

/// Create the bounded block channel with the given capacity.
pub fn block_channel(capacity: usize) -> (BlockSender, BlockReceiver) {
    bounded(capacity)
}

/// Channel capacity for a session: roughly four seconds of blocks.
pub fn session_capacity(sample_rate: u32, block_size: usize) -> usize {
    ((4 * sample_rate as usize) / block_size.max(1)).max(16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{TryRecvError, TrySendError};

    fn block(tag: f32) -> TimestampedBlock {
        TimestampedBlock {
            samples: vec![tag; 4],
            adjusted_time: tag as f64,
        }
    }

    #[test]
    fn test_delivery_is_fifo() {
        let (tx, rx) = block_channel(8);
        for i in 0..5 {
            tx.send(block(i as f32)).unwrap();
        }
        for i in 0..5 {
            let got = rx.recv().unwrap();
            assert_eq!(got.adjusted_time, i as f64);
            assert_eq!(got.samples[0], i as f32);
        }
    }

    #[test]
    fn test_full_channel_rejects_try_send() {
        let (tx, _rx) = block_channel(2);
        tx.try_send(block(0.0)).unwrap();
        tx.try_send(block(1.0)).unwrap();
        assert!(matches!(
            tx.try_send(block(2.0)),
            Err(TrySendError::Full(_))
        ));
    }

    #[test]
    fn test_dropped_sender_disconnects_receiver() {
        let (tx, rx) = block_channel(4);
        tx.send(block(0.0)).unwrap();
        drop(tx);
        assert!(rx.try_recv().is_ok());
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_session_capacity_covers_four_seconds() {
        // 48000 Hz / 1200-sample blocks is 40 blocks per second.
        assert_eq!(session_capacity(48000, 1200), 160);
        // Degenerate inputs still leave room for a handful of blocks.
        assert_eq!(session_capacity(100, 1000), 16);
    }
}
