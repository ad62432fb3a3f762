//! Ring buffer wrapper for microphone capture.

use ringbuf::traits::{Consumer, Observer, Split};
use ringbuf::HeapRb;
use std::time::Duration;

use crate::AudioBlock;

/// A ring buffer of mono samples with block-based reading.
///
/// The CPAL callback pushes into the producer half without blocking; the
/// bridge task reads fixed-size [`AudioBlock`]s from this side.
pub struct BlockBuffer {
    consumer: ringbuf::HeapCons<f32>,
    sample_rate: u32,
    block_size: usize,
}

impl BlockBuffer {
    /// Creates a block reader over a ring buffer consumer.
    pub fn new(
        consumer: ringbuf::HeapCons<f32>,
        sample_rate: u32,
        block_duration: Duration,
    ) -> Self {
        let block_size =
            ((f64::from(sample_rate) * block_duration.as_secs_f64()).round() as usize).max(1);

        Self {
            consumer,
            sample_rate,
            block_size,
        }
    }

    /// Sample rate of the buffered audio.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Attempts to read a complete block from the buffer.
    ///
    /// Returns `None` if not enough samples are available.
    pub fn try_read_block(&mut self) -> Option<AudioBlock> {
        if !self.has_block() {
            return None;
        }

        let mut samples = vec![0.0f32; self.block_size];
        let read = self.consumer.pop_slice(&mut samples);
        samples.truncate(read);

        if samples.is_empty() {
            return None;
        }

        Some(AudioBlock::new(samples, self.sample_rate))
    }

    /// Returns the number of samples currently in the buffer.
    pub fn available(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Returns true if enough samples are available for a complete block.
    pub fn has_block(&self) -> bool {
        self.available() >= self.block_size
    }
}

/// Creates a ring buffer pair for microphone capture.
///
/// Returns a producer (for the CPAL callback) and a `BlockBuffer` (for the
/// bridge task).
pub fn create_block_buffer(
    capacity_duration: Duration,
    sample_rate: u32,
    block_duration: Duration,
) -> (ringbuf::HeapProd<f32>, BlockBuffer) {
    let capacity =
        ((f64::from(sample_rate) * capacity_duration.as_secs_f64()).round() as usize).max(1);

    let ring_buffer = HeapRb::<f32>::new(capacity);
    let (producer, consumer) = ring_buffer.split();

    (
        producer,
        BlockBuffer::new(consumer, sample_rate, block_duration),
    )
}
