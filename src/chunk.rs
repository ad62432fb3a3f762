//! Audio blocks flowing through the capture and playback pipelines.

use std::sync::Arc;
use std::time::Duration;

use crate::format::rms;

/// A fixed buffer of mono float samples at a known sample rate.
///
/// `AudioBlock` is the unit of audio in both directions: microphone blocks
/// at the device's native rate on the way out, and decoded synthesized
/// speech at the wire rate on the way in. Blocks are produced once, consumed
/// once, and never mutated; the samples live behind an `Arc` so handing a
/// block between tasks never copies audio.
///
/// # Example
///
/// ```
/// use voice_stream::AudioBlock;
/// use std::time::Duration;
///
/// let block = AudioBlock::new(vec![0.0; 2400], 24000);
/// assert_eq!(block.duration(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct AudioBlock {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioBlock {
    /// Creates a new block from mono samples.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// The samples in this block.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples (frames, since blocks are mono).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this block contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of this block.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// RMS level of this block, used for level metering.
    pub fn level(&self) -> f32 {
        rms(&self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_16khz() {
        let block = AudioBlock::new(vec![0.0; 1600], 16000);
        assert_eq!(block.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_duration_24khz_short_block() {
        let block = AudioBlock::new(vec![0.0; 100], 24000);
        let expected = 100.0 / 24000.0;
        assert!((block.duration().as_secs_f64() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_block() {
        let block = AudioBlock::new(vec![], 16000);
        assert!(block.is_empty());
        assert_eq!(block.len(), 0);
        assert_eq!(block.duration(), Duration::ZERO);
        assert_eq!(block.level(), 0.0);
    }

    #[test]
    fn test_zero_sample_rate() {
        let block = AudioBlock::new(vec![0.0; 100], 0);
        assert_eq!(block.duration(), Duration::ZERO);
    }

    #[test]
    fn test_clone_shares_samples() {
        let block = AudioBlock::new(vec![0.25; 8], 16000);
        let copy = block.clone();
        assert!(std::ptr::eq(block.samples(), copy.samples()));
        assert!((copy.level() - 0.25).abs() < 1e-6);
    }
}
