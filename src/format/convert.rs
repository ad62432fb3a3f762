//! Sample format conversion between the float audio domain and wire PCM16.

/// Scale applied to negative samples (full i16 range down to -32768).
const NEGATIVE_SCALE: f32 = 32768.0;
/// Scale applied to non-negative samples (up to 32767).
const POSITIVE_SCALE: f32 = 32767.0;

/// Converts an f32 sample to i16.
///
/// The input is clamped to `[-1.0, 1.0]` before scaling. Negative values
/// scale by 32768 and non-negative values by 32767, so both extremes map
/// onto the full i16 range without overflowing.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    if s < 0.0 {
        (s * NEGATIVE_SCALE).round() as i16
    } else {
        (s * POSITIVE_SCALE).round() as i16
    }
}

/// Converts an i16 sample to f32 in `[-1.0, 1.0]`.
///
/// Mirrors [`f32_to_i16`] so a round trip stays within one quantization step.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / NEGATIVE_SCALE
    } else {
        f32::from(sample) / POSITIVE_SCALE
    }
}

/// Batch converts f32 samples to i16.
pub fn f32_slice_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Batch converts i16 samples to f32.
pub fn i16_slice_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| i16_to_f32(s)).collect()
}

/// Down-mixes interleaved frames to mono by averaging channels.
///
/// A trailing partial frame is ignored.
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => interleaved.to_vec(),
        n => {
            let n = n as usize;
            interleaved
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Root-mean-square level of a block of float samples.
///
/// Returns 0.0 for an empty block.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}
