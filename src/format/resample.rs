//! Sample rate conversion.
//!
//! Linear interpolation between adjacent input samples. Good enough for
//! speech in both directions (device rate to 16 kHz capture, 24 kHz
//! playback to device rate).

/// Resamples mono audio from one sample rate to another.
///
/// The output holds `round(len / (from_rate / to_rate))` samples. Matching
/// rates return the input unchanged. A zero rate cannot describe a ratio,
/// so the input is returned unchanged rather than panicking.
///
/// # Arguments
///
/// * `samples` - Input samples (mono)
/// * `from_rate` - Source sample rate in Hz
/// * `to_rate` - Target sample rate in Hz
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let step = f64::from(from_rate) / f64::from(to_rate);
    let output_len = (samples.len() as f64 / step).round() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 * step;
            let src_idx = src_pos.floor() as usize;
            if src_idx >= last {
                return samples[last];
            }
            let frac = (src_pos - src_idx as f64) as f32;
            let s1 = samples[src_idx];
            let s2 = samples[src_idx + 1];
            s1 + (s2 - s1) * frac
        })
        .collect()
}
