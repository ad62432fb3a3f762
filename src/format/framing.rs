//! Binary to text framing for the transport.
//!
//! Wire blocks are little-endian PCM16 bytes carried as base64 text. The
//! decoder accepts the standard and URL-safe alphabets, tolerates
//! whitespace, and restores missing padding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;
use crate::format::convert::{f32_slice_to_i16, i16_slice_to_f32};

/// Encodes raw bytes as standard, padded base64.
pub fn frame_to_transportable(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes base64 text into bytes.
///
/// # Errors
///
/// Returns [`CodecError::InvalidEncoding`] if the text is not base64 in
/// either alphabet.
pub fn try_transportable_to_frame(text: &str) -> Result<Vec<u8>, CodecError> {
    let mut normalized: String = text
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }

    STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| CodecError::InvalidEncoding(e.to_string()))
}

/// Best-effort decode: malformed input yields an empty buffer.
pub fn transportable_to_frame(text: &str) -> Vec<u8> {
    match try_transportable_to_frame(text) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "discarding malformed frame");
            Vec::new()
        }
    }
}

/// Serializes PCM16 samples as little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parses little-endian bytes into PCM16 samples.
///
/// # Errors
///
/// Returns [`CodecError::OddByteLength`] if the buffer does not hold a whole
/// number of samples.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Result<Vec<i16>, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddByteLength { len: bytes.len() });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encodes float samples (already at the wire rate) into a transport string.
pub fn encode_wire_block(samples: &[f32]) -> String {
    frame_to_transportable(&pcm16_to_bytes(&f32_slice_to_i16(samples)))
}

/// Decodes a transport string into float samples at the wire rate.
///
/// # Errors
///
/// Returns a [`CodecError`] for malformed base64 or a truncated sample.
pub fn decode_wire_block(text: &str) -> Result<Vec<f32>, CodecError> {
    let bytes = try_transportable_to_frame(text)?;
    let pcm = bytes_to_pcm16(&bytes)?;
    Ok(i16_slice_to_f32(&pcm))
}
