//! Audio format conversion utilities.
//!
//! Pure, stateless transforms used on both directions of the stream:
//! - Sample format conversion (f32 ↔ i16)
//! - Sample rate conversion (resampling)
//! - Binary ↔ text framing for the transport

mod convert;
mod framing;
mod resample;

pub use convert::{
    downmix_to_mono, f32_slice_to_i16, f32_to_i16, i16_slice_to_f32, i16_to_f32, rms,
};
pub use framing::{
    bytes_to_pcm16, decode_wire_block, encode_wire_block, frame_to_transportable,
    pcm16_to_bytes, transportable_to_frame, try_transportable_to_frame,
};
pub use resample::resample;
