//! Audio pipeline components.
//!
//! Two independent directions share the session state:
//!
//! ```text
//! CPAL Thread → Ring Buffer → Bridge Task → Capture Pipeline → Transport
//! Transport → Playback Queue → Render Loop → Output Device
//! ```
//!
//! - **Ring Buffer**: Lock-free SPSC queue so the CPAL callback never blocks
//! - **Capture Pipeline**: Gates, meters, resamples and encodes each block
//! - **Playback Scheduler**: Gapless cursor-based rendering with lookahead
//! - **Washout**: Discards stale inbound audio right after an interruption

mod capture;
mod playback;
mod ring_buffer;
mod washout;

pub(crate) use capture::{spawn_capture_pipeline, CapturePipeline};
pub(crate) use playback::{EnqueueOutcome, PlaybackScheduler};
pub(crate) use ring_buffer::{create_block_buffer, BlockBuffer};
