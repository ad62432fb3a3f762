//! Microphone abstraction and CPAL device wrapper.
//!
//! A [`Microphone`] hands out [`MicStream`]s: a receiver of native-rate
//! [`AudioBlock`]s plus the [`MicTrack`] controlling the hardware behind
//! it. Exactly one stream is owned by the current session; it must be
//! released (disabled, then stopped) before another session may acquire
//! the device.

mod device;
mod mock;

pub use device::CpalMicrophone;
pub use mock::MockMicrophone;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use tokio::sync::mpsc;

use crate::{AudioBlock, VoiceStreamError};

/// Source of live microphone streams.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Acquires exclusive access to the microphone.
    ///
    /// Fails with a permission or availability error.
    async fn acquire(&self) -> Result<MicStream, VoiceStreamError>;
}

/// Control over the hardware behind a [`MicStream`].
pub trait MicTrack: Send + Sync {
    /// Enables or disables delivery without releasing the device.
    fn set_enabled(&self, enabled: bool);

    /// Stops the track and releases the device. Idempotent.
    fn stop(&self);
}

/// A live microphone stream.
///
/// Dropping the stream releases the hardware.
pub struct MicStream {
    sample_rate: u32,
    blocks: Option<mpsc::Receiver<AudioBlock>>,
    track: Option<Box<dyn MicTrack>>,
}

impl MicStream {
    /// Creates a stream from its parts.
    pub fn new(
        sample_rate: u32,
        blocks: mpsc::Receiver<AudioBlock>,
        track: Box<dyn MicTrack>,
    ) -> Self {
        Self {
            sample_rate,
            blocks: Some(blocks),
            track: Some(track),
        }
    }

    /// Native sample rate of delivered blocks.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Takes the block receiver, leaving the track in place.
    pub(crate) fn take_blocks(&mut self) -> Option<mpsc::Receiver<AudioBlock>> {
        self.blocks.take()
    }

    /// Disables then stops the track.
    pub fn release(mut self) {
        self.release_track();
    }

    fn release_track(&mut self) {
        if let Some(track) = self.track.take() {
            track.set_enabled(false);
            track.stop();
        }
        // Closing the receiver unblocks any bridge still forwarding blocks.
        if let Some(mut blocks) = self.blocks.take() {
            blocks.close();
        }
    }
}

impl Drop for MicStream {
    fn drop(&mut self) {
        self.release_track();
    }
}

impl std::fmt::Debug for MicStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MicStream")
            .field("sample_rate", &self.sample_rate)
            .field("released", &self.track.is_none())
            .finish()
    }
}

/// Lists all available input devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_input_devices() -> Result<Vec<String>, VoiceStreamError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}
