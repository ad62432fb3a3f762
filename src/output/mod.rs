//! Audio rendering devices.
//!
//! An [`AudioOutput`] is a hardware rendering context: it exposes a clock,
//! accepts [`RenderUnit`]s scheduled at absolute clock instants, and can be
//! suspended and resumed. Only one context exists per process (platforms cap
//! how many may be open), so it is shared through an [`OutputContext`] and
//! suspended, never destroyed, between sessions.

mod context;
mod device;
mod mock;

pub use context::OutputContext;
pub use device::CpalOutput;
pub use mock::{MockOutput, ScheduledUnit};

use std::time::Duration;

use tokio::sync::oneshot;

use crate::{AudioBlock, VoiceStreamError};

/// A block wrapped for rendering at a known sample rate.
#[derive(Debug, Clone)]
pub struct RenderUnit {
    block: AudioBlock,
}

impl RenderUnit {
    /// Wraps a decoded block.
    pub fn new(block: AudioBlock) -> Self {
        Self { block }
    }

    /// The audio to render.
    pub fn block(&self) -> &AudioBlock {
        &self.block
    }

    /// How long the unit plays.
    pub fn duration(&self) -> Duration {
        self.block.duration()
    }
}

/// Completion signal for a scheduled unit.
///
/// Resolves when the unit finishes playing. A forced stop drops the sender,
/// which callers treat the same as completion.
pub type UnitCompletion = oneshot::Receiver<()>;

/// A hardware rendering context.
pub trait AudioOutput: Send + Sync {
    /// Current position of the hardware clock.
    ///
    /// Does not advance while suspended.
    fn current_time(&self) -> Duration;

    /// `true` if the platform or the engine has suspended rendering.
    fn is_suspended(&self) -> bool;

    /// Resumes rendering.
    fn resume(&self) -> Result<(), VoiceStreamError>;

    /// Suspends rendering without releasing the device.
    fn suspend(&self) -> Result<(), VoiceStreamError>;

    /// Schedules `unit` to begin exactly at `start_at` on the hardware clock.
    fn schedule(&self, unit: RenderUnit, start_at: Duration) -> UnitCompletion;

    /// Stops every scheduled or playing unit immediately.
    fn stop_all(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_render_unit_duration() {
        let unit = RenderUnit::new(AudioBlock::new(vec![0.0; 2400], 24000));
        assert_eq!(unit.duration(), Duration::from_millis(100));
        assert_eq!(unit.block().len(), 2400);
    }

    #[test]
    fn test_audio_output_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn AudioOutput>>();
    }
}
