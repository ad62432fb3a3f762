//! Mock rendering device for testing without hardware.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::output::{AudioOutput, RenderUnit, UnitCompletion};
use crate::VoiceStreamError;

/// A unit as it was handed to the mock device.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledUnit {
    /// Clock instant the unit was scheduled to begin at.
    pub start: Duration,
    /// Playback duration of the unit.
    pub duration: Duration,
    /// Number of samples in the unit.
    pub samples: usize,
}

impl ScheduledUnit {
    /// Clock instant the unit ends.
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }
}

/// A rendering device with a manually advanced clock.
///
/// Nothing is rendered; the mock records every scheduled unit and fires
/// completions as the clock passes their end.
///
/// # Example
///
/// ```
/// use voice_stream::{AudioBlock, AudioOutput, MockOutput, RenderUnit};
/// use std::time::Duration;
///
/// let output = MockOutput::new();
/// let unit = RenderUnit::new(AudioBlock::new(vec![0.0; 240], 24000));
/// let _done = output.schedule(unit, Duration::from_millis(50));
///
/// output.advance(Duration::from_millis(100));
/// assert_eq!(output.scheduled().len(), 1);
/// assert_eq!(output.pending_units(), 0);
/// ```
pub struct MockOutput {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    now: Duration,
    suspended: bool,
    resumes: usize,
    suspends: usize,
    stop_all_calls: usize,
    scheduled: Vec<ScheduledUnit>,
    pending: Vec<(Duration, oneshot::Sender<()>)>,
}

impl MockOutput {
    /// A running device with its clock at zero.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    /// A device that starts suspended, as under an autoplay policy.
    pub fn suspended() -> Self {
        let output = Self::new();
        output.state.lock().suspended = true;
        output
    }

    /// Advances the clock unless suspended, completing finished units.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock();
        if state.suspended {
            return;
        }
        state.now += by;
        let now = state.now;
        let (done, pending): (Vec<_>, Vec<_>) =
            state.pending.drain(..).partition(|(end, _)| *end <= now);
        state.pending = pending;
        drop(state);

        for (_, tx) in done {
            let _ = tx.send(());
        }
    }

    /// Every unit scheduled so far, in scheduling order.
    pub fn scheduled(&self) -> Vec<ScheduledUnit> {
        self.state.lock().scheduled.clone()
    }

    /// Units scheduled but neither finished nor stopped.
    pub fn pending_units(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Number of `resume()` calls.
    pub fn resume_count(&self) -> usize {
        self.state.lock().resumes
    }

    /// Number of `suspend()` calls.
    pub fn suspend_count(&self) -> usize {
        self.state.lock().suspends
    }

    /// Number of `stop_all()` calls.
    pub fn stop_all_count(&self) -> usize {
        self.state.lock().stop_all_calls
    }
}

impl Default for MockOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for MockOutput {
    fn current_time(&self) -> Duration {
        self.state.lock().now
    }

    fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    fn resume(&self) -> Result<(), VoiceStreamError> {
        let mut state = self.state.lock();
        state.suspended = false;
        state.resumes += 1;
        Ok(())
    }

    fn suspend(&self) -> Result<(), VoiceStreamError> {
        let mut state = self.state.lock();
        state.suspended = true;
        state.suspends += 1;
        Ok(())
    }

    fn schedule(&self, unit: RenderUnit, start_at: Duration) -> UnitCompletion {
        let (tx, rx) = oneshot::channel();
        let record = ScheduledUnit {
            start: start_at,
            duration: unit.duration(),
            samples: unit.block().len(),
        };

        let mut state = self.state.lock();
        state.pending.push((record.end(), tx));
        state.scheduled.push(record);
        rx
    }

    fn stop_all(&self) {
        let mut state = self.state.lock();
        state.stop_all_calls += 1;
        // Dropping the senders completes every waiter.
        state.pending.clear();
    }
}
