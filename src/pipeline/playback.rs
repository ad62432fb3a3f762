//! Playback scheduler - queues decoded blocks and renders them gaplessly.
//!
//! Units are placed at absolute instants on the output device's clock. A
//! single cursor marks where the next unit begins; each scheduled unit
//! advances it by its own duration, so consecutive units abut exactly.
//!
//! The render loop is a small actor reacting to two wake sources: a
//! lookahead timer, and new data arriving while it waits on the last
//! scheduled unit. Every wake re-enters [`PlaybackScheduler::play_next`]
//! with the generation it was started under; a flush bumps the generation
//! so stale loops exit on their next step.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use super::washout::Washout;
use crate::event::{LevelCallback, LevelSource};
use crate::format::decode_wire_block;
use crate::output::{AudioOutput, OutputContext, RenderUnit, UnitCompletion};
use crate::session::SessionState;
use crate::{AudioBlock, CodecError, EngineConfig};

/// Result of offering an inbound block to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EnqueueOutcome {
    /// Decoded and appended; carries the new queue length.
    Queued { queue_len: usize },
    /// Rejected because the engine is hard-stopped.
    HardStopped,
    /// Rejected because it arrived inside the washout window.
    Stale,
    /// Rejected because it failed to decode.
    Malformed(CodecError),
    /// Decoded to zero samples; nothing to render.
    Empty,
}

/// What the render loop should do after a scheduling pass.
enum RenderStep {
    /// Queue drained; rendering stopped.
    Idle,
    /// A flush happened since this loop started.
    Cancelled,
    /// More is queued but far enough ahead; come back after this delay.
    WakeAfter(Duration),
    /// Queue drained with a unit still playing; wait for it or for new data.
    AwaitUnit(UnitCompletion),
}

struct SchedulerCore {
    queue: VecDeque<AudioBlock>,
    next_start: Option<Duration>,
    rendering: bool,
    generation: u64,
}

impl SchedulerCore {
    fn go_idle(&mut self) {
        self.rendering = false;
        self.next_start = None;
    }
}

/// Owns the playback queue and the render schedule cursor.
pub(crate) struct PlaybackScheduler {
    core: Mutex<SchedulerCore>,
    context: Arc<OutputContext>,
    state: Arc<SessionState>,
    washout: Washout,
    sample_rate: u32,
    lookahead: Duration,
    margin: Duration,
    data_ready: Notify,
    level: Mutex<Option<LevelCallback>>,
}

impl PlaybackScheduler {
    pub fn new(
        context: Arc<OutputContext>,
        state: Arc<SessionState>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            core: Mutex::new(SchedulerCore {
                queue: VecDeque::new(),
                next_start: None,
                rendering: false,
                generation: 0,
            }),
            context,
            state,
            washout: Washout::new(config.washout_window),
            sample_rate: config.playback_sample_rate,
            lookahead: config.lookahead,
            margin: config.schedule_margin,
            data_ready: Notify::new(),
            level: Mutex::new(None),
        }
    }

    /// Replaces the callback receiving playback levels.
    pub fn set_level_callback(&self, callback: Option<LevelCallback>) {
        *self.level.lock() = callback;
    }

    /// Decodes and appends a wire block. Never starts rendering.
    pub fn enqueue(&self, data: &str) -> EnqueueOutcome {
        if self.state.is_hard_stopped() {
            return EnqueueOutcome::HardStopped;
        }
        if self.washout.is_active() {
            return EnqueueOutcome::Stale;
        }

        let samples = match decode_wire_block(data) {
            Ok(samples) => samples,
            Err(e) => return EnqueueOutcome::Malformed(e),
        };
        if samples.is_empty() {
            return EnqueueOutcome::Empty;
        }

        let queue_len = {
            let mut core = self.core.lock();
            core.queue.push_back(AudioBlock::new(samples, self.sample_rate));
            core.queue.len()
        };
        self.data_ready.notify_one();

        EnqueueOutcome::Queued { queue_len }
    }

    /// Begins rendering if idle and there is something queued.
    pub fn start_queue_playback(self: &Arc<Self>) {
        let generation = {
            let mut core = self.core.lock();
            if core.rendering || core.queue.is_empty() {
                return;
            }
            core.rendering = true;
            core.generation
        };

        let step = self.play_next(generation);
        if matches!(step, RenderStep::Idle | RenderStep::Cancelled) {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(Arc::clone(self).render_loop(generation, step));
            }
            Err(_) => {
                tracing::warn!("no async runtime; playback stops after the first scheduled batch");
                let mut core = self.core.lock();
                if core.generation == generation {
                    core.go_idle();
                }
            }
        }
    }

    /// Flushes everything after an interruption and opens the washout window.
    ///
    /// Returns the number of queued blocks discarded.
    pub fn clear(&self) -> usize {
        self.washout.mark();
        self.flush()
    }

    /// Flushes everything without opening the washout window.
    pub fn reset(&self) -> usize {
        self.flush()
    }

    /// `true` while the render loop owns the queue.
    pub fn is_rendering(&self) -> bool {
        self.core.lock().rendering
    }

    pub fn queue_len(&self) -> usize {
        self.core.lock().queue.len()
    }

    fn flush(&self) -> usize {
        let dropped = {
            let mut core = self.core.lock();
            core.generation = core.generation.wrapping_add(1);
            let dropped = core.queue.len();
            core.queue.clear();
            core.go_idle();
            dropped
        };

        if let Some(output) = self.context.get() {
            output.stop_all();
        }
        self.emit_level(0.0);

        dropped
    }

    async fn render_loop(self: Arc<Self>, generation: u64, mut step: RenderStep) {
        loop {
            match step {
                RenderStep::Idle | RenderStep::Cancelled => return,
                RenderStep::WakeAfter(delay) => tokio::time::sleep(delay).await,
                RenderStep::AwaitUnit(mut done) => loop {
                    tokio::select! {
                        _ = &mut done => break,
                        () = self.data_ready.notified() => {
                            if self.queue_len() > 0 {
                                break;
                            }
                        }
                    }
                },
            }
            step = self.play_next(generation);
        }
    }

    /// One scheduling pass. Level callbacks fire after the lock is released.
    fn play_next(&self, generation: u64) -> RenderStep {
        let mut levels = Vec::new();
        let step = self.schedule_ready(generation, &mut levels);
        for level in levels {
            self.emit_level(level);
        }
        step
    }

    fn schedule_ready(&self, generation: u64, levels: &mut Vec<f32>) -> RenderStep {
        let mut core = self.core.lock();
        if core.generation != generation || !core.rendering {
            return RenderStep::Cancelled;
        }

        if core.queue.is_empty() {
            core.go_idle();
            levels.push(0.0);
            return RenderStep::Idle;
        }

        let output = match self.context.acquire_or_reuse() {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "audio output unavailable; playback idle");
                core.go_idle();
                return RenderStep::Idle;
            }
        };
        if output.is_suspended() {
            if let Err(e) = output.resume() {
                tracing::warn!(error = %e, "failed to resume audio output");
            }
        }

        while let Some(block) = core.queue.pop_front() {
            levels.push(block.level());
            let unit = RenderUnit::new(block);
            let duration = unit.duration();

            let now = output.current_time();
            // Only a cursor strictly behind the clock is reset.
            let start_at = match core.next_start {
                Some(cursor) if cursor >= now => cursor,
                _ => now + self.margin,
            };
            let done = output.schedule(unit, start_at);
            core.next_start = Some(start_at + duration);
            self.state.units_scheduled.fetch_add(1, Ordering::SeqCst);

            tracing::debug!(
                start_at = ?start_at,
                queue_len = core.queue.len(),
                "scheduled render unit"
            );

            if core.queue.is_empty() {
                return RenderStep::AwaitUnit(done);
            }

            let until_start = start_at.saturating_sub(now);
            if until_start >= self.lookahead {
                return RenderStep::WakeAfter(until_start - self.lookahead);
            }
        }

        core.go_idle();
        RenderStep::Idle
    }

    fn emit_level(&self, level: f32) {
        let callback = self.level.lock().clone();
        if let Some(callback) = callback {
            callback(level, LevelSource::Playback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::level_callback;
    use crate::format::encode_wire_block;
    use crate::output::MockOutput;
    use crate::VoiceStreamError;

    struct Harness {
        scheduler: Arc<PlaybackScheduler>,
        output: Arc<MockOutput>,
        state: Arc<SessionState>,
        levels: Arc<Mutex<Vec<f32>>>,
    }

    fn harness_with(output: MockOutput) -> Harness {
        let output = Arc::new(output);
        let context = Arc::new(OutputContext::with_output(output.clone()));
        let state = Arc::new(SessionState::new());
        let scheduler = Arc::new(PlaybackScheduler::new(
            context,
            Arc::clone(&state),
            &EngineConfig::default(),
        ));

        let levels = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&levels);
        scheduler.set_level_callback(Some(level_callback(move |level, source| {
            assert!(source.is_playback());
            sink.lock().push(level);
        })));

        Harness {
            scheduler,
            output,
            state,
            levels,
        }
    }

    fn harness() -> Harness {
        harness_with(MockOutput::new())
    }

    fn wire_block(samples: usize) -> String {
        encode_wire_block(&vec![0.25; samples])
    }

    #[tokio::test]
    async fn test_enqueue_does_not_start_playback() {
        let h = harness();
        let outcome = h.scheduler.enqueue(&wire_block(100));

        assert_eq!(outcome, EnqueueOutcome::Queued { queue_len: 1 });
        assert!(!h.scheduler.is_rendering());
        assert!(h.output.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_three_blocks_schedule_gaplessly() {
        let h = harness();
        for _ in 0..3 {
            h.scheduler.enqueue(&wire_block(100));
        }

        h.scheduler.start_queue_playback();

        let units = h.output.scheduled();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].start, Duration::from_millis(50));
        assert_eq!(units[1].start, units[0].end());
        assert_eq!(units[2].start, units[1].end());
        assert_eq!(h.scheduler.queue_len(), 0);
        assert!(h.scheduler.is_rendering());
        assert_eq!(h.state.stats().units_scheduled, 3);
    }

    #[tokio::test]
    async fn test_start_is_noop_when_empty_or_rendering() {
        let h = harness();
        h.scheduler.start_queue_playback();
        assert!(!h.scheduler.is_rendering());

        h.scheduler.enqueue(&wire_block(100));
        h.scheduler.start_queue_playback();
        h.scheduler.start_queue_playback();
        assert_eq!(h.output.scheduled().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookahead_defers_far_units() {
        let h = harness();
        for _ in 0..3 {
            h.scheduler.enqueue(&wire_block(2400));
        }

        h.scheduler.start_queue_playback();
        assert_eq!(h.output.scheduled().len(), 2);
        assert_eq!(h.scheduler.queue_len(), 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;

        let starts: Vec<_> = h.output.scheduled().iter().map(|u| u.start).collect();
        assert_eq!(
            starts,
            vec![
                Duration::from_millis(50),
                Duration::from_millis(150),
                Duration::from_millis(250),
            ]
        );
    }

    #[tokio::test]
    async fn test_new_data_continues_at_cursor() {
        let h = harness();
        h.scheduler.enqueue(&wire_block(240));
        h.scheduler.start_queue_playback();

        h.scheduler.enqueue(&wire_block(240));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let units = h.output.scheduled();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].start, units[0].end());
    }

    #[tokio::test]
    async fn test_cursor_equal_to_clock_stays_gapless() {
        let h = harness();
        h.scheduler.enqueue(&wire_block(2400));
        h.scheduler.start_queue_playback();

        // The clock lands exactly on the end of the first unit.
        h.output.advance(Duration::from_millis(150));
        h.scheduler.enqueue(&wire_block(2400));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        let units = h.output.scheduled();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].end(), Duration::from_millis(150));
        assert_eq!(units[1].start, Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_completion_with_empty_queue_goes_idle() {
        let h = harness();
        h.scheduler.enqueue(&wire_block(240));
        h.scheduler.start_queue_playback();

        h.output.advance(Duration::from_millis(100));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert!(!h.scheduler.is_rendering());
        assert_eq!(h.levels.lock().last().copied(), Some(0.0));
    }

    #[tokio::test]
    async fn test_cursor_resets_after_falling_behind() {
        let h = harness();
        h.scheduler.enqueue(&wire_block(240));
        h.scheduler.start_queue_playback();
        h.output.advance(Duration::from_secs(1));
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        h.scheduler.enqueue(&wire_block(240));
        h.scheduler.start_queue_playback();

        let units = h.output.scheduled();
        assert_eq!(units[1].start, Duration::from_millis(1050));
    }

    #[tokio::test]
    async fn test_clear_flushes_and_opens_washout() {
        let h = harness();
        for _ in 0..3 {
            h.scheduler.enqueue(&wire_block(2400));
        }
        h.scheduler.start_queue_playback();

        let dropped = h.scheduler.clear();

        assert_eq!(dropped, 1);
        assert_eq!(h.scheduler.queue_len(), 0);
        assert!(!h.scheduler.is_rendering());
        assert_eq!(h.output.stop_all_count(), 1);
        assert_eq!(h.output.pending_units(), 0);
        assert_eq!(h.levels.lock().last().copied(), Some(0.0));
        assert_eq!(h.scheduler.enqueue(&wire_block(100)), EnqueueOutcome::Stale);
    }

    #[tokio::test]
    async fn test_reset_does_not_open_washout() {
        let h = harness();
        h.scheduler.enqueue(&wire_block(100));
        assert_eq!(h.scheduler.reset(), 1);
        assert_eq!(
            h.scheduler.enqueue(&wire_block(100)),
            EnqueueOutcome::Queued { queue_len: 1 }
        );
    }

    #[tokio::test]
    async fn test_rejects_when_hard_stopped() {
        let h = harness();
        h.state.hard_stop();
        assert_eq!(
            h.scheduler.enqueue(&wire_block(100)),
            EnqueueOutcome::HardStopped
        );
    }

    #[tokio::test]
    async fn test_malformed_and_empty_blocks() {
        let h = harness();
        assert!(matches!(
            h.scheduler.enqueue("AA"),
            EnqueueOutcome::Malformed(CodecError::OddByteLength { .. })
        ));
        assert!(matches!(
            h.scheduler.enqueue("not base64!"),
            EnqueueOutcome::Malformed(CodecError::InvalidEncoding(_))
        ));
        assert_eq!(h.scheduler.enqueue(""), EnqueueOutcome::Empty);
        assert_eq!(h.scheduler.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_resumes_suspended_output() {
        let h = harness_with(MockOutput::suspended());
        h.scheduler.enqueue(&wire_block(100));
        h.scheduler.start_queue_playback();

        assert_eq!(h.output.resume_count(), 1);
        assert!(!h.output.is_suspended());
    }

    #[tokio::test]
    async fn test_output_failure_goes_idle() {
        let context = Arc::new(OutputContext::new(|| Err(VoiceStreamError::NoDefaultDevice)));
        let scheduler = Arc::new(PlaybackScheduler::new(
            context,
            Arc::new(SessionState::new()),
            &EngineConfig::default(),
        ));

        scheduler.enqueue(&wire_block(100));
        scheduler.start_queue_playback();
        assert!(!scheduler.is_rendering());
    }

    #[tokio::test]
    async fn test_levels_reported_per_block() {
        let h = harness();
        h.scheduler.enqueue(&wire_block(100));
        h.scheduler.start_queue_playback();

        let levels = h.levels.lock().clone();
        assert_eq!(levels.len(), 1);
        assert!((levels[0] - 0.25).abs() < 0.001);
    }
}
