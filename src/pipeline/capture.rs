//! Capture pipeline task - turns microphone blocks into outbound wire audio.
//!
//! Each native-rate block is gated on the session token, metered, resampled
//! to the wire rate, encoded as PCM16 and handed to the transport. Blocks
//! are processed strictly in arrival order, one message per block.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::event::{LevelCallback, LevelSource};
use crate::format::{encode_wire_block, resample};
use crate::protocol::ClientMessage;
use crate::session::{SessionState, SessionToken};
use crate::transport::Transport;
use crate::AudioBlock;

/// The capture pipeline owns the microphone block receiver for one session.
pub(crate) struct CapturePipeline {
    blocks: mpsc::Receiver<AudioBlock>,
    wire_rate: u32,
    token: SessionToken,
    state: Arc<SessionState>,
    transport: Arc<dyn Transport>,
    level: Option<LevelCallback>,
}

impl CapturePipeline {
    pub fn new(
        blocks: mpsc::Receiver<AudioBlock>,
        wire_rate: u32,
        token: SessionToken,
        state: Arc<SessionState>,
        transport: Arc<dyn Transport>,
        level: Option<LevelCallback>,
    ) -> Self {
        tracing::info!(
            session_id = token.id(),
            wire_rate,
            "capture pipeline starting"
        );

        Self {
            blocks,
            wire_rate,
            token,
            state,
            transport,
            level,
        }
    }

    /// Runs until the microphone closes, the session ends, or the
    /// transport goes away.
    pub async fn run(mut self) {
        while let Some(block) = self.blocks.recv().await {
            if !self.token.is_current() {
                tracing::debug!(session_id = self.token.id(), "capture pipeline superseded");
                break;
            }

            let Some(data) = self.process_block(&block) else {
                continue;
            };

            if let Err(e) = self.transport.send(ClientMessage::AudioChunk { data }) {
                tracing::warn!(error = %e, "transport closed; capture pipeline stopping");
                break;
            }

            let sent = self.state.blocks_sent.fetch_add(1, Ordering::SeqCst) + 1;
            if sent % 50 == 0 {
                tracing::debug!(
                    session_id = self.token.id(),
                    blocks_sent = sent,
                    "capture pipeline progress"
                );
            }
        }
    }

    /// Converts one block to wire form, or `None` if capture is gated off.
    fn process_block(&self, block: &AudioBlock) -> Option<String> {
        if !self.token.may_capture() {
            return None;
        }

        if let Some(ref callback) = self.level {
            callback(block.level(), LevelSource::Microphone);
        }

        let resampled = resample(block.samples(), block.sample_rate(), self.wire_rate);
        Some(encode_wire_block(&resampled))
    }
}

/// Spawns the capture pipeline as a background task.
pub(crate) fn spawn_capture_pipeline(pipeline: CapturePipeline) -> tokio::task::JoinHandle<()> {
    tokio::spawn(pipeline.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::level_callback;
    use crate::format::decode_wire_block;
    use crate::session::SessionPhase;
    use crate::transport::ChannelTransport;

    struct Harness {
        state: Arc<SessionState>,
        block_tx: mpsc::Sender<AudioBlock>,
        outbound: mpsc::UnboundedReceiver<ClientMessage>,
        levels: Arc<parking_lot::Mutex<Vec<(f32, LevelSource)>>>,
        pipeline: CapturePipeline,
    }

    fn harness() -> Harness {
        let state = Arc::new(SessionState::new());
        let token = state.begin();
        state.set_phase(SessionPhase::Active);

        let (block_tx, block_rx) = mpsc::channel(8);
        let (transport, outbound) = ChannelTransport::new();
        let levels = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&levels);
        let level = level_callback(move |level, source| sink.lock().push((level, source)));

        let pipeline = CapturePipeline::new(
            block_rx,
            16000,
            token,
            Arc::clone(&state),
            Arc::new(transport),
            Some(level),
        );

        Harness {
            state,
            block_tx,
            outbound,
            levels,
            pipeline,
        }
    }

    #[test]
    fn test_process_block_resamples_to_wire_rate() {
        let h = harness();
        let block = AudioBlock::new(vec![0.5; 4800], 48000);

        let data = h.pipeline.process_block(&block).unwrap();
        let samples = decode_wire_block(&data).unwrap();

        assert_eq!(samples.len(), 1600);
        assert!((samples[0] - 0.5).abs() < 0.001);
        assert_eq!(h.levels.lock()[0].1, LevelSource::Microphone);
    }

    #[test]
    fn test_process_block_gated_by_mute() {
        let h = harness();
        h.state.set_mic_muted(true);

        let block = AudioBlock::new(vec![0.5; 160], 16000);
        assert!(h.pipeline.process_block(&block).is_none());
        assert!(h.levels.lock().is_empty());

        h.state.set_mic_muted(false);
        assert!(h.pipeline.process_block(&block).is_some());
    }

    #[test]
    fn test_process_block_gated_by_phase() {
        let h = harness();
        h.state.set_phase(SessionPhase::Stopping);

        let block = AudioBlock::new(vec![0.5; 160], 16000);
        assert!(h.pipeline.process_block(&block).is_none());
    }

    #[tokio::test]
    async fn test_run_sends_blocks_in_order() {
        let mut h = harness();
        let task = spawn_capture_pipeline(h.pipeline);

        h.block_tx
            .send(AudioBlock::new(vec![0.1; 160], 16000))
            .await
            .unwrap();
        h.block_tx
            .send(AudioBlock::new(vec![0.2; 320], 16000))
            .await
            .unwrap();
        drop(h.block_tx);
        task.await.unwrap();

        let mut lengths = Vec::new();
        while let Ok(ClientMessage::AudioChunk { data }) = h.outbound.try_recv() {
            lengths.push(decode_wire_block(&data).unwrap().len());
        }
        assert_eq!(lengths, vec![160, 320]);
        assert_eq!(h.state.stats().blocks_sent, 2);
    }

    #[tokio::test]
    async fn test_run_exits_after_hard_stop() {
        let mut h = harness();
        h.state.hard_stop();
        let task = spawn_capture_pipeline(h.pipeline);

        h.block_tx
            .send(AudioBlock::new(vec![0.1; 160], 16000))
            .await
            .unwrap();
        task.await.unwrap();

        assert!(h.outbound.try_recv().is_err());
        assert_eq!(h.state.stats().blocks_sent, 0);
    }

    #[tokio::test]
    async fn test_run_exits_when_transport_closes() {
        let h = harness();
        drop(h.outbound);
        let task = spawn_capture_pipeline(h.pipeline);

        h.block_tx
            .send(AudioBlock::new(vec![0.1; 160], 16000))
            .await
            .unwrap();
        task.await.unwrap();

        assert_eq!(h.state.stats().blocks_sent, 0);
    }
}
