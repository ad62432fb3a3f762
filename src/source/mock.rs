//! Mock microphone for testing without hardware.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use crate::source::{MicStream, MicTrack, Microphone};
use crate::{AudioBlock, VoiceStreamError};

/// A microphone that hands out in-memory streams.
///
/// Clones share state, so a test can keep one handle while the engine owns
/// another. Acquisition can be held open to exercise races, or made to fail.
///
/// # Example
///
/// ```
/// use voice_stream::MockMicrophone;
///
/// let mic = MockMicrophone::new(48000);
/// mic.hold();
/// // ... start the engine, then race it ...
/// mic.open();
/// assert_eq!(mic.tracks_stopped(), 0);
/// ```
#[derive(Clone)]
pub struct MockMicrophone {
    inner: Arc<MockInner>,
}

struct MockInner {
    sample_rate: u32,
    held: AtomicBool,
    gate: Notify,
    fail_next: Mutex<Option<VoiceStreamError>>,
    acquisitions: AtomicUsize,
    tracks_stopped: Arc<AtomicUsize>,
    senders: Mutex<Vec<mpsc::Sender<AudioBlock>>>,
}

impl MockMicrophone {
    /// Creates a mock delivering blocks at the given native rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(MockInner {
                sample_rate,
                held: AtomicBool::new(false),
                gate: Notify::new(),
                fail_next: Mutex::new(None),
                acquisitions: AtomicUsize::new(0),
                tracks_stopped: Arc::new(AtomicUsize::new(0)),
                senders: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Makes subsequent acquisitions wait until [`open`](Self::open).
    pub fn hold(&self) {
        self.inner.held.store(true, Ordering::SeqCst);
    }

    /// Lets held acquisitions resolve.
    pub fn open(&self) {
        self.inner.held.store(false, Ordering::SeqCst);
        self.inner.gate.notify_waiters();
    }

    /// Makes the next acquisition fail with `error`.
    pub fn fail_next(&self, error: VoiceStreamError) {
        *self.inner.fail_next.lock() = Some(error);
    }

    /// Number of acquisitions that resolved successfully.
    pub fn acquisitions(&self) -> usize {
        self.inner.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of tracks that have been stopped.
    pub fn tracks_stopped(&self) -> usize {
        self.inner.tracks_stopped.load(Ordering::SeqCst)
    }

    /// Number of acquired tracks not yet stopped.
    pub fn live_tracks(&self) -> usize {
        self.acquisitions().saturating_sub(self.tracks_stopped())
    }

    /// Delivers a block to the most recently acquired, still-open stream.
    ///
    /// Returns `false` if no stream is listening.
    pub fn push_block(&self, samples: Vec<f32>) -> bool {
        let block = AudioBlock::new(samples, self.inner.sample_rate);
        let mut senders = self.inner.senders.lock();
        senders.retain(|tx| !tx.is_closed());
        match senders.last() {
            Some(tx) => tx.try_send(block).is_ok(),
            None => false,
        }
    }

    async fn wait_for_gate(&self) {
        loop {
            let notified = self.inner.gate.notified();
            if !self.inner.held.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Microphone for MockMicrophone {
    async fn acquire(&self) -> Result<MicStream, VoiceStreamError> {
        self.wait_for_gate().await;

        if let Some(error) = self.inner.fail_next.lock().take() {
            return Err(error);
        }

        let (tx, rx) = mpsc::channel(64);
        self.inner.senders.lock().push(tx);
        self.inner.acquisitions.fetch_add(1, Ordering::SeqCst);

        Ok(MicStream::new(
            self.inner.sample_rate,
            rx,
            Box::new(MockTrack {
                enabled: AtomicBool::new(true),
                stopped: AtomicBool::new(false),
                tracks_stopped: Arc::clone(&self.inner.tracks_stopped),
            }),
        ))
    }
}

struct MockTrack {
    enabled: AtomicBool,
    stopped: AtomicBool,
    tracks_stopped: Arc<AtomicUsize>,
}

impl MicTrack for MockTrack {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.tracks_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_mock_acquire_and_release() {
        let mic = MockMicrophone::new(48000);
        let stream = mic.acquire().await.unwrap();

        assert_eq!(stream.sample_rate(), 48000);
        assert_eq!(mic.live_tracks(), 1);

        stream.release();
        assert_eq!(mic.tracks_stopped(), 1);
        assert_eq!(mic.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_mock_fail_next() {
        let mic = MockMicrophone::new(48000);
        mic.fail_next(VoiceStreamError::PermissionDenied);

        assert!(matches!(
            mic.acquire().await,
            Err(VoiceStreamError::PermissionDenied)
        ));
        assert!(mic.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_hold_blocks_until_open() {
        let mic = MockMicrophone::new(16000);
        mic.hold();

        let pending = tokio::spawn({
            let mic = mic.clone();
            async move { mic.acquire().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());

        mic.open();
        let stream = pending.await.unwrap().unwrap();
        assert_eq!(mic.acquisitions(), 1);
        drop(stream);
    }

    #[tokio::test]
    async fn test_mock_push_block() {
        let mic = MockMicrophone::new(16000);
        assert!(!mic.push_block(vec![0.0; 4]));

        let mut stream = mic.acquire().await.unwrap();
        let mut blocks = stream.take_blocks().unwrap();

        assert!(mic.push_block(vec![0.5; 4]));
        let block = blocks.recv().await.unwrap();
        assert_eq!(block.len(), 4);
        assert_eq!(block.sample_rate(), 16000);
    }
}
