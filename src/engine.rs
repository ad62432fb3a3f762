//! The voice engine: session lifecycle, inbound dispatch and playback control.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::output::OutputContext;
use crate::pipeline::{spawn_capture_pipeline, CapturePipeline, EnqueueOutcome, PlaybackScheduler};
use crate::session::{SessionPhase, SessionState, SessionStats, SessionToken};
use crate::source::{MicStream, Microphone};
use crate::transport::Transport;
use crate::{
    ClientMessage, EngineConfig, EngineEvent, EventCallback, LevelCallback, ServerMessage,
    StartRequest, VoiceStreamError,
};

/// A start waiting for the remote "connected" acknowledgment.
struct PendingHandshake {
    session_id: u64,
    reply: oneshot::Sender<Result<(), String>>,
}

/// Hardware and tasks owned by the current session.
#[derive(Default)]
struct SessionResources {
    mic: Option<MicStream>,
    capture_task: Option<JoinHandle<()>>,
}

/// Internal state shared between engine handles.
struct EngineInner {
    config: EngineConfig,
    state: Arc<SessionState>,
    transport: Arc<dyn Transport>,
    microphone: Arc<dyn Microphone>,
    output: Arc<OutputContext>,
    playback: Arc<PlaybackScheduler>,
    handshake: Mutex<Option<PendingHandshake>>,
    resources: Mutex<SessionResources>,
    event_callback: Option<EventCallback>,
}

/// Handle to a bidirectional voice-streaming engine.
///
/// The engine captures microphone audio and sends it to the remote peer as
/// 16 kHz PCM16 while rendering the peer's 24 kHz synthesized speech
/// gaplessly on the shared output device. Handles are cheap to clone; all
/// clones drive the same engine.
///
/// # Lifecycle
///
/// 1. Created by [`VoiceEngineBuilder::build()`](crate::VoiceEngineBuilder::build)
/// 2. [`start()`](Self::start) runs the handshake and microphone acquisition
///    concurrently, then begins capture
/// 3. Inbound messages are fed to [`handle_server_message()`](Self::handle_server_message)
/// 4. [`stop()`](Self::stop) tears everything down; a later `start()` begins
///    a fresh session on the same engine
///
/// # Example
///
/// ```ignore
/// use voice_stream::{level_callback, ChannelTransport, StartRequest, VoiceEngine};
///
/// let (transport, mut outbound) = ChannelTransport::new();
/// let engine = VoiceEngine::builder(transport)
///     .on_event(|e| tracing::info!(?e, "voice event"))
///     .build();
///
/// // Forward `outbound` to the socket; feed parsed frames back:
/// // engine.handle_server_message(ServerMessage::from_json(&frame)?);
///
/// engine
///     .start(level_callback(|level, source| meter.set(level, source)), StartRequest::new())
///     .await?;
///
/// // ... conversation ...
///
/// engine.stop();
/// ```
#[derive(Clone)]
pub struct VoiceEngine {
    inner: Arc<EngineInner>,
}

impl VoiceEngine {
    /// Creates a builder using `transport` for outbound messages.
    pub fn builder<T: Transport + 'static>(transport: T) -> crate::VoiceEngineBuilder {
        crate::VoiceEngineBuilder::new(transport)
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        microphone: Arc<dyn Microphone>,
        output: Arc<OutputContext>,
        event_callback: Option<EventCallback>,
    ) -> Self {
        let state = Arc::new(SessionState::new());
        let playback = Arc::new(PlaybackScheduler::new(
            Arc::clone(&output),
            Arc::clone(&state),
            &config,
        ));

        Self {
            inner: Arc::new(EngineInner {
                config,
                state,
                transport,
                microphone,
                output,
                playback,
                handshake: Mutex::new(None),
                resources: Mutex::new(SessionResources::default()),
                event_callback,
            }),
        }
    }

    /// Starts a voice session.
    ///
    /// Sends the "begin session" request and acquires the microphone
    /// concurrently, waiting for both. If [`stop()`](Self::stop) or a newer
    /// `start()` ran meanwhile, the just-acquired microphone is released and
    /// this call returns `Ok(())` without activating.
    ///
    /// # Errors
    ///
    /// Returns an acquisition error (permission, device), a handshake error
    /// (timeout, rejection), or a transport error. Every resource taken by
    /// this attempt has been released by the time the error is returned.
    pub async fn start(
        &self,
        level: LevelCallback,
        request: StartRequest,
    ) -> Result<(), VoiceStreamError> {
        let inner = &self.inner;
        let token = inner.state.begin();
        let session_id = token.id();
        tracing::info!(session_id, "starting voice session");

        if matches!(
            inner.state.phase(),
            SessionPhase::Active | SessionPhase::Stopping
        ) {
            tracing::debug!(session_id, "releasing previous session before start");
            inner.cleanup();
        }
        inner.state.set_phase(SessionPhase::Starting);
        inner.playback.set_level_callback(Some(Arc::clone(&level)));

        let (reply, ack) = oneshot::channel();
        // Replacing an older pending start cancels its wait.
        *inner.handshake.lock() = Some(PendingHandshake { session_id, reply });

        if let Err(e) = inner.transport.send(request.into_message()) {
            inner.fail_start(&token);
            return Err(e);
        }

        let timeout = inner.config.handshake_timeout;
        let handshake = async move {
            match tokio::time::timeout(timeout, ack).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(message))) => Err(VoiceStreamError::HandshakeRejected { message }),
                Ok(Err(_)) => Err(VoiceStreamError::HandshakeCancelled),
                Err(_) => Err(VoiceStreamError::HandshakeTimeout { timeout }),
            }
        };
        let (handshake, mic) = tokio::join!(handshake, inner.microphone.acquire());

        if !token.is_current() {
            if let Ok(stream) = mic {
                stream.release();
            }
            inner.abort_start(session_id);
            return Ok(());
        }

        let mut stream = match (handshake, mic) {
            (Ok(()), Ok(stream)) => stream,
            (Err(e), mic) => {
                if let Ok(stream) = mic {
                    stream.release();
                }
                tracing::warn!(session_id, error = %e, "session handshake failed");
                inner.fail_start(&token);
                return Err(e);
            }
            (Ok(()), Err(e)) => {
                tracing::warn!(session_id, error = %e, "microphone acquisition failed");
                // The remote side already accepted; close it again.
                if let Err(send_err) = inner.transport.send(ClientMessage::EndSession) {
                    tracing::debug!(error = %send_err, "could not send end_session");
                }
                inner.fail_start(&token);
                return Err(e);
            }
        };

        match inner.output.acquire_or_reuse() {
            Ok(output) => {
                if output.is_suspended() {
                    if let Err(e) = output.resume() {
                        tracing::warn!(error = %e, "failed to resume audio output");
                    }
                }
            }
            Err(e) => {
                stream.release();
                inner.fail_start(&token);
                return Err(e);
            }
        }

        let Some(blocks) = stream.take_blocks() else {
            stream.release();
            inner.fail_start(&token);
            return Err(VoiceStreamError::microphone_unavailable(
                "stream delivered no audio",
            ));
        };
        let pipeline = CapturePipeline::new(
            blocks,
            inner.config.capture_sample_rate,
            token.clone(),
            Arc::clone(&inner.state),
            Arc::clone(&inner.transport),
            Some(level),
        );

        {
            let mut resources = inner.resources.lock();
            if !token.is_current() {
                drop(resources);
                stream.release();
                inner.abort_start(session_id);
                return Ok(());
            }
            resources.mic = Some(stream);
            resources.capture_task = Some(spawn_capture_pipeline(pipeline));
            inner.state.set_phase(SessionPhase::Active);
        }

        tracing::info!(session_id, "voice session active");
        inner.emit(EngineEvent::SessionActive { session_id });
        Ok(())
    }

    /// Stops the current session, if any.
    ///
    /// The hard stop takes effect before anything else, so every in-flight
    /// callback observes it. Idempotent.
    pub fn stop(&self) {
        let inner = &self.inner;
        let session_id = inner.state.hard_stop();
        let previous = inner.state.phase();

        if previous != SessionPhase::Idle {
            inner.state.set_phase(SessionPhase::Stopping);
            if let Err(e) = inner.transport.send(ClientMessage::EndSession) {
                tracing::debug!(error = %e, "could not send end_session");
            }
        }

        inner.cleanup();
        inner.state.mark_stopped();

        if previous != SessionPhase::Idle {
            tracing::info!(session_id, ?previous, "voice session stopped");
            inner.emit(EngineEvent::SessionStopped { session_id });
        }
    }

    /// Mutes or unmutes capture without releasing the microphone.
    pub fn set_mic_muted(&self, muted: bool) {
        self.inner.state.set_mic_muted(muted);
        tracing::debug!(muted, "microphone mute changed");
    }

    /// Routes one inbound protocol message.
    ///
    /// Audio chunks are enqueued and playback is started if idle.
    pub fn handle_server_message(&self, message: ServerMessage) {
        match message {
            ServerMessage::SessionConnected => {
                if let Some(pending) = self.inner.handshake.lock().take() {
                    tracing::debug!(session_id = pending.session_id, "session acknowledged");
                    let _ = pending.reply.send(Ok(()));
                } else {
                    tracing::debug!("ignoring unsolicited session_connected");
                }
            }
            ServerMessage::SessionError { message } => {
                if let Some(pending) = self.inner.handshake.lock().take() {
                    let _ = pending.reply.send(Err(message));
                } else {
                    tracing::warn!(%message, "remote session error");
                    self.inner.emit(EngineEvent::RemoteError { message });
                }
            }
            ServerMessage::AudioChunk { data } => {
                self.handle_incoming_audio(&data);
                self.start_queue_playback();
            }
            ServerMessage::Interrupted => self.clear_playback(),
        }
    }

    /// Decodes one framed inbound block and enqueues it.
    ///
    /// Dropped while hard-stopped or inside the washout window. Malformed
    /// blocks are logged and skipped. Never starts playback.
    pub fn handle_incoming_audio(&self, data: &str) {
        let inner = &self.inner;
        inner.state.blocks_received.fetch_add(1, Ordering::SeqCst);

        match inner.playback.enqueue(data) {
            EnqueueOutcome::Queued { queue_len } => {
                tracing::trace!(queue_len, "inbound audio queued");
            }
            EnqueueOutcome::HardStopped => {
                tracing::debug!("dropping inbound audio after stop");
            }
            EnqueueOutcome::Stale => {
                inner.state.stale_blocks_dropped.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("dropping stale inbound audio inside washout window");
                inner.emit(EngineEvent::StaleAudioDropped);
            }
            EnqueueOutcome::Malformed(e) => {
                inner.state.malformed_blocks.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(error = %e, "dropping malformed inbound audio");
                inner.emit(EngineEvent::MalformedAudio {
                    error: e.to_string(),
                });
            }
            EnqueueOutcome::Empty => {
                tracing::debug!("ignoring empty inbound audio block");
            }
        }
    }

    /// Begins rendering queued audio if not already rendering.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_queue_playback(&self) {
        self.inner.playback.start_queue_playback();
    }

    /// Flushes all playback and discards inbound audio for the washout window.
    pub fn clear_playback(&self) {
        let inner = &self.inner;
        let dropped_blocks = inner.playback.clear();
        inner.state.interruptions.fetch_add(1, Ordering::SeqCst);
        tracing::info!(dropped_blocks, "playback cleared");
        inner.emit(EngineEvent::PlaybackCleared { dropped_blocks });
    }

    /// Clears playback only if something is rendering.
    pub fn proactive_stop(&self) {
        if self.is_audio_playing() {
            self.clear_playback();
        }
    }

    /// `true` between `stop()` and the next `start()`.
    pub fn is_hard_stopped(&self) -> bool {
        self.inner.state.is_hard_stopped()
    }

    /// `true` while the render loop is active.
    pub fn is_audio_playing(&self) -> bool {
        self.inner.playback.is_rendering()
    }

    /// Number of decoded blocks waiting to be scheduled.
    pub fn queue_len(&self) -> usize {
        self.inner.playback.queue_len()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        self.inner.state.phase()
    }

    /// Current value of the session counter.
    pub fn session_id(&self) -> u64 {
        self.inner.state.current_id()
    }

    /// `true` if capture is muted.
    pub fn is_mic_muted(&self) -> bool {
        self.inner.state.is_mic_muted()
    }

    /// When `stop()` last ran, if ever.
    pub fn last_stop(&self) -> Option<Instant> {
        self.inner.state.last_stop()
    }

    /// Counters accumulated since the engine was built.
    pub fn stats(&self) -> SessionStats {
        self.inner.state.stats()
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for VoiceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEngine")
            .field("session_id", &self.session_id())
            .field("phase", &self.phase())
            .field("hard_stopped", &self.is_hard_stopped())
            .field("queue_len", &self.queue_len())
            .finish_non_exhaustive()
    }
}

impl EngineInner {
    /// Releases every session resource and returns to idle.
    fn cleanup(&self) {
        let (mic, capture_task) = {
            let mut resources = self.resources.lock();
            (resources.mic.take(), resources.capture_task.take())
        };

        if let Some(task) = capture_task {
            task.abort();
        }
        if let Some(mic) = mic {
            mic.release();
        }

        self.handshake.lock().take();
        self.playback.reset();
        self.output.suspend();
        self.state.set_phase(SessionPhase::Idle);
    }

    /// Cleans up after a failed start unless a newer session owns the engine.
    fn fail_start(&self, token: &SessionToken) {
        if token.is_current() {
            self.cleanup();
        }
    }

    fn abort_start(&self, session_id: u64) {
        tracing::warn!(session_id, "start superseded; microphone released");
        self.emit(EngineEvent::StartAborted { session_id });
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        let resources = self.resources.get_mut();
        if let Some(task) = resources.capture_task.take() {
            task.abort();
        }
        if let Some(mic) = resources.mic.take() {
            mic.release();
        }
    }
}
