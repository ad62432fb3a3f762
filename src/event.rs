//! Runtime events and level metering callbacks.
//!
//! Events are non-fatal notifications about engine behavior. The session
//! continues after events are emitted - they're for logging/metrics, not
//! error handling.

use std::sync::Arc;

/// Runtime events emitted by the voice engine.
///
/// # Example
///
/// ```
/// use voice_stream::EngineEvent;
///
/// fn handle_event(event: EngineEvent) {
///     match event {
///         EngineEvent::SessionActive { session_id } => {
///             eprintln!("session {session_id} live");
///         }
///         EngineEvent::MalformedAudio { error } => {
///             eprintln!("dropped bad block: {error}");
///         }
///         other => eprintln!("{other:?}"),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Handshake and microphone both resolved; audio is flowing.
    SessionActive {
        /// Identifier of the now-current session.
        session_id: u64,
    },

    /// A session was torn down by `stop()`.
    SessionStopped {
        /// Session counter value after the stop.
        session_id: u64,
    },

    /// A `start()` lost a race against `stop()` or a newer `start()` and
    /// released its hardware without activating.
    StartAborted {
        /// Identifier the aborted start was issued with.
        session_id: u64,
    },

    /// Playback was flushed because of an interruption.
    PlaybackCleared {
        /// Number of queued blocks discarded.
        dropped_blocks: usize,
    },

    /// An inbound block arrived inside the washout window and was discarded.
    StaleAudioDropped,

    /// An inbound block could not be decoded and was discarded.
    MalformedAudio {
        /// Description of the decode failure.
        error: String,
    },

    /// The remote peer reported an error outside of a pending handshake.
    RemoteError {
        /// Message from the remote peer.
        message: String,
    },
}

/// Callback type for receiving runtime events.
pub type EventCallback = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use voice_stream::{event_callback, EngineEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(EngineEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Which direction a level reading describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelSource {
    /// Captured microphone audio.
    Microphone,
    /// Rendered playback audio.
    Playback,
}

impl LevelSource {
    /// `true` for playback readings.
    pub fn is_playback(self) -> bool {
        matches!(self, Self::Playback)
    }
}

/// Callback receiving an RMS level per processed block.
///
/// Invoked from the capture pipeline and the render loop; keep it cheap.
pub type LevelCallback = Arc<dyn Fn(f32, LevelSource) + Send + Sync>;

/// Creates a [`LevelCallback`] from a closure.
pub fn level_callback<F>(f: F) -> LevelCallback
where
    F: Fn(f32, LevelSource) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_engine_event_debug() {
        let event = EngineEvent::PlaybackCleared { dropped_blocks: 3 };
        let debug = format!("{event:?}");
        assert!(debug.contains("PlaybackCleared"));
        assert!(debug.contains('3'));
    }

    #[test]
    fn test_event_callback_helper() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(EngineEvent::StaleAudioDropped);
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_level_source() {
        assert!(LevelSource::Playback.is_playback());
        assert!(!LevelSource::Microphone.is_playback());
    }

    #[test]
    fn test_level_callback_helper() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let callback = level_callback(move |level, source| {
            seen_clone.lock().push((level, source));
        });

        callback(0.5, LevelSource::Microphone);
        assert_eq!(*seen.lock(), vec![(0.5, LevelSource::Microphone)]);
    }
}
