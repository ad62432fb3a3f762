//! Session lifecycle state shared between the engine and its background tasks.
//!
//! Every asynchronous continuation spawned for a session holds a
//! [`SessionToken`] and must check it before touching audio. `stop()` flips
//! the hard-stop flag and bumps the session counter before doing anything
//! else, so any in-flight callback observes the stop on its next check.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No session; hardware released.
    Idle,
    /// Waiting on the handshake and microphone.
    Starting,
    /// Capturing and accepting playback.
    Active,
    /// Tearing down.
    Stopping,
}

impl SessionPhase {
    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Starting => 1,
            Self::Active => 2,
            Self::Stopping => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Active,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Statistics about the engine since it was built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Captured blocks transmitted.
    pub blocks_sent: u64,
    /// Inbound audio blocks handed to the engine.
    pub blocks_received: u64,
    /// Inbound blocks discarded inside the washout window.
    pub stale_blocks_dropped: u64,
    /// Inbound blocks discarded because they failed to decode.
    pub malformed_blocks: u64,
    /// Render units handed to the output device.
    pub units_scheduled: u64,
    /// Playback flushes caused by interruptions.
    pub interruptions: u64,
}

/// Internal state shared between the engine and background tasks.
pub(crate) struct SessionState {
    session_counter: AtomicU64,
    hard_stopped: AtomicBool,
    mic_muted: AtomicBool,
    phase: AtomicU8,
    last_stop: Mutex<Option<Instant>>,
    pub blocks_sent: AtomicU64,
    pub blocks_received: AtomicU64,
    pub stale_blocks_dropped: AtomicU64,
    pub malformed_blocks: AtomicU64,
    pub units_scheduled: AtomicU64,
    pub interruptions: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            session_counter: AtomicU64::new(0),
            hard_stopped: AtomicBool::new(false),
            mic_muted: AtomicBool::new(false),
            phase: AtomicU8::new(SessionPhase::Idle.to_u8()),
            last_stop: Mutex::new(None),
            blocks_sent: AtomicU64::new(0),
            blocks_received: AtomicU64::new(0),
            stale_blocks_dropped: AtomicU64::new(0),
            malformed_blocks: AtomicU64::new(0),
            units_scheduled: AtomicU64::new(0),
            interruptions: AtomicU64::new(0),
        }
    }

    /// Claims a new session id and clears the hard stop.
    pub fn begin(self: &Arc<Self>) -> SessionToken {
        let id = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.hard_stopped.store(false, Ordering::SeqCst);
        SessionToken {
            id,
            state: Arc::clone(self),
        }
    }

    /// Asserts the hard stop and invalidates every outstanding token.
    ///
    /// Returns the new counter value.
    pub fn hard_stop(&self) -> u64 {
        self.hard_stopped.store(true, Ordering::SeqCst);
        self.session_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_id(&self) -> u64 {
        self.session_counter.load(Ordering::SeqCst)
    }

    pub fn is_hard_stopped(&self) -> bool {
        self.hard_stopped.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.phase.store(phase.to_u8(), Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.phase() == SessionPhase::Active
    }

    pub fn is_mic_muted(&self) -> bool {
        self.mic_muted.load(Ordering::SeqCst)
    }

    pub fn set_mic_muted(&self, muted: bool) {
        self.mic_muted.store(muted, Ordering::SeqCst);
    }

    pub fn mark_stopped(&self) {
        *self.last_stop.lock() = Some(Instant::now());
    }

    pub fn last_stop(&self) -> Option<Instant> {
        *self.last_stop.lock()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            blocks_sent: self.blocks_sent.load(Ordering::SeqCst),
            blocks_received: self.blocks_received.load(Ordering::SeqCst),
            stale_blocks_dropped: self.stale_blocks_dropped.load(Ordering::SeqCst),
            malformed_blocks: self.malformed_blocks.load(Ordering::SeqCst),
            units_scheduled: self.units_scheduled.load(Ordering::SeqCst),
            interruptions: self.interruptions.load(Ordering::SeqCst),
        }
    }
}

/// Proof that a continuation belongs to a particular session.
///
/// A token stays valid until `stop()` runs or a newer `start()` claims a
/// new id.
#[derive(Clone)]
pub(crate) struct SessionToken {
    id: u64,
    state: Arc<SessionState>,
}

impl SessionToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `true` while no stop and no newer start has happened.
    pub fn is_current(&self) -> bool {
        !self.state.is_hard_stopped() && self.state.current_id() == self.id
    }

    /// `true` if the session may process captured audio right now.
    pub fn may_capture(&self) -> bool {
        self.is_current() && self.state.is_active() && !self.state.is_mic_muted()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("id", &self.id)
            .field("current", &self.is_current())
            .finish()
    }
}
