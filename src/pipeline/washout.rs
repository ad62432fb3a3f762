//! Post-interruption washout window.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Tracks the last interruption and answers whether inbound audio is stale.
///
/// Audio generated before an interruption can still be in flight when the
/// interruption signal arrives. Anything that shows up within `window` of
/// the last interruption is treated as stale.
pub(crate) struct Washout {
    window: Duration,
    last_interruption: Mutex<Option<Instant>>,
}

impl Washout {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_interruption: Mutex::new(None),
        }
    }

    /// Records an interruption at the current instant.
    pub fn mark(&self) {
        *self.last_interruption.lock() = Some(Instant::now());
    }

    /// `true` while inside the window following the last interruption.
    pub fn is_active(&self) -> bool {
        self.last_interruption
            .lock()
            .is_some_and(|at| at.elapsed() < self.window)
    }
}
