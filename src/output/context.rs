//! Shared rendering context.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::output::{AudioOutput, CpalOutput};
use crate::VoiceStreamError;

type OutputFactory = Box<dyn Fn() -> Result<Arc<dyn AudioOutput>, VoiceStreamError> + Send + Sync>;

/// Lazily-created, reference-counted handle to the rendering device.
///
/// The device is opened on the first [`acquire_or_reuse`] and then reused
/// for every later session. Between sessions it is suspended, never closed.
/// If opening fails, the next call tries again.
///
/// [`acquire_or_reuse`]: OutputContext::acquire_or_reuse
pub struct OutputContext {
    factory: OutputFactory,
    slot: Mutex<Option<Arc<dyn AudioOutput>>>,
}

impl OutputContext {
    /// Creates a context that opens its device with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn AudioOutput>, VoiceStreamError> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            slot: Mutex::new(None),
        }
    }

    /// Wraps an already-open device.
    pub fn with_output(output: Arc<dyn AudioOutput>) -> Self {
        let fallback = Arc::clone(&output);
        Self {
            factory: Box::new(move || Ok(Arc::clone(&fallback))),
            slot: Mutex::new(Some(output)),
        }
    }

    /// The process-wide context backed by the default CPAL output device.
    pub fn process_default() -> Arc<OutputContext> {
        static DEFAULT: OnceLock<Arc<OutputContext>> = OnceLock::new();
        Arc::clone(DEFAULT.get_or_init(|| {
            Arc::new(OutputContext::new(|| {
                let output: Arc<dyn AudioOutput> = Arc::new(CpalOutput::open_default()?);
                Ok(output)
            }))
        }))
    }

    /// Returns the device, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the device cannot be opened.
    pub fn acquire_or_reuse(&self) -> Result<Arc<dyn AudioOutput>, VoiceStreamError> {
        let mut slot = self.slot.lock();
        if let Some(output) = slot.as_ref() {
            return Ok(Arc::clone(output));
        }

        let output = (self.factory)()?;
        tracing::info!("audio output context created");
        *slot = Some(Arc::clone(&output));
        Ok(output)
    }

    /// The device if it has been opened.
    pub fn get(&self) -> Option<Arc<dyn AudioOutput>> {
        self.slot.lock().clone()
    }

    /// Suspends the device if it has been opened.
    pub fn suspend(&self) {
        if let Some(output) = self.get() {
            if let Err(e) = output.suspend() {
                tracing::warn!(error = %e, "failed to suspend audio output");
            }
        }
    }
}

impl std::fmt::Debug for OutputContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputContext")
            .field("open", &self.slot.lock().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MockOutput;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_context_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let context = OutputContext::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            let output: Arc<dyn AudioOutput> = Arc::new(MockOutput::new());
            Ok(output)
        });

        assert!(context.get().is_none());
        let first = context.acquire_or_reuse().unwrap();
        let second = context.acquire_or_reuse().unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_context_retries_after_failure() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let context = OutputContext::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(VoiceStreamError::NoDefaultDevice);
            }
            let output: Arc<dyn AudioOutput> = Arc::new(MockOutput::new());
            Ok(output)
        });

        assert!(context.acquire_or_reuse().is_err());
        assert!(context.acquire_or_reuse().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_suspend_keeps_device() {
        let mock = Arc::new(MockOutput::new());
        let context = OutputContext::with_output(mock.clone());

        context.suspend();
        assert!(mock.is_suspended());

        // Still the same device after suspension.
        let output = context.acquire_or_reuse().unwrap();
        output.resume().unwrap();
        assert!(!mock.is_suspended());
    }

    #[test]
    fn test_suspend_before_open_is_noop() {
        let context = OutputContext::new(|| Err(VoiceStreamError::NoDefaultDevice));
        context.suspend();
        assert!(context.get().is_none());
    }
}
