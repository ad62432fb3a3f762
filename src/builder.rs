//! Builder pattern for `VoiceEngine`.

use std::sync::Arc;

use crate::output::OutputContext;
use crate::source::{CpalMicrophone, Microphone};
use crate::transport::Transport;
use crate::{event_callback, EngineConfig, EngineEvent, EventCallback, VoiceEngine};

/// Builder for configuring a [`VoiceEngine`].
///
/// Use [`VoiceEngine::builder()`] to create a new builder. Unset parts fall
/// back to the system default microphone and the process-wide output
/// context.
///
/// # Example
///
/// ```
/// use voice_stream::{ChannelTransport, EngineConfig, MockMicrophone, VoiceEngine};
/// use std::time::Duration;
///
/// let (transport, _outbound) = ChannelTransport::new();
///
/// let engine = VoiceEngine::builder(transport)
///     .microphone(MockMicrophone::new(48000))
///     .config(EngineConfig {
///         handshake_timeout: Duration::from_secs(5),
///         ..Default::default()
///     })
///     .on_event(|e| eprintln!("{e:?}"))
///     .build();
///
/// assert!(!engine.is_audio_playing());
/// ```
///
/// [`VoiceEngine::builder()`]: crate::VoiceEngine::builder
#[must_use]
pub struct VoiceEngineBuilder {
    transport: Arc<dyn Transport>,
    microphone: Option<Arc<dyn Microphone>>,
    output: Option<Arc<OutputContext>>,
    event_callback: Option<EventCallback>,
    config: EngineConfig,
}

impl VoiceEngineBuilder {
    /// Creates a builder with default settings.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self::with_transport(Arc::new(transport))
    }

    /// Creates a builder around a shared transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            microphone: None,
            output: None,
            event_callback: None,
            config: EngineConfig::default(),
        }
    }

    /// Sets the microphone sessions acquire.
    ///
    /// Default: [`CpalMicrophone::default_device()`] with the configured
    /// block duration.
    pub fn microphone<M: Microphone + 'static>(mut self, microphone: M) -> Self {
        self.microphone = Some(Arc::new(microphone));
        self
    }

    /// Sets the rendering context.
    ///
    /// Default: [`OutputContext::process_default()`].
    pub fn output_context(mut self, output: Arc<OutputContext>) -> Self {
        self.output = Some(output);
        self
    }

    /// Set the engine configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a callback for runtime events.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Builds the engine. No hardware is touched until the first start.
    pub fn build(self) -> VoiceEngine {
        let microphone: Arc<dyn Microphone> = match self.microphone {
            Some(microphone) => microphone,
            None => Arc::new(
                CpalMicrophone::default_device()
                    .with_block_duration(self.config.capture_block_duration),
            ),
        };
        let output = self.output.unwrap_or_else(OutputContext::process_default);

        VoiceEngine::from_parts(
            self.config,
            self.transport,
            microphone,
            output,
            self.event_callback,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::MockOutput;
    use crate::source::MockMicrophone;
    use crate::ChannelTransport;
    use std::time::Duration;

    #[test]
    fn test_builder_defaults() {
        let (transport, _rx) = ChannelTransport::new();
        let builder = VoiceEngineBuilder::new(transport);
        assert!(builder.microphone.is_none());
        assert!(builder.output.is_none());
        assert!(builder.event_callback.is_none());
        assert_eq!(builder.config.washout_window, Duration::from_millis(500));
    }

    #[test]
    fn test_builder_config() {
        let (transport, _rx) = ChannelTransport::new();
        let engine = VoiceEngineBuilder::new(transport)
            .microphone(MockMicrophone::new(16000))
            .output_context(Arc::new(OutputContext::with_output(Arc::new(
                MockOutput::new(),
            ))))
            .config(EngineConfig {
                lookahead: Duration::from_millis(200),
                ..Default::default()
            })
            .build();

        assert_eq!(engine.config().lookahead, Duration::from_millis(200));
        assert_eq!(engine.session_id(), 0);
    }

    #[test]
    fn test_builder_on_event() {
        let (transport, _rx) = ChannelTransport::new();
        let builder = VoiceEngineBuilder::new(transport).on_event(|_| {});
        assert!(builder.event_callback.is_some());
    }
}
