//! Error types for voice-stream.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`VoiceStreamError`]): Prevent a voice session from starting
//! - **Per-block errors** ([`CodecError`]): A single malformed block is dropped
//!   and reported via [`EventCallback`](crate::EventCallback); the session continues

use std::time::Duration;

/// Fatal errors that prevent a voice session from starting.
///
/// These are returned from [`VoiceEngine::start()`] after all partially
/// acquired resources have been released. Callers typically surface them as
/// "could not begin voice session" and may retry.
///
/// [`VoiceEngine::start()`]: crate::VoiceEngine::start
#[derive(Debug, thiserror::Error)]
pub enum VoiceStreamError {
    /// No default input or output device is configured on this system.
    #[error("no default audio device configured")]
    NoDefaultDevice,

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// The microphone exists but could not be opened.
    #[error("microphone unavailable: {reason}")]
    MicrophoneUnavailable {
        /// Reason the microphone is unavailable.
        reason: String,
    },

    /// Permission to capture audio was denied.
    ///
    /// On macOS, check System Settings > Privacy & Security > Microphone.
    #[error("permission denied for audio capture (check OS settings)")]
    PermissionDenied,

    /// The device's sample format is not supported.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// The remote peer did not acknowledge the session in time.
    #[error("no session acknowledgment within {timeout:?}")]
    HandshakeTimeout {
        /// How long the engine waited.
        timeout: Duration,
    },

    /// The remote peer answered the session request with an error.
    #[error("session rejected by remote: {message}")]
    HandshakeRejected {
        /// Message from the remote peer.
        message: String,
    },

    /// The pending handshake was abandoned before an answer arrived.
    #[error("session handshake cancelled")]
    HandshakeCancelled,

    /// The outbound transport is closed.
    #[error("transport closed")]
    TransportClosed,

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

impl VoiceStreamError {
    /// Creates a microphone-unavailable error with the given reason.
    pub fn microphone_unavailable(reason: impl Into<String>) -> Self {
        Self::MicrophoneUnavailable {
            reason: reason.into(),
        }
    }

    /// Returns `true` for failures of the hardware acquisition step.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            Self::NoDefaultDevice
                | Self::DeviceNotFound { .. }
                | Self::MicrophoneUnavailable { .. }
                | Self::PermissionDenied
                | Self::UnsupportedFormat { .. }
        )
    }

    /// Returns `true` for failures of the remote session handshake.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            Self::HandshakeTimeout { .. }
                | Self::HandshakeRejected { .. }
                | Self::HandshakeCancelled
                | Self::TransportClosed
        )
    }
}

/// Errors decoding a single inbound audio block.
///
/// Never fatal: the block is logged, counted, and dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The text frame is not valid base64.
    #[error("invalid frame encoding: {0}")]
    InvalidEncoding(String),

    /// The decoded buffer does not hold a whole number of PCM16 samples.
    #[error("frame has odd byte length {len}")]
    OddByteLength {
        /// Length of the decoded buffer in bytes.
        len: usize,
    },
}
