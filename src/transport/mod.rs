//! Outbound transport seam.
//!
//! A [`Transport`] is whatever carries [`ClientMessage`]s to the remote
//! peer: a websocket writer, a socket.io emitter, a test recorder. The
//! engine assumes ordered, reliable delivery and never reconnects; that
//! policy belongs to the transport owner.
//!
//! The crate provides [`ChannelTransport`], which forwards messages into a
//! tokio channel for a separate writer task to drain.

mod channel;

pub use channel::ChannelTransport;

use crate::{ClientMessage, VoiceStreamError};

/// A destination for outbound protocol messages.
///
/// # Implementation Notes
///
/// - `send` is synchronous and must not block: it is called from `stop()`
///   and from the capture pipeline once per block
/// - Queue internally if the underlying socket is async
/// - Return [`VoiceStreamError::TransportClosed`] once the peer is gone
///
/// # Example
///
/// ```
/// use voice_stream::{ClientMessage, Transport, VoiceStreamError};
///
/// struct PrintTransport;
///
/// impl Transport for PrintTransport {
///     fn send(&self, message: ClientMessage) -> Result<(), VoiceStreamError> {
///         println!("{message:?}");
///         Ok(())
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    /// Queues one message for delivery.
    fn send(&self, message: ClientMessage) -> Result<(), VoiceStreamError>;
}
