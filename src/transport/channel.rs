//! Tokio mpsc channel transport implementation.

use tokio::sync::mpsc;

use crate::transport::Transport;
use crate::{ClientMessage, VoiceStreamError};

/// A transport that forwards messages to a tokio mpsc channel.
///
/// The receiving half is drained by whatever owns the socket.
///
/// # Example
///
/// ```
/// use voice_stream::{ChannelTransport, ClientMessage};
///
/// let (transport, mut rx) = ChannelTransport::new();
///
/// // Hand `transport` to the engine builder, then in a writer task:
/// // while let Some(message) = rx.recv().await {
/// //     socket.send(message.to_json()?).await?;
/// // }
/// ```
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<ClientMessage>,
}

impl ChannelTransport {
    /// Creates a transport and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    pub fn from_sender(sender: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { sender }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: ClientMessage) -> Result<(), VoiceStreamError> {
        self.sender
            .send(message)
            .map_err(|_| VoiceStreamError::TransportClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_forwards() {
        let (transport, mut rx) = ChannelTransport::new();

        transport.send(ClientMessage::EndSession).unwrap();

        assert_eq!(rx.recv().await.unwrap(), ClientMessage::EndSession);
    }

    #[tokio::test]
    async fn test_channel_transport_closed() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);

        let result = transport.send(ClientMessage::EndSession);
        assert!(matches!(result, Err(VoiceStreamError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_channel_transport_preserves_order() {
        let (sender, mut rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::from_sender(sender);

        for i in 0..3 {
            transport
                .send(ClientMessage::AudioChunk {
                    data: i.to_string(),
                })
                .unwrap();
        }

        for i in 0..3 {
            assert_eq!(
                rx.recv().await.unwrap(),
                ClientMessage::AudioChunk {
                    data: i.to_string()
                }
            );
        }
    }
}
