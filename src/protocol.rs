//! Messages exchanged with the remote speech backend.
//!
//! Both directions are JSON objects tagged by a `"type"` field. The duplex
//! channel itself is owned by the caller; the engine only produces
//! [`ClientMessage`]s through a [`Transport`](crate::Transport) and consumes
//! [`ServerMessage`]s handed to [`VoiceEngine::handle_server_message`].
//!
//! [`VoiceEngine::handle_server_message`]: crate::VoiceEngine::handle_server_message

use serde::{Deserialize, Serialize};

/// One prior exchange in the conversation, replayed to the backend on start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Speaker role, e.g. `"user"` or `"assistant"`.
    pub role: String,
    /// Text of the turn.
    pub content: String,
}

impl ConversationTurn {
    /// Creates a turn.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Coarse device location passed to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationHint {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Optional human-readable place name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Optional context sent with the "begin session" request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartRequest {
    /// Prior conversation to resume from.
    pub history: Option<Vec<ConversationTurn>>,
    /// Where the user is.
    pub location: Option<LocationHint>,
    /// Free-text context for the backend.
    pub context: Option<String>,
}

impl StartRequest {
    /// A request with no history, location, or context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches conversation history.
    #[must_use]
    pub fn history(mut self, history: Vec<ConversationTurn>) -> Self {
        self.history = Some(history);
        self
    }

    /// Attaches a location hint.
    #[must_use]
    pub fn location(mut self, location: LocationHint) -> Self {
        self.location = Some(location);
        self
    }

    /// Attaches free-text context.
    #[must_use]
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub(crate) fn into_message(self) -> ClientMessage {
        ClientMessage::StartSession {
            history: self.history,
            location: self.location,
            context: self.context,
        }
    }
}

/// Outbound messages produced by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin a voice session.
    StartSession {
        /// Prior conversation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<Vec<ConversationTurn>>,
        /// Location hint.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<LocationHint>,
        /// Free-text context.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },

    /// One captured block: base64 PCM16 at the capture wire rate.
    AudioChunk {
        /// Framed audio.
        data: String,
    },

    /// End the current voice session.
    EndSession,
}

/// Inbound messages consumed by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The remote peer accepted the session.
    SessionConnected,

    /// The remote peer reported an error.
    SessionError {
        /// Error description.
        message: String,
    },

    /// One synthesized block: base64 PCM16 at the playback wire rate.
    AudioChunk {
        /// Framed audio.
        data: String,
    },

    /// The remote peer detected the user talking over playback.
    Interrupted,
}

impl ServerMessage {
    /// Parses a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serde error for unknown or malformed messages.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ClientMessage {
    /// Serializes to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serde error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
