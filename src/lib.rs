//! # voice-stream
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time bidirectional voice streaming.
//!
//! `voice-stream` captures microphone audio, converts it to 16 kHz PCM16
//! and hands it to a duplex transport, while decoding the remote peer's
//! 24 kHz synthesized speech and rendering it gaplessly against the output
//! device's clock. Interruptions flush playback instantly and a short
//! washout window keeps in-flight stale audio from leaking back in.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voice_stream::{level_callback, ChannelTransport, ServerMessage, StartRequest, VoiceEngine};
//!
//! let (transport, mut outbound) = ChannelTransport::new();
//! let engine = VoiceEngine::builder(transport)
//!     .on_event(|e| tracing::warn!(?e, "voice event"))
//!     .build();
//!
//! // Writer task: forward `outbound` messages to the socket as JSON.
//! // Reader task: engine.handle_server_message(ServerMessage::from_json(&text)?);
//!
//! engine
//!     .start(level_callback(|level, source| ui.meter(level, source)), StartRequest::new())
//!     .await?;
//!
//! // Conversation runs in the background...
//!
//! engine.stop();
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **CPAL Threads**: Input and output callbacks that never block
//! - **Ring Buffer**: Lock-free SPSC queue between the input callback and tokio
//! - **Tokio Runtime**: Capture pipeline task and playback render loop
//!
//! Every background continuation holds a session token. `stop()` flips a
//! hard-stop flag and bumps the session counter before anything else, so
//! in-flight work observes the stop on its next check.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod chunk;
mod config;
mod engine;
mod error;
mod event;
pub mod format;
pub mod output;
mod pipeline;
mod protocol;
mod session;
pub mod source;
pub mod transport;

pub use builder::VoiceEngineBuilder;
pub use chunk::AudioBlock;
pub use config::{EngineConfig, CAPTURE_WIRE_RATE, PLAYBACK_WIRE_RATE};
pub use engine::VoiceEngine;
pub use error::{CodecError, VoiceStreamError};
pub use event::{
    event_callback, level_callback, EngineEvent, EventCallback, LevelCallback, LevelSource,
};
pub use output::{AudioOutput, CpalOutput, MockOutput, OutputContext, RenderUnit, ScheduledUnit};
pub use protocol::{ClientMessage, ConversationTurn, LocationHint, ServerMessage, StartRequest};
pub use session::{SessionPhase, SessionStats};
pub use source::{
    default_input_device_name, list_input_devices, CpalMicrophone, MicStream, MicTrack,
    Microphone, MockMicrophone,
};
pub use transport::{ChannelTransport, Transport};
