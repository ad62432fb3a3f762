//! Configuration types for the voice engine.

use std::time::Duration;

/// Sample rate of outbound (captured) wire audio.
pub const CAPTURE_WIRE_RATE: u32 = 16_000;

/// Sample rate of inbound (synthesized) wire audio.
pub const PLAYBACK_WIRE_RATE: u32 = 24_000;

/// Configuration for engine behavior.
///
/// Use [`EngineConfig::default()`] for the wire contract's defaults, or
/// customize as needed.
///
/// # Example
///
/// ```
/// use voice_stream::EngineConfig;
/// use std::time::Duration;
///
/// let config = EngineConfig {
///     handshake_timeout: Duration::from_secs(5),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate of captured audio on the wire.
    ///
    /// Default: 16000 Hz
    pub capture_sample_rate: u32,

    /// Sample rate of synthesized audio arriving from the remote peer.
    ///
    /// Default: 24000 Hz
    pub playback_sample_rate: u32,

    /// Duration of each captured block handed to the capture pipeline.
    ///
    /// Default: 100ms
    pub capture_block_duration: Duration,

    /// Window after an interruption during which inbound audio is treated as stale.
    ///
    /// Default: 500ms
    pub washout_window: Duration,

    /// How far ahead of the hardware clock the scheduler keeps units queued.
    ///
    /// Default: 100ms
    pub lookahead: Duration,

    /// Offset from "now" used when the schedule cursor has fallen behind.
    ///
    /// Default: 50ms
    pub schedule_margin: Duration,

    /// Upper bound on waiting for the remote session acknowledgment.
    ///
    /// Default: 10s
    pub handshake_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: CAPTURE_WIRE_RATE,
            playback_sample_rate: PLAYBACK_WIRE_RATE,
            capture_block_duration: Duration::from_millis(100),
            washout_window: Duration::from_millis(500),
            lookahead: Duration::from_millis(100),
            schedule_margin: Duration::from_millis(50),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.capture_sample_rate, 16000);
        assert_eq!(config.playback_sample_rate, 24000);
        assert_eq!(config.capture_block_duration, Duration::from_millis(100));
        assert_eq!(config.washout_window, Duration::from_millis(500));
        assert_eq!(config.lookahead, Duration::from_millis(100));
        assert_eq!(config.schedule_margin, Duration::from_millis(50));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_engine_config_override() {
        let config = EngineConfig {
            washout_window: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(config.washout_window, Duration::from_millis(250));
        assert_eq!(config.lookahead, Duration::from_millis(100));
    }
}
