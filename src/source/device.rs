//! CPAL device wrapper for microphone capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::Producer;
use tokio::sync::{mpsc, oneshot};

use crate::format::i16_to_f32;
use crate::pipeline::{create_block_buffer, BlockBuffer};
use crate::source::{MicStream, MicTrack, Microphone};
use crate::VoiceStreamError;

/// Blocks buffered between the bridge task and the capture pipeline.
const BLOCK_CHANNEL_CAPACITY: usize = 32;

/// Ring buffer headroom between the CPAL callback and the bridge task.
const RING_BUFFER_DURATION: Duration = Duration::from_secs(5);

/// Specifies which audio input device to use.
#[derive(Debug, Clone, Default)]
enum DeviceSelection {
    /// Use the system's default input device.
    #[default]
    SystemDefault,
    /// Use a specific device by name.
    ByName(String),
}

/// Microphone backed by a CPAL input device.
///
/// Each [`acquire`](Microphone::acquire) opens the device on a dedicated
/// thread that owns the CPAL stream for its whole life. The callback
/// down-mixes to mono and pushes into a ring buffer; a tokio task cuts the
/// buffer into fixed-duration blocks.
#[derive(Debug, Clone)]
pub struct CpalMicrophone {
    device: DeviceSelection,
    block_duration: Duration,
}

impl CpalMicrophone {
    /// Captures from the system default input device.
    pub fn default_device() -> Self {
        Self {
            device: DeviceSelection::SystemDefault,
            block_duration: Duration::from_millis(100),
        }
    }

    /// Captures from a specific input device by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device: DeviceSelection::ByName(name.into()),
            block_duration: Duration::from_millis(100),
        }
    }

    /// Sets the duration of each delivered block.
    #[must_use]
    pub fn with_block_duration(mut self, block_duration: Duration) -> Self {
        self.block_duration = block_duration;
        self
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    async fn acquire(&self) -> Result<MicStream, VoiceStreamError> {
        let enabled = Arc::new(AtomicBool::new(true));
        let stopped = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel::<()>();

        let device = self.device.clone();
        let block_duration = self.block_duration;
        let thread_enabled = Arc::clone(&enabled);
        std::thread::Builder::new()
            .name("voice-mic".to_string())
            .spawn(move || {
                match open_input(&device, block_duration, thread_enabled) {
                    Ok((stream, buffer)) => {
                        if ready_tx.send(Ok(buffer)).is_err() {
                            return;
                        }
                        // Parks until the track is stopped or dropped.
                        let _ = stop_rx.recv();
                        drop(stream);
                        tracing::debug!("microphone stream closed");
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

        let buffer = ready_rx.await.map_err(|_| {
            VoiceStreamError::microphone_unavailable("capture thread exited before opening")
        })??;

        let sample_rate = buffer.sample_rate();
        let block_size = buffer.block_size();
        let (block_tx, block_rx) = mpsc::channel(BLOCK_CHANNEL_CAPACITY);
        tokio::spawn(forward_blocks(
            buffer,
            block_tx,
            Arc::clone(&stopped),
            block_duration / 2,
        ));

        tracing::info!(sample_rate, block_size, "microphone acquired");

        Ok(MicStream::new(
            sample_rate,
            block_rx,
            Box::new(CpalTrack {
                enabled,
                stopped,
                stop_tx: Mutex::new(Some(stop_tx)),
            }),
        ))
    }
}

/// Track handle for a CPAL capture thread.
struct CpalTrack {
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    stop_tx: Mutex<Option<std::sync::mpsc::Sender<()>>>,
}

impl MicTrack for CpalTrack {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(tx) = self.stop_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Polls the ring buffer and forwards whole blocks until stopped.
async fn forward_blocks(
    mut buffer: BlockBuffer,
    block_tx: mpsc::Sender<crate::AudioBlock>,
    stopped: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut interval = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));

    while !stopped.load(Ordering::SeqCst) {
        interval.tick().await;

        while let Some(block) = buffer.try_read_block() {
            if block_tx.send(block).await.is_err() {
                // Receiver gone, nothing left to feed
                return;
            }
        }
    }
}

fn resolve_device(selection: &DeviceSelection) -> Result<Device, VoiceStreamError> {
    let host = cpal::default_host();
    match selection {
        DeviceSelection::SystemDefault => host
            .default_input_device()
            .ok_or(VoiceStreamError::NoDefaultDevice),
        DeviceSelection::ByName(name) => {
            let devices = host
                .input_devices()
                .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

            for device in devices {
                if device.name().is_ok_and(|n| n == *name) {
                    return Ok(device);
                }
            }

            Err(VoiceStreamError::DeviceNotFound { name: name.clone() })
        }
    }
}

fn open_input(
    selection: &DeviceSelection,
    block_duration: Duration,
    enabled: Arc<AtomicBool>,
) -> Result<(Stream, BlockBuffer), VoiceStreamError> {
    let device = resolve_device(selection)?;

    let supported_config = device
        .default_input_config()
        .map_err(|e| VoiceStreamError::microphone_unavailable(e.to_string()))?;

    let sample_format = supported_config.sample_format();
    let cpal_config: CpalStreamConfig = supported_config.into();
    let sample_rate = cpal_config.sample_rate.0;
    let channels = usize::from(cpal_config.channels.max(1));

    let (mut producer, buffer) =
        create_block_buffer(RING_BUFFER_DURATION, sample_rate, block_duration);

    let on_error = |err: cpal::StreamError| tracing::error!("Microphone stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &cpal_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if enabled.load(Ordering::Relaxed) {
                    push_mono(data, channels, |s| s, &mut producer);
                }
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &cpal_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if enabled.load(Ordering::Relaxed) {
                    push_mono(data, channels, i16_to_f32, &mut producer);
                }
            },
            on_error,
            None,
        ),
        format => {
            return Err(VoiceStreamError::UnsupportedFormat {
                format: format!("{format:?}"),
            });
        }
    }
    .map_err(map_build_error)?;

    stream
        .play()
        .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

    Ok((stream, buffer))
}

/// Averages each interleaved frame and pushes it without allocating.
fn push_mono<T: Copy>(
    data: &[T],
    channels: usize,
    to_f32: impl Fn(T) -> f32,
    producer: &mut ringbuf::HeapProd<f32>,
) {
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| to_f32(s)).sum();
        // Non-blocking push - drops samples if buffer is full
        let _ = producer.try_push(sum / channels as f32);
    }
}

fn map_build_error(err: cpal::BuildStreamError) -> VoiceStreamError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            VoiceStreamError::microphone_unavailable("device not available")
        }
        other => {
            let message = other.to_string();
            if message.to_lowercase().contains("permission") {
                VoiceStreamError::PermissionDenied
            } else {
                VoiceStreamError::BackendError(message)
            }
        }
    }
}
