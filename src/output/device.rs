//! CPAL device wrapper for playback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tokio::sync::oneshot;

use crate::format::{f32_to_i16, resample};
use crate::output::{AudioOutput, RenderUnit, UnitCompletion};
use crate::VoiceStreamError;

/// Units that may be waiting for the callback to pick them up.
const UNIT_QUEUE_CAPACITY: usize = 256;

enum OutputCommand {
    Play,
    Pause,
}

/// State the callback publishes and the scheduling side reads, lock-free.
#[derive(Default)]
struct SharedClock {
    frames_rendered: AtomicU64,
    flush_epoch: AtomicU64,
}

struct PlacedUnit {
    start_frame: u64,
    samples: Vec<f32>,
    epoch: u64,
    done: Option<oneshot::Sender<()>>,
}

impl PlacedUnit {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Callback-owned mixer. Receives units through an SPSC ring.
struct Renderer {
    shared: Arc<SharedClock>,
    incoming: HeapCons<PlacedUnit>,
    units: Vec<PlacedUnit>,
    frames_rendered: u64,
    seen_epoch: u64,
}

fn unit_queue(shared: &Arc<SharedClock>) -> (HeapProd<PlacedUnit>, Renderer) {
    let (producer, consumer) = HeapRb::<PlacedUnit>::new(UNIT_QUEUE_CAPACITY).split();
    let renderer = Renderer {
        shared: Arc::clone(shared),
        incoming: consumer,
        units: Vec::with_capacity(UNIT_QUEUE_CAPACITY),
        frames_rendered: 0,
        seen_epoch: 0,
    };
    (producer, renderer)
}

/// Rendering device backed by the default CPAL output device.
///
/// The CPAL stream lives on a dedicated thread. Its callback mixes every
/// unit overlapping the current buffer and advances a frame counter that
/// serves as the hardware clock; pausing the stream freezes the clock.
/// Units are resampled to the device rate when scheduled.
pub struct CpalOutput {
    shared: Arc<SharedClock>,
    incoming: Mutex<HeapProd<PlacedUnit>>,
    sample_rate: u32,
    suspended: AtomicBool,
    commands: Mutex<std::sync::mpsc::Sender<OutputCommand>>,
}

impl CpalOutput {
    /// Opens the default output device and starts it running.
    ///
    /// # Errors
    ///
    /// Returns `NoDefaultDevice` if no output device is configured, or a
    /// backend error if the stream cannot be built.
    pub fn open_default() -> Result<Self, VoiceStreamError> {
        let shared = Arc::new(SharedClock::default());
        let (producer, renderer) = unit_queue(&shared);
        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel(1);
        let (command_tx, command_rx) = std::sync::mpsc::channel::<OutputCommand>();

        std::thread::Builder::new()
            .name("voice-output".to_string())
            .spawn(move || match open_output(renderer) {
                Ok((stream, sample_rate)) => {
                    if ready_tx.send(Ok(sample_rate)).is_err() {
                        return;
                    }
                    // Runs until every CpalOutput handle is dropped.
                    while let Ok(command) = command_rx.recv() {
                        let result = match command {
                            OutputCommand::Play => stream.play().map_err(|e| e.to_string()),
                            OutputCommand::Pause => stream.pause().map_err(|e| e.to_string()),
                        };
                        if let Err(e) = result {
                            tracing::error!("Output stream control failed: {}", e);
                        }
                    }
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

        let sample_rate = ready_rx.recv().map_err(|_| {
            VoiceStreamError::BackendError("output thread exited before opening".to_string())
        })??;

        tracing::info!(sample_rate, "audio output opened");

        Ok(Self {
            shared,
            incoming: Mutex::new(producer),
            sample_rate,
            suspended: AtomicBool::new(false),
            commands: Mutex::new(command_tx),
        })
    }

    /// Sample rate the device renders at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn send(&self, command: OutputCommand) -> Result<(), VoiceStreamError> {
        self.commands
            .lock()
            .send(command)
            .map_err(|_| VoiceStreamError::BackendError("output thread stopped".to_string()))
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> Duration {
        let frames = self.shared.frames_rendered.load(Ordering::Acquire);
        frames_to_duration(frames, self.sample_rate)
    }

    fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    fn resume(&self) -> Result<(), VoiceStreamError> {
        self.send(OutputCommand::Play)?;
        self.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&self) -> Result<(), VoiceStreamError> {
        self.send(OutputCommand::Pause)?;
        self.suspended.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn schedule(&self, unit: RenderUnit, start_at: Duration) -> UnitCompletion {
        let (tx, rx) = oneshot::channel();
        let block = unit.block();
        let samples = resample(block.samples(), block.sample_rate(), self.sample_rate);
        let start_frame = (start_at.as_secs_f64() * f64::from(self.sample_rate)).round() as u64;

        let placed = PlacedUnit {
            start_frame,
            samples,
            epoch: self.shared.flush_epoch.load(Ordering::Acquire),
            done: Some(tx),
        };
        // A full queue drops the unit; its completion fires immediately.
        if self.incoming.lock().try_push(placed).is_err() {
            tracing::warn!(start_frame, "output unit queue full; dropping unit");
        }
        rx
    }

    fn stop_all(&self) {
        // The callback drops units from older epochs, completing their waiters.
        self.shared.flush_epoch.fetch_add(1, Ordering::AcqRel);
    }
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
}

fn open_output(mut renderer: Renderer) -> Result<(Stream, u32), VoiceStreamError> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or(VoiceStreamError::NoDefaultDevice)?;

    let supported_config = device
        .default_output_config()
        .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

    let sample_format = supported_config.sample_format();
    let cpal_config: CpalStreamConfig = supported_config.into();
    let sample_rate = cpal_config.sample_rate.0;
    let channels = usize::from(cpal_config.channels.max(1));

    let on_error = |err: cpal::StreamError| tracing::error!("Output stream error: {}", err);

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            &cpal_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                renderer.render(data, channels, |s| s);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            &cpal_config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                renderer.render(data, channels, f32_to_i16);
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
    .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| VoiceStreamError::BackendError(e.to_string()))?;

    Ok((stream, sample_rate))
}

impl Renderer {
    /// Mixes overlapping units into one interleaved buffer and advances the clock.
    fn render<T: Copy>(&mut self, data: &mut [T], channels: usize, from_f32: impl Fn(f32) -> T) {
        let epoch = self.shared.flush_epoch.load(Ordering::Acquire);
        if epoch != self.seen_epoch {
            self.units.retain(|unit| unit.epoch >= epoch);
            self.seen_epoch = epoch;
        }
        while let Some(unit) = self.incoming.try_pop() {
            if unit.epoch >= epoch {
                self.units.push(unit);
            }
        }

        let base = self.frames_rendered;
        let mut frames = 0u64;
        for (i, frame) in data.chunks_exact_mut(channels).enumerate() {
            let position = base + i as u64;
            let mixed: f32 = self
                .units
                .iter()
                .filter(|u| position >= u.start_frame)
                .filter_map(|u| u.samples.get((position - u.start_frame) as usize))
                .sum();
            frame.fill(from_f32(mixed.clamp(-1.0, 1.0)));
            frames += 1;
        }

        self.frames_rendered += frames;
        let now = self.frames_rendered;
        self.shared.frames_rendered.store(now, Ordering::Release);

        self.units.retain_mut(|unit| {
            if unit.end_frame() > now {
                return true;
            }
            if let Some(done) = unit.done.take() {
                let _ = done.send(());
            }
            false
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer_with(units: Vec<(u64, Vec<f32>)>) -> (HeapProd<PlacedUnit>, Renderer) {
        let shared = Arc::new(SharedClock::default());
        let (mut producer, renderer) = unit_queue(&shared);
        for (start_frame, samples) in units {
            assert!(producer
                .try_push(PlacedUnit {
                    start_frame,
                    samples,
                    epoch: 0,
                    done: None,
                })
                .is_ok());
        }
        (producer, renderer)
    }

    #[test]
    fn test_render_places_unit_at_start_frame() {
        let (_producer, mut renderer) = renderer_with(vec![(2, vec![0.5, 0.25])]);
        let mut out = [9.0f32; 6];

        renderer.render(&mut out, 1, |s| s);

        assert_eq!(out, [0.0, 0.0, 0.5, 0.25, 0.0, 0.0]);
        assert_eq!(renderer.shared.frames_rendered.load(Ordering::Acquire), 6);
        assert!(renderer.units.is_empty());
    }

    #[test]
    fn test_render_duplicates_across_channels() {
        let (_producer, mut renderer) = renderer_with(vec![(0, vec![0.5])]);
        let mut out = [0.0f32; 4];

        renderer.render(&mut out, 2, |s| s);

        assert_eq!(out, [0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_render_keeps_unfinished_units() {
        let (_producer, mut renderer) = renderer_with(vec![(1, vec![0.1; 8])]);
        let mut out = [0.0f32; 4];

        renderer.render(&mut out, 1, |s| s);
        assert_eq!(renderer.units.len(), 1);

        let mut out = [0.0f32; 8];
        renderer.render(&mut out, 1, |s| s);
        assert!(renderer.units.is_empty());
    }

    #[tokio::test]
    async fn test_render_completes_unit() {
        let (mut producer, mut renderer) = renderer_with(Vec::new());
        let (tx, rx) = oneshot::channel();
        assert!(producer
            .try_push(PlacedUnit {
                start_frame: 0,
                samples: vec![0.0; 2],
                epoch: 0,
                done: Some(tx),
            })
            .is_ok());

        let mut out = [0i16; 2];
        renderer.render(&mut out, 1, f32_to_i16);

        assert!(rx.await.is_ok());
    }

    #[tokio::test]
    async fn test_flush_epoch_drops_older_units() {
        let (mut producer, mut renderer) = renderer_with(Vec::new());
        let (active_tx, active_rx) = oneshot::channel();
        assert!(producer
            .try_push(PlacedUnit {
                start_frame: 0,
                samples: vec![0.5; 16],
                epoch: 0,
                done: Some(active_tx),
            })
            .is_ok());

        let mut out = [0.0f32; 4];
        renderer.render(&mut out, 1, |s| s);
        assert_eq!(renderer.units.len(), 1);

        // One unit queued before the flush, one after.
        let (stale_tx, stale_rx) = oneshot::channel();
        assert!(producer
            .try_push(PlacedUnit {
                start_frame: 4,
                samples: vec![0.5; 4],
                epoch: 0,
                done: Some(stale_tx),
            })
            .is_ok());
        renderer.shared.flush_epoch.fetch_add(1, Ordering::AcqRel);
        assert!(producer
            .try_push(PlacedUnit {
                start_frame: 8,
                samples: vec![0.25; 4],
                epoch: 1,
                done: None,
            })
            .is_ok());

        let mut out = [9.0f32; 8];
        renderer.render(&mut out, 1, |s| s);

        assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 0.25, 0.25, 0.25, 0.25]);
        assert!(active_rx.await.is_err());
        assert!(stale_rx.await.is_err());
        assert!(renderer.units.is_empty());
    }

    #[test]
    fn test_frames_to_duration() {
        assert_eq!(frames_to_duration(48000, 48000), Duration::from_secs(1));
        assert_eq!(frames_to_duration(100, 0), Duration::ZERO);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_output() {
        let output = CpalOutput::open_default().unwrap();
        println!("Output rate: {}", output.sample_rate());
        output.suspend().unwrap();
        assert!(output.is_suspended());
    }
}
