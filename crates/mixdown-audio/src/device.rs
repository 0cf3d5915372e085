//! Output device contract.
//!
//! The engine is the producer: a sink is an external pump that pulls
//! fixed-size blocks from a `RenderSource` at its own pace.

use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use mixdown_core::{MixdownError, Result, CHANNELS};
use parking_lot::Mutex;
use tracing::{debug, error, info};

/// The root of the mixing graph as seen by a sink.
pub trait RenderSource: Send + Sync {
    /// Fill `out` with interleaved stereo frames; returns frames produced.
    fn render(&self, out: &mut [f32]) -> usize;
}

/// An output device.
pub trait DeviceSink: Send {
    /// Bind `source` as the producer at the given format.
    fn initialize(&mut self, sample_rate: u32, channels: u16, source: Arc<dyn RenderSource>) -> Result<()>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Human-readable device name for logs.
    fn name(&self) -> String {
        "output".to_string()
    }
}

// ── Offline sink ────────────────────────────────────────────────

#[derive(Default)]
struct OfflineState {
    source: Option<Arc<dyn RenderSource>>,
    sample_rate: u32,
    running: bool,
}

/// A sink driven by explicit `pull` calls. Clones share the same binding,
/// so a caller can keep a handle after giving one clone to the engine.
#[derive(Clone, Default)]
pub struct OfflineSink {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `frames` frames of interleaved stereo. Silence when unbound or stopped.
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * CHANNELS as usize];
        let source = {
            let state = self.state.lock();
            match (&state.source, state.running) {
                (Some(source), true) => Some(Arc::clone(source)),
                _ => None,
            }
        };
        if let Some(source) = source {
            source.render(&mut out);
        }
        out
    }

    /// Pull `seconds` of audio in blocks of `block_frames`.
    pub fn pull_seconds(&self, seconds: f64, block_frames: usize) -> Vec<f32> {
        let total = (seconds * f64::from(self.sample_rate())).round() as usize;
        let mut out = Vec::with_capacity(total * CHANNELS as usize);
        let mut done = 0;
        while done < total {
            let n = block_frames.max(1).min(total - done);
            out.extend(self.pull(n));
            done += n;
        }
        out
    }

    pub fn sample_rate(&self) -> u32 {
        self.state.lock().sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn is_bound(&self) -> bool {
        self.state.lock().source.is_some()
    }
}

impl DeviceSink for OfflineSink {
    fn initialize(&mut self, sample_rate: u32, _channels: u16, source: Arc<dyn RenderSource>) -> Result<()> {
        let mut state = self.state.lock();
        state.source = Some(source);
        state.sample_rate = sample_rate;
        state.running = false;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.source.is_none() {
            return Err(MixdownError::Device("offline sink started before initialize".into()));
        }
        state.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.running = false;
        state.source = None;
        Ok(())
    }

    fn name(&self) -> String {
        "offline".to_string()
    }
}

// ── cpal sink ───────────────────────────────────────────────────

/// The host's default output device.
///
/// cpal streams are not `Send` on every platform, so the stream lives on a
/// dedicated thread that owns it until `stop`.
pub struct CpalSink {
    device_name: Option<String>,
    sample_rate: u32,
    source: Option<Arc<dyn RenderSource>>,
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Use the default output device.
    pub fn new() -> Self {
        Self {
            device_name: None,
            sample_rate: 0,
            source: None,
            stop_tx: None,
            thread: None,
        }
    }

    /// Use the output device with this name.
    pub fn with_device(name: impl Into<String>) -> Self {
        let mut sink = Self::new();
        sink.device_name = Some(name.into());
        sink
    }

    /// Names of the host's output devices.
    pub fn output_device_names() -> Vec<String> {
        let host = cpal::default_host();
        match host.output_devices() {
            Ok(devices) => devices.filter_map(|d| d.name().ok()).collect(),
            Err(e) => {
                error!("failed to enumerate output devices: {}", e);
                Vec::new()
            }
        }
    }

    fn open_device(name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match name {
            None => host
                .default_output_device()
                .ok_or_else(|| MixdownError::Device("no default output device".into())),
            Some(name) => host
                .output_devices()
                .map_err(|e| MixdownError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| MixdownError::Device(format!("output device '{}' not found", name))),
        }
    }

    fn build_stream(device: &cpal::Device, sample_rate: u32, source: Arc<dyn RenderSource>) -> Result<cpal::Stream> {
        let ranges = device
            .supported_output_configs()
            .map_err(|e| MixdownError::Device(e.to_string()))?;
        let supported = pick_output_config(ranges, sample_rate).ok_or_else(|| {
            MixdownError::Device(format!("device has no f32 output config at {} Hz", sample_rate))
        })?;
        let channels = supported.channels() as usize;
        let buffer_size = match supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => {
                cpal::BufferSize::Fixed(PREFERRED_CALLBACK_FRAMES.clamp(*min, *max))
            }
            cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Default,
        };
        let config = cpal::StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size,
        };
        debug!(channels, sample_rate, ?buffer_size, "output config selected");

        let mut scratch = vec![0.0f32; SCRATCH_FRAMES * CHANNELS as usize];
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_output(source.as_ref(), &mut scratch, data, channels);
                },
                move |err| {
                    error!("audio output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| MixdownError::Device(e.to_string()))
    }
}

/// Frames per callback requested from devices that report a range.
const PREFERRED_CALLBACK_FRAMES: u32 = 512;
/// Render scratch size; larger callbacks are rendered in several pieces.
const SCRATCH_FRAMES: usize = 4096;

/// First f32 config that covers `sample_rate`, stereo preferred over other layouts.
fn pick_output_config(
    ranges: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
    sample_rate: u32,
) -> Option<cpal::SupportedStreamConfig> {
    let rate = cpal::SampleRate(sample_rate);
    let mut candidates: Vec<_> = ranges
        .filter(|r| r.sample_format() == cpal::SampleFormat::F32)
        .filter(|r| r.channels() > 0)
        .collect();
    candidates.sort_by_key(|r| r.channels() != CHANNELS);
    candidates.into_iter().find_map(|r| r.try_with_sample_rate(rate))
}

/// Render into a device buffer of `channels` interleaved channels, in
/// scratch-sized pieces. Mono devices get the stereo average; extra
/// channels are silent.
fn fill_output(source: &dyn RenderSource, scratch: &mut [f32], data: &mut [f32], channels: usize) {
    let chunk_frames = scratch.len() / 2;
    for piece in data.chunks_mut(chunk_frames * channels) {
        let frames = piece.len() / channels;
        let block = &mut scratch[..frames * 2];
        block.fill(0.0);
        source.render(block);
        match channels {
            1 => {
                for (i, sample) in piece.iter_mut().enumerate() {
                    *sample = (block[i * 2] + block[i * 2 + 1]) * 0.5;
                }
            }
            2 => piece.copy_from_slice(block),
            _ => {
                for (i, frame) in piece.chunks_mut(channels).enumerate() {
                    frame[0] = block[i * 2];
                    frame[1] = block[i * 2 + 1];
                    frame[2..].fill(0.0);
                }
            }
        }
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSink for CpalSink {
    fn initialize(&mut self, sample_rate: u32, channels: u16, source: Arc<dyn RenderSource>) -> Result<()> {
        if channels != CHANNELS {
            return Err(MixdownError::Device(format!(
                "engine renders {} channels, got {}",
                CHANNELS, channels
            )));
        }
        self.stop()?;
        self.sample_rate = sample_rate;
        self.source = Some(source);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }
        let source = self
            .source
            .clone()
            .ok_or_else(|| MixdownError::Device("cpal sink started before initialize".into()))?;
        let sample_rate = self.sample_rate;
        let name = self.device_name.clone();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<String>>(1);

        let thread = std::thread::Builder::new()
            .name("mixdown-output".into())
            .spawn(move || {
                let opened = Self::open_device(name.as_deref()).and_then(|device| {
                    let stream = Self::build_stream(&device, sample_rate, source)?;
                    stream
                        .play()
                        .map_err(|e| MixdownError::Device(e.to_string()))?;
                    Ok((device.name().unwrap_or_else(|_| "unknown".into()), stream))
                });
                match opened {
                    Ok((device_name, stream)) => {
                        let _ = ready_tx.send(Ok(device_name));
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(device_name)) => {
                info!(device = %device_name, sample_rate, "output stream started");
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(MixdownError::Device("output thread exited during startup".into()))
            }
        }
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                return Err(MixdownError::Device("output thread panicked".into()));
            }
            debug!("output stream stopped");
        }
        Ok(())
    }

    fn name(&self) -> String {
        self.device_name.clone().unwrap_or_else(|| "default".into())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
