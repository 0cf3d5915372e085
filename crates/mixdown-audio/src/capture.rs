//! Audio input capture and WAV recording.
//!
//! A `CaptureBackend` delivers interleaved blocks over a channel; the
//! `AudioRecorder` drains that channel on a writer thread so file I/O never
//! runs on the device callback.

use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use mixdown_core::{MixdownError, Result};
use tracing::{debug, error, info};

use crate::file::WavStreamWriter;

/// A source of recorded audio.
pub trait CaptureBackend: Send + Sync {
    /// Start capturing; every captured block is sent on `blocks`.
    fn open(&self, blocks: Sender<Vec<f32>>) -> Result<Box<dyn CaptureStream>>;
}

/// A running capture.
pub trait CaptureStream: Send {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Stop delivering blocks and release the device.
    fn stop(self: Box<Self>) -> Result<()>;
}

// ── Recorder ────────────────────────────────────────────────────

/// Streams a capture into a 32-bit float WAV file.
pub struct AudioRecorder {
    path: PathBuf,
    stream: Box<dyn CaptureStream>,
    writer: JoinHandle<Result<u64>>,
}

impl AudioRecorder {
    pub fn start(backend: &dyn CaptureBackend, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (tx, rx) = unbounded();
        let stream = backend.open(tx)?;
        let mut file = match WavStreamWriter::create(&path, stream.sample_rate(), stream.channels()) {
            Ok(file) => file,
            Err(e) => {
                let _ = stream.stop();
                return Err(e);
            }
        };

        let writer = std::thread::Builder::new()
            .name("mixdown-recorder".into())
            .spawn(move || -> Result<u64> {
                let mut written = 0u64;
                for block in rx {
                    file.write(&block)?;
                    written += block.len() as u64;
                }
                file.finalize()?;
                Ok(written)
            })?;

        info!(path = %path.display(), "audio recording started");
        Ok(Self {
            path,
            stream,
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop the capture, flush the queue and finalize the file.
    pub fn stop(self) -> Result<PathBuf> {
        // Stopping the stream drops its sender, which ends the writer loop.
        let stop_result = self.stream.stop();
        let written = self
            .writer
            .join()
            .map_err(|_| MixdownError::Audio("recorder thread panicked".into()))??;
        stop_result?;
        info!(path = %self.path.display(), samples = written, "audio recording finished");
        Ok(self.path)
    }
}

// ── In-memory capture ───────────────────────────────────────────

/// Capture backend that replays prepared blocks. Used for offline
/// bouncing and in tests.
#[derive(Debug, Clone)]
pub struct MemoryCapture {
    sample_rate: u32,
    channels: u16,
    blocks: Vec<Vec<f32>>,
}

impl MemoryCapture {
    pub fn new(sample_rate: u32, channels: u16, blocks: Vec<Vec<f32>>) -> Self {
        Self {
            sample_rate,
            channels,
            blocks,
        }
    }
}

struct MemoryStream {
    sample_rate: u32,
    channels: u16,
}

impl CaptureBackend for MemoryCapture {
    fn open(&self, blocks: Sender<Vec<f32>>) -> Result<Box<dyn CaptureStream>> {
        for block in &self.blocks {
            blocks
                .send(block.clone())
                .map_err(|_| MixdownError::Audio("capture receiver closed".into()))?;
        }
        Ok(Box::new(MemoryStream {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }))
    }
}

impl CaptureStream for MemoryStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn stop(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// ── cpal capture ────────────────────────────────────────────────

/// Captures from the host's default input device.
#[derive(Debug, Default, Clone)]
pub struct CpalCapture {
    device_name: Option<String>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
        }
    }

    fn open_device(name: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match name {
            None => host
                .default_input_device()
                .ok_or_else(|| MixdownError::PreconditionFailed("no default input device".into())),
            Some(name) => host
                .input_devices()
                .map_err(|e| MixdownError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| MixdownError::PreconditionFailed(format!("input device '{}' not found", name))),
        }
    }
}

struct CpalCaptureStream {
    sample_rate: u32,
    channels: u16,
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl CaptureBackend for CpalCapture {
    fn open(&self, blocks: Sender<Vec<f32>>) -> Result<Box<dyn CaptureStream>> {
        let name = self.device_name.clone();
        let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(1);
        let (ready_tx, ready_rx) = bounded::<Result<(u32, u16)>>(1);

        // The stream is not Send on every platform: build and own it on its own thread.
        let thread = std::thread::Builder::new()
            .name("mixdown-capture".into())
            .spawn(move || {
                let opened = Self::open_device(name.as_deref()).and_then(|device| {
                    let supported = device
                        .default_input_config()
                        .map_err(|e| MixdownError::Device(e.to_string()))?;
                    if supported.sample_format() != cpal::SampleFormat::F32 {
                        return Err(MixdownError::Device(format!(
                            "input device delivers {:?}, expected f32",
                            supported.sample_format()
                        )));
                    }
                    let config: cpal::StreamConfig = supported.config();
                    let format = (config.sample_rate.0, config.channels);
                    let stream = device
                        .build_input_stream(
                            &config,
                            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                                let _ = blocks.send(data.to_vec());
                            },
                            move |err| {
                                error!("audio input stream error: {}", err);
                            },
                            None,
                        )
                        .map_err(|e| MixdownError::Device(e.to_string()))?;
                    stream.play().map_err(|e| MixdownError::Device(e.to_string()))?;
                    Ok((format, stream))
                });
                match opened {
                    Ok((format, stream)) => {
                        let _ = ready_tx.send(Ok(format));
                        let _ = stop_rx.recv();
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok((sample_rate, channels))) => {
                debug!(sample_rate, channels, "input stream started");
                Ok(Box::new(CpalCaptureStream {
                    sample_rate,
                    channels,
                    stop_tx,
                    thread,
                }))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(MixdownError::Device("input thread exited during startup".into()))
            }
        }
    }
}

impl CaptureStream for CpalCaptureStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn stop(self: Box<Self>) -> Result<()> {
        let _ = self.stop_tx.send(());
        self.thread
            .join()
            .map_err(|_| MixdownError::Device("input thread panicked".into()))
    }
}
