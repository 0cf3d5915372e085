//! Mixdown Audio - Mixing graph building blocks
//!
//! Everything the render path touches lives here; the engine crate wires
//! these pieces into clips, tracks and the master bus.
//!
//! Architecture:
//! - `SampleSource`: Pull contract for every node of the graph
//! - `Mixer`: Copy-on-write input list summed per block
//! - `stage`: Stereo gain/pan, fades, metering, mute gate
//! - `TimeStretch`: Tempo/pitch stage (signalsmith-stretch by default)
//! - `resample`: Whole-buffer sample-rate conversion
//! - `AudioFile`: WAV-backed sources (hound)
//! - `DeviceSink`: Output pump contract, offline and cpal sinks
//! - `CaptureBackend`: Input capture and WAV recording

pub mod capture;
pub mod device;
pub mod file;
pub mod mixer;
pub mod resample;
pub mod source;
pub mod stage;
pub mod stretch;

pub use capture::{AudioRecorder, CaptureBackend, CaptureStream, CpalCapture, MemoryCapture};
pub use device::{CpalSink, DeviceSink, OfflineSink, RenderSource};
pub use file::{AudioFile, AudioReader, WavStreamWriter};
pub use mixer::{Mixer, MixerInput};
pub use resample::convert_rate;
pub use source::{BufferSource, SampleSource};
pub use stage::{FadeEnvelope, LevelMeter, MeterLevels, MeterTap, MuteGate, StereoStage};
pub use stretch::{FrameReader, SpectralStretch, TimeStretch};
