//! WAV-backed audio sources (hound).
//!
//! `AudioFile` holds the whole decoded file in memory as interleaved `f32`;
//! readers are cheap cursors over the shared samples.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mixdown_core::{MixdownError, Result};
use tracing::debug;

/// A decoded WAV file.
#[derive(Debug, Clone)]
pub struct AudioFile {
    path: PathBuf,
    sample_rate: u32,
    channels: u16,
    samples: Arc<[f32]>,
}

impl AudioFile {
    /// Decode a WAV file into memory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path).map_err(|e| wav_error(path, e))?;
        let spec = reader.spec();
        if spec.channels == 0 {
            return Err(MixdownError::Audio(format!(
                "{}: file declares zero channels",
                path.display()
            )));
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| wav_error(path, e))?,
            hound::SampleFormat::Int => {
                let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max_value))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| wav_error(path, e))?
            }
        };

        debug!(
            path = %path.display(),
            sample_rate = spec.sample_rate,
            channels = spec.channels,
            frames = samples.len() / spec.channels as usize,
            "opened audio file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples: samples.into(),
        })
    }

    /// Wrap already-decoded interleaved samples.
    pub fn from_samples(path: impl Into<PathBuf>, sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            path: path.into(),
            sample_rate,
            channels: channels.max(1),
            samples: samples.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Total length in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Interleaved stereo copy: mono is duplicated, extra channels are dropped.
    pub fn to_stereo(&self) -> Vec<f32> {
        let ch = self.channels as usize;
        if ch == 2 {
            return self.samples.to_vec();
        }
        let mut out = Vec::with_capacity(self.frames() * 2);
        for frame in self.samples.chunks_exact(ch) {
            let l = frame[0];
            let r = if ch == 1 { frame[0] } else { frame[1] };
            out.push(l);
            out.push(r);
        }
        out
    }

    /// A new cursor positioned at the start of the file.
    pub fn reader(&self) -> AudioReader {
        AudioReader {
            samples: Arc::clone(&self.samples),
            channels: self.channels as usize,
            sample_rate: self.sample_rate,
            pos: 0,
        }
    }

    /// Write interleaved samples as a 32-bit float WAV file.
    pub fn write_wav(path: impl AsRef<Path>, sample_rate: u32, channels: u16, samples: &[f32]) -> Result<()> {
        let path = path.as_ref();
        let mut writer = WavStreamWriter::create(path, sample_rate, channels)?;
        writer.write(samples)?;
        writer.finalize()
    }
}

// ── Reader ──────────────────────────────────────────────────────

/// Read cursor over an `AudioFile`'s samples in the file's own channel layout.
#[derive(Debug, Clone)]
pub struct AudioReader {
    samples: Arc<[f32]>,
    channels: usize,
    sample_rate: u32,
    /// Position in frames.
    pos: usize,
}

impl AudioReader {
    /// Copy whole frames into `buf`; returns the number of samples written.
    pub fn read(&mut self, buf: &mut [f32]) -> usize {
        let start = self.pos * self.channels;
        let wanted = buf.len() / self.channels * self.channels;
        let n = wanted.min(self.samples.len().saturating_sub(start));
        buf[..n].copy_from_slice(&self.samples[start..start + n]);
        self.pos += n / self.channels;
        n
    }

    /// Move to `time` seconds.
    pub fn seek(&mut self, time: f64) -> Result<()> {
        let total = self.samples.len() / self.channels;
        let frame = (time * f64::from(self.sample_rate)).round();
        if !(0.0..=total as f64).contains(&frame) {
            return Err(MixdownError::Range(format!(
                "seek to {time:.3}s outside file of {:.3}s",
                total as f64 / f64::from(self.sample_rate)
            )));
        }
        self.pos = frame as usize;
        Ok(())
    }

    /// Current position in seconds.
    pub fn position(&self) -> f64 {
        self.pos as f64 / f64::from(self.sample_rate)
    }
}

// ── Writer ──────────────────────────────────────────────────────

/// Incremental 32-bit float WAV writer used by export and recording.
pub struct WavStreamWriter {
    path: PathBuf,
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
}

impl WavStreamWriter {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32, channels: u16) -> Result<Self> {
        let path = path.as_ref();
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|e| wav_error(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn write(&mut self, samples: &[f32]) -> Result<()> {
        for &s in samples {
            self.writer
                .write_sample(s)
                .map_err(|e| wav_error(&self.path, e))?;
        }
        Ok(())
    }

    /// Patch the header and close the file.
    pub fn finalize(self) -> Result<()> {
        let path = self.path;
        self.writer.finalize().map_err(|e| wav_error(&path, e))
    }
}

fn wav_error(path: &Path, err: hound::Error) -> MixdownError {
    match err {
        hound::Error::IoError(source) => MixdownError::resource(path, "wav i/o", source),
        other => MixdownError::Audio(format!("{}: {}", path.display(), other)),
    }
}
