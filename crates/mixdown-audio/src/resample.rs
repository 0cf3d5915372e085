//! Whole-buffer sample-rate conversion (rubato FFT resampler).
//!
//! Runs when a clip starts playing a file whose rate differs from the
//! engine's, never on the render thread.

use mixdown_core::{MixdownError, Result};
use rubato::{FftFixedIn, Resampler};
use tracing::debug;

const CHUNK_FRAMES: usize = 1024;

/// Convert interleaved `samples` with `channels` channels from `from` Hz to `to` Hz.
pub fn convert_rate(samples: &[f32], channels: usize, from: u32, to: u32) -> Result<Vec<f32>> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if channels == 0 || from == 0 || to == 0 {
        return Err(MixdownError::Audio(format!(
            "cannot resample {} channels from {} Hz to {} Hz",
            channels, from, to
        )));
    }

    let frames = samples.len() / channels;
    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, s) in frame.iter().enumerate() {
            planar[ch].push(*s);
        }
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK_FRAMES, 2, channels)
        .map_err(|e| MixdownError::Audio(format!("failed to build resampler: {}", e)))?;
    let delay = resampler.output_delay();
    let expected = (frames as f64 * f64::from(to) / f64::from(from)).round() as usize;
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay + CHUNK_FRAMES); channels];

    let mut pos = 0;
    while frames - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..pos + n]).collect();
        let block = resampler.process(&chunk, None).map_err(resample_error)?;
        append(&mut out, block);
        pos += n;
    }
    if pos < frames {
        let chunk: Vec<&[f32]> = planar.iter().map(|c| &c[pos..]).collect();
        let block = resampler
            .process_partial(Some(&chunk[..]), None)
            .map_err(resample_error)?;
        append(&mut out, block);
    }
    // Flush the filter tail until the delayed output covers the whole input.
    while out[0].len() < expected + delay {
        let block = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(resample_error)?;
        if block[0].is_empty() {
            break;
        }
        append(&mut out, block);
    }

    let end = (delay + expected).min(out[0].len());
    let start = delay.min(end);
    let mut interleaved = Vec::with_capacity((end - start) * channels);
    for i in start..end {
        for ch in &out {
            interleaved.push(ch[i]);
        }
    }
    debug!(from, to, frames, out_frames = end - start, "resampled buffer");
    Ok(interleaved)
}

fn append(out: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (dst, src) in out.iter_mut().zip(block) {
        dst.extend_from_slice(&src);
    }
}

fn resample_error(e: rubato::ResampleError) -> MixdownError {
    MixdownError::Audio(format!("resampling failed: {}", e))
}
