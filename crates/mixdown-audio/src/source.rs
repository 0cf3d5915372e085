//! The pull contract every node of the mixing graph implements.

/// A producer of interleaved stereo `f32` frames.
///
/// `read` is called from the render thread and must not block or allocate.
pub trait SampleSource: Send {
    /// Write up to `out.len() / 2` frames to the front of `out` and return
    /// how many were written. Returning fewer than requested means the
    /// source is exhausted.
    fn read(&mut self, out: &mut [f32]) -> usize;
}

impl<F> SampleSource for F
where
    F: FnMut(&mut [f32]) -> usize + Send,
{
    fn read(&mut self, out: &mut [f32]) -> usize {
        self(out)
    }
}

/// Source that plays a fixed interleaved stereo buffer once.
#[derive(Debug, Clone)]
pub struct BufferSource {
    samples: Vec<f32>,
    pos: usize,
}

impl BufferSource {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples, pos: 0 }
    }

    /// `frames` frames of a constant value on both channels.
    pub fn constant(value: f32, frames: usize) -> Self {
        Self::new(vec![value; frames * 2])
    }
}

impl SampleSource for BufferSource {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let n = (out.len() / 2 * 2).min(self.samples.len() - self.pos);
        out[..n].copy_from_slice(&self.samples[self.pos..self.pos + n]);
        self.pos += n;
        n / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_source_exhausts() {
        let mut src = BufferSource::constant(0.5, 3);
        let mut out = [0.0f32; 4];
        assert_eq!(src.read(&mut out), 2);
        assert_eq!(out, [0.5; 4]);
        assert_eq!(src.read(&mut out), 1);
        assert_eq!(src.read(&mut out), 0);
    }

    #[test]
    fn test_closure_source() {
        let mut calls = 0;
        let mut src = move |out: &mut [f32]| {
            calls += 1;
            out.fill(calls as f32);
            out.len() / 2
        };
        let mut out = [0.0f32; 2];
        assert_eq!(SampleSource::read(&mut src, &mut out), 1);
        assert_eq!(out, [1.0, 1.0]);
    }
}
