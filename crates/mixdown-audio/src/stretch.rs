//! Tempo/pitch stage.
//!
//! The engine only sequences calls to a `TimeStretch`. The built-in
//! `SpectralStretch` hands the DSP to signalsmith-stretch, which changes
//! tempo and pitch independently: tempo alone decides how fast the source
//! is consumed, so transposing never moves the playback clock.

use signalsmith_stretch::Stretch;

/// Upstream of a stretch stage: interleaved stereo frames.
pub trait FrameReader {
    /// Fill the front of `out`; returns frames written. Fewer than asked means exhausted.
    fn read_frames(&mut self, out: &mut [f32]) -> usize;
}

/// A tempo/pitch processor working on interleaved stereo.
pub trait TimeStretch: Send {
    /// Source frames consumed per output frame; `2.0` plays twice as fast.
    fn set_tempo(&mut self, tempo: f64);

    /// Transpose by `semitones` without changing the tempo.
    fn set_pitch_semitones(&mut self, semitones: f32);

    /// Produce up to `out.len() / 2` frames, pulling from `input` as needed.
    fn process(&mut self, input: &mut dyn FrameReader, out: &mut [f32]) -> usize;

    /// Drop buffered state, e.g. after a seek.
    fn reset(&mut self);
}

/// Largest tempo change either way.
const MAX_TEMPO: f64 = 8.0;

/// Phase-vocoder tempo and pitch through signalsmith-stretch.
///
/// Passes frames straight through until the tempo or pitch first leaves
/// neutral; from then on every block goes through the stretcher (and picks
/// up its latency) until `reset`.
pub struct SpectralStretch {
    tempo: f64,
    semitones: f32,
    stretch: Stretch,
    input: Vec<f32>,
    /// Fractional source frames carried into the next block.
    owed: f64,
    engaged: bool,
}

impl SpectralStretch {
    pub fn new(sample_rate: u32, tempo: f64, semitones: f32) -> Self {
        let mut stretch = Stretch::preset_default(2, sample_rate.max(1));
        let semitones = if semitones.is_finite() { semitones } else { 0.0 };
        stretch.set_transpose_factor_semitones(semitones, None);
        let tempo = if tempo > 0.0 && tempo.is_finite() { tempo } else { 1.0 };
        Self {
            tempo: tempo.clamp(1.0 / MAX_TEMPO, MAX_TEMPO),
            semitones,
            stretch,
            input: Vec::with_capacity(8192),
            owed: 0.0,
            engaged: false,
        }
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn semitones(&self) -> f32 {
        self.semitones
    }

    /// Output delay in frames once the stretcher is engaged.
    pub fn latency(&self) -> usize {
        self.stretch.input_latency() + self.stretch.output_latency()
    }

    fn is_neutral(&self) -> bool {
        self.tempo == 1.0 && self.semitones == 0.0
    }
}

impl TimeStretch for SpectralStretch {
    fn set_tempo(&mut self, tempo: f64) {
        if tempo > 0.0 && tempo.is_finite() {
            self.tempo = tempo.clamp(1.0 / MAX_TEMPO, MAX_TEMPO);
        }
    }

    fn set_pitch_semitones(&mut self, semitones: f32) {
        if semitones.is_finite() && semitones != self.semitones {
            self.semitones = semitones;
            self.stretch.set_transpose_factor_semitones(semitones, None);
        }
    }

    fn process(&mut self, input: &mut dyn FrameReader, out: &mut [f32]) -> usize {
        let wanted = out.len() / 2;
        if !self.engaged && self.is_neutral() {
            return input.read_frames(&mut out[..wanted * 2]);
        }
        self.engaged = true;

        let exact = wanted as f64 * self.tempo + self.owed;
        let needed = exact.floor() as usize;
        self.owed = exact - needed as f64;
        if self.input.len() < needed * 2 {
            self.input.resize(needed * 2, 0.0);
        }
        let block = &mut self.input[..needed * 2];
        let got = input.read_frames(block);
        block[got * 2..].fill(0.0);
        self.stretch.process(&self.input[..needed * 2], &mut out[..wanted * 2]);

        if got < needed {
            // the source ends inside this block
            let produced = ((got as f64 / self.tempo).round() as usize).min(wanted);
            out[produced * 2..wanted * 2].fill(0.0);
            return produced;
        }
        wanted
    }

    fn reset(&mut self) {
        self.stretch.reset();
        self.owed = 0.0;
        self.engaged = false;
    }
}
