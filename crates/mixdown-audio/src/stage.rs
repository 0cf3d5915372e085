//! In-place processing stages shared by clips, tracks and the master bus.

use std::sync::atomic::{AtomicBool, Ordering};

use mixdown_core::gain::{db_to_linear, linear_pan};
use mixdown_core::AtomicF32;

// ── Stereo gain/pan ─────────────────────────────────────────────

/// Gain and linear-law pan applied to interleaved stereo.
#[derive(Debug)]
pub struct StereoStage {
    gain: AtomicF32,
    pan: AtomicF32,
}

impl StereoStage {
    /// `gain` is linear, `pan` is in `[-1, 1]`.
    pub fn new(gain: f32, pan: f32) -> Self {
        Self {
            gain: AtomicF32::new(gain),
            pan: AtomicF32::new(pan),
        }
    }

    /// Unity gain, centred.
    pub fn unity() -> Self {
        Self::new(1.0, 0.0)
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.max(0.0));
    }

    pub fn set_gain_db(&self, db: f32) {
        self.set_gain(db_to_linear(db));
    }

    pub fn set_pan(&self, pan: f32) {
        self.pan.store(pan.clamp(-1.0, 1.0));
    }

    pub fn gain(&self) -> f32 {
        self.gain.load()
    }

    pub fn pan(&self) -> f32 {
        self.pan.load()
    }

    /// Current left/right multipliers.
    pub fn multipliers(&self) -> (f32, f32) {
        let gain = self.gain.load();
        let (l, r) = linear_pan(self.pan.load());
        (l * gain, r * gain)
    }

    pub fn process(&self, buf: &mut [f32]) {
        let (l, r) = self.multipliers();
        for frame in buf.chunks_exact_mut(2) {
            frame[0] *= l;
            frame[1] *= r;
        }
    }
}

impl Default for StereoStage {
    fn default() -> Self {
        Self::unity()
    }
}

// ── Mute gate ───────────────────────────────────────────────────

/// Zeroes the signal while muted.
#[derive(Debug, Default)]
pub struct MuteGate {
    muted: AtomicBool,
}

impl MuteGate {
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn process(&self, buf: &mut [f32]) {
        if self.is_muted() {
            buf.fill(0.0);
        }
    }
}

// ── Fades ───────────────────────────────────────────────────────

/// Linear fade-in/fade-out over a region of source time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeEnvelope {
    start: f64,
    end: f64,
    fade_in: f64,
    fade_out: f64,
}

impl FadeEnvelope {
    /// Fades over `[start, end)`, all values in seconds.
    pub fn new(start: f64, end: f64, fade_in: f64, fade_out: f64) -> Self {
        Self {
            start,
            end,
            fade_in: fade_in.max(0.0),
            fade_out: fade_out.max(0.0),
        }
    }

    /// Gain at source position `pos`.
    pub fn gain_at(&self, pos: f64) -> f32 {
        let mut gain = 1.0;
        if self.fade_in > 0.0 {
            gain *= ((pos - self.start) / self.fade_in).clamp(0.0, 1.0);
        }
        if self.fade_out > 0.0 {
            gain *= ((self.end - pos) / self.fade_out).clamp(0.0, 1.0);
        }
        gain as f32
    }

    /// Whether the envelope is flat at unity everywhere.
    pub fn is_flat(&self) -> bool {
        self.fade_in == 0.0 && self.fade_out == 0.0
    }
}

// ── Metering ────────────────────────────────────────────────────

/// Peak levels of one meter interval.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeterLevels {
    pub left: f32,
    pub right: f32,
}

/// Shared side of a meter: the last published levels.
#[derive(Debug, Default)]
pub struct LevelMeter {
    left: AtomicF32,
    right: AtomicF32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn left(&self) -> f32 {
        self.left.load()
    }

    pub fn right(&self) -> f32 {
        self.right.load()
    }

    pub fn levels(&self) -> MeterLevels {
        MeterLevels {
            left: self.left(),
            right: self.right(),
        }
    }

    fn publish(&self, levels: MeterLevels) {
        self.left.store(levels.left);
        self.right.store(levels.right);
    }
}

/// Render-side accumulator feeding a `LevelMeter` once per interval.
#[derive(Debug)]
pub struct MeterTap {
    interval: usize,
    counted: usize,
    peak: MeterLevels,
}

impl MeterTap {
    /// Publish every `interval` frames.
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
            counted: 0,
            peak: MeterLevels::default(),
        }
    }

    /// Accumulate `buf`; returns the levels published during this call, if any.
    pub fn process(&mut self, buf: &[f32], meter: &LevelMeter) -> Option<MeterLevels> {
        let mut published = None;
        for frame in buf.chunks_exact(2) {
            self.peak.left = self.peak.left.max(frame[0].abs());
            self.peak.right = self.peak.right.max(frame[1].abs());
            self.counted += 1;
            if self.counted >= self.interval {
                meter.publish(self.peak);
                published = Some(self.peak);
                self.peak = MeterLevels::default();
                self.counted = 0;
            }
        }
        published
    }
}
