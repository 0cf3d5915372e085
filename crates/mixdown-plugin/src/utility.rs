//! Built-in utility effect: volume, pan, stereo width, mono and polarity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mixdown_core::gain::linear_pan;
use mixdown_core::AtomicF32;
use uuid::Uuid;

use crate::error::PluginError;
use crate::plugin::{Plugin, PluginKind};

pub const WIDTH_MIN: f32 = -100.0;
pub const WIDTH_MAX: f32 = 400.0;

/// Parameters of a `Utility`, shared with the host after the plugin is
/// moved into a chain.
#[derive(Debug)]
pub struct UtilityParams {
    volume: AtomicF32,
    pan: AtomicF32,
    width: AtomicF32,
    mono: AtomicBool,
    invert_left: AtomicBool,
    invert_right: AtomicBool,
}

impl Default for UtilityParams {
    fn default() -> Self {
        Self {
            volume: AtomicF32::new(1.0),
            pan: AtomicF32::new(0.0),
            width: AtomicF32::new(0.0),
            mono: AtomicBool::new(false),
            invert_left: AtomicBool::new(false),
            invert_right: AtomicBool::new(false),
        }
    }
}

impl UtilityParams {
    pub fn volume(&self) -> f32 {
        self.volume.load()
    }

    /// Linear gain, `>= 0`.
    pub fn set_volume(&self, volume: f32) -> Result<(), PluginError> {
        if volume.is_nan() || volume < 0.0 {
            return Err(PluginError::Range(format!("volume must be >= 0, got {}", volume)));
        }
        self.volume.store(volume);
        Ok(())
    }

    pub fn pan(&self) -> f32 {
        self.pan.load()
    }

    /// Pan in `[-1, 1]`.
    pub fn set_pan(&self, pan: f32) -> Result<(), PluginError> {
        if !(-1.0..=1.0).contains(&pan) {
            return Err(PluginError::Range(format!("pan must be in [-1, 1], got {}", pan)));
        }
        self.pan.store(pan);
        Ok(())
    }

    pub fn width(&self) -> f32 {
        self.width.load()
    }

    /// Stereo width in `[-100, 400]`; 0 leaves the image untouched, -100 is mono.
    pub fn set_width(&self, width: f32) -> Result<(), PluginError> {
        if !(WIDTH_MIN..=WIDTH_MAX).contains(&width) {
            return Err(PluginError::Range(format!(
                "width must be in [{}, {}], got {}",
                WIDTH_MIN, WIDTH_MAX, width
            )));
        }
        self.width.store(width);
        Ok(())
    }

    pub fn mono(&self) -> bool {
        self.mono.load(Ordering::Relaxed)
    }

    pub fn set_mono(&self, mono: bool) {
        self.mono.store(mono, Ordering::Relaxed);
    }

    pub fn invert_left(&self) -> bool {
        self.invert_left.load(Ordering::Relaxed)
    }

    pub fn set_invert_left(&self, invert: bool) {
        self.invert_left.store(invert, Ordering::Relaxed);
    }

    pub fn invert_right(&self) -> bool {
        self.invert_right.load(Ordering::Relaxed)
    }

    pub fn set_invert_right(&self, invert: bool) {
        self.invert_right.store(invert, Ordering::Relaxed);
    }
}

/// Volume, pan, width, mono fold-down and polarity inversion.
pub struct Utility {
    id: Uuid,
    name: String,
    enabled: bool,
    params: Arc<UtilityParams>,
}

impl Utility {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "Utility".to_string(),
            enabled: true,
            params: Arc::new(UtilityParams::default()),
        }
    }

    /// Handle for changing parameters while the plugin runs.
    pub fn params(&self) -> Arc<UtilityParams> {
        Arc::clone(&self.params)
    }
}

impl Default for Utility {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Utility {
    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Effect
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn process(&mut self, input: &[f32], output: &mut [f32], frames: usize) {
        let p = &self.params;
        let volume = p.volume();
        let (pan_l, pan_r) = linear_pan(p.pan());
        let side_scale = (p.width() + 100.0) / 100.0;
        let mono = p.mono();
        let (invert_l, invert_r) = (p.invert_left(), p.invert_right());

        let n = frames.min(input.len() / 2).min(output.len() / 2);
        for i in 0..n {
            let (mut left, mut right) = (input[i * 2], input[i * 2 + 1]);
            let mid = (left + right) / 2.0;
            if mono {
                left = mid;
                right = mid;
            } else {
                let side = (left - right) / 2.0 * side_scale;
                left = mid + side;
                right = mid - side;
            }
            if invert_l {
                left = -left;
            }
            if invert_r {
                right = -right;
            }
            output[i * 2] = left * volume * pan_l;
            output[i * 2 + 1] = right * volume * pan_r;
        }
    }
}
