//! Automation lanes: time-ordered parameter values with per-point interpolation.
//!
//! A lane belongs to one (clip, parameter) pair. Points are unique per time
//! and kept sorted ascending; the interpolation kind stored on the earlier
//! point of a segment decides how that segment is evaluated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MixdownError, Result};

// ── Parameters ──────────────────────────────────────────────────

/// A clip parameter that can be automated.
///
/// Audio clips honour `Volume`, `Pan` and `Pitch`. MIDI clips translate every
/// parameter except `Pitch` into a controller message for the track's instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AutomationParameter {
    Volume,
    Pan,
    Balance,
    Pitch,
    SustainPedal,
    Portamento,
    SostenutoPedal,
    SoftPedal,
    LegatoPedal,
    Modulation,
}

impl AutomationParameter {
    pub const ALL: [AutomationParameter; 10] = [
        Self::Volume,
        Self::Pan,
        Self::Balance,
        Self::Pitch,
        Self::SustainPedal,
        Self::Portamento,
        Self::SostenutoPedal,
        Self::SoftPedal,
        Self::LegatoPedal,
        Self::Modulation,
    ];

    /// MIDI controller number this parameter drives on MIDI clips.
    pub fn midi_controller(self) -> Option<u8> {
        match self {
            Self::Volume => Some(7),
            Self::Pan => Some(10),
            Self::Balance => Some(8),
            Self::SustainPedal => Some(64),
            Self::Portamento => Some(65),
            Self::SostenutoPedal => Some(66),
            Self::SoftPedal => Some(67),
            Self::LegatoPedal => Some(68),
            Self::Modulation => Some(1),
            Self::Pitch => None,
        }
    }

    /// Whether audio clips react to this parameter.
    pub fn applies_to_audio(self) -> bool {
        matches!(self, Self::Volume | Self::Pan | Self::Pitch)
    }
}

impl fmt::Display for AutomationParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── Interpolation ───────────────────────────────────────────────

/// How a segment moves from its left point to its right point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InterpolationKind {
    /// Hold the left value until the next point.
    Step,
    #[default]
    Linear,
    /// Cubic ease, `f² (3 - 2f)`.
    Smooth,
}

impl InterpolationKind {
    /// Map a normalized position in `[0, 1]` to a blend factor.
    pub fn shape(self, f: f64) -> f64 {
        match self {
            Self::Step => 0.0,
            Self::Linear => f,
            Self::Smooth => f * f * (3.0 - 2.0 * f),
        }
    }
}

// ── Points ──────────────────────────────────────────────────────

/// A single automation point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    /// Seconds on the clip's playback clock.
    pub time: f64,
    pub value: f64,
    /// Interpolation used from this point to the next one.
    pub kind: InterpolationKind,
}

impl AutomationPoint {
    pub fn new(time: f64, value: f64, kind: InterpolationKind) -> Self {
        Self { time, value, kind }
    }
}

// ── Lane ────────────────────────────────────────────────────────

/// Sorted automation points for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationLane {
    parameter: AutomationParameter,
    points: Vec<AutomationPoint>,
}

impl AutomationLane {
    pub fn new(parameter: AutomationParameter) -> Self {
        Self {
            parameter,
            points: Vec::new(),
        }
    }

    pub fn parameter(&self) -> AutomationParameter {
        self.parameter
    }

    /// Insert a point, or update the point already at `time`.
    pub fn set(&mut self, time: f64, value: f64, kind: InterpolationKind) -> Result<()> {
        if !time.is_finite() || !value.is_finite() {
            return Err(MixdownError::Range(format!(
                "automation point ({time}, {value}) must be finite"
            )));
        }
        if let Some(p) = self.points.iter_mut().find(|p| p.time == time) {
            p.value = value;
            p.kind = kind;
            return Ok(());
        }
        let pos = self.points.partition_point(|p| p.time < time);
        self.points.insert(pos, AutomationPoint::new(time, value, kind));
        Ok(())
    }

    /// Remove the point at exactly `time`.
    pub fn remove(&mut self, time: f64) -> bool {
        if let Some(pos) = self.points.iter().position(|p| p.time == time) {
            self.points.remove(pos);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Evaluate the lane at `time` seconds.
    pub fn evaluate(&self, time: f64) -> f64 {
        let (first, last) = match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };
        if self.points.len() == 1 || time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }
        // Last point with p.time <= time; the one after it is strictly later.
        let idx = self.points.partition_point(|p| p.time <= time) - 1;
        Self::interpolate(&self.points[idx], &self.points[idx + 1], time)
    }

    fn interpolate(a: &AutomationPoint, b: &AutomationPoint, time: f64) -> f64 {
        let span = b.time - a.time;
        if span <= 0.0 {
            return a.value;
        }
        let f = ((time - a.time) / span).clamp(0.0, 1.0);
        a.value + (b.value - a.value) * a.kind.shape(f)
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

// ── Tests ───────────────────────────────────────────────────────
