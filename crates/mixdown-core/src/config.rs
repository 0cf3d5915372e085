//! Engine configuration with versioned JSON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MixdownError, Result};

/// Current config schema version.
pub const CONFIG_VERSION: u32 = 1;

/// Output channel count. The mixing graph is stereo throughout.
pub const CHANNELS: u16 = 2;

/// Runtime settings for an engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Schema version for forward compatibility.
    pub version: u32,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per render block for offline rendering and export.
    pub block_frames: usize,
    /// Automation polling rate in Hz.
    pub automation_rate_hz: f64,
    /// Interval between level meter notifications.
    pub meter_interval_ms: u32,
    /// Capacity of each track's instrument MIDI queue.
    pub midi_queue_capacity: usize,
    /// Per-subscriber buffer for change notifications.
    pub event_queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            sample_rate: 44_100,
            block_frames: 512,
            automation_rate_hz: 60.0,
            meter_interval_ms: 100,
            midi_queue_capacity: 1024,
            event_queue_capacity: crate::notify::DEFAULT_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.version > CONFIG_VERSION {
            return Err(MixdownError::Config(format!(
                "config version {} is newer than supported version {}",
                self.version, CONFIG_VERSION
            )));
        }
        if self.sample_rate == 0 {
            return Err(MixdownError::Config("sample_rate must be positive".into()));
        }
        if self.block_frames == 0 {
            return Err(MixdownError::Config("block_frames must be positive".into()));
        }
        if !(self.automation_rate_hz.is_finite() && self.automation_rate_hz > 0.0) {
            return Err(MixdownError::Config(format!(
                "automation_rate_hz must be positive, got {}",
                self.automation_rate_hz
            )));
        }
        if self.midi_queue_capacity == 0 || self.event_queue_capacity == 0 {
            return Err(MixdownError::Config("queue capacities must be positive".into()));
        }
        Ok(())
    }

    /// Samples between meter notifications at the configured rate.
    pub fn meter_interval_frames(&self) -> usize {
        ((u64::from(self.sample_rate) * u64::from(self.meter_interval_ms)) / 1000).max(1) as usize
    }

    /// Delay between automation ticks.
    pub fn automation_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.automation_rate_hz)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| MixdownError::Config(format!("Failed to serialize config: {}", e)))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Self = serde_json::from_slice(data)
            .map_err(|e| MixdownError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = self.to_json()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }
}
