//! Gain and pan math shared by clips, tracks and the master bus.

use crate::error::{MixdownError, Result};

/// Lowest accepted volume in dB.
pub const VOLUME_MIN_DB: f32 = -90.0;
/// Highest accepted volume in dB.
pub const VOLUME_MAX_DB: f32 = 6.0;
/// Pan range exposed on clips, tracks and the master bus.
pub const PAN_MIN: f32 = -50.0;
pub const PAN_MAX: f32 = 50.0;

/// Convert decibels to a linear amplitude multiplier.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert a linear amplitude to decibels. Silence maps to `-inf`.
#[inline]
pub fn linear_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}

/// Left/right multipliers for a pan position in `[-1, 1]`.
///
/// Linear law: the far side is attenuated, the near side stays at unity.
#[inline]
pub fn linear_pan(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let left = if pan <= 0.0 { 1.0 } else { 1.0 - pan };
    let right = if pan >= 0.0 { 1.0 } else { 1.0 + pan };
    (left, right)
}

/// Map the user-facing `[-50, 50]` pan range to `[-1, 1]`.
#[inline]
pub fn pan_to_unit(pan: f32) -> f32 {
    pan / PAN_MAX
}

pub fn validate_volume(db: f32) -> Result<()> {
    if !(VOLUME_MIN_DB..=VOLUME_MAX_DB).contains(&db) {
        return Err(MixdownError::Range(format!(
            "volume {db} dB must be between {VOLUME_MIN_DB} and {VOLUME_MAX_DB}"
        )));
    }
    Ok(())
}

pub fn validate_pan(pan: f32) -> Result<()> {
    if !(PAN_MIN..=PAN_MAX).contains(&pan) {
        return Err(MixdownError::Range(format!(
            "pan {pan} must be between {PAN_MIN} and {PAN_MAX}"
        )));
    }
    Ok(())
}
