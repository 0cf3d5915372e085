//! Mixdown Core - Foundation types for the audio/MIDI engine
//!
//! This crate provides the types shared by every other Mixdown crate:
//! - Errors (`MixdownError`) and `OperationResult`
//! - Automation lanes and parameters
//! - Gain and pan-law math
//! - Lock-free scalar parameters
//! - Change notifications
//! - MIDI events
//! - Engine configuration

pub mod automation;
pub mod config;
pub mod error;
pub mod gain;
pub mod midi;
pub mod notify;
pub mod param;

pub use automation::{AutomationLane, AutomationParameter, AutomationPoint, InterpolationKind};
pub use config::{EngineConfig, CHANNELS};
pub use error::{MixdownError, OperationResult, Result};
pub use midi::{MidiEvent, TimedMidiEvent};
pub use notify::Notifier;
pub use param::{AtomicF32, AtomicF64, CancelFlag};
