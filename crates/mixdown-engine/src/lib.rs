//! Mixdown Engine - Clips, tracks and the master bus
//!
//! This crate assembles the mixing graph from the lower crates:
//! - `Clip`: audio/MIDI playback state machine, editing and automation
//! - `AutomationScheduler`: one timer driving every playing clip's lanes
//! - `Track`: audio, MIDI and group mixing nodes with plugin chains
//! - `MasterBus`: root mixer bound to the output device
//! - `Engine`: the context owning configuration, scheduler and devices
//!
//! Architecture:
//! ```text
//! Clip voices ─► Track mixer ─► PluginChain ─► gain/pan ─► meter ─► mute
//!                                                                    │
//!                     (Group mixer ─► ... same stages) ◄─────────────┤
//!                                                                    ▼
//!                               Master mixer ─► gain/pan ─► meter ─► DeviceSink
//! ```

pub mod clip;
pub mod clock;
pub mod engine;
pub mod events;
pub mod master;
mod recording;
pub mod scheduler;
pub mod track;
mod voice;

pub use clip::{Clip, ClipKind, PlaybackState};
pub use clock::PlaybackClock;
pub use engine::Engine;
pub use events::{ClipEvent, EngineEvent, MasterEvent, TrackEvent};
pub use master::MasterBus;
pub use scheduler::AutomationScheduler;
pub use track::{Track, TrackKind};
