//! Change notifications emitted by clips, tracks, the master bus and the engine.
//!
//! Obtain a receiver with the owner's `subscribe()`; see `mixdown_core::Notifier`
//! for delivery guarantees.

use uuid::Uuid;

/// Clip attribute and playback changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ClipEvent {
    NameChanged(String),
    EnabledChanged(bool),
    /// Timeline position in seconds.
    TimeChanged(f64),
    StartMarkerChanged(f64),
    EndMarkerChanged(f64),
    /// Volume in dB.
    VolumeChanged(f32),
    PanChanged(f32),
    PitchChanged(f32),
    PlaybackStarted,
    /// `natural` is true when the clip ran to its end rather than being stopped.
    PlaybackStopped { natural: bool },
    /// The clip now plays a different file (after a reverse).
    SourceChanged,
}

/// Track structure and attribute changes.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    ClipAdded(Uuid),
    ClipRemoved(Uuid),
    PluginAdded(Uuid),
    PluginRemoved(Uuid),
    /// A member joined a group track.
    TrackAdded(Uuid),
    /// A member left a group track.
    TrackRemoved(Uuid),
    NameChanged(String),
    MuteChanged(bool),
    VolumeChanged(f32),
    PanChanged(f32),
    RecordingStateChanged(bool),
    VolumeMeasured { left: f32, right: f32 },
}

/// Master bus changes.
#[derive(Debug, Clone, PartialEq)]
pub enum MasterEvent {
    TrackAdded(Uuid),
    TrackRemoved(Uuid),
    VolumeChanged(f32),
    PanChanged(f32),
    VolumeMeasured { left: f32, right: f32 },
}

/// Device selection changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    AudioDeviceChanged(String),
    MidiDeviceChanged(Option<String>),
}
