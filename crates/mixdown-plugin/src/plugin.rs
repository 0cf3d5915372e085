//! The plugin contract.
//!
//! Hosting native plugin binaries is out of scope; a host wraps whatever it
//! loads behind `Plugin` and the chain only sequences calls to it.

use mixdown_core::MidiEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PluginError;

/// Where a plugin sits in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginKind {
    /// Generates audio from MIDI; occupies the single instrument slot.
    Instrument,
    /// Transforms audio; appended to the effect list.
    Effect,
}

/// A processing unit in a plugin chain.
///
/// `process` runs on the render thread and must not block.
pub trait Plugin: Send {
    fn id(&self) -> Uuid;

    fn name(&self) -> &str;

    fn kind(&self) -> PluginKind;

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);

    /// Process `frames` interleaved stereo frames from `input` into `output`.
    fn process(&mut self, input: &[f32], output: &mut [f32], frames: usize);

    fn receive_midi_event(&mut self, _event: MidiEvent) {}

    fn open_editor(&mut self) -> Result<(), PluginError> {
        Err(PluginError::NoEditor(self.name().to_string()))
    }

    fn close_editor(&mut self) {}

    /// Release resources. Called once when the plugin leaves its chain.
    fn dispose(&mut self) {}
}

/// Snapshot of a plugin slot, for hosts and UIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: Uuid,
    pub name: String,
    pub kind: PluginKind,
    pub enabled: bool,
}
