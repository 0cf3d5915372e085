//! Mixdown MIDI - Sequences, input ports and recording
//!
//! - `MidiSequence`: standard MIDI files flattened to events in seconds (midly)
//! - `MidiInputBackend`: port enumeration and connections (midir, virtual)
//! - `MidiDispatcher`: fan-out of live input to handlers
//! - `MidiEventQueue`: non-blocking hand-off to an instrument
//! - `MidiRecorder`: live input to SMF

pub mod input;
pub mod queue;
pub mod recorder;
pub mod sequence;

pub use input::{
    MidiDispatcher, MidiHandler, MidiInputBackend, MidiInputConnection, MidirBackend, VirtualMidiBackend,
};
pub use queue::MidiEventQueue;
pub use recorder::MidiRecorder;
pub use sequence::MidiSequence;
