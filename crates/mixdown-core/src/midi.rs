//! Channel-voice MIDI events passed between sequences, inputs and instruments.

use serde::{Deserialize, Serialize};

/// A channel MIDI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEvent {
    NoteOn {
        /// MIDI channel (0-15)
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    /// Polyphonic key pressure.
    Aftertouch { channel: u8, note: u8, pressure: u8 },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit pitch bend value (0-16383, center at 8192)
    PitchBend { channel: u8, value: u16 },
}

impl MidiEvent {
    #[inline]
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::ControlChange {
            channel: channel & 0x0f,
            controller: controller & 0x7f,
            value: value & 0x7f,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            Self::NoteOn { channel, .. }
            | Self::NoteOff { channel, .. }
            | Self::Aftertouch { channel, .. }
            | Self::ControlChange { channel, .. }
            | Self::ProgramChange { channel, .. }
            | Self::ChannelPressure { channel, .. }
            | Self::PitchBend { channel, .. } => channel,
        }
    }

    /// Parse a raw message as delivered by an input port.
    ///
    /// A note-on with zero velocity is reported as a note-off. System
    /// messages and truncated data yield `None`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let status = *bytes.first()?;
        let channel = status & 0x0f;
        let d1 = bytes.get(1).copied().map(|b| b & 0x7f);
        let d2 = bytes.get(2).copied().map(|b| b & 0x7f);
        let event = match status & 0xf0 {
            0x80 => Self::NoteOff {
                channel,
                note: d1?,
                velocity: d2?,
            },
            0x90 => {
                let (note, velocity) = (d1?, d2?);
                if velocity == 0 {
                    Self::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    }
                } else {
                    Self::NoteOn {
                        channel,
                        note,
                        velocity,
                    }
                }
            }
            0xa0 => Self::Aftertouch {
                channel,
                note: d1?,
                pressure: d2?,
            },
            0xb0 => Self::ControlChange {
                channel,
                controller: d1?,
                value: d2?,
            },
            0xc0 => Self::ProgramChange {
                channel,
                program: d1?,
            },
            0xd0 => Self::ChannelPressure {
                channel,
                pressure: d1?,
            },
            0xe0 => Self::PitchBend {
                channel,
                value: u16::from(d1?) | (u16::from(d2?) << 7),
            },
            _ => return None,
        };
        Some(event)
    }

    /// Encode as raw bytes. Returns the buffer and the number of bytes used.
    pub fn to_bytes(&self) -> ([u8; 3], usize) {
        match *self {
            Self::NoteOff {
                channel,
                note,
                velocity,
            } => ([0x80 | channel, note, velocity], 3),
            Self::NoteOn {
                channel,
                note,
                velocity,
            } => ([0x90 | channel, note, velocity], 3),
            Self::Aftertouch {
                channel,
                note,
                pressure,
            } => ([0xa0 | channel, note, pressure], 3),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => ([0xb0 | channel, controller, value], 3),
            Self::ProgramChange { channel, program } => ([0xc0 | channel, program, 0], 2),
            Self::ChannelPressure { channel, pressure } => ([0xd0 | channel, pressure, 0], 2),
            Self::PitchBend { channel, value } => (
                [0xe0 | channel, (value & 0x7f) as u8, ((value >> 7) & 0x7f) as u8],
                3,
            ),
        }
    }
}

/// A MIDI event positioned in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedMidiEvent {
    pub time: f64,
    pub event: MidiEvent,
}

impl TimedMidiEvent {
    pub fn new(time: f64, event: MidiEvent) -> Self {
        Self { time, event }
    }
}
