//! MIDI sequences: standard MIDI files flattened to events in seconds.

use std::path::{Path, PathBuf};

use midly::num::{u14, u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind};
use mixdown_core::{MidiEvent, MixdownError, Result, TimedMidiEvent};
use tracing::debug;

/// Ticks per quarter note used when writing files.
pub const WRITE_TICKS_PER_BEAT: u16 = 480;
/// Tempo used when writing files (120 BPM).
pub const WRITE_MICROS_PER_BEAT: u32 = 500_000;
const DEFAULT_MICROS_PER_BEAT: u32 = 500_000;
const MAX_DELTA: u64 = 0x0fff_ffff;

/// A playable MIDI sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiSequence {
    path: Option<PathBuf>,
    /// Sorted by time.
    events: Vec<TimedMidiEvent>,
    duration: f64,
}

impl MidiSequence {
    /// Parse a standard MIDI file. All tracks are merged.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| MixdownError::resource(path, "read midi file", e))?;
        let mut sequence = Self::parse(&data)
            .map_err(|e| MixdownError::Midi(format!("{}: {}", path.display(), e)))?;
        sequence.path = Some(path.to_path_buf());
        debug!(
            path = %path.display(),
            events = sequence.events.len(),
            duration = sequence.duration,
            "opened midi file"
        );
        Ok(sequence)
    }

    /// Parse SMF bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data).map_err(|e| MixdownError::Midi(format!("invalid midi file: {}", e)))?;
        let clock = TickClock::from_smf(&smf);

        let mut events = Vec::new();
        let mut last_tick = 0u64;
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += u64::from(event.delta.as_int());
                if let TrackEventKind::Midi { channel, message } = event.kind {
                    if let Some(ev) = convert_message(channel.as_int(), message) {
                        events.push(TimedMidiEvent::new(clock.seconds(tick), ev));
                    }
                }
            }
            last_tick = last_tick.max(tick);
        }
        // Stable: events at equal times keep file order.
        events.sort_by(|a, b| a.time.total_cmp(&b.time));

        Ok(Self {
            path: None,
            events,
            duration: clock.seconds(last_tick),
        })
    }

    /// Build a sequence from events; `duration` is extended to cover the last event.
    pub fn from_events(mut events: Vec<TimedMidiEvent>, duration: f64) -> Self {
        events.sort_by(|a, b| a.time.total_cmp(&b.time));
        let last = events.last().map(|e| e.time).unwrap_or(0.0);
        Self {
            path: None,
            events,
            duration: duration.max(last),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn events(&self) -> &[TimedMidiEvent] {
        &self.events
    }

    /// Events with `from <= time < to`.
    pub fn events_between(&self, from: f64, to: f64) -> &[TimedMidiEvent] {
        let start = self.events.partition_point(|e| e.time < from);
        let end = self.events.partition_point(|e| e.time < to);
        &self.events[start..end.max(start)]
    }

    /// Index of the first event at or after `time`.
    pub fn position_of(&self, time: f64) -> usize {
        self.events.partition_point(|e| e.time < time)
    }

    /// Write as a single-track SMF at 120 BPM.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let ticks_per_second = f64::from(WRITE_TICKS_PER_BEAT) * 1_000_000.0 / f64::from(WRITE_MICROS_PER_BEAT);

        let mut track: Vec<TrackEvent<'static>> = Vec::with_capacity(self.events.len() + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(WRITE_MICROS_PER_BEAT))),
        });
        let mut last_tick = 0u64;
        for timed in &self.events {
            let tick = (timed.time.max(0.0) * ticks_per_second).round() as u64;
            let delta = tick.saturating_sub(last_tick);
            last_tick = last_tick.max(tick);
            let (channel, message) = to_midly(&timed.event);
            track.push(TrackEvent {
                delta: u28::new(delta.min(MAX_DELTA) as u32),
                kind: TrackEventKind::Midi {
                    channel: u4::new(channel),
                    message,
                },
            });
        }
        let end_tick = (self.duration * ticks_per_second).round() as u64;
        track.push(TrackEvent {
            delta: u28::new(end_tick.saturating_sub(last_tick).min(MAX_DELTA) as u32),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header::new(Format::SingleTrack, Timing::Metrical(u15::new(WRITE_TICKS_PER_BEAT))),
            tracks: vec![track],
        };
        smf.save(path)
            .map_err(|e| MixdownError::resource(path, "write midi file", e))
    }
}

// ── Tick conversion ─────────────────────────────────────────────

/// Converts absolute ticks to seconds through the file's tempo map.
enum TickClock {
    Metrical {
        ticks_per_beat: f64,
        /// (tick, micros per beat, seconds at tick)
        tempo_map: Vec<(u64, u32, f64)>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl TickClock {
    fn from_smf(smf: &Smf<'_>) -> Self {
        match smf.header.timing {
            Timing::Metrical(tpb) => {
                let ticks_per_beat = f64::from(tpb.as_int().max(1));
                let mut changes: Vec<(u64, u32)> = Vec::new();
                for track in &smf.tracks {
                    let mut tick = 0u64;
                    for event in track {
                        tick += u64::from(event.delta.as_int());
                        if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                            changes.push((tick, tempo.as_int()));
                        }
                    }
                }
                changes.sort_by_key(|c| c.0);
                if changes.first().map(|c| c.0 > 0).unwrap_or(true) {
                    changes.insert(0, (0, DEFAULT_MICROS_PER_BEAT));
                }

                let mut tempo_map = Vec::with_capacity(changes.len());
                let mut seconds = 0.0;
                let mut prev: Option<(u64, u32)> = None;
                for (tick, micros) in changes {
                    if let Some((prev_tick, prev_micros)) = prev {
                        seconds += (tick - prev_tick) as f64 * f64::from(prev_micros) / 1_000_000.0 / ticks_per_beat;
                    }
                    tempo_map.push((tick, micros, seconds));
                    prev = Some((tick, micros));
                }
                Self::Metrical {
                    ticks_per_beat,
                    tempo_map,
                }
            }
            Timing::Timecode(fps, ticks_per_frame) => Self::Timecode {
                ticks_per_second: (f64::from(fps.as_f32()) * f64::from(ticks_per_frame)).max(1.0),
            },
        }
    }

    fn seconds(&self, tick: u64) -> f64 {
        match self {
            Self::Metrical {
                ticks_per_beat,
                tempo_map,
            } => {
                let idx = tempo_map.partition_point(|t| t.0 <= tick).saturating_sub(1);
                let (start_tick, micros, start_seconds) = tempo_map[idx];
                start_seconds + (tick - start_tick) as f64 * f64::from(micros) / 1_000_000.0 / ticks_per_beat
            }
            Self::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
        }
    }
}

// ── Message conversion ──────────────────────────────────────────

fn convert_message(channel: u8, message: MidiMessage) -> Option<MidiEvent> {
    let event = match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => MidiEvent::NoteOff {
            channel,
            note: key.as_int(),
            velocity: 0,
        },
        MidiMessage::NoteOn { key, vel } => MidiEvent::NoteOn {
            channel,
            note: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::NoteOff { key, vel } => MidiEvent::NoteOff {
            channel,
            note: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::Aftertouch { key, vel } => MidiEvent::Aftertouch {
            channel,
            note: key.as_int(),
            pressure: vel.as_int(),
        },
        MidiMessage::Controller { controller, value } => MidiEvent::ControlChange {
            channel,
            controller: controller.as_int(),
            value: value.as_int(),
        },
        MidiMessage::ProgramChange { program } => MidiEvent::ProgramChange {
            channel,
            program: program.as_int(),
        },
        MidiMessage::ChannelAftertouch { vel } => MidiEvent::ChannelPressure {
            channel,
            pressure: vel.as_int(),
        },
        MidiMessage::PitchBend { bend } => MidiEvent::PitchBend {
            channel,
            value: bend.0.as_int(),
        },
    };
    Some(event)
}

fn to_midly(event: &MidiEvent) -> (u8, MidiMessage) {
    let message = match *event {
        MidiEvent::NoteOn { note, velocity, .. } => MidiMessage::NoteOn {
            key: u7::new(note & 0x7f),
            vel: u7::new(velocity & 0x7f),
        },
        MidiEvent::NoteOff { note, velocity, .. } => MidiMessage::NoteOff {
            key: u7::new(note & 0x7f),
            vel: u7::new(velocity & 0x7f),
        },
        MidiEvent::Aftertouch { note, pressure, .. } => MidiMessage::Aftertouch {
            key: u7::new(note & 0x7f),
            vel: u7::new(pressure & 0x7f),
        },
        MidiEvent::ControlChange {
            controller, value, ..
        } => MidiMessage::Controller {
            controller: u7::new(controller & 0x7f),
            value: u7::new(value & 0x7f),
        },
        MidiEvent::ProgramChange { program, .. } => MidiMessage::ProgramChange {
            program: u7::new(program & 0x7f),
        },
        MidiEvent::ChannelPressure { pressure, .. } => MidiMessage::ChannelAftertouch {
            vel: u7::new(pressure & 0x7f),
        },
        MidiEvent::PitchBend { value, .. } => MidiMessage::PitchBend {
            bend: PitchBend(u14::new(value & 0x3fff)),
        },
    };
    (event.channel() & 0x0f, message)
}
