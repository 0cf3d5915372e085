//! Render-side clip outputs.
//!
//! A voice is built by `Clip::play` for one play session and handed to the
//! track's mixer. Control threads reach it only through the shared
//! `PlaySession` flags and the clip's atomic parameters.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mixdown_audio::{FadeEnvelope, FrameReader, SampleSource, SpectralStretch, StereoStage, TimeStretch};
use mixdown_core::{AtomicF32, AtomicF64, CancelFlag, MidiEvent, Result};
use mixdown_midi::{MidiEventQueue, MidiSequence};
use tracing::trace;
use uuid::Uuid;

use crate::clock::PlaybackClock;

/// MIDI controller for "all notes off".
pub(crate) const ALL_NOTES_OFF: u8 = 123;

/// Bit per MIDI channel the sequence uses.
pub(crate) fn used_channels(sequence: &MidiSequence) -> u16 {
    sequence
        .events()
        .iter()
        .fold(0u16, |mask, e| mask | 1 << (e.event.channel() & 0x0f))
}

// ── Session ─────────────────────────────────────────────────────

/// State shared by everything taking part in one play session.
#[derive(Debug)]
pub(crate) struct PlaySession {
    id: Uuid,
    /// Set by the voice once its region is exhausted.
    ended: AtomicBool,
    /// Pending seek target in source seconds; NaN when none.
    seek: AtomicF64,
    /// Cancels the session's automation job.
    cancel: CancelFlag,
}

impl PlaySession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            ended: AtomicBool::new(false),
            seek: AtomicF64::new(f64::NAN),
            cancel: CancelFlag::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    fn mark_ended(&self) {
        self.ended.store(true, Ordering::Release);
    }

    pub fn request_seek(&self, seconds: f64) {
        self.seek.store(seconds);
    }

    fn take_seek(&self) -> Option<f64> {
        let target = self.seek.swap(f64::NAN);
        (!target.is_nan()).then_some(target)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Live handles a voice writes to or reads from every block.
#[derive(Clone)]
pub(crate) struct VoiceControls {
    pub stage: Arc<StereoStage>,
    pub pitch: Arc<AtomicF32>,
    pub clock: Arc<PlaybackClock>,
    pub session: Arc<PlaySession>,
}

// ── Audio ───────────────────────────────────────────────────────

/// Playable region of an audio clip, resolved for one session.
pub(crate) struct AudioRegion {
    /// Interleaved stereo at `sample_rate`.
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub start: f64,
    pub end: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    pub speed: f64,
}

/// Read cursor over a stereo buffer, bounded by the region's end frame.
struct Cursor {
    samples: Arc<[f32]>,
    pos: usize,
    start: usize,
    end: usize,
}

impl FrameReader for Cursor {
    fn read_frames(&mut self, out: &mut [f32]) -> usize {
        let n = (out.len() / 2).min(self.end.saturating_sub(self.pos));
        out[..n * 2].copy_from_slice(&self.samples[self.pos * 2..(self.pos + n) * 2]);
        self.pos += n;
        n
    }
}

/// Audio clip output: stretch, then fades, then gain/pan.
pub(crate) struct AudioVoice {
    cursor: Cursor,
    sample_rate: f64,
    stretch: Box<dyn TimeStretch>,
    fade: FadeEnvelope,
    pitch: f32,
    controls: VoiceControls,
}

impl AudioVoice {
    pub fn new(region: AudioRegion, controls: VoiceControls) -> Result<Self> {
        let sr = f64::from(region.sample_rate.max(1));
        let total = region.samples.len() / 2;
        let to_frame = |seconds: f64| ((seconds * sr).round().max(0.0) as usize).min(total);
        let start = to_frame(region.start);
        let end = to_frame(region.end).max(start);
        let pitch = controls.pitch.load();

        Ok(Self {
            cursor: Cursor {
                samples: region.samples,
                pos: start,
                start,
                end,
            },
            sample_rate: sr,
            stretch: Box::new(SpectralStretch::new(region.sample_rate, region.speed, pitch)),
            fade: FadeEnvelope::new(region.start, region.end, region.fade_in, region.fade_out),
            pitch,
            controls,
        })
    }

    fn apply_seek(&mut self, seconds: f64) {
        let frame = (seconds * self.sample_rate).round().max(0.0) as usize;
        self.cursor.pos = frame.clamp(self.cursor.start, self.cursor.end);
        self.stretch.reset();
    }
}

impl SampleSource for AudioVoice {
    fn read(&mut self, out: &mut [f32]) -> usize {
        if let Some(target) = self.controls.session.take_seek() {
            self.apply_seek(target);
        }
        let pitch = self.controls.pitch.load();
        if pitch != self.pitch {
            self.pitch = pitch;
            self.stretch.set_pitch_semitones(pitch);
        }

        let wanted = out.len() / 2;
        let before = self.cursor.pos;
        let produced = self.stretch.process(&mut self.cursor, &mut out[..wanted * 2]);
        let consumed = self.cursor.pos - before;

        if !self.fade.is_flat() && produced > 0 {
            let step = consumed as f64 / produced as f64;
            for (i, frame) in out[..produced * 2].chunks_exact_mut(2).enumerate() {
                let pos = (before as f64 + i as f64 * step) / self.sample_rate;
                let gain = self.fade.gain_at(pos);
                frame[0] *= gain;
                frame[1] *= gain;
            }
        }
        self.controls.stage.process(&mut out[..produced * 2]);
        self.controls.clock.set(self.cursor.pos as f64 / self.sample_rate);

        if produced < wanted {
            trace!("audio voice exhausted");
            self.controls.session.mark_ended();
        }
        produced
    }
}

// ── MIDI ────────────────────────────────────────────────────────

/// MIDI clip output: renders silence and schedules the sequence's events
/// into the track's instrument queue one block at a time.
pub(crate) struct MidiVoice {
    sequence: Arc<MidiSequence>,
    next: usize,
    position: f64,
    end: f64,
    sample_rate: f64,
    queue: MidiEventQueue,
    /// Bit per channel used by the sequence.
    channels: u16,
    controls: VoiceControls,
}

impl MidiVoice {
    pub fn new(
        sequence: Arc<MidiSequence>,
        start: f64,
        end: f64,
        sample_rate: u32,
        queue: MidiEventQueue,
        controls: VoiceControls,
    ) -> Self {
        let channels = used_channels(&sequence);
        Self {
            next: sequence.position_of(start),
            sequence,
            position: start,
            end,
            sample_rate: f64::from(sample_rate.max(1)),
            queue,
            channels,
            controls,
        }
    }

    /// Silence every channel the sequence touches.
    fn release_notes(&self) {
        for channel in 0..16u8 {
            if self.channels & (1 << channel) != 0 {
                self.queue.push(MidiEvent::control_change(channel, ALL_NOTES_OFF, 0));
            }
        }
    }
}

impl SampleSource for MidiVoice {
    fn read(&mut self, out: &mut [f32]) -> usize {
        if let Some(target) = self.controls.session.take_seek() {
            self.position = target;
            self.next = self.sequence.position_of(target);
            self.release_notes();
        }
        out.fill(0.0);
        if self.position >= self.end {
            return 0;
        }

        let wanted = out.len() / 2;
        let block_end = self.position + wanted as f64 / self.sample_rate;
        let limit = block_end.min(self.end);
        let events = self.sequence.events();
        while self.next < events.len() && events[self.next].time < limit {
            if !self.queue.push(events[self.next].event) {
                trace!("instrument queue full, midi event dropped");
            }
            self.next += 1;
        }

        let produced = if block_end >= self.end {
            let remaining = ((self.end - self.position) * self.sample_rate).ceil() as usize;
            self.release_notes();
            remaining.min(wanted)
        } else {
            wanted
        };
        self.position = limit;
        self.controls.clock.set(self.position);
        if produced < wanted {
            self.controls.session.mark_ended();
        }
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_core::TimedMidiEvent;

    fn controls() -> VoiceControls {
        VoiceControls {
            stage: Arc::new(StereoStage::unity()),
            pitch: Arc::new(AtomicF32::new(0.0)),
            clock: Arc::new(PlaybackClock::default()),
            session: PlaySession::new(),
        }
    }

    fn region(frames: usize, sample_rate: u32) -> AudioRegion {
        AudioRegion {
            samples: vec![1.0f32; frames * 2].into(),
            sample_rate,
            start: 0.0,
            end: frames as f64 / f64::from(sample_rate),
            fade_in: 0.0,
            fade_out: 0.0,
            speed: 1.0,
        }
    }

    #[test]
    fn test_audio_voice_plays_region_and_ends() {
        let c = controls();
        let mut r = region(100, 100);
        r.start = 0.5;
        let mut voice = AudioVoice::new(r, c.clone()).unwrap();

        let mut out = vec![0.0f32; 80];
        assert_eq!(voice.read(&mut out), 40);
        assert!((c.clock.now() - 0.9).abs() < 1e-9);
        assert!(!c.session.has_ended());

        assert_eq!(voice.read(&mut out), 10);
        assert!(c.session.has_ended());
        assert!((c.clock.now() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_audio_voice_applies_fades_and_gain() {
        let c = controls();
        c.stage.set_gain(0.5);
        let mut r = region(100, 100);
        r.fade_in = 0.5;
        let mut voice = AudioVoice::new(r, c).unwrap();

        let mut out = vec![0.0f32; 200];
        assert_eq!(voice.read(&mut out), 100);
        assert_eq!(out[0], 0.0);
        // frame 25 is halfway through the fade-in
        assert!((out[50] - 0.25).abs() < 1e-6);
        assert!((out[160] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_audio_voice_seek() {
        let c = controls();
        let mut voice = AudioVoice::new(region(100, 100), c.clone()).unwrap();
        c.session.request_seek(0.75);
        let mut out = vec![0.0f32; 100];
        assert_eq!(voice.read(&mut out), 25);
        assert!(c.session.has_ended());
    }

    #[test]
    fn test_midi_voice_schedules_events_per_block() {
        let c = controls();
        let queue = MidiEventQueue::new(64);
        let seq = MidiSequence::from_events(
            vec![
                TimedMidiEvent::new(0.0, MidiEvent::control_change(0, 1, 1)),
                TimedMidiEvent::new(0.5, MidiEvent::control_change(0, 1, 2)),
                TimedMidiEvent::new(1.5, MidiEvent::control_change(0, 1, 3)),
            ],
            2.0,
        );
        let mut voice = MidiVoice::new(Arc::new(seq), 0.0, 1.0, 100, queue.clone(), c.clone());

        let mut out = vec![1.0f32; 2 * 40];
        assert_eq!(voice.read(&mut out), 40);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(queue.len(), 1);

        assert_eq!(voice.read(&mut out), 40);
        assert_eq!(queue.len(), 2);

        // 0.2s left: partial block, the event at 1.5s is outside the region
        assert_eq!(voice.read(&mut out), 20);
        assert!(c.session.has_ended());
        let mut values = Vec::new();
        queue.drain(|e| {
            if let MidiEvent::ControlChange { controller, value, .. } = e {
                values.push((controller, value));
            }
        });
        assert_eq!(values, vec![(1, 1), (1, 2), (ALL_NOTES_OFF, 0)]);
        assert_eq!(voice.read(&mut out), 0);
    }
}
