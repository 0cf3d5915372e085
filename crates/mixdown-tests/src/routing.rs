//! Tracks, groups, plugins and the master bus.

use std::sync::{Arc, Mutex};

use mixdown_core::gain::db_to_linear;
use mixdown_core::MidiEvent;
use mixdown_midi::VirtualMidiBackend;
use mixdown_plugin::{Plugin, PluginKind, Utility};
use uuid::Uuid;

use crate::support::{constant_clip, left, offline_engine};

struct Sine {
    id: Uuid,
}

impl Plugin for Sine {
    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        "sine"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Instrument
    }
    fn is_enabled(&self) -> bool {
        true
    }
    fn set_enabled(&mut self, _enabled: bool) {}
    fn process(&mut self, _input: &[f32], output: &mut [f32], frames: usize) {
        output[..frames * 2].fill(0.25);
    }
    fn receive_midi_event(&mut self, _event: MidiEvent) {}
}

struct Listener {
    id: Uuid,
    heard: Arc<Mutex<Vec<MidiEvent>>>,
}

impl Plugin for Listener {
    fn id(&self) -> Uuid {
        self.id
    }
    fn name(&self) -> &str {
        "listener"
    }
    fn kind(&self) -> PluginKind {
        PluginKind::Instrument
    }
    fn is_enabled(&self) -> bool {
        true
    }
    fn set_enabled(&mut self, _enabled: bool) {}
    fn process(&mut self, _input: &[f32], output: &mut [f32], frames: usize) {
        output[..frames * 2].fill(0.0);
    }
    fn receive_midi_event(&mut self, event: MidiEvent) {
        self.heard.lock().unwrap().push(event);
    }
}

#[test]
fn group_move_then_removal_to_master() {
    let (engine, _sink) = offline_engine();
    let group = engine.create_group_track("bus");
    let track = engine.create_audio_track("vocals");

    group.add_track(&track).unwrap();
    assert!(group.contains_member(track.id()));
    assert!(!engine.master().is_attached(track.id()));
    assert!(!engine.master().tracks().contains(&track.id()));

    let removed = group.remove_track(track.id(), true).unwrap();
    assert_eq!(removed.as_ref().map(|t| t.id()), Some(track.id()));
    assert!(engine.master().is_attached(track.id()));
    assert!(!group.contains_member(track.id()));
    assert!(track.is_on_master());
    assert!(track.parent_group().is_none());
}

#[test]
fn group_applies_its_gain_to_members() {
    let (engine, sink) = offline_engine();
    let group = engine.create_group_track("bus");
    let track = engine.create_audio_track("drums");
    group.add_track(&track).unwrap();
    group.set_volume(-6.0).unwrap();

    let clip = constant_clip(1, 1.0);
    track.add_clip(clip.clone());
    clip.play().unwrap();

    let out = sink.pull(10);
    assert!((left(&out, 0) - db_to_linear(-6.0)).abs() < 1e-6);

    group.set_muted(true);
    let out = sink.pull(10);
    assert_eq!(left(&out, 0), 0.0);
    group.stop_sounds();
    assert!(!clip.is_playing());
}

#[test]
fn moving_between_groups_never_doubles_output() {
    let (engine, sink) = offline_engine();
    let a = engine.create_group_track("a");
    let b = engine.create_group_track("b");
    let track = engine.create_audio_track("t");
    a.add_track(&track).unwrap();
    b.add_track(&track).unwrap();
    assert!(!a.contains_member(track.id()));
    assert!(b.contains_member(track.id()));

    let clip = constant_clip(1, 0.5);
    track.add_clip(clip.clone());
    clip.play().unwrap();
    let out = sink.pull(10);
    assert!((left(&out, 0) - 0.5).abs() < 1e-6);
}

#[test]
fn instrument_is_rejected_on_audio_tracks_only() {
    let (engine, sink) = offline_engine();
    let audio = engine.create_audio_track("audio");
    let midi = engine.create_midi_track("midi");

    let rejected = audio.add_plugin(Box::new(Sine { id: Uuid::new_v4() }));
    assert!(rejected.is_failure());
    assert!(audio.instrument().is_none());

    let sine = Uuid::new_v4();
    assert!(midi.add_plugin(Box::new(Sine { id: sine })).is_success());
    assert_eq!(midi.instrument().map(|p| p.id), Some(sine));
    let out = sink.pull(4);
    assert_eq!(left(&out, 0), 0.25);

    let replacement = Uuid::new_v4();
    let replaced = midi.add_plugin(Box::new(Sine { id: replacement }));
    assert!(replaced.is_success());
    assert_eq!(midi.instrument().map(|p| p.id), Some(replacement));
}

#[test]
fn utility_effect_runs_in_the_track_chain() {
    let (engine, sink) = offline_engine();
    let track = engine.create_audio_track("fx");
    let utility = Utility::new();
    let params = utility.params();
    track.add_plugin(Box::new(utility));
    params.set_volume(0.5).unwrap();
    params.set_invert_left(true);

    let clip = constant_clip(1, 1.0);
    track.add_clip(clip.clone());
    clip.play().unwrap();
    let out = sink.pull(2);
    assert!((out[0] + 0.5).abs() < 1e-6);
    assert!((out[1] - 0.5).abs() < 1e-6);

    assert!(track.swap_effects(0, 3).is_failure());
}

#[test]
fn live_midi_input_is_shared_by_tracks_that_listen() {
    let (engine, sink) = offline_engine();
    let backend = VirtualMidiBackend::new(["pads"]);
    engine.set_midi_input(&backend, "pads").unwrap();

    let heard = Arc::new(Mutex::new(Vec::new()));
    let mut tracks = Vec::new();
    for name in ["one", "two"] {
        let track = engine.create_midi_track(name);
        track.add_plugin(Box::new(Listener {
            id: Uuid::new_v4(),
            heard: Arc::clone(&heard),
        }));
        track.set_receive_midi_input(true).unwrap();
        tracks.push(track);
    }
    assert!(tracks.iter().all(|t| t.receives_midi_input()));

    assert_eq!(backend.send("pads", 0, &[0x90, 36, 100]), 1);
    sink.pull(4);
    let note = MidiEvent::NoteOn {
        channel: 0,
        note: 36,
        velocity: 100,
    };
    assert_eq!(*heard.lock().unwrap(), vec![note, note]);

    tracks[1].set_receive_midi_input(false).unwrap();
    backend.send("pads", 1, &[0x90, 38, 90]);
    sink.pull(4);
    assert_eq!(heard.lock().unwrap().len(), 3);

    let audio = engine.create_audio_track("audio");
    assert!(audio.set_receive_midi_input(true).is_err());
}
