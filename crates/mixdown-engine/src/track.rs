//! Tracks: mixing nodes for clips (audio/MIDI) or member tracks (group).
//!
//! Each track owns a `TrackNode` that the render path pulls through a
//! `TrackTap`: mixer → plugin chain → gain/pan → meter → mute gate. The tap
//! sits in exactly one parent mixer, the master's or a group's.

use std::path::Path;
use std::sync::{Arc, Weak};

use mixdown_audio::{LevelMeter, MeterTap, Mixer, MuteGate, SampleSource, StereoStage};
use mixdown_core::gain::{pan_to_unit, validate_pan, validate_volume};
use mixdown_core::{MidiEvent, MixdownError, Notifier, OperationResult, Result};
use mixdown_plugin::{Plugin, PluginChain, PluginDescriptor};
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clip::{Clip, ClipKind};
use crate::engine::EngineContext;
use crate::events::TrackEvent;
use crate::recording::Recording;

/// Track variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Midi,
    /// Mixes member tracks instead of clips. Cannot be nested.
    Group,
}

// ── Render side ─────────────────────────────────────────────────

pub(crate) struct TrackNode {
    pub(crate) mixer: Mixer,
    pub(crate) chain: PluginChain,
    stage: StereoStage,
    gate: MuteGate,
    meter: LevelMeter,
    events: Notifier<TrackEvent>,
    meter_interval: usize,
}

/// A track's output as one mixer input.
pub(crate) struct TrackTap {
    node: Arc<TrackNode>,
    mix_scratch: Vec<f32>,
    chain_scratch: Vec<f32>,
    meter: MeterTap,
}

impl SampleSource for TrackTap {
    fn read(&mut self, out: &mut [f32]) -> usize {
        let node = &self.node;
        node.mixer.mix(out, &mut self.mix_scratch);
        node.chain.process(out, &mut self.chain_scratch);
        node.stage.process(out);
        if let Some(levels) = self.meter.process(out, &node.meter) {
            node.events.try_notify(TrackEvent::VolumeMeasured {
                left: levels.left,
                right: levels.right,
            });
        }
        node.gate.process(out);
        out.len() / 2
    }
}

// ── Control side ────────────────────────────────────────────────

#[derive(Clone, Default)]
pub(crate) enum Parent {
    #[default]
    Detached,
    Master,
    Group(Weak<TrackShared>),
}

struct TrackState {
    name: String,
    volume: f32,
    pan: f32,
    clips: Vec<Clip>,
    members: Vec<Track>,
    parent: Parent,
    recording: Option<Recording>,
    midi_handler: Option<Uuid>,
}

pub(crate) struct TrackShared {
    id: Uuid,
    kind: TrackKind,
    node: Arc<TrackNode>,
    context: Weak<EngineContext>,
    state: Mutex<TrackState>,
}

impl TrackShared {
    pub(crate) fn node(&self) -> &TrackNode {
        &self.node
    }

    pub(crate) fn context(&self) -> Option<Arc<EngineContext>> {
        self.context.upgrade()
    }
}

/// A mixing node. Clones refer to the same track.
#[derive(Clone)]
pub struct Track {
    shared: Arc<TrackShared>,
}

impl std::fmt::Debug for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Track {
    pub(crate) fn create(kind: TrackKind, name: String, ctx: &Arc<EngineContext>) -> Self {
        let config = ctx.config();
        let chain = match kind {
            TrackKind::Midi => PluginChain::for_midi(config.midi_queue_capacity),
            TrackKind::Audio | TrackKind::Group => PluginChain::for_audio(config.midi_queue_capacity),
        };
        let node = Arc::new(TrackNode {
            mixer: Mixer::new(),
            chain,
            stage: StereoStage::unity(),
            gate: MuteGate::default(),
            meter: LevelMeter::new(),
            events: Notifier::with_capacity(config.event_queue_capacity),
            meter_interval: config.meter_interval_frames(),
        });
        Self {
            shared: Arc::new(TrackShared {
                id: Uuid::new_v4(),
                kind,
                node,
                context: Arc::downgrade(ctx),
                state: Mutex::new(TrackState {
                    name,
                    volume: 0.0,
                    pan: 0.0,
                    clips: Vec::new(),
                    members: Vec::new(),
                    parent: Parent::Detached,
                    recording: None,
                    midi_handler: None,
                }),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<TrackShared>) -> Self {
        Self { shared }
    }

    /// A fresh render tap for attaching this track to a parent mixer.
    pub(crate) fn tap(&self) -> Box<dyn SampleSource> {
        Box::new(TrackTap {
            node: Arc::clone(&self.shared.node),
            mix_scratch: Vec::new(),
            chain_scratch: Vec::new(),
            meter: MeterTap::new(self.shared.node.meter_interval),
        })
    }

    pub(crate) fn set_parent(&self, parent: Parent) {
        self.shared.state.lock().parent = parent;
    }

    fn take_parent(&self) -> Parent {
        std::mem::take(&mut self.shared.state.lock().parent)
    }

    /// Unplug from the current parent mixer, whichever it is.
    pub(crate) fn detach(&self) {
        match self.take_parent() {
            Parent::Detached => {}
            Parent::Master => {
                if let Some(ctx) = self.shared.context() {
                    ctx.master().detach(self.id());
                }
            }
            Parent::Group(group) => {
                if let Some(group) = group.upgrade() {
                    Track::from_shared(group).detach_member(self.id());
                }
            }
        }
    }

    fn notify(&self, event: TrackEvent) {
        self.shared.node.events.notify(event);
    }

    fn context(&self) -> Result<Arc<EngineContext>> {
        self.shared
            .context()
            .ok_or_else(|| MixdownError::InvalidState("the track's engine has shut down".into()))
    }

    fn require_group(&self, what: &str) -> Result<()> {
        if self.shared.kind != TrackKind::Group {
            return Err(MixdownError::NotSupported(format!("{what} is only supported on group tracks")));
        }
        Ok(())
    }

    // ── Attributes ──────────────────────────────────────────────

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn kind(&self) -> TrackKind {
        self.shared.kind
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<TrackEvent> {
        self.shared.node.events.subscribe()
    }

    pub fn name(&self) -> String {
        self.shared.state.lock().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.shared.state.lock().name = name.clone();
        self.notify(TrackEvent::NameChanged(name));
    }

    pub fn is_muted(&self) -> bool {
        self.shared.node.gate.is_muted()
    }

    pub fn set_muted(&self, muted: bool) {
        self.shared.node.gate.set_muted(muted);
        self.notify(TrackEvent::MuteChanged(muted));
    }

    /// Volume in dB.
    pub fn volume(&self) -> f32 {
        self.shared.state.lock().volume
    }

    pub fn set_volume(&self, db: f32) -> Result<()> {
        validate_volume(db)?;
        self.shared.state.lock().volume = db;
        self.shared.node.stage.set_gain_db(db);
        self.notify(TrackEvent::VolumeChanged(db));
        Ok(())
    }

    /// Pan in `[-50, 50]`.
    pub fn pan(&self) -> f32 {
        self.shared.state.lock().pan
    }

    pub fn set_pan(&self, pan: f32) -> Result<()> {
        validate_pan(pan)?;
        self.shared.state.lock().pan = pan;
        self.shared.node.stage.set_pan(pan_to_unit(pan));
        self.notify(TrackEvent::PanChanged(pan));
        Ok(())
    }

    /// Most recent left peak after gain/pan.
    pub fn left_channel_gain(&self) -> f32 {
        self.shared.node.meter.left()
    }

    pub fn right_channel_gain(&self) -> f32 {
        self.shared.node.meter.right()
    }

    // ── Clips ───────────────────────────────────────────────────

    /// Add a clip. A clip already in another track is moved here.
    pub fn add_clip(&self, clip: Clip) -> OperationResult {
        let expected = match self.shared.kind {
            TrackKind::Audio => ClipKind::Audio,
            TrackKind::Midi => ClipKind::Midi,
            TrackKind::Group => return OperationResult::failure("group tracks hold tracks, not clips"),
        };
        if clip.kind() != expected {
            return OperationResult::failure(format!(
                "cannot add a {:?} clip to a {:?} track",
                clip.kind(),
                self.shared.kind
            ));
        }
        if self.shared.state.lock().clips.iter().any(|c| c.id() == clip.id()) {
            return OperationResult::failure(format!("clip '{}' is already in this track", clip.name()));
        }
        if let Some(previous) = clip.track() {
            previous.remove_clip(clip.id());
        }
        self.attach_clip(clip);
        OperationResult::success()
    }

    fn attach_clip(&self, clip: Clip) {
        let id = clip.id();
        clip.bind(Arc::downgrade(&self.shared));
        self.shared.state.lock().clips.push(clip);
        debug!(track = %self.shared.id, clip = %id, "clip added");
        self.notify(TrackEvent::ClipAdded(id));
    }

    /// Stop, unbind and return the clip `id`.
    pub fn remove_clip(&self, id: Uuid) -> Option<Clip> {
        let clip = {
            let mut st = self.shared.state.lock();
            let pos = st.clips.iter().position(|c| c.id() == id)?;
            st.clips.remove(pos)
        };
        clip.stop();
        clip.unbind();
        debug!(track = %self.shared.id, clip = %id, "clip removed");
        self.notify(TrackEvent::ClipRemoved(id));
        Some(clip)
    }

    pub fn remove_all_clips(&self) {
        let clips = std::mem::take(&mut self.shared.state.lock().clips);
        for clip in clips {
            clip.stop();
            clip.unbind();
            self.notify(TrackEvent::ClipRemoved(clip.id()));
        }
    }

    pub fn clip(&self, id: Uuid) -> Option<Clip> {
        self.shared.state.lock().clips.iter().find(|c| c.id() == id).cloned()
    }

    pub fn clips(&self) -> Vec<Clip> {
        self.shared.state.lock().clips.clone()
    }

    fn require_clip(&self, id: Uuid) -> Result<Clip> {
        self.clip(id)
            .ok_or_else(|| MixdownError::InvalidArgument(format!("no clip {id} in this track")))
    }

    /// Split clip `id` at `t` and add the right-hand part to this track.
    pub fn split_clip(&self, id: Uuid, t: f64) -> Result<Clip> {
        let right = self.require_clip(id)?.split(t)?;
        self.attach_clip(right.clone());
        Ok(right)
    }

    pub fn split_clip_from_to(&self, id: Uuid, a: f64, b: f64) -> Result<(Clip, Clip)> {
        let (middle, right) = self.require_clip(id)?.split_from_to(a, b)?;
        self.attach_clip(middle.clone());
        self.attach_clip(right.clone());
        Ok((middle, right))
    }

    pub fn cut_out_clip(&self, id: Uuid, a: f64, b: f64) -> Result<Clip> {
        let right = self.require_clip(id)?.cut_out(a, b)?;
        self.attach_clip(right.clone());
        Ok(right)
    }

    pub fn duplicate_clip(&self, id: Uuid) -> Result<Clip> {
        let copy = self.require_clip(id)?.duplicate();
        self.attach_clip(copy.clone());
        Ok(copy)
    }

    /// Stop every clip; on a group, every member track.
    pub fn stop_sounds(&self) {
        let (clips, members) = {
            let st = self.shared.state.lock();
            (st.clips.clone(), st.members.clone())
        };
        for clip in clips {
            clip.stop();
        }
        for member in members {
            member.stop_sounds();
        }
        self.shared.node.chain.midi_queue().clear();
    }

    // ── Plugins ─────────────────────────────────────────────────

    pub fn add_plugin(&self, plugin: Box<dyn Plugin>) -> OperationResult {
        let id = plugin.id();
        let result = self.shared.node.chain.add(plugin);
        if result.is_success() {
            self.notify(TrackEvent::PluginAdded(id));
        }
        result
    }

    pub fn remove_plugin(&self, id: Uuid) -> bool {
        let removed = self.shared.node.chain.remove(id);
        if removed {
            self.notify(TrackEvent::PluginRemoved(id));
        }
        removed
    }

    pub fn swap_effects(&self, i: usize, j: usize) -> OperationResult {
        self.shared.node.chain.swap_effects(i, j)
    }

    pub fn remove_all_plugins(&self) {
        let mut ids: Vec<Uuid> = self.effects().into_iter().map(|p| p.id).collect();
        ids.extend(self.instrument().map(|p| p.id));
        self.shared.node.chain.remove_all();
        for id in ids {
            self.notify(TrackEvent::PluginRemoved(id));
        }
    }

    pub fn instrument(&self) -> Option<PluginDescriptor> {
        self.shared.node.chain.instrument()
    }

    pub fn effects(&self) -> Vec<PluginDescriptor> {
        self.shared.node.chain.effects()
    }

    pub fn set_plugin_enabled(&self, id: Uuid, enabled: bool) -> Result<()> {
        Ok(self.shared.node.chain.set_enabled(id, enabled)?)
    }

    pub fn open_plugin_editor(&self, id: Uuid) -> Result<()> {
        Ok(self.shared.node.chain.open_editor(id)?)
    }

    pub fn close_plugin_editor(&self, id: Uuid) -> Result<()> {
        Ok(self.shared.node.chain.close_editor(id)?)
    }

    /// Send an event straight to this track's instrument.
    pub fn send_midi_event(&self, event: MidiEvent) -> bool {
        self.shared.node.chain.midi_queue().push(event)
    }

    // ── Live MIDI input ─────────────────────────────────────────

    pub fn receives_midi_input(&self) -> bool {
        self.shared.state.lock().midi_handler.is_some()
    }

    /// Forward the engine's MIDI input to this track's instrument.
    pub fn set_receive_midi_input(&self, receive: bool) -> Result<()> {
        if self.shared.kind != TrackKind::Midi {
            return Err(MixdownError::NotSupported("only MIDI tracks receive MIDI input".into()));
        }
        let ctx = self.context()?;
        let mut st = self.shared.state.lock();
        match (receive, st.midi_handler) {
            (true, None) => {
                let queue = self.shared.node.chain.midi_queue().clone();
                st.midi_handler = Some(ctx.midi_dispatcher().register(Arc::new(move |_, event| {
                    queue.push(event);
                })));
            }
            (false, Some(handler)) => {
                ctx.midi_dispatcher().unregister(handler);
                st.midi_handler = None;
            }
            _ => {}
        }
        Ok(())
    }

    // ── Groups ──────────────────────────────────────────────────

    /// Move `member` into this group, out of the master bus or another group.
    pub fn add_track(&self, member: &Track) -> Result<()> {
        self.require_group("adding member tracks")?;
        if member.kind() == TrackKind::Group {
            return Err(MixdownError::InvalidArgument("group tracks cannot be nested".into()));
        }
        if self.contains_member(member.id()) {
            return Ok(());
        }
        member.detach();
        self.shared.node.mixer.add_input(member.id(), member.tap());
        member.set_parent(Parent::Group(Arc::downgrade(&self.shared)));
        self.shared.state.lock().members.push(member.clone());
        info!(group = %self.shared.id, track = %member.id(), "track moved into group");
        self.notify(TrackEvent::TrackAdded(member.id()));
        Ok(())
    }

    /// Take `id` out of this group. With `point_to_master` the track is
    /// attached to the master bus, otherwise it is left unrouted.
    pub fn remove_track(&self, id: Uuid, point_to_master: bool) -> Result<Option<Track>> {
        self.require_group("removing member tracks")?;
        let Some(member) = self.detach_member(id) else {
            return Ok(None);
        };
        member.set_parent(Parent::Detached);
        if point_to_master {
            self.context()?.master().add_track(&member);
        }
        Ok(Some(member))
    }

    fn detach_member(&self, id: Uuid) -> Option<Track> {
        let member = {
            let mut st = self.shared.state.lock();
            let pos = st.members.iter().position(|t| t.id() == id)?;
            st.members.remove(pos)
        };
        self.shared.node.mixer.remove_input(id);
        debug!(group = %self.shared.id, track = %id, "track left group");
        self.notify(TrackEvent::TrackRemoved(id));
        Some(member)
    }

    pub fn members(&self) -> Vec<Track> {
        self.shared.state.lock().members.clone()
    }

    /// Whether `id` is a member routed through this group's mixer.
    pub fn contains_member(&self, id: Uuid) -> bool {
        self.shared.state.lock().members.iter().any(|t| t.id() == id) && self.shared.node.mixer.contains(id)
    }

    /// The group this track is routed through.
    pub fn parent_group(&self) -> Option<Track> {
        match &self.shared.state.lock().parent {
            Parent::Group(group) => group.upgrade().map(Track::from_shared),
            _ => None,
        }
    }

    pub fn is_on_master(&self) -> bool {
        matches!(self.shared.state.lock().parent, Parent::Master)
    }

    // ── Recording ───────────────────────────────────────────────

    pub fn is_recording(&self) -> bool {
        self.shared.state.lock().recording.is_some()
    }

    /// Start recording into `path`. No-op while already recording.
    ///
    /// Audio tracks capture from the engine's capture backend; MIDI tracks
    /// record the engine's MIDI input and fail with `PreconditionFailed`
    /// when none is selected.
    pub fn start_recording(&self, path: impl AsRef<Path>) -> Result<()> {
        if self.shared.kind == TrackKind::Group {
            return Err(MixdownError::NotSupported("group tracks cannot record".into()));
        }
        if self.is_recording() {
            return Ok(());
        }
        let ctx = self.context()?;
        let recording = match self.shared.kind {
            TrackKind::Midi => Recording::start_midi(&ctx, path.as_ref())?,
            _ => Recording::start_audio(&ctx, path.as_ref())?,
        };
        self.shared.state.lock().recording = Some(recording);
        info!(track = %self.shared.id, path = %path.as_ref().display(), "recording started");
        self.notify(TrackEvent::RecordingStateChanged(true));
        Ok(())
    }

    /// Finish recording and add the take to this track as a new clip.
    /// Returns `None` when not recording.
    pub fn stop_recording(&self) -> Result<Option<Clip>> {
        if self.shared.kind == TrackKind::Group {
            return Err(MixdownError::NotSupported("group tracks cannot record".into()));
        }
        let Some(recording) = self.shared.state.lock().recording.take() else {
            return Ok(None);
        };
        self.notify(TrackEvent::RecordingStateChanged(false));
        let clip = recording.finish()?;
        info!(track = %self.shared.id, clip = %clip.id(), "recording stopped");
        self.attach_clip(clip.clone());
        Ok(Some(clip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Engine;
    use mixdown_audio::{AudioFile, MemoryCapture, OfflineSink};
    use mixdown_core::EngineConfig;
    use mixdown_midi::{MidiSequence, VirtualMidiBackend};
    use mixdown_plugin::{PluginKind, Utility};

    fn engine() -> (Engine, OfflineSink) {
        let engine = Engine::with_manual_automation(EngineConfig::default().with_sample_rate(100)).unwrap();
        let sink = OfflineSink::new();
        engine.set_output_device(Box::new(sink.clone())).unwrap();
        (engine, sink)
    }

    fn tone(seconds: usize, value: f32) -> Clip {
        Clip::from_audio(AudioFile::from_samples("tone.wav", 100, 2, vec![value; seconds * 200]))
    }

    struct Synth {
        id: Uuid,
        received: Arc<Mutex<Vec<MidiEvent>>>,
    }

    impl Plugin for Synth {
        fn id(&self) -> Uuid {
            self.id
        }
        fn name(&self) -> &str {
            "synth"
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
            self.received.lock().push(event);
        }
    }

    #[test]
    fn test_add_clip_checks_kind_and_duplicates() {
        let (engine, _sink) = engine();
        let audio = engine.create_audio_track("a");
        let midi = engine.create_midi_track("m");
        let clip = tone(1, 0.5);

        assert!(midi.add_clip(clip.clone()).is_failure());
        assert!(audio.add_clip(clip.clone()).is_success());
        assert!(audio.add_clip(clip.clone()).is_failure());
        assert_eq!(clip.track(), Some(audio.clone()));

        let seq = Clip::from_sequence(MidiSequence::from_events(Vec::new(), 1.0));
        assert!(audio.add_clip(seq.clone()).is_failure());
        assert!(midi.add_clip(seq).is_success());
    }

    #[test]
    fn test_add_clip_moves_between_tracks() {
        let (engine, _sink) = engine();
        let first = engine.create_audio_track("1");
        let second = engine.create_audio_track("2");
        let clip = tone(1, 0.5);
        first.add_clip(clip.clone());
        second.add_clip(clip.clone());

        assert!(first.clips().is_empty());
        assert_eq!(second.clips(), vec![clip.clone()]);
        assert_eq!(clip.track(), Some(second));
    }

    #[test]
    fn test_track_renders_clip_through_gain_and_mute() {
        let (engine, sink) = engine();
        let track = engine.create_audio_track("t");
        let clip = tone(2, 0.5);
        track.add_clip(clip.clone());
        track.set_pan(50.0).unwrap();
        clip.play().unwrap();

        let out = sink.pull(10);
        assert!((out[0]).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);

        track.set_muted(true);
        let out = sink.pull(10);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_remove_clip_stops_and_unbinds() {
        let (engine, _sink) = engine();
        let track = engine.create_audio_track("t");
        let clip = tone(1, 0.5);
        track.add_clip(clip.clone());
        clip.play().unwrap();

        let removed = track.remove_clip(clip.id()).unwrap();
        assert_eq!(removed, clip);
        assert!(!clip.is_playing());
        assert!(!clip.is_in_track());
        assert!(track.remove_clip(clip.id()).is_none());
    }

    #[test]
    fn test_split_clip_inserts_sibling() {
        let (engine, _sink) = engine();
        let track = engine.create_audio_track("t");
        let clip = tone(4, 0.5);
        track.add_clip(clip.clone());

        let right = track.split_clip(clip.id(), 1.0).unwrap();
        assert_eq!(track.clips().len(), 2);
        assert_eq!(right.track(), Some(track.clone()));
        assert!(track.split_clip(Uuid::new_v4(), 1.0).is_err());

        let (middle, tail) = track.split_clip_from_to(right.id(), 2.0, 3.0).unwrap();
        assert_eq!(middle.start_marker(), 2.0);
        assert_eq!(tail.start_marker(), 3.0);
        assert_eq!(track.clips().len(), 4);
    }

    #[test]
    fn test_instrument_rejected_on_audio_track() {
        let (engine, _sink) = engine();
        let audio = engine.create_audio_track("a");
        let synth = Synth {
            id: Uuid::new_v4(),
            received: Arc::default(),
        };
        assert!(audio.add_plugin(Box::new(synth)).is_failure());
        assert!(audio.add_plugin(Box::new(Utility::new())).is_success());
        assert_eq!(audio.effects().len(), 1);
        audio.remove_all_plugins();
        assert!(audio.effects().is_empty());
    }

    #[test]
    fn test_midi_input_reaches_instrument() {
        let (engine, sink) = engine();
        let backend = VirtualMidiBackend::new(["keys"]);
        engine.set_midi_input(&backend, "keys").unwrap();

        let track = engine.create_midi_track("m");
        let received = Arc::new(Mutex::new(Vec::new()));
        let synth = Synth {
            id: Uuid::new_v4(),
            received: Arc::clone(&received),
        };
        assert!(track.add_plugin(Box::new(synth)).is_success());
        track.set_receive_midi_input(true).unwrap();

        backend.send("keys", 0, &[0x90, 60, 100]);
        sink.pull(10);
        assert_eq!(received.lock().len(), 1);

        track.set_receive_midi_input(false).unwrap();
        backend.send("keys", 0, &[0x80, 60, 0]);
        sink.pull(10);
        assert_eq!(received.lock().len(), 1);
    }

    #[test]
    fn test_group_membership_moves_output() {
        let (engine, _sink) = engine();
        let group = engine.create_group_track("g");
        let track = engine.create_audio_track("t");
        assert!(engine.master().is_attached(track.id()));

        group.add_track(&track).unwrap();
        assert!(group.contains_member(track.id()));
        assert!(!engine.master().is_attached(track.id()));
        assert_eq!(track.parent_group(), Some(group.clone()));

        let other = engine.create_group_track("g2");
        assert!(matches!(group.add_track(&other), Err(MixdownError::InvalidArgument(_))));
        assert!(matches!(track.add_track(&other), Err(MixdownError::NotSupported(_))));

        let removed = group.remove_track(track.id(), false).unwrap();
        assert_eq!(removed, Some(track.clone()));
        assert!(!group.contains_member(track.id()));
        assert!(!engine.master().is_attached(track.id()));
        assert!(!track.is_on_master());
    }

    #[test]
    fn test_group_cannot_hold_clips_or_record() {
        let (engine, _sink) = engine();
        let group = engine.create_group_track("g");
        assert!(group.add_clip(tone(1, 0.5)).is_failure());
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            group.start_recording(dir.path().join("x.wav")),
            Err(MixdownError::NotSupported(_))
        ));
    }

    #[test]
    fn test_audio_recording_adds_clip() {
        let (engine, _sink) = engine();
        engine.set_capture_backend(Arc::new(MemoryCapture::new(100, 2, vec![vec![0.25; 200]; 3])));
        let track = engine.create_audio_track("t");
        let dir = tempfile::tempdir().unwrap();

        assert!(track.stop_recording().unwrap().is_none());
        track.start_recording(dir.path().join("take.wav")).unwrap();
        assert!(track.is_recording());
        let clip = track.stop_recording().unwrap().unwrap();
        assert!(!track.is_recording());
        assert_eq!(track.clips(), vec![clip.clone()]);
        assert!((clip.source_duration() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_midi_recording_requires_input() {
        let (engine, _sink) = engine();
        let track = engine.create_midi_track("m");
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            track.start_recording(dir.path().join("take.mid")),
            Err(MixdownError::PreconditionFailed(_))
        ));

        let backend = VirtualMidiBackend::new(["keys"]);
        engine.set_midi_input(&backend, "keys").unwrap();
        track.start_recording(dir.path().join("take.mid")).unwrap();
        backend.send("keys", 0, &[0x90, 60, 100]);
        let clip = track.stop_recording().unwrap().unwrap();
        assert_eq!(clip.kind(), ClipKind::Midi);
        assert_eq!(track.clips().len(), 1);
    }

    #[test]
    fn test_volume_and_pan_validation() {
        let (engine, _sink) = engine();
        let track = engine.create_audio_track("t");
        assert!(matches!(track.set_volume(7.0), Err(MixdownError::Range(_))));
        assert!(matches!(track.set_pan(-51.0), Err(MixdownError::Range(_))));
        track.set_volume(-6.0).unwrap();
        assert_eq!(track.volume(), -6.0);
    }
}
