//! Clips: a bounded, playable segment of an audio file or MIDI sequence.
//!
//! `Clip` is a cheap handle; clones refer to the same clip. A clip is owned
//! by at most one track and keeps a non-owning link back to it. Playing a
//! clip builds a voice for the track's mixer and registers an automation
//! job; both are tied to a `PlaySession` that `stop` cancels.
//!
//! All times are in source seconds. The playback clock starts at the start
//! marker and advances by `speed` seconds per second of output; automation
//! lanes are evaluated at the clock reading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use mixdown_audio::{convert_rate, AudioFile, SampleSource, StereoStage, WavStreamWriter};
use mixdown_core::gain::{db_to_linear, pan_to_unit, validate_pan, validate_volume, PAN_MAX, PAN_MIN, VOLUME_MAX_DB, VOLUME_MIN_DB};
use mixdown_core::{
    AtomicF32, AutomationLane, AutomationParameter, InterpolationKind, MidiEvent, MixdownError, Notifier, Result,
};
use mixdown_midi::MidiSequence;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::PlaybackClock;
use crate::events::ClipEvent;
use crate::track::{Track, TrackShared};
use crate::voice::{used_channels, AudioRegion, AudioVoice, MidiVoice, PlaySession, VoiceControls, ALL_NOTES_OFF};

/// Audio or MIDI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipKind {
    Audio,
    Midi,
}

/// Where a clip is in its play cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Never played.
    Idle,
    Playing,
    Stopped,
}

/// Result of one automation pass over a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepOutcome {
    Continue,
    Finished,
}

// ── State ───────────────────────────────────────────────────────

enum ClipSource {
    Audio {
        file: AudioFile,
        /// Stereo samples at the engine rate, built on first play.
        rendered: Option<(u32, Arc<[f32]>)>,
    },
    Midi {
        sequence: Arc<MidiSequence>,
    },
}

impl ClipSource {
    fn duration(&self) -> f64 {
        match self {
            Self::Audio { file, .. } => file.duration(),
            Self::Midi { sequence } => sequence.duration(),
        }
    }

    /// Copy for a sibling clip: audio shares the decoded file, MIDI gets its own sequence.
    fn sibling(&self) -> Self {
        match self {
            Self::Audio { file, rendered } => Self::Audio {
                file: file.clone(),
                rendered: rendered.clone(),
            },
            Self::Midi { sequence } => Self::Midi {
                sequence: Arc::new(MidiSequence::clone(sequence)),
            },
        }
    }

    fn path(&self) -> Option<PathBuf> {
        match self {
            Self::Audio { file, .. } => Some(file.path().to_path_buf()),
            Self::Midi { sequence } => sequence.path().map(Path::to_path_buf),
        }
    }
}

#[derive(Debug, Clone)]
struct ClipSettings {
    name: String,
    enabled: bool,
    time: f64,
    start_marker: f64,
    end_marker: f64,
    fade_in: f64,
    fade_out: f64,
    volume: f32,
    pan: f32,
    pitch: f32,
    speed: f64,
}

impl ClipSettings {
    fn new(name: String) -> Self {
        Self {
            name,
            enabled: true,
            time: 0.0,
            start_marker: 0.0,
            end_marker: 0.0,
            fade_in: 0.0,
            fade_out: 0.0,
            volume: 0.0,
            pan: 0.0,
            pitch: 0.0,
            speed: 1.0,
        }
    }

    /// Settings a split or cut sibling inherits; markers are set by the caller.
    fn for_sibling(&self) -> Self {
        Self {
            name: self.name.clone(),
            enabled: self.enabled,
            volume: self.volume,
            pan: self.pan,
            pitch: self.pitch,
            speed: self.speed,
            ..Self::new(String::new())
        }
    }
}

struct ClipState {
    settings: ClipSettings,
    automations: BTreeMap<AutomationParameter, AutomationLane>,
    source: ClipSource,
    track: Option<Weak<TrackShared>>,
    session: Option<Arc<PlaySession>>,
    played: bool,
}

impl ClipState {
    fn source_duration(&self) -> f64 {
        self.source.duration()
    }

    /// End of the playable region: the end marker, or the source end.
    fn region_end(&self) -> f64 {
        if self.settings.end_marker > 0.0 {
            self.settings.end_marker
        } else {
            self.source_duration()
        }
    }

    fn is_playing(&self) -> bool {
        self.session.as_ref().map(|s| !s.has_ended()).unwrap_or(false)
    }

    fn track(&self) -> Option<Arc<TrackShared>> {
        self.track.as_ref().and_then(Weak::upgrade)
    }

    fn check_split_point(&self, t: f64, what: &str) -> Result<()> {
        let (start, end) = (self.settings.start_marker, self.region_end());
        if !(t > start && t < end) {
            return Err(MixdownError::Range(format!(
                "{what} {t:.3}s must be strictly between {start:.3}s and {end:.3}s"
            )));
        }
        Ok(())
    }
}

pub(crate) struct ClipShared {
    id: Uuid,
    kind: ClipKind,
    state: Mutex<ClipState>,
    stage: Arc<StereoStage>,
    pitch: Arc<AtomicF32>,
    clock: Arc<PlaybackClock>,
    notifier: Notifier<ClipEvent>,
}

// ── Clip ────────────────────────────────────────────────────────

/// A playable audio or MIDI segment.
#[derive(Clone)]
pub struct Clip {
    shared: Arc<ClipShared>,
}

impl std::fmt::Debug for Clip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clip")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .field("name", &self.name())
            .finish()
    }
}

impl PartialEq for Clip {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Clip {
    fn new(name: String, source: ClipSource, settings: Option<ClipSettings>) -> Self {
        let kind = match source {
            ClipSource::Audio { .. } => ClipKind::Audio,
            ClipSource::Midi { .. } => ClipKind::Midi,
        };
        let settings = settings.unwrap_or_else(|| ClipSettings::new(name));
        let start = settings.start_marker;
        Self {
            shared: Arc::new(ClipShared {
                id: Uuid::new_v4(),
                kind,
                stage: Arc::new(StereoStage::new(
                    db_to_linear(settings.volume),
                    pan_to_unit(settings.pan),
                )),
                pitch: Arc::new(AtomicF32::new(settings.pitch)),
                clock: Arc::new(PlaybackClock::new(start)),
                state: Mutex::new(ClipState {
                    settings,
                    automations: BTreeMap::new(),
                    source,
                    track: None,
                    session: None,
                    played: false,
                }),
                notifier: Notifier::new(),
            }),
        }
    }

    /// Open a clip from a file: `.mid`/`.midi` as MIDI, anything else as WAV.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let is_midi = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("mid") || e.eq_ignore_ascii_case("midi"))
            .unwrap_or(false);
        if is_midi {
            Self::open_midi(path)
        } else {
            Self::open_audio(path)
        }
    }

    pub fn open_audio(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_audio(AudioFile::open(path)?))
    }

    pub fn open_midi(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_sequence(MidiSequence::open(path)?))
    }

    pub fn from_audio(file: AudioFile) -> Self {
        let name = stem(file.path());
        Self::new(name, ClipSource::Audio { file, rendered: None }, None)
    }

    pub fn from_sequence(sequence: MidiSequence) -> Self {
        let name = sequence.path().map(stem).unwrap_or_else(|| "MIDI".to_string());
        Self::new(
            name,
            ClipSource::Midi {
                sequence: Arc::new(sequence),
            },
            None,
        )
    }

    fn sibling(&self, state: &ClipState, settings: ClipSettings) -> Self {
        let clip = Self::new(settings.name.clone(), state.source.sibling(), Some(settings));
        clip.shared.state.lock().automations = state.automations.clone();
        clip
    }

    pub(crate) fn from_shared(shared: Arc<ClipShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn kind(&self) -> ClipKind {
        self.shared.kind
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<ClipEvent> {
        self.shared.notifier.subscribe()
    }

    fn notify(&self, event: ClipEvent) {
        self.shared.notifier.notify(event);
    }

    fn require_audio(&self, what: &str) -> Result<()> {
        match self.shared.kind {
            ClipKind::Audio => Ok(()),
            ClipKind::Midi => Err(MixdownError::NotSupported(format!("{what} is not supported on MIDI clips"))),
        }
    }

    // ── Track binding ───────────────────────────────────────────

    pub(crate) fn bind(&self, track: Weak<TrackShared>) {
        self.shared.state.lock().track = Some(track);
    }

    pub(crate) fn unbind(&self) {
        self.shared.state.lock().track = None;
    }

    /// The track this clip belongs to.
    pub fn track(&self) -> Option<Track> {
        self.shared.state.lock().track().map(Track::from_shared)
    }

    pub fn is_in_track(&self) -> bool {
        self.shared.state.lock().track().is_some()
    }

    // ── Attributes ──────────────────────────────────────────────

    pub fn name(&self) -> String {
        self.shared.state.lock().settings.name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.shared.state.lock().settings.name = name.clone();
        self.notify(ClipEvent::NameChanged(name));
    }

    pub fn enabled(&self) -> bool {
        self.shared.state.lock().settings.enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.state.lock().settings.enabled = enabled;
        self.notify(ClipEvent::EnabledChanged(enabled));
    }

    /// Position on the host's timeline. Not used for playback.
    pub fn time(&self) -> f64 {
        self.shared.state.lock().settings.time
    }

    pub fn set_time(&self, time: f64) -> Result<()> {
        if !(time.is_finite() && time >= 0.0) {
            return Err(MixdownError::Range(format!("clip time must be >= 0, got {time}")));
        }
        self.shared.state.lock().settings.time = time;
        self.notify(ClipEvent::TimeChanged(time));
        Ok(())
    }

    pub fn start_marker(&self) -> f64 {
        self.shared.state.lock().settings.start_marker
    }

    pub fn set_start_marker(&self, start: f64) -> Result<()> {
        {
            let mut st = self.shared.state.lock();
            let duration = st.source_duration();
            let end = st.settings.end_marker;
            if !(start >= 0.0 && start < duration) || (end > 0.0 && start >= end) {
                return Err(MixdownError::Range(format!(
                    "start marker {start:.3}s must be in [0, {:.3}s)",
                    if end > 0.0 { end } else { duration }
                )));
            }
            st.settings.start_marker = start;
        }
        self.notify(ClipEvent::StartMarkerChanged(start));
        Ok(())
    }

    /// End of the playable region; `0` plays to the end of the source.
    pub fn end_marker(&self) -> f64 {
        self.shared.state.lock().settings.end_marker
    }

    pub fn set_end_marker(&self, end: f64) -> Result<()> {
        {
            let mut st = self.shared.state.lock();
            let duration = st.source_duration();
            let start = st.settings.start_marker;
            if end != 0.0 && !(end > start && end <= duration) {
                return Err(MixdownError::Range(format!(
                    "end marker {end:.3}s must be 0 or in ({start:.3}s, {duration:.3}s]"
                )));
            }
            st.settings.end_marker = end;
        }
        self.notify(ClipEvent::EndMarkerChanged(end));
        Ok(())
    }

    pub fn fade_in(&self) -> f64 {
        self.shared.state.lock().settings.fade_in
    }

    pub fn set_fade_in(&self, seconds: f64) -> Result<()> {
        self.require_audio("fading")?;
        let mut st = self.shared.state.lock();
        let duration = st.source_duration();
        if !(0.0..=duration).contains(&seconds) || seconds + st.settings.fade_out >= duration {
            return Err(MixdownError::Range(format!(
                "fade-in {seconds:.3}s must be in [0, {duration:.3}s] and leave fade-in + fade-out below {duration:.3}s"
            )));
        }
        st.settings.fade_in = seconds;
        Ok(())
    }

    pub fn fade_out(&self) -> f64 {
        self.shared.state.lock().settings.fade_out
    }

    pub fn set_fade_out(&self, seconds: f64) -> Result<()> {
        self.require_audio("fading")?;
        let mut st = self.shared.state.lock();
        let duration = st.source_duration();
        if !(seconds >= 0.0 && st.settings.fade_in + seconds < duration) {
            return Err(MixdownError::Range(format!(
                "fade-out {seconds:.3}s must be >= 0 and leave fade-in + fade-out below {duration:.3}s"
            )));
        }
        st.settings.fade_out = seconds;
        Ok(())
    }

    /// Volume in dB.
    pub fn volume(&self) -> f32 {
        self.shared.state.lock().settings.volume
    }

    pub fn set_volume(&self, db: f32) -> Result<()> {
        self.require_audio("volume")?;
        validate_volume(db)?;
        self.shared.state.lock().settings.volume = db;
        self.shared.stage.set_gain_db(db);
        self.notify(ClipEvent::VolumeChanged(db));
        Ok(())
    }

    /// Pan in `[-50, 50]`.
    pub fn pan(&self) -> f32 {
        self.shared.state.lock().settings.pan
    }

    pub fn set_pan(&self, pan: f32) -> Result<()> {
        self.require_audio("panning")?;
        validate_pan(pan)?;
        self.shared.state.lock().settings.pan = pan;
        self.shared.stage.set_pan(pan_to_unit(pan));
        self.notify(ClipEvent::PanChanged(pan));
        Ok(())
    }

    /// Pitch shift in semitones.
    pub fn pitch(&self) -> f32 {
        self.shared.state.lock().settings.pitch
    }

    pub fn set_pitch(&self, semitones: f32) -> Result<()> {
        self.require_audio("pitch shifting")?;
        if !semitones.is_finite() {
            return Err(MixdownError::Range(format!("pitch must be finite, got {semitones}")));
        }
        self.shared.state.lock().settings.pitch = semitones;
        self.shared.pitch.store(semitones);
        self.notify(ClipEvent::PitchChanged(semitones));
        Ok(())
    }

    pub fn speed(&self) -> f64 {
        self.shared.state.lock().settings.speed
    }

    /// Playback speed (`> 0`). Cannot change while playing.
    pub fn set_speed(&self, speed: f64) -> Result<()> {
        self.require_audio("speed")?;
        if !(speed.is_finite() && speed > 0.0) {
            return Err(MixdownError::Range(format!("speed must be > 0, got {speed}")));
        }
        let mut st = self.shared.state.lock();
        if st.is_playing() {
            return Err(MixdownError::InvalidState("cannot change speed while playing".into()));
        }
        st.settings.speed = speed;
        Ok(())
    }

    /// Length of the source in seconds.
    pub fn source_duration(&self) -> f64 {
        self.shared.state.lock().source_duration()
    }

    /// Playing time of the region between the markers at the current speed.
    pub fn duration(&self) -> f64 {
        let st = self.shared.state.lock();
        (st.region_end() - st.settings.start_marker) / st.settings.speed
    }

    /// Current playback clock reading in source seconds.
    pub fn current_time(&self) -> f64 {
        self.shared.clock.now()
    }

    pub fn file_path(&self) -> Option<PathBuf> {
        self.shared.state.lock().source.path()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().is_playing()
    }

    pub fn playback_state(&self) -> PlaybackState {
        let st = self.shared.state.lock();
        if st.is_playing() {
            PlaybackState::Playing
        } else if st.played {
            PlaybackState::Stopped
        } else {
            PlaybackState::Idle
        }
    }

    // ── Automation ──────────────────────────────────────────────

    /// Insert a point, or update the point already at `time`.
    pub fn add_automation_point(
        &self,
        parameter: AutomationParameter,
        time: f64,
        value: f64,
        kind: InterpolationKind,
    ) -> Result<()> {
        let mut st = self.shared.state.lock();
        st.automations
            .entry(parameter)
            .or_insert_with(|| AutomationLane::new(parameter))
            .set(time, value, kind)
    }

    pub fn remove_automation_point(&self, parameter: AutomationParameter, time: f64) -> bool {
        let mut st = self.shared.state.lock();
        let Some(lane) = st.automations.get_mut(&parameter) else {
            return false;
        };
        let removed = lane.remove(time);
        if lane.is_empty() {
            st.automations.remove(&parameter);
        }
        removed
    }

    pub fn clear_automation(&self, parameter: AutomationParameter) {
        self.shared.state.lock().automations.remove(&parameter);
    }

    pub fn clear_all_automations(&self) {
        self.shared.state.lock().automations.clear();
    }

    /// Copy of the lane for `parameter`.
    pub fn automation(&self, parameter: AutomationParameter) -> Option<AutomationLane> {
        self.shared.state.lock().automations.get(&parameter).cloned()
    }

    pub fn automated_parameters(&self) -> Vec<AutomationParameter> {
        self.shared.state.lock().automations.keys().copied().collect()
    }

    // ── Playback ────────────────────────────────────────────────

    /// Start playing from the start marker.
    ///
    /// No-op while already playing or when disabled. Fails with
    /// `InvalidState` if the clip is not in a track.
    pub fn play(&self) -> Result<()> {
        let mut st = self.shared.state.lock();
        let track = st
            .track()
            .ok_or_else(|| MixdownError::InvalidState("clip must be inside a track to be played".into()))?;
        if st.is_playing() || !st.settings.enabled {
            return Ok(());
        }
        let ctx = track
            .context()
            .ok_or_else(|| MixdownError::InvalidState("the clip's engine has shut down".into()))?;
        let sample_rate = ctx.config().sample_rate;

        if let Some(stale) = st.session.take() {
            stale.cancel();
            track.node().mixer.remove_input(self.shared.id);
        }

        let session = PlaySession::new();
        let controls = VoiceControls {
            stage: Arc::clone(&self.shared.stage),
            pitch: Arc::clone(&self.shared.pitch),
            clock: Arc::clone(&self.shared.clock),
            session: Arc::clone(&session),
        };
        let start = st.settings.start_marker;
        let end = st.region_end();
        let settings = st.settings.clone();

        let voice: Box<dyn SampleSource> = match &mut st.source {
            ClipSource::Audio { file, rendered } => {
                let samples = playback_samples(file, rendered, sample_rate)?;
                self.shared.stage.set_gain_db(settings.volume);
                self.shared.stage.set_pan(pan_to_unit(settings.pan));
                self.shared.pitch.store(settings.pitch);
                Box::new(AudioVoice::new(
                    AudioRegion {
                        samples,
                        sample_rate,
                        start,
                        end,
                        fade_in: settings.fade_in,
                        fade_out: settings.fade_out,
                        speed: settings.speed,
                    },
                    controls,
                )?)
            }
            ClipSource::Midi { sequence } => Box::new(MidiVoice::new(
                Arc::clone(sequence),
                start,
                end,
                sample_rate,
                track.node().chain.midi_queue().clone(),
                controls,
            )),
        };

        self.shared.clock.set(start);
        track.node().mixer.add_input(self.shared.id, voice);
        ctx.scheduler()
            .register(Arc::downgrade(&self.shared), Arc::clone(&session));
        st.session = Some(session);
        st.played = true;
        drop(st);

        info!(clip = %self.shared.id, start, end, "clip playing");
        self.notify(ClipEvent::PlaybackStarted);
        Ok(())
    }

    /// Stop playing and rewind the clock to the start marker. No-op when not playing.
    pub fn stop(&self) {
        let mut st = self.shared.state.lock();
        let Some(session) = st.session.take() else {
            return;
        };
        self.end_session(&st, &session);
        self.shared.clock.set(st.settings.start_marker);
        drop(st);

        info!(clip = %self.shared.id, "clip stopped");
        self.notify(ClipEvent::PlaybackStopped { natural: false });
    }

    /// Stop at the current position, keeping the clock where it is.
    fn stop_naturally(&self, session: &Arc<PlaySession>) {
        let mut st = self.shared.state.lock();
        if st.session.as_ref().map(|s| s.id()) != Some(session.id()) {
            return;
        }
        st.session = None;
        self.end_session(&st, session);
        drop(st);

        debug!(clip = %self.shared.id, at = self.shared.clock.now(), "clip reached its end");
        self.notify(ClipEvent::PlaybackStopped { natural: true });
    }

    fn end_session(&self, st: &ClipState, session: &PlaySession) {
        session.cancel();
        if let Some(track) = st.track() {
            track.node().mixer.remove_input(self.shared.id);
            if let ClipSource::Midi { sequence } = &st.source {
                let queue = track.node().chain.midi_queue();
                let mask = used_channels(sequence);
                for channel in (0..16u8).filter(|c| mask & (1 << c) != 0) {
                    queue.push(MidiEvent::control_change(channel, ALL_NOTES_OFF, 0));
                }
            }
        }
    }

    /// Jump to `time` (source seconds) while playing.
    pub fn seek(&self, time: f64) -> Result<()> {
        let st = self.shared.state.lock();
        let session = match &st.session {
            Some(session) if !session.has_ended() => Arc::clone(session),
            _ => return Err(MixdownError::InvalidState("cannot seek a clip that is not playing".into())),
        };
        let (start, end) = (st.settings.start_marker, st.region_end());
        if !(time >= start && time < end) {
            return Err(MixdownError::Range(format!(
                "seek time {time:.3}s must be in [{start:.3}s, {end:.3}s)"
            )));
        }
        session.request_seek(time);
        self.shared.clock.set(time);
        Ok(())
    }

    /// One automation pass, run by the scheduler.
    pub(crate) fn automation_step(&self, session: &Arc<PlaySession>) -> StepOutcome {
        let (time, end, values) = {
            let st = self.shared.state.lock();
            if st.session.as_ref().map(|s| s.id()) != Some(session.id()) {
                return StepOutcome::Finished;
            }
            if session.has_ended() {
                drop(st);
                self.stop_naturally(session);
                return StepOutcome::Finished;
            }
            let time = self.shared.clock.now();
            let values: SmallVec<[(AutomationParameter, f64); 4]> = st
                .automations
                .values()
                .filter(|lane| !lane.is_empty())
                .map(|lane| (lane.parameter(), lane.evaluate(time)))
                .collect();
            (time, st.settings.end_marker, values)
        };

        if end > 0.0 && time >= end {
            self.stop_naturally(session);
            return StepOutcome::Finished;
        }
        for (parameter, value) in values {
            self.apply_parameter(parameter, value);
        }
        StepOutcome::Continue
    }

    /// Push an automated value into the live clip.
    ///
    /// Audio clips update volume, pan or pitch. MIDI clips send the
    /// parameter's controller to the track's instrument.
    pub fn apply_parameter(&self, parameter: AutomationParameter, value: f64) {
        match self.shared.kind {
            ClipKind::Audio => {
                let Some(event) = apply_to_stages(parameter, value, &self.shared.stage, &self.shared.pitch) else {
                    return;
                };
                let changed = {
                    let mut st = self.shared.state.lock();
                    let s = &mut st.settings;
                    match &event {
                        ClipEvent::VolumeChanged(v) if s.volume != *v => {
                            s.volume = *v;
                            true
                        }
                        ClipEvent::PanChanged(v) if s.pan != *v => {
                            s.pan = *v;
                            true
                        }
                        ClipEvent::PitchChanged(v) if s.pitch != *v => {
                            s.pitch = *v;
                            true
                        }
                        _ => false,
                    }
                };
                if changed {
                    self.notify(event);
                }
            }
            ClipKind::Midi => {
                let Some(controller) = parameter.midi_controller() else {
                    return;
                };
                let Some(track) = self.shared.state.lock().track() else {
                    return;
                };
                let value = value.clamp(0.0, 127.0) as u8;
                if !track
                    .node()
                    .chain
                    .midi_queue()
                    .push(MidiEvent::control_change(0, controller, value))
                {
                    warn!(clip = %self.shared.id, %parameter, "instrument queue full, automation dropped");
                }
            }
        }
    }

    // ── Editing ─────────────────────────────────────────────────

    /// Split at `t`: this clip now ends at `t` and the returned sibling
    /// covers `[t, old end)`. The sibling is not in any track.
    pub fn split(&self, t: f64) -> Result<Clip> {
        let sibling = {
            let mut st = self.shared.state.lock();
            st.check_split_point(t, "split point")?;
            let mut settings = st.settings.for_sibling();
            settings.start_marker = t;
            settings.end_marker = st.settings.end_marker;
            st.settings.end_marker = t;
            self.sibling(&st, settings)
        };
        debug!(clip = %self.shared.id, at = t, sibling = %sibling.id(), "clip split");
        self.notify(ClipEvent::EndMarkerChanged(t));
        Ok(sibling)
    }

    /// Carve `[a, b)` out into a middle clip; this clip ends at `a`.
    /// Returns `(middle, right)` where `right` covers `[b, old end)`.
    pub fn split_from_to(&self, a: f64, b: f64) -> Result<(Clip, Clip)> {
        let (middle, right) = {
            let mut st = self.shared.state.lock();
            check_span(a, b)?;
            st.check_split_point(a, "split start")?;
            st.check_split_point(b, "split end")?;

            let mut middle = st.settings.for_sibling();
            middle.start_marker = a;
            middle.end_marker = b;
            let mut right = st.settings.for_sibling();
            right.start_marker = b;
            right.end_marker = st.settings.end_marker;
            st.settings.end_marker = a;
            (self.sibling(&st, middle), self.sibling(&st, right))
        };
        self.notify(ClipEvent::EndMarkerChanged(a));
        Ok((middle, right))
    }

    /// Discard `[a, b)`: this clip ends at `a` and the returned clip covers
    /// `[b, old end)`.
    pub fn cut_out(&self, a: f64, b: f64) -> Result<Clip> {
        let right = {
            let mut st = self.shared.state.lock();
            check_span(a, b)?;
            st.check_split_point(a, "cut start")?;
            st.check_split_point(b, "cut end")?;

            let mut right = st.settings.for_sibling();
            right.start_marker = b;
            right.end_marker = st.settings.end_marker;
            st.settings.end_marker = a;
            self.sibling(&st, right)
        };
        self.notify(ClipEvent::EndMarkerChanged(a));
        Ok(right)
    }

    /// An independent copy with identical settings and automation.
    pub fn duplicate(&self) -> Clip {
        let st = self.shared.state.lock();
        self.sibling(&st, st.settings.clone())
    }

    /// Reverse the audio into `<dir>/<name>_rev.wav` and play that from now on.
    ///
    /// Any `_rev` suffix is stripped from the name first, so reversing twice
    /// overwrites the same file. Returns the path written.
    pub fn reverse(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let file = {
            let st = self.shared.state.lock();
            if st.is_playing() {
                return Err(MixdownError::InvalidState("cannot reverse a playing clip".into()));
            }
            match &st.source {
                ClipSource::Audio { file, .. } => file.clone(),
                ClipSource::Midi { .. } => return Err(MixdownError::NotSupported("cannot reverse a MIDI clip".into())),
            }
        };

        let base = stem(file.path()).replace("_rev", "");
        let dir = dir.as_ref();
        let tmp = dir.join(format!("{base}_rev_tmp.wav"));
        let target = dir.join(format!("{base}_rev.wav"));

        let channels = file.channels() as usize;
        let reversed: Vec<f32> = file
            .samples()
            .chunks_exact(channels)
            .rev()
            .flatten()
            .copied()
            .collect();

        let written = AudioFile::write_wav(&tmp, file.sample_rate(), file.channels(), &reversed).and_then(|()| {
            if target.exists() {
                std::fs::remove_file(&target)
                    .map_err(|e| MixdownError::resource(&target, "remove previous reversed file", e))?;
            }
            std::fs::rename(&tmp, &target).map_err(|e| MixdownError::resource(&target, "move reversed file", e))
        });
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        let reversed_file = AudioFile::open(&target)?;
        self.shared.state.lock().source = ClipSource::Audio {
            file: reversed_file,
            rendered: None,
        };
        info!(clip = %self.shared.id, path = %target.display(), "clip reversed");
        self.notify(ClipEvent::SourceChanged);
        Ok(target)
    }

    /// Render the processed clip (markers, speed, pitch, fades, gain/pan and
    /// automation) to a 32-bit float stereo WAV at the source's sample rate.
    pub fn render_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let (file, settings, automations, end) = {
            let st = self.shared.state.lock();
            let ClipSource::Audio { file, .. } = &st.source else {
                return Err(MixdownError::NotSupported("cannot render a MIDI clip".into()));
            };
            (file.clone(), st.settings.clone(), st.automations.clone(), st.region_end())
        };

        let sample_rate = file.sample_rate();
        let stage = Arc::new(StereoStage::new(db_to_linear(settings.volume), pan_to_unit(settings.pan)));
        let pitch = Arc::new(AtomicF32::new(settings.pitch));
        let clock = Arc::new(PlaybackClock::new(settings.start_marker));
        let mut voice = AudioVoice::new(
            AudioRegion {
                samples: file.to_stereo().into(),
                sample_rate,
                start: settings.start_marker,
                end,
                fade_in: settings.fade_in,
                fade_out: settings.fade_out,
                speed: settings.speed,
            },
            VoiceControls {
                stage: Arc::clone(&stage),
                pitch: Arc::clone(&pitch),
                clock: Arc::clone(&clock),
                session: PlaySession::new(),
            },
        )?;

        let block = (sample_rate as usize / 10).max(1);
        let mut buf = vec![0.0f32; block * 2];
        let rendered = WavStreamWriter::create(path, sample_rate, 2).and_then(|mut writer| {
            loop {
                let now = clock.now();
                for lane in automations.values().filter(|l| !l.is_empty()) {
                    apply_to_stages(lane.parameter(), lane.evaluate(now), &stage, &pitch);
                }
                let n = voice.read(&mut buf);
                writer.write(&buf[..n * 2])?;
                if n < block {
                    break;
                }
            }
            writer.finalize()
        });
        if let Err(e) = rendered {
            let _ = std::fs::remove_file(path);
            return Err(e);
        }
        info!(clip = %self.shared.id, path = %path.display(), "clip rendered");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn check_span(a: f64, b: f64) -> Result<()> {
    if b <= a {
        return Err(MixdownError::Range(format!(
            "end {b:.3}s must be greater than start {a:.3}s"
        )));
    }
    Ok(())
}

/// Stereo samples at `sample_rate`, converting and caching on first use.
fn playback_samples(file: &AudioFile, rendered: &mut Option<(u32, Arc<[f32]>)>, sample_rate: u32) -> Result<Arc<[f32]>> {
    if let Some((rate, samples)) = rendered {
        if *rate == sample_rate {
            return Ok(Arc::clone(samples));
        }
    }
    let stereo = file.to_stereo();
    let samples: Arc<[f32]> = if file.sample_rate() == sample_rate {
        stereo.into()
    } else {
        debug!(from = file.sample_rate(), to = sample_rate, "converting clip sample rate");
        convert_rate(&stereo, 2, file.sample_rate(), sample_rate)?.into()
    };
    *rendered = Some((sample_rate, Arc::clone(&samples)));
    Ok(samples)
}

/// Write an automated audio parameter into the live stages. Returns the
/// resulting attribute change, or `None` for parameters audio ignores.
fn apply_to_stages(
    parameter: AutomationParameter,
    value: f64,
    stage: &StereoStage,
    pitch: &AtomicF32,
) -> Option<ClipEvent> {
    match parameter {
        AutomationParameter::Volume => {
            let db = (value as f32).clamp(VOLUME_MIN_DB, VOLUME_MAX_DB);
            stage.set_gain_db(db);
            Some(ClipEvent::VolumeChanged(db))
        }
        AutomationParameter::Pan => {
            let pan = (value as f32).clamp(PAN_MIN, PAN_MAX);
            stage.set_pan(pan_to_unit(pan));
            Some(ClipEvent::PanChanged(pan))
        }
        AutomationParameter::Pitch => {
            pitch.store(value as f32);
            Some(ClipEvent::PitchChanged(value as f32))
        }
        _ => None,
    }
}
