//! The master bus: root of the mixing graph.
//!
//! The render state (`MasterNode`) is rebuilt on every output device
//! change; the attached tracks and the master volume/pan survive it.

use std::sync::Arc;

use mixdown_audio::{LevelMeter, MeterTap, Mixer, RenderSource, StereoStage};
use mixdown_core::gain::{db_to_linear, pan_to_unit, validate_pan, validate_volume};
use mixdown_core::{Notifier, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::events::MasterEvent;
use crate::track::{Parent, Track};

struct RenderState {
    scratch: Vec<f32>,
    meter: MeterTap,
}

/// Root mixer, master gain/pan and meter, as bound to a device sink.
pub(crate) struct MasterNode {
    mixer: Mixer,
    stage: StereoStage,
    meter: LevelMeter,
    render: Mutex<RenderState>,
    events: Arc<Notifier<MasterEvent>>,
    sample_rate: u32,
}

impl RenderSource for MasterNode {
    fn render(&self, out: &mut [f32]) -> usize {
        let Some(mut state) = self.render.try_lock() else {
            trace!("master render already in progress, rendering silence");
            out.fill(0.0);
            return out.len() / 2;
        };
        let RenderState { scratch, meter } = &mut *state;
        self.mixer.mix(out, scratch);
        self.stage.process(out);
        if let Some(levels) = meter.process(out, &self.meter) {
            self.events.try_notify(MasterEvent::VolumeMeasured {
                left: levels.left,
                right: levels.right,
            });
        }
        out.len() / 2
    }
}

struct MasterSettings {
    volume: f32,
    pan: f32,
    meter_interval_ms: u32,
}

/// The master bus. Clones refer to the same bus.
#[derive(Clone)]
pub struct MasterBus {
    node: Arc<RwLock<Arc<MasterNode>>>,
    tracks: Arc<Mutex<Vec<Track>>>,
    settings: Arc<Mutex<MasterSettings>>,
    events: Arc<Notifier<MasterEvent>>,
}

impl MasterBus {
    pub(crate) fn new(sample_rate: u32, meter_interval_ms: u32, event_capacity: usize) -> Self {
        let events = Arc::new(Notifier::with_capacity(event_capacity));
        let settings = MasterSettings {
            volume: 0.0,
            pan: 0.0,
            meter_interval_ms,
        };
        let node = Self::build_node(sample_rate, &settings, &events);
        Self {
            node: Arc::new(RwLock::new(node)),
            tracks: Arc::new(Mutex::new(Vec::new())),
            settings: Arc::new(Mutex::new(settings)),
            events,
        }
    }

    fn build_node(
        sample_rate: u32,
        settings: &MasterSettings,
        events: &Arc<Notifier<MasterEvent>>,
    ) -> Arc<MasterNode> {
        let interval = (sample_rate as usize * settings.meter_interval_ms as usize / 1000).max(1);
        Arc::new(MasterNode {
            mixer: Mixer::new(),
            stage: StereoStage::new(db_to_linear(settings.volume), pan_to_unit(settings.pan)),
            meter: LevelMeter::new(),
            render: Mutex::new(RenderState {
                scratch: Vec::new(),
                meter: MeterTap::new(interval),
            }),
            events: Arc::clone(events),
            sample_rate,
        })
    }

    fn current(&self) -> Arc<MasterNode> {
        Arc::clone(&self.node.read())
    }

    /// Tear down the render state and build a new one at `sample_rate`.
    ///
    /// Every attached track's clips are stopped; the tracks themselves are
    /// re-attached to the new root mixer.
    pub(crate) fn rebuild(&self, sample_rate: u32) -> Arc<MasterNode> {
        let tracks = self.tracks.lock().clone();
        for track in &tracks {
            track.stop_sounds();
        }
        let node = {
            let settings = self.settings.lock();
            Self::build_node(sample_rate, &settings, &self.events)
        };
        for track in &tracks {
            node.mixer.add_input(track.id(), track.tap());
        }
        *self.node.write() = Arc::clone(&node);
        info!(sample_rate, tracks = tracks.len(), "master bus rebuilt");
        node
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<MasterEvent> {
        self.events.subscribe()
    }

    pub fn sample_rate(&self) -> u32 {
        self.current().sample_rate
    }

    // ── Tracks ──────────────────────────────────────────────────

    /// Route `track` into the root mixer, taking it out of any group first.
    pub fn add_track(&self, track: &Track) {
        if self.is_attached(track.id()) {
            return;
        }
        track.detach();
        self.current().mixer.add_input(track.id(), track.tap());
        track.set_parent(Parent::Master);
        self.tracks.lock().push(track.clone());
        debug!(track = %track.id(), "track attached to master");
        self.events.notify(MasterEvent::TrackAdded(track.id()));
    }

    /// Unroute the track `id`. Its clips keep playing into a detached node.
    pub fn remove_track(&self, id: Uuid) -> Option<Track> {
        let track = self.detach(id)?;
        track.set_parent(Parent::Detached);
        Some(track)
    }

    pub(crate) fn detach(&self, id: Uuid) -> Option<Track> {
        let track = {
            let mut tracks = self.tracks.lock();
            let pos = tracks.iter().position(|t| t.id() == id)?;
            tracks.remove(pos)
        };
        self.current().mixer.remove_input(id);
        debug!(track = %id, "track detached from master");
        self.events.notify(MasterEvent::TrackRemoved(id));
        Some(track)
    }

    /// Stop every track's sounds, then detach them all.
    pub fn remove_all_tracks(&self) {
        let tracks = self.tracks.lock().clone();
        for track in &tracks {
            track.stop_sounds();
        }
        for track in tracks {
            self.remove_track(track.id());
        }
    }

    /// Ids of the attached top-level tracks.
    pub fn tracks(&self) -> Vec<Uuid> {
        self.tracks.lock().iter().map(Track::id).collect()
    }

    pub fn track(&self, id: Uuid) -> Option<Track> {
        self.tracks.lock().iter().find(|t| t.id() == id).cloned()
    }

    /// Whether `id` is routed into the root mixer.
    pub fn is_attached(&self, id: Uuid) -> bool {
        self.current().mixer.contains(id)
    }

    pub fn stop_sounds(&self) {
        let tracks = self.tracks.lock().clone();
        for track in tracks {
            track.stop_sounds();
        }
    }

    // ── Gain ────────────────────────────────────────────────────

    /// Volume in dB.
    pub fn volume(&self) -> f32 {
        self.settings.lock().volume
    }

    pub fn set_volume(&self, db: f32) -> Result<()> {
        validate_volume(db)?;
        self.settings.lock().volume = db;
        self.current().stage.set_gain_db(db);
        self.events.notify(MasterEvent::VolumeChanged(db));
        Ok(())
    }

    pub fn pan(&self) -> f32 {
        self.settings.lock().pan
    }

    pub fn set_pan(&self, pan: f32) -> Result<()> {
        validate_pan(pan)?;
        self.settings.lock().pan = pan;
        self.current().stage.set_pan(pan_to_unit(pan));
        self.events.notify(MasterEvent::PanChanged(pan));
        Ok(())
    }

    pub fn left_channel_gain(&self) -> f32 {
        self.current().meter.left()
    }

    pub fn right_channel_gain(&self) -> f32 {
        self.current().meter.right()
    }
}
