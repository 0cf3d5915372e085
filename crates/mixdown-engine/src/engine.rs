//! Engine context: configuration, automation scheduler, master bus and the
//! selected devices.
//!
//! There is no global state; every track holds a weak link to the context
//! that created it.

use std::sync::Arc;

use mixdown_audio::{CaptureBackend, CpalCapture, DeviceSink, RenderSource};
use mixdown_core::{EngineConfig, MixdownError, Notifier, Result, CHANNELS};
use mixdown_midi::{MidiDispatcher, MidiInputBackend, MidiInputConnection};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::events::EngineEvent;
use crate::master::MasterBus;
use crate::scheduler::AutomationScheduler;
use crate::track::{Track, TrackKind};

pub(crate) struct EngineContext {
    config: EngineConfig,
    scheduler: AutomationScheduler,
    master: MasterBus,
    sink: Mutex<Option<Box<dyn DeviceSink>>>,
    midi_dispatcher: Arc<MidiDispatcher>,
    midi_input: Mutex<Option<Box<dyn MidiInputConnection>>>,
    capture: RwLock<Arc<dyn CaptureBackend>>,
    events: Notifier<EngineEvent>,
}

impl EngineContext {
    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn scheduler(&self) -> &AutomationScheduler {
        &self.scheduler
    }

    pub(crate) fn master(&self) -> &MasterBus {
        &self.master
    }

    pub(crate) fn midi_dispatcher(&self) -> &Arc<MidiDispatcher> {
        &self.midi_dispatcher
    }

    pub(crate) fn midi_input_name(&self) -> Option<String> {
        self.midi_input.lock().as_ref().map(|c| c.name().to_string())
    }

    pub(crate) fn capture_backend(&self) -> Arc<dyn CaptureBackend> {
        Arc::clone(&self.capture.read())
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.scheduler.cancel_all();
        if let Some(mut sink) = self.sink.get_mut().take() {
            if let Err(e) = sink.stop() {
                warn!(device = %sink.name(), "failed to stop output device: {}", e);
            }
        }
        if let Some(connection) = self.midi_input.get_mut().take() {
            connection.close();
        }
        debug!("engine shut down");
    }
}

/// Handle to an engine. Clones share the same engine; it shuts down when
/// the last handle is dropped.
#[derive(Clone)]
pub struct Engine {
    ctx: Arc<EngineContext>,
}

impl Engine {
    /// Create an engine whose automation runs on its own thread.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = AutomationScheduler::start(config.automation_period())?;
        Ok(Self::with_scheduler(config, scheduler))
    }

    /// Create an engine whose automation advances only on `tick_automation`.
    pub fn with_manual_automation(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let scheduler = AutomationScheduler::manual(config.automation_period());
        Ok(Self::with_scheduler(config, scheduler))
    }

    fn with_scheduler(config: EngineConfig, scheduler: AutomationScheduler) -> Self {
        let master = MasterBus::new(config.sample_rate, config.meter_interval_ms, config.event_queue_capacity);
        info!(
            sample_rate = config.sample_rate,
            block_frames = config.block_frames,
            automation_hz = config.automation_rate_hz,
            "engine created"
        );
        Self {
            ctx: Arc::new(EngineContext {
                events: Notifier::with_capacity(config.event_queue_capacity),
                config,
                scheduler,
                master,
                sink: Mutex::new(None),
                midi_dispatcher: Arc::new(MidiDispatcher::new()),
                midi_input: Mutex::new(None),
                capture: RwLock::new(Arc::new(CpalCapture::new())),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn master(&self) -> &MasterBus {
        &self.ctx.master
    }

    pub fn subscribe(&self) -> crossbeam_channel::Receiver<EngineEvent> {
        self.ctx.events.subscribe()
    }

    /// Run one automation pass now. Returns the number of clips still automated.
    pub fn tick_automation(&self) -> usize {
        self.ctx.scheduler.tick()
    }

    pub fn active_automation_jobs(&self) -> usize {
        self.ctx.scheduler.active_jobs()
    }

    // ── Tracks ──────────────────────────────────────────────────

    fn create_track(&self, kind: TrackKind, name: impl Into<String>) -> Track {
        let track = Track::create(kind, name.into(), &self.ctx);
        self.ctx.master.add_track(&track);
        info!(track = %track.id(), ?kind, name = %track.name(), "track created");
        track
    }

    pub fn create_audio_track(&self, name: impl Into<String>) -> Track {
        self.create_track(TrackKind::Audio, name)
    }

    pub fn create_midi_track(&self, name: impl Into<String>) -> Track {
        self.create_track(TrackKind::Midi, name)
    }

    pub fn create_group_track(&self, name: impl Into<String>) -> Track {
        self.create_track(TrackKind::Group, name)
    }

    // ── Devices ─────────────────────────────────────────────────

    /// Switch output device.
    ///
    /// The previous device is stopped and every playing clip stops with it.
    /// The master bus is rebuilt at the configured sample rate with the
    /// same tracks attached, then bound to `sink` and started.
    pub fn set_output_device(&self, mut sink: Box<dyn DeviceSink>) -> Result<()> {
        let mut current = self.ctx.sink.lock();
        if let Some(mut old) = current.take() {
            if let Err(e) = old.stop() {
                warn!(device = %old.name(), "failed to stop output device: {}", e);
            }
            info!(device = %old.name(), "output device released");
        }

        let node = self.ctx.master.rebuild(self.ctx.config.sample_rate);
        let source: Arc<dyn RenderSource> = node;
        sink.initialize(self.ctx.config.sample_rate, CHANNELS, source)?;
        sink.start()?;

        let name = sink.name();
        info!(device = %name, "output device started");
        *current = Some(sink);
        drop(current);
        self.ctx.events.notify(EngineEvent::AudioDeviceChanged(name));
        Ok(())
    }

    pub fn output_device_name(&self) -> Option<String> {
        self.ctx.sink.lock().as_ref().map(|s| s.name())
    }

    /// Names of the input ports `backend` offers.
    pub fn midi_input_names(&self, backend: &dyn MidiInputBackend) -> Result<Vec<String>> {
        backend.enumerate()
    }

    /// Open `name` on `backend` as the engine's MIDI input, replacing the
    /// current one.
    pub fn set_midi_input(&self, backend: &dyn MidiInputBackend, name: &str) -> Result<()> {
        let mut current = self.ctx.midi_input.lock();
        if current.as_ref().map(|c| c.name() == name).unwrap_or(false) {
            return Ok(());
        }
        if let Some(old) = current.take() {
            old.close();
        }
        let connection = backend.open(name, Arc::clone(&self.ctx.midi_dispatcher))?;
        *current = Some(connection);
        drop(current);
        info!(device = %name, "midi input selected");
        self.ctx.events.notify(EngineEvent::MidiDeviceChanged(Some(name.to_string())));
        Ok(())
    }

    pub fn clear_midi_input(&self) {
        let Some(old) = self.ctx.midi_input.lock().take() else {
            return;
        };
        old.close();
        self.ctx.events.notify(EngineEvent::MidiDeviceChanged(None));
    }

    pub fn midi_input_name(&self) -> Option<String> {
        self.ctx.midi_input_name()
    }

    /// Replace the audio capture backend used by track recording.
    pub fn set_capture_backend(&self, backend: Arc<dyn CaptureBackend>) {
        *self.ctx.capture.write() = backend;
    }

    /// Stop every clip on every attached track.
    pub fn stop_all(&self) -> Result<()> {
        if self.ctx.sink.lock().is_none() {
            return Err(MixdownError::PreconditionFailed("no output device is selected".into()));
        }
        self.ctx.master.stop_sounds();
        Ok(())
    }
}
