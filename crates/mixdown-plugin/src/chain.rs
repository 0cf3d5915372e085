//! Plugin chain: one optional instrument slot followed by ordered effects.
//!
//! The slot layout is copy-on-write. Control-thread edits build a new
//! layout and swap it in; the render thread clones the current `Arc` and
//! never waits on a slot (a busy slot is skipped for one block).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mixdown_core::OperationResult;
use mixdown_midi::MidiEventQueue;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::error::PluginError;
use crate::plugin::{Plugin, PluginDescriptor, PluginKind};

struct Slot {
    id: Uuid,
    name: String,
    kind: PluginKind,
    plugin: Mutex<Box<dyn Plugin>>,
    /// Set under the plugin lock; a render pass holding an older layout skips the slot.
    disposed: AtomicBool,
}

impl Slot {
    fn new(plugin: Box<dyn Plugin>) -> Arc<Self> {
        Arc::new(Self {
            id: plugin.id(),
            name: plugin.name().to_string(),
            kind: plugin.kind(),
            plugin: Mutex::new(plugin),
            disposed: AtomicBool::new(false),
        })
    }

    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            enabled: self.plugin.lock().is_enabled(),
        }
    }

    fn dispose(&self) {
        let mut plugin = self.plugin.lock();
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        plugin.dispose();
        debug!(plugin = %self.name, "plugin disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[derive(Clone, Default)]
struct Layout {
    instrument: Option<Arc<Slot>>,
    effects: Vec<Arc<Slot>>,
}

/// Ordered processing pipeline applied to a track's summed clips.
pub struct PluginChain {
    accepts_instrument: bool,
    layout: RwLock<Arc<Layout>>,
    midi: MidiEventQueue,
}

impl PluginChain {
    /// Chain for a MIDI track: the instrument slot is available.
    pub fn for_midi(midi_queue_capacity: usize) -> Self {
        Self::new(true, midi_queue_capacity)
    }

    /// Chain for an audio or group track: instruments are rejected.
    pub fn for_audio(midi_queue_capacity: usize) -> Self {
        Self::new(false, midi_queue_capacity)
    }

    fn new(accepts_instrument: bool, midi_queue_capacity: usize) -> Self {
        Self {
            accepts_instrument,
            layout: RwLock::new(Arc::new(Layout::default())),
            midi: MidiEventQueue::new(midi_queue_capacity),
        }
    }

    pub fn accepts_instrument(&self) -> bool {
        self.accepts_instrument
    }

    /// Queue feeding the instrument slot.
    pub fn midi_queue(&self) -> &MidiEventQueue {
        &self.midi
    }

    // ── Structure ───────────────────────────────────────────────

    /// Add a plugin. An instrument replaces (and disposes) the current
    /// instrument; an effect is appended.
    pub fn add(&self, plugin: Box<dyn Plugin>) -> OperationResult {
        let kind = plugin.kind();
        if kind == PluginKind::Instrument && !self.accepts_instrument {
            return OperationResult::failure(format!(
                "cannot add instrument '{}' to a chain without an instrument slot",
                plugin.name()
            ));
        }
        let id = plugin.id();
        let name = plugin.name().to_string();
        if self.contains(id) {
            return OperationResult::failure(format!("plugin '{}' is already in this chain", name));
        }

        let slot = Slot::new(plugin);
        let mut replaced = None;
        self.update(|layout| match kind {
            PluginKind::Instrument => replaced = layout.instrument.replace(slot),
            PluginKind::Effect => layout.effects.push(slot),
        });
        if let Some(old) = replaced {
            old.dispose();
            info!(old = %old.name, new = %name, "instrument replaced");
            return OperationResult::success_with(format!("replaced instrument '{}'", old.name));
        }
        info!(plugin = %name, ?kind, "plugin added");
        OperationResult::success()
    }

    /// Remove and dispose the plugin `id`.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut removed = None;
        self.update(|layout| {
            if layout.instrument.as_ref().map(|s| s.id == id).unwrap_or(false) {
                removed = layout.instrument.take();
            } else if let Some(pos) = layout.effects.iter().position(|s| s.id == id) {
                removed = Some(layout.effects.remove(pos));
            }
        });
        match removed {
            Some(slot) => {
                slot.dispose();
                info!(plugin = %slot.name, "plugin removed");
                true
            }
            None => false,
        }
    }

    /// Exchange the effects at positions `i` and `j`.
    pub fn swap_effects(&self, i: usize, j: usize) -> OperationResult {
        let len = self.layout.read().effects.len();
        if i >= len || j >= len {
            return OperationResult::failure(format!(
                "effect index out of range: {} and {} with {} effects",
                i, j, len
            ));
        }
        if i != j {
            self.update(|layout| layout.effects.swap(i, j));
        }
        OperationResult::success()
    }

    /// Remove and dispose every plugin.
    pub fn remove_all(&self) {
        let old = std::mem::take(&mut *self.layout.write());
        if let Some(slot) = &old.instrument {
            slot.dispose();
        }
        for slot in &old.effects {
            slot.dispose();
        }
        self.midi.clear();
    }

    fn update(&self, f: impl FnOnce(&mut Layout)) {
        let mut guard = self.layout.write();
        let mut next = Layout::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn contains(&self, id: Uuid) -> bool {
        let layout = self.layout.read();
        layout.instrument.as_ref().map(|s| s.id == id).unwrap_or(false) || layout.effects.iter().any(|s| s.id == id)
    }

    pub fn instrument(&self) -> Option<PluginDescriptor> {
        let layout = Arc::clone(&self.layout.read());
        layout.instrument.as_ref().map(|s| s.descriptor())
    }

    pub fn effects(&self) -> Vec<PluginDescriptor> {
        let layout = Arc::clone(&self.layout.read());
        layout.effects.iter().map(|s| s.descriptor()).collect()
    }

    pub fn has_instrument(&self) -> bool {
        self.layout.read().instrument.is_some()
    }

    pub fn len(&self) -> usize {
        let layout = self.layout.read();
        layout.effects.len() + usize::from(layout.instrument.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: Uuid) -> Option<Arc<Slot>> {
        let layout = self.layout.read();
        layout
            .instrument
            .iter()
            .chain(layout.effects.iter())
            .find(|s| s.id == id)
            .cloned()
    }

    // ── Control ─────────────────────────────────────────────────

    pub fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<(), PluginError> {
        let slot = self.slot(id).ok_or(PluginError::NotFound(id))?;
        slot.plugin.lock().set_enabled(enabled);
        Ok(())
    }

    pub fn open_editor(&self, id: Uuid) -> Result<(), PluginError> {
        let slot = self.slot(id).ok_or(PluginError::NotFound(id))?;
        let result = slot.plugin.lock().open_editor();
        result
    }

    pub fn close_editor(&self, id: Uuid) -> Result<(), PluginError> {
        let slot = self.slot(id).ok_or(PluginError::NotFound(id))?;
        slot.plugin.lock().close_editor();
        Ok(())
    }

    // ── Render ──────────────────────────────────────────────────

    /// Run the chain in place over `buf` (interleaved stereo).
    ///
    /// Queued MIDI goes to the instrument first; the instrument and then
    /// each enabled effect read a copy of the buffer and write back into it.
    pub fn process(&self, buf: &mut [f32], scratch: &mut Vec<f32>) {
        let layout = match self.layout.try_read() {
            Some(guard) => Arc::clone(&guard),
            None => {
                trace!("plugin chain busy, rendering silence");
                buf.fill(0.0);
                return;
            }
        };
        self.process_layout(&layout, buf, scratch);
    }

    fn process_layout(&self, layout: &Layout, buf: &mut [f32], scratch: &mut Vec<f32>) {
        let frames = buf.len() / 2;

        if let Some(slot) = &layout.instrument {
            match slot.plugin.try_lock() {
                Some(_) if slot.is_disposed() => self.midi.clear(),
                Some(mut plugin) => {
                    self.midi.drain(|event| plugin.receive_midi_event(event));
                    if plugin.is_enabled() {
                        run(&mut **plugin, buf, scratch, frames);
                    }
                }
                None => trace!(plugin = %slot.name, "instrument busy, skipped"),
            }
        } else {
            self.midi.clear();
        }

        for slot in &layout.effects {
            let Some(mut plugin) = slot.plugin.try_lock() else {
                trace!(plugin = %slot.name, "effect busy, skipped");
                continue;
            };
            if plugin.is_enabled() && !slot.is_disposed() {
                run(&mut **plugin, buf, scratch, frames);
            }
        }
    }
}

fn run(plugin: &mut dyn Plugin, buf: &mut [f32], scratch: &mut Vec<f32>, frames: usize) {
    if scratch.len() < buf.len() {
        scratch.resize(buf.len(), 0.0);
    }
    let input = &mut scratch[..buf.len()];
    input.copy_from_slice(buf);
    plugin.process(input, buf, frames);
}

impl Drop for PluginChain {
    fn drop(&mut self) {
        self.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixdown_core::MidiEvent;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Multiplies the signal by a constant.
    struct Gain {
        id: Uuid,
        factor: f32,
        enabled: bool,
        disposed: Arc<AtomicBool>,
    }

    impl Gain {
        fn new(factor: f32) -> Self {
            Self {
                id: Uuid::new_v4(),
                factor,
                enabled: true,
                disposed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Plugin for Gain {
        fn id(&self) -> Uuid {
            self.id
        }
        fn name(&self) -> &str {
            "gain"
        }
        fn kind(&self) -> PluginKind {
            PluginKind::Effect
        }
        fn is_enabled(&self) -> bool {
            self.enabled
        }
        fn set_enabled(&mut self, enabled: bool) {
            self.enabled = enabled;
        }
        fn process(&mut self, input: &[f32], output: &mut [f32], frames: usize) {
            for i in 0..frames * 2 {
                output[i] = input[i] * self.factor;
            }
        }
        fn dispose(&mut self) {
            self.disposed.store(true, Ordering::Relaxed);
        }
    }

    /// Outputs the number of note-ons it has received.
    struct Counter {
        id: Uuid,
        notes: Arc<AtomicUsize>,
        disposed: Arc<AtomicBool>,
    }

    impl Counter {
        fn new() -> Self {
            Self {
                id: Uuid::new_v4(),
                notes: Arc::new(AtomicUsize::new(0)),
                disposed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Plugin for Counter {
        fn id(&self) -> Uuid {
            self.id
        }
        fn name(&self) -> &str {
            "counter"
        }
        fn kind(&self) -> PluginKind {
            PluginKind::Instrument
        }
        fn is_enabled(&self) -> bool {
            true
        }
        fn set_enabled(&mut self, _enabled: bool) {}
        fn process(&mut self, _input: &[f32], output: &mut [f32], frames: usize) {
            let n = self.notes.load(Ordering::Relaxed) as f32;
            output[..frames * 2].fill(n);
        }
        fn receive_midi_event(&mut self, event: MidiEvent) {
            if matches!(event, MidiEvent::NoteOn { .. }) {
                self.notes.fetch_add(1, Ordering::Relaxed);
            }
        }
        fn dispose(&mut self) {
            self.disposed.store(true, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_effects_run_in_order() {
        let chain = PluginChain::for_audio(16);
        assert!(chain.add(Box::new(Gain::new(2.0))).is_success());
        assert!(chain.add(Box::new(Gain::new(0.25))).is_success());

        let mut buf = vec![1.0f32; 4];
        chain.process(&mut buf, &mut Vec::new());
        assert!(buf.iter().all(|s| (s - 0.5).abs() < 0.0001));
    }

    #[test]
    fn test_audio_chain_rejects_instrument() {
        let chain = PluginChain::for_audio(16);
        let result = chain.add(Box::new(Counter::new()));
        assert!(result.is_failure());
        assert!(chain.is_empty());
    }

    #[test]
    fn test_disabled_effect_is_skipped() {
        let chain = PluginChain::for_audio(16);
        let gain = Gain::new(0.0);
        let id = gain.id;
        chain.add(Box::new(gain));
        chain.set_enabled(id, false).unwrap();
        assert!(!chain.effects()[0].enabled);

        let mut buf = vec![1.0f32; 4];
        chain.process(&mut buf, &mut Vec::new());
        assert_eq!(buf, vec![1.0; 4]);
    }

    #[test]
    fn test_instrument_replacement_disposes_previous() {
        let chain = PluginChain::for_midi(16);
        let first = Counter::new();
        let first_disposed = Arc::clone(&first.disposed);
        chain.add(Box::new(first));
        let second = Counter::new();
        let second_id = second.id;
        let result = chain.add(Box::new(second));

        assert!(result.is_success());
        assert!(first_disposed.load(Ordering::Relaxed));
        assert_eq!(chain.instrument().unwrap().id, second_id);
        assert!(chain.effects().is_empty());
    }

    #[test]
    fn test_midi_reaches_instrument_before_effects() {
        let chain = PluginChain::for_midi(16);
        chain.add(Box::new(Counter::new()));
        chain.add(Box::new(Gain::new(10.0)));
        chain.midi_queue().push(MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        });
        chain.midi_queue().push(MidiEvent::NoteOn {
            channel: 0,
            note: 64,
            velocity: 100,
        });

        let mut buf = vec![0.0f32; 4];
        chain.process(&mut buf, &mut Vec::new());
        assert!(buf.iter().all(|s| (s - 20.0).abs() < 0.0001));
        assert!(chain.midi_queue().is_empty());
    }

    #[test]
    fn test_removed_effect_not_run_from_stale_layout() {
        let chain = PluginChain::for_audio(16);
        let gain = Gain::new(0.0);
        let (id, disposed) = (gain.id, Arc::clone(&gain.disposed));
        chain.add(Box::new(gain));

        // a render pass that grabbed the layout before the removal
        let stale = Arc::clone(&chain.layout.read());
        assert!(chain.remove(id));
        assert!(disposed.load(Ordering::Relaxed));

        let mut buf = vec![1.0f32; 4];
        chain.process_layout(&stale, &mut buf, &mut Vec::new());
        assert_eq!(buf, vec![1.0; 4]);
    }

    #[test]
    fn test_swap_effects() {
        let chain = PluginChain::for_audio(16);
        let a = Gain::new(1.0);
        let b = Gain::new(1.0);
        let (a_id, b_id) = (a.id, b.id);
        chain.add(Box::new(a));
        chain.add(Box::new(b));

        assert!(chain.swap_effects(0, 1).is_success());
        let ids: Vec<Uuid> = chain.effects().iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![b_id, a_id]);

        let result = chain.swap_effects(0, 2);
        assert!(result.is_failure());
        assert!(result.message().contains("out of range"));
    }

    #[test]
    fn test_remove_disposes() {
        let chain = PluginChain::for_audio(16);
        let gain = Gain::new(1.0);
        let (id, disposed) = (gain.id, Arc::clone(&gain.disposed));
        chain.add(Box::new(gain));
        assert!(chain.remove(id));
        assert!(disposed.load(Ordering::Relaxed));
        assert!(!chain.remove(id));
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let chain = PluginChain::for_audio(16);
        let gain = Gain::new(1.0);
        let id = gain.id;
        chain.add(Box::new(gain));
        let mut twin = Gain::new(1.0);
        twin.id = id;
        assert!(chain.add(Box::new(twin)).is_failure());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_remove_all() {
        let chain = PluginChain::for_midi(16);
        let counter = Counter::new();
        let disposed = Arc::clone(&counter.disposed);
        chain.add(Box::new(counter));
        chain.add(Box::new(Gain::new(1.0)));
        chain.remove_all();
        assert!(chain.is_empty());
        assert!(disposed.load(Ordering::Relaxed));
    }

    #[test]
    fn test_editor_defaults() {
        let chain = PluginChain::for_audio(16);
        let gain = Gain::new(1.0);
        let id = gain.id;
        chain.add(Box::new(gain));
        assert!(matches!(chain.open_editor(id), Err(PluginError::NoEditor(_))));
        assert!(chain.close_editor(id).is_ok());
        assert!(matches!(chain.open_editor(Uuid::new_v4()), Err(PluginError::NotFound(_))));
    }
}
