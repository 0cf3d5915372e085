//! Records live MIDI input into a sequence.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use mixdown_core::{Result, TimedMidiEvent};
use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::input::MidiDispatcher;
use crate::sequence::MidiSequence;

/// Captures events from a dispatcher, timestamped relative to `start`.
pub struct MidiRecorder {
    dispatcher: Arc<MidiDispatcher>,
    handler: Uuid,
    started: Instant,
    events: Arc<Mutex<Vec<TimedMidiEvent>>>,
}

impl MidiRecorder {
    pub fn start(dispatcher: Arc<MidiDispatcher>) -> Self {
        let started = Instant::now();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let handler = dispatcher.register(Arc::new(move |_, event| {
            let time = started.elapsed().as_secs_f64();
            sink.lock().push(TimedMidiEvent::new(time, event));
        }));
        info!("midi recording started");
        Self {
            dispatcher,
            handler,
            started,
            events,
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Stop listening and return the take.
    pub fn finish(self) -> MidiSequence {
        self.dispatcher.unregister(self.handler);
        let duration = self.started.elapsed().as_secs_f64();
        let events = std::mem::take(&mut *self.events.lock());
        MidiSequence::from_events(events, duration)
    }

    /// Stop listening, write the take to `path` and load it back.
    pub fn stop(self, path: impl AsRef<Path>) -> Result<MidiSequence> {
        let path = path.as_ref();
        let take = self.finish();
        take.save(path)?;
        info!(path = %path.display(), events = take.events().len(), "midi recording finished");
        MidiSequence::open(path)
    }
}
