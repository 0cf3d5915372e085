//! MIDI input devices.
//!
//! A backend enumerates ports and opens a connection that feeds raw
//! messages into a `MidiDispatcher`. The dispatcher parses each message
//! once and fans it out to the registered handlers (live instrument
//! input, MIDI recorders).

use std::sync::Arc;

use midir::MidiInput;
use mixdown_core::{MidiEvent, MixdownError, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Callback receiving `(timestamp in microseconds, event)`.
pub type MidiHandler = Arc<dyn Fn(u64, MidiEvent) + Send + Sync>;

/// Fan-out of parsed input events to handlers.
#[derive(Default)]
pub struct MidiDispatcher {
    handlers: RwLock<Vec<(Uuid, MidiHandler)>>,
}

impl MidiDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and return its key for `unregister`.
    pub fn register(&self, handler: MidiHandler) -> Uuid {
        let id = Uuid::new_v4();
        self.handlers.write().push((id, handler));
        id
    }

    pub fn unregister(&self, id: Uuid) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(key, _)| *key != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Parse `raw` and deliver it. System messages are ignored.
    pub fn dispatch(&self, timestamp: u64, raw: &[u8]) {
        let Some(event) = MidiEvent::from_bytes(raw) else {
            trace!(len = raw.len(), "ignoring non-channel midi message");
            return;
        };
        for (_, handler) in self.handlers.read().iter() {
            handler(timestamp, event);
        }
    }
}

/// An open input port. Dropping or closing it stops delivery.
pub trait MidiInputConnection: Send {
    fn name(&self) -> &str;

    fn close(self: Box<Self>);
}

/// A source of MIDI input ports.
pub trait MidiInputBackend: Send + Sync {
    /// Names of the available input ports.
    fn enumerate(&self) -> Result<Vec<String>>;

    /// Open the port called `name`, delivering its messages to `dispatcher`.
    fn open(&self, name: &str, dispatcher: Arc<MidiDispatcher>) -> Result<Box<dyn MidiInputConnection>>;
}

// ── midir backend ───────────────────────────────────────────────

/// Hardware and virtual ports of the host, through midir.
#[derive(Debug, Clone)]
pub struct MidirBackend {
    client_name: String,
}

impl MidirBackend {
    pub fn new() -> Self {
        Self {
            client_name: "mixdown".to_string(),
        }
    }

    fn client(&self, suffix: &str) -> Result<MidiInput> {
        MidiInput::new(&format!("{}-{}", self.client_name, suffix))
            .map_err(|e| MixdownError::Midi(format!("failed to create midi input: {}", e)))
    }
}

impl Default for MidirBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct MidirConnection {
    name: String,
    connection: midir::MidiInputConnection<()>,
}

impl MidiInputConnection for MidirConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(self: Box<Self>) {
        let MidirConnection { name, connection } = *self;
        let _ = connection.close();
        info!(device = %name, "midi input closed");
    }
}

impl MidiInputBackend for MidirBackend {
    fn enumerate(&self) -> Result<Vec<String>> {
        let midi_in = self.client("enumerate")?;
        let ports = midi_in.ports();
        Ok(ports
            .iter()
            .enumerate()
            .map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .unwrap_or_else(|_| format!("Unknown Device {}", index))
            })
            .collect())
    }

    fn open(&self, name: &str, dispatcher: Arc<MidiDispatcher>) -> Result<Box<dyn MidiInputConnection>> {
        let midi_in = self.client("input")?;
        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| midi_in.port_name(p).map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| MixdownError::PreconditionFailed(format!("midi input '{}' not found", name)))?;

        let connection = midi_in
            .connect(
                port,
                "mixdown-midi-in",
                move |timestamp, message, _| dispatcher.dispatch(timestamp, message),
                (),
            )
            .map_err(|e| MixdownError::Midi(format!("failed to connect to '{}': {}", name, e)))?;

        info!(device = %name, "midi input opened");
        Ok(Box::new(MidirConnection {
            name: name.to_string(),
            connection,
        }))
    }
}

// ── Virtual backend ─────────────────────────────────────────────

/// In-process ports driven by `send`. Used by tests and for scripted input.
#[derive(Clone, Default)]
pub struct VirtualMidiBackend {
    inner: Arc<VirtualPorts>,
}

#[derive(Default)]
struct VirtualPorts {
    names: Vec<String>,
    /// Dispatchers of open connections, keyed by connection id.
    open: Mutex<Vec<(Uuid, String, Arc<MidiDispatcher>)>>,
}

impl VirtualMidiBackend {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Arc::new(VirtualPorts {
                names: names.into_iter().map(Into::into).collect(),
                open: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Deliver a raw message on port `name`. Returns how many connections received it.
    pub fn send(&self, name: &str, timestamp: u64, raw: &[u8]) -> usize {
        let targets: Vec<Arc<MidiDispatcher>> = self
            .inner
            .open
            .lock()
            .iter()
            .filter(|(_, port, _)| port == name)
            .map(|(_, _, d)| Arc::clone(d))
            .collect();
        for dispatcher in &targets {
            dispatcher.dispatch(timestamp, raw);
        }
        targets.len()
    }

    pub fn open_count(&self) -> usize {
        self.inner.open.lock().len()
    }
}

struct VirtualConnection {
    id: Uuid,
    name: String,
    ports: Arc<VirtualPorts>,
}

impl MidiInputConnection for VirtualConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn close(self: Box<Self>) {
        drop(self);
    }
}

impl Drop for VirtualConnection {
    fn drop(&mut self) {
        self.ports.open.lock().retain(|(id, _, _)| *id != self.id);
        debug!(device = %self.name, "virtual midi input closed");
    }
}

impl MidiInputBackend for VirtualMidiBackend {
    fn enumerate(&self) -> Result<Vec<String>> {
        Ok(self.inner.names.clone())
    }

    fn open(&self, name: &str, dispatcher: Arc<MidiDispatcher>) -> Result<Box<dyn MidiInputConnection>> {
        if !self.inner.names.iter().any(|n| n == name) {
            return Err(MixdownError::PreconditionFailed(format!(
                "midi input '{}' not found",
                name
            )));
        }
        let id = Uuid::new_v4();
        self.inner
            .open
            .lock()
            .push((id, name.to_string(), dispatcher));
        Ok(Box::new(VirtualConnection {
            id,
            name: name.to_string(),
            ports: Arc::clone(&self.inner),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatcher_parses_and_fans_out() {
        let dispatcher = MidiDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.register(Arc::new(move |ts, ev| sink.lock().push((ts, ev))));

        dispatcher.dispatch(10, &[0x90, 60, 100]);
        dispatcher.dispatch(11, &[0xf8]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, 10);
        assert!(matches!(seen[0].1, MidiEvent::NoteOn { note: 60, .. }));
    }

    #[test]
    fn test_unregister() {
        let dispatcher = MidiDispatcher::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let id = dispatcher.register(Arc::new(move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        }));
        dispatcher.dispatch(0, &[0xb0, 7, 100]);
        assert!(dispatcher.unregister(id));
        assert!(!dispatcher.unregister(id));
        dispatcher.dispatch(0, &[0xb0, 7, 100]);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_virtual_backend() {
        let backend = VirtualMidiBackend::new(["Keys", "Pads"]);
        assert_eq!(backend.enumerate().unwrap(), vec!["Keys", "Pads"]);
        assert!(backend.open("Drums", Arc::new(MidiDispatcher::new())).is_err());

        let dispatcher = Arc::new(MidiDispatcher::new());
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        dispatcher.register(Arc::new(move |_, _| {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        let conn = backend.open("Keys", Arc::clone(&dispatcher)).unwrap();
        assert_eq!(conn.name(), "Keys");
        assert_eq!(backend.send("Keys", 0, &[0x90, 64, 1]), 1);
        assert_eq!(backend.send("Pads", 0, &[0x90, 64, 1]), 0);
        conn.close();
        assert_eq!(backend.open_count(), 0);
        assert_eq!(backend.send("Keys", 0, &[0x90, 64, 1]), 0);
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
