//! Bounded MIDI event queue between producers and an instrument.
//!
//! Producers are the MIDI clip voices, live input and parameter automation;
//! the consumer is the plugin chain on the render thread. Pushing never
//! blocks: when the queue is full the event is dropped and the producer
//! decides whether that is worth reporting.

use crossbeam_channel::{bounded, Receiver, Sender};
use mixdown_core::MidiEvent;

#[derive(Debug, Clone)]
pub struct MidiEventQueue {
    tx: Sender<MidiEvent>,
    rx: Receiver<MidiEvent>,
}

impl MidiEventQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Enqueue an event. Returns false if it was dropped.
    pub fn push(&self, event: MidiEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }

    /// Hand every queued event to `f`, oldest first.
    pub fn drain(&self, mut f: impl FnMut(MidiEvent)) -> usize {
        let mut n = 0;
        while let Ok(event) = self.rx.try_recv() {
            f(event);
            n += 1;
        }
        n
    }

    /// Discard queued events.
    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for MidiEventQueue {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_drain_in_order() {
        let queue = MidiEventQueue::new(4);
        queue.push(MidiEvent::control_change(0, 7, 1));
        queue.push(MidiEvent::control_change(0, 7, 2));
        let mut values = Vec::new();
        let n = queue.drain(|ev| {
            if let MidiEvent::ControlChange { value, .. } = ev {
                values.push(value);
            }
        });
        assert_eq!(n, 2);
        assert_eq!(values, vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_drops() {
        let queue = MidiEventQueue::new(1);
        assert!(queue.push(MidiEvent::control_change(0, 1, 1)));
        assert!(!queue.push(MidiEvent::control_change(0, 1, 2)));
        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clones_share_the_queue() {
        let queue = MidiEventQueue::new(8);
        let producer = queue.clone();
        producer.push(MidiEvent::ProgramChange { channel: 0, program: 3 });
        assert_eq!(queue.len(), 1);
    }
}
