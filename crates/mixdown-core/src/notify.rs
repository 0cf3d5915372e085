//! Change notifications over channels.
//!
//! Every observable object owns a `Notifier` and hands out receivers from
//! `subscribe()`. Sending never blocks: a full subscriber misses the event,
//! a dropped subscriber is pruned on the next send.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::trace;

/// Default per-subscriber buffer.
pub const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of events to any number of subscribers.
#[derive(Debug)]
pub struct Notifier<E> {
    subscribers: Mutex<Vec<Sender<E>>>,
    capacity: usize,
}

impl<E: Clone> Notifier<E> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn notify(&self, event: E) {
        let mut subs = self.subscribers.lock();
        Self::fan_out(&mut subs, event);
    }

    /// Like `notify`, but gives up instead of waiting for the subscriber list.
    /// Used from the render thread.
    pub fn try_notify(&self, event: E) -> bool {
        match self.subscribers.try_lock() {
            Some(mut subs) => {
                Self::fan_out(&mut subs, event);
                true
            }
            None => false,
        }
    }

    fn fan_out(subs: &mut Vec<Sender<E>>, event: E) {
        if subs.is_empty() {
            return;
        }
        subs.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!("subscriber lagging, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<E: Clone> Default for Notifier<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_reaches_all_subscribers() {
        let n = Notifier::new();
        let a = n.subscribe();
        let b = n.subscribe();
        n.notify(7u32);
        assert_eq!(a.try_recv().unwrap(), 7);
        assert_eq!(b.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let n = Notifier::new();
        let a = n.subscribe();
        {
            let _b = n.subscribe();
        }
        assert_eq!(n.subscriber_count(), 2);
        n.notify("x");
        assert_eq!(n.subscriber_count(), 1);
        assert_eq!(a.try_recv().unwrap(), "x");
    }

    #[test]
    fn test_full_subscriber_drops_events() {
        let n = Notifier::with_capacity(1);
        let a = n.subscribe();
        n.notify(1);
        n.notify(2);
        assert_eq!(a.try_recv().unwrap(), 1);
        assert!(a.try_recv().is_err());
        assert_eq!(n.subscriber_count(), 1);
    }

    #[test]
    fn test_try_notify_without_subscribers() {
        let n: Notifier<u8> = Notifier::new();
        assert!(n.try_notify(1));
    }
}
