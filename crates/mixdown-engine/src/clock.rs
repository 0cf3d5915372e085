//! Playback clock shared between a clip, its voice and the automation scheduler.

use mixdown_core::AtomicF64;

/// Current playback position in source seconds.
///
/// The voice advances it once per rendered block; readers may observe a
/// value up to one block old.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    seconds: AtomicF64,
}

impl PlaybackClock {
    pub fn new(seconds: f64) -> Self {
        Self {
            seconds: AtomicF64::new(seconds),
        }
    }

    pub fn now(&self) -> f64 {
        self.seconds.load()
    }

    pub fn set(&self, seconds: f64) {
        self.seconds.store(seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_set_and_read() {
        let clock = PlaybackClock::new(1.5);
        assert_eq!(clock.now(), 1.5);
        clock.set(2.25);
        assert_eq!(clock.now(), 2.25);
    }
}
