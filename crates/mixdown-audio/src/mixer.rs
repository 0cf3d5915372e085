//! Audio mixer - sums any number of inputs into one stereo buffer.
//!
//! The input list is copy-on-write: control threads build a new list and
//! swap it in, the render thread clones the current `Arc` and iterates it
//! without holding the lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;
use uuid::Uuid;

use crate::source::SampleSource;

/// One source attached to a mixer.
pub struct MixerInput {
    id: Uuid,
    source: Mutex<Box<dyn SampleSource>>,
    ended: AtomicBool,
}

impl MixerInput {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the source has reported exhaustion.
    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}

type InputList = Arc<Vec<Arc<MixerInput>>>;

/// Sums its inputs. Exhausted inputs go silent and are pruned on the next
/// structural change.
pub struct Mixer {
    inputs: RwLock<InputList>,
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            inputs: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Attach a source under `id`, replacing any input with the same id.
    pub fn add_input(&self, id: Uuid, source: Box<dyn SampleSource>) {
        let input = Arc::new(MixerInput {
            id,
            source: Mutex::new(source),
            ended: AtomicBool::new(false),
        });
        self.update(|list| {
            list.retain(|i| i.id != id);
            list.push(input);
        });
    }

    /// Detach the input `id`. Returns whether it was attached.
    pub fn remove_input(&self, id: Uuid) -> bool {
        let mut found = false;
        self.update(|list| {
            let before = list.len();
            list.retain(|i| i.id != id);
            found = list.len() != before;
        });
        found
    }

    /// Detach every input.
    pub fn clear(&self) {
        *self.inputs.write() = Arc::new(Vec::new());
    }

    /// Whether `id` is attached and still producing.
    pub fn contains(&self, id: Uuid) -> bool {
        self.inputs.read().iter().any(|i| i.id == id && !i.has_ended())
    }

    pub fn input_ids(&self) -> Vec<Uuid> {
        self.inputs
            .read()
            .iter()
            .filter(|i| !i.has_ended())
            .map(|i| i.id)
            .collect()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.read().iter().filter(|i| !i.has_ended()).count()
    }

    /// Drop exhausted inputs from the list.
    pub fn prune_ended(&self) {
        if self.inputs.read().iter().any(|i| i.has_ended()) {
            self.update(|_| {});
        }
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Arc<MixerInput>>)) {
        let mut guard = self.inputs.write();
        let mut next: Vec<Arc<MixerInput>> = guard.iter().filter(|i| !i.has_ended()).cloned().collect();
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Render one block of `out.len() / 2` frames into `out`.
    ///
    /// `scratch` is owned by the caller so the render thread never allocates
    /// once it has grown to the block size.
    pub fn mix(&self, out: &mut [f32], scratch: &mut Vec<f32>) {
        out.fill(0.0);
        let inputs = match self.inputs.try_read() {
            Some(guard) => Arc::clone(&guard),
            None => {
                trace!("mixer input list busy, rendering silence");
                return;
            }
        };
        if scratch.len() < out.len() {
            scratch.resize(out.len(), 0.0);
        }
        let requested = out.len() / 2;

        for input in inputs.iter() {
            if input.has_ended() {
                continue;
            }
            let Some(mut source) = input.source.try_lock() else {
                continue;
            };
            let buf = &mut scratch[..requested * 2];
            buf.fill(0.0);
            let frames = source.read(buf).min(requested);
            for (o, s) in out[..frames * 2].iter_mut().zip(&buf[..frames * 2]) {
                *o += *s;
            }
            if frames < requested {
                input.ended.store(true, Ordering::Release);
            }
        }
    }
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::BufferSource;

    #[test]
    fn test_mixer_sums_inputs() {
        let mixer = Mixer::new();
        mixer.add_input(Uuid::new_v4(), Box::new(BufferSource::constant(0.5, 8)));
        mixer.add_input(Uuid::new_v4(), Box::new(BufferSource::constant(0.25, 8)));

        let mut out = vec![0.0f32; 8];
        let mut scratch = Vec::new();
        mixer.mix(&mut out, &mut scratch);
        for s in &out {
            assert!((s - 0.75).abs() < 0.0001);
        }
    }

    #[test]
    fn test_mixer_empty_is_silent() {
        let mixer = Mixer::new();
        let mut out = vec![1.0f32; 8];
        mixer.mix(&mut out, &mut Vec::new());
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_remove_input() {
        let mixer = Mixer::new();
        let id = Uuid::new_v4();
        mixer.add_input(id, Box::new(BufferSource::constant(1.0, 8)));
        assert!(mixer.contains(id));
        assert!(mixer.remove_input(id));
        assert!(!mixer.remove_input(id));
        assert_eq!(mixer.input_count(), 0);
    }

    #[test]
    fn test_add_same_id_replaces() {
        let mixer = Mixer::new();
        let id = Uuid::new_v4();
        mixer.add_input(id, Box::new(BufferSource::constant(1.0, 8)));
        mixer.add_input(id, Box::new(BufferSource::constant(0.5, 8)));
        assert_eq!(mixer.input_count(), 1);

        let mut out = vec![0.0f32; 4];
        mixer.mix(&mut out, &mut Vec::new());
        assert!((out[0] - 0.5).abs() < 0.0001);
    }

    #[test]
    fn test_exhausted_input_ends_and_prunes() {
        let mixer = Mixer::new();
        let id = Uuid::new_v4();
        mixer.add_input(id, Box::new(BufferSource::constant(1.0, 3)));

        let mut out = vec![0.0f32; 4];
        let mut scratch = Vec::new();
        mixer.mix(&mut out, &mut scratch);
        assert!(mixer.contains(id));
        mixer.mix(&mut out, &mut scratch);
        // partial block: one frame of signal, then silence
        assert_eq!(&out[..], &[1.0, 1.0, 0.0, 0.0]);
        assert!(!mixer.contains(id));

        mixer.prune_ended();
        assert!(mixer.input_ids().is_empty());
    }
}
