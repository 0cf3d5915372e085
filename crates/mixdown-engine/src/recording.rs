//! Track recording takes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mixdown_audio::AudioRecorder;
use mixdown_core::{MixdownError, Result};
use mixdown_midi::MidiRecorder;

use crate::clip::Clip;
use crate::engine::EngineContext;

/// A take in progress.
pub(crate) enum Recording {
    Audio(AudioRecorder),
    Midi { recorder: MidiRecorder, path: PathBuf },
}

impl Recording {
    /// Capture from the engine's capture backend into a WAV file at `path`.
    pub fn start_audio(ctx: &Arc<EngineContext>, path: &Path) -> Result<Self> {
        let backend = ctx.capture_backend();
        Ok(Self::Audio(AudioRecorder::start(backend.as_ref(), path)?))
    }

    /// Record the engine's MIDI input; written to `path` on finish.
    pub fn start_midi(ctx: &Arc<EngineContext>, path: &Path) -> Result<Self> {
        if ctx.midi_input_name().is_none() {
            return Err(MixdownError::PreconditionFailed(
                "no MIDI input device is selected".into(),
            ));
        }
        Ok(Self::Midi {
            recorder: MidiRecorder::start(Arc::clone(ctx.midi_dispatcher())),
            path: path.to_path_buf(),
        })
    }

    /// Finalize the take and load it as a clip.
    pub fn finish(self) -> Result<Clip> {
        match self {
            Self::Audio(recorder) => Clip::open_audio(recorder.stop()?),
            Self::Midi { recorder, path } => Ok(Clip::from_sequence(recorder.stop(&path)?)),
        }
    }
}
