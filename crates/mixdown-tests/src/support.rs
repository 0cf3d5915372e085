//! Shared fixtures.

use mixdown_audio::{AudioFile, OfflineSink};
use mixdown_core::EngineConfig;
use mixdown_engine::{Clip, Engine};

pub const RATE: u32 = 100;

/// Engine at 100 Hz with hand-driven automation, bound to an offline sink.
pub fn offline_engine() -> (Engine, OfflineSink) {
    let engine = Engine::with_manual_automation(EngineConfig::default().with_sample_rate(RATE))
        .expect("valid config");
    let sink = OfflineSink::new();
    engine
        .set_output_device(Box::new(sink.clone()))
        .expect("offline sink binds");
    (engine, sink)
}

/// `seconds` of a constant stereo signal at `RATE`.
pub fn constant_clip(seconds: usize, value: f32) -> Clip {
    Clip::from_audio(AudioFile::from_samples(
        "constant.wav",
        RATE,
        2,
        vec![value; seconds * RATE as usize * 2],
    ))
}

/// Left sample of frame `frame`.
pub fn left(out: &[f32], frame: usize) -> f32 {
    out[frame * 2]
}
