//! Clip playback through the full graph.

use mixdown_audio::{AudioFile, OfflineSink};
use mixdown_core::gain::db_to_linear;
use mixdown_core::{AutomationLane, AutomationParameter, EngineConfig, InterpolationKind};
use mixdown_engine::{Clip, ClipEvent, Engine, PlaybackState};

use crate::support::{constant_clip, left, offline_engine};

#[test]
fn fades_attenuate_both_edges_of_a_ten_second_clip() {
    let (engine, sink) = offline_engine();
    let track = engine.create_audio_track("fades");
    let clip = constant_clip(10, 1.0);
    clip.set_fade_in(1.0).unwrap();
    clip.set_fade_out(1.0).unwrap();
    assert!(track.add_clip(clip.clone()).is_success());
    clip.play().unwrap();

    let out = sink.pull_seconds(10.0, 10);
    assert_eq!(out.len(), 2000);

    assert!(left(&out, 5) < 0.1);
    assert!((left(&out, 50) - 0.5).abs() < 1e-3);
    for frame in [100, 300, 500, 700, 900] {
        assert!((left(&out, frame) - 1.0).abs() < 1e-3, "frame {frame}");
    }
    assert!((left(&out, 950) - 0.5).abs() < 1e-3);
    assert!(left(&out, 995) < 0.1);
}

#[test]
fn linear_volume_lane_reaches_minus_45_db_at_midpoint() {
    let mut lane = AutomationLane::new(AutomationParameter::Volume);
    lane.set(0.0, -90.0, InterpolationKind::Linear).unwrap();
    lane.set(5.0, 0.0, InterpolationKind::Linear).unwrap();
    assert_eq!(lane.evaluate(2.5), -45.0);

    let (engine, sink) = offline_engine();
    let track = engine.create_audio_track("automation");
    let clip = constant_clip(10, 1.0);
    track.add_clip(clip.clone());
    clip.add_automation_point(AutomationParameter::Volume, 0.0, -90.0, InterpolationKind::Linear)
        .unwrap();
    clip.add_automation_point(AutomationParameter::Volume, 5.0, 0.0, InterpolationKind::Linear)
        .unwrap();

    let events = clip.subscribe();
    clip.play().unwrap();
    sink.pull_seconds(2.5, 50);
    engine.tick_automation();

    assert_eq!(clip.volume(), -45.0);
    assert_eq!(events.try_recv().unwrap(), ClipEvent::PlaybackStarted);
    assert_eq!(events.try_recv().unwrap(), ClipEvent::VolumeChanged(-45.0));
    let out = sink.pull(1);
    assert!((left(&out, 0) - db_to_linear(-45.0)).abs() < 1e-6);
}

#[test]
fn stop_on_a_never_played_clip_leaves_it_idle() {
    let (engine, _sink) = offline_engine();
    let track = engine.create_audio_track("idle");
    let clip = constant_clip(1, 1.0);
    track.add_clip(clip.clone());
    clip.stop();
    assert_eq!(clip.playback_state(), PlaybackState::Idle);
}

#[test]
fn clip_reaching_its_end_stops_and_goes_silent() {
    let (engine, sink) = offline_engine();
    let track = engine.create_audio_track("end");
    let clip = constant_clip(1, 1.0);
    track.add_clip(clip.clone());
    clip.play().unwrap();

    let out = sink.pull_seconds(1.5, 10);
    assert_eq!(left(&out, 99), 1.0);
    assert_eq!(left(&out, 100), 0.0);
    assert!(!clip.is_playing());
    engine.tick_automation();
    assert_eq!(clip.playback_state(), PlaybackState::Stopped);
    assert_eq!(engine.active_automation_jobs(), 0);
}

#[test]
fn source_at_another_rate_is_converted_before_playing() {
    let engine = Engine::with_manual_automation(EngineConfig::default().with_sample_rate(44_100)).unwrap();
    let sink = OfflineSink::new();
    engine.set_output_device(Box::new(sink.clone())).unwrap();

    let track = engine.create_audio_track("convert");
    let clip = Clip::from_audio(AudioFile::from_samples("low.wav", 22_050, 1, vec![0.5; 22_050]));
    track.add_clip(clip.clone());
    clip.play().unwrap();

    let out = sink.pull_seconds(0.5, 512);
    assert!((left(&out, 11_025) - 0.5).abs() < 0.05);
    assert!((clip.current_time() - 0.5).abs() < 0.02);
}

#[test]
fn transposed_clip_still_plays_for_its_duration() {
    let engine = Engine::with_manual_automation(EngineConfig::default().with_sample_rate(8_000)).unwrap();
    let sink = OfflineSink::new();
    engine.set_output_device(Box::new(sink.clone())).unwrap();

    let track = engine.create_audio_track("pitch");
    let clip = Clip::from_audio(AudioFile::from_samples("tone.wav", 8_000, 2, vec![0.25; 2 * 8_000 * 2]));
    track.add_clip(clip.clone());
    clip.set_pitch(12.0).unwrap();
    assert_eq!(clip.duration(), 2.0);
    clip.play().unwrap();

    sink.pull_seconds(1.0, 256);
    assert!(clip.is_playing());
    assert!((clip.current_time() - 1.0).abs() < 0.05);

    // retuning mid-play leaves the clock alone
    clip.set_pitch(-5.0).unwrap();
    sink.pull_seconds(0.9, 256);
    assert!(clip.is_playing());
    assert!((clip.current_time() - 1.9).abs() < 0.05);

    sink.pull_seconds(0.2, 256);
    assert!(!clip.is_playing());
}

#[test]
fn export_follows_automation() {
    let dir = tempfile::tempdir().unwrap();
    let clip = constant_clip(2, 1.0);
    clip.add_automation_point(AutomationParameter::Volume, 0.0, 0.0, InterpolationKind::Step)
        .unwrap();
    clip.add_automation_point(AutomationParameter::Volume, 1.0, -6.0, InterpolationKind::Step)
        .unwrap();
    let path = dir.path().join("export.wav");
    clip.render_to_file(&path).unwrap();

    let rendered = AudioFile::open(&path).unwrap();
    assert_eq!(rendered.frames(), 200);
    let samples = rendered.samples();
    assert!((samples[0] - 1.0).abs() < 1e-6);
    assert!((samples[150 * 2] - db_to_linear(-6.0)).abs() < 1e-6);
    // the stored volume of the clip itself is untouched
    assert_eq!(clip.volume(), 0.0);
}
