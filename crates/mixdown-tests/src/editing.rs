//! Clip editing across clips and tracks.

use mixdown_core::{AutomationParameter, InterpolationKind, MixdownError};

use crate::support::{constant_clip, offline_engine};

#[test]
fn split_produces_contiguous_independent_clips() {
    let (engine, _sink) = offline_engine();
    let track = engine.create_audio_track("edit");
    let clip = constant_clip(10, 0.5);
    track.add_clip(clip.clone());
    clip.set_start_marker(1.0).unwrap();
    clip.set_end_marker(9.0).unwrap();
    clip.add_automation_point(AutomationParameter::Pan, 2.0, -20.0, InterpolationKind::Smooth)
        .unwrap();

    let right = track.split_clip(clip.id(), 4.0).unwrap();
    assert_eq!((clip.start_marker(), clip.end_marker()), (1.0, 4.0));
    assert_eq!((right.start_marker(), right.end_marker()), (4.0, 9.0));
    assert_eq!(track.clips().len(), 2);

    right.clear_automation(AutomationParameter::Pan);
    assert!(right.automation(AutomationParameter::Pan).is_none());
    assert_eq!(clip.automation(AutomationParameter::Pan).unwrap().len(), 1);

    right.set_volume(-12.0).unwrap();
    assert_eq!(clip.volume(), 0.0);
}

#[test]
fn split_family_rejects_out_of_bounds_times() {
    let clip = constant_clip(10, 0.5);
    clip.set_start_marker(2.0).unwrap();
    clip.set_end_marker(8.0).unwrap();

    assert!(matches!(clip.split(2.0), Err(MixdownError::Range(_))));
    assert!(matches!(clip.split(8.5), Err(MixdownError::Range(_))));
    assert!(matches!(clip.split_from_to(1.0, 5.0), Err(MixdownError::Range(_))));
    assert!(matches!(clip.split_from_to(3.0, 8.0), Err(MixdownError::Range(_))));
    assert!(matches!(clip.cut_out(5.0, 4.0), Err(MixdownError::Range(_))));
    assert!(matches!(clip.cut_out(-1.0, 4.0), Err(MixdownError::Range(_))));
}

#[test]
fn cut_out_removes_the_middle() {
    let (engine, _sink) = offline_engine();
    let track = engine.create_audio_track("edit");
    let clip = constant_clip(6, 0.5);
    track.add_clip(clip.clone());

    let rest = track.cut_out_clip(clip.id(), 2.0, 3.0).unwrap();
    assert_eq!(clip.duration(), 2.0);
    assert_eq!(rest.duration(), 3.0);
    assert_eq!(track.clips(), vec![clip, rest]);
}

#[test]
fn volume_and_pan_ranges_are_enforced_everywhere() {
    let (engine, _sink) = offline_engine();
    let track = engine.create_audio_track("ranges");
    let clip = constant_clip(1, 0.5);

    for db in [-90.1, 6.1, f32::NAN] {
        assert!(matches!(clip.set_volume(db), Err(MixdownError::Range(_))));
        assert!(matches!(track.set_volume(db), Err(MixdownError::Range(_))));
        assert!(matches!(engine.master().set_volume(db), Err(MixdownError::Range(_))));
    }
    for pan in [-50.1, 50.1] {
        assert!(matches!(clip.set_pan(pan), Err(MixdownError::Range(_))));
        assert!(matches!(track.set_pan(pan), Err(MixdownError::Range(_))));
        assert!(matches!(engine.master().set_pan(pan), Err(MixdownError::Range(_))));
    }
}

#[test]
fn reversing_twice_restores_the_original_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("loop.wav");
    mixdown_audio::AudioFile::write_wav(&path, 100, 1, &[0.1, 0.2, 0.3]).unwrap();
    let clip = mixdown_engine::Clip::open_audio(&path).unwrap();

    let first = clip.reverse(dir.path()).unwrap();
    let second = clip.reverse(dir.path()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.file_name().unwrap(), "loop_rev.wav");
    let restored = mixdown_audio::AudioFile::open(&second).unwrap();
    assert_eq!(restored.samples(), &[0.1, 0.2, 0.3]);
}
