use super::*;

#[test]
fn longer_audio_is_trimmed_at_video_end() {
    let plan = AudioPlan::for_durations(12.0, 14.5);
    assert_eq!(plan, AudioPlan::TrimTo(12.0));
    assert_eq!(plan.output_audio_secs(14.5), 12.0);
}

#[test]
fn shorter_or_equal_audio_is_attached_as_is() {
    let plan = AudioPlan::for_durations(12.0, 9.0);
    assert_eq!(plan, AudioPlan::AsIs);
    assert_eq!(plan.output_audio_secs(9.0), 9.0);
    assert_eq!(AudioPlan::for_durations(12.0, 12.0), AudioPlan::AsIs);
}

#[test]
fn missing_inputs_are_unreadable() {
    let dir = tempfile::tempdir().unwrap();
    let err = sync_audio(
        &dir.path().join("v.mp4"),
        &dir.path().join("a.wav"),
        &dir.path().join("out.mp4"),
    )
    .unwrap_err();
    assert!(matches!(err, ReelError::AssetUnreadable(_)));
}
