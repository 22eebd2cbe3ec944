use super::*;

#[test]
fn parses_video_with_audio() {
    let json = br#"{
        "streams": [
            {"codec_type": "video", "width": 1080, "height": 1920, "r_frame_rate": "30/1", "avg_frame_rate": "30/1"},
            {"codec_type": "audio", "duration": "12.000000"}
        ],
        "format": {"duration": "12.033000"}
    }"#;
    let info = parse_probe_json(json).unwrap();
    assert_eq!((info.width, info.height), (1080, 1920));
    assert_eq!(info.fps, Some(Fps { num: 30, den: 1 }));
    assert!((info.duration_secs - 12.033).abs() < 1e-9);
    assert!(info.has_video);
    assert!(info.has_audio);
}

#[test]
fn parses_audio_only_and_falls_back_to_stream_duration() {
    let json = br#"{
        "streams": [{"codec_type": "audio", "duration": "4.5"}],
        "format": {}
    }"#;
    let info = parse_probe_json(json).unwrap();
    assert!(!info.has_video);
    assert!(info.has_audio);
    assert_eq!(info.fps, None);
    assert!((info.duration_secs - 4.5).abs() < 1e-9);
    assert!(info.video_fps().is_err());
}

#[test]
fn zero_rate_falls_back_to_average() {
    let json = br#"{
        "streams": [{"codec_type": "video", "width": 8, "height": 8, "r_frame_rate": "0/0", "avg_frame_rate": "25/1"}],
        "format": {"duration": "1.0"}
    }"#;
    let info = parse_probe_json(json).unwrap();
    assert_eq!(info.fps, Some(Fps { num: 25, den: 1 }));
}

#[test]
fn rejects_streamless_output() {
    let json = br#"{"streams": [], "format": {"duration": "1.0"}}"#;
    assert!(parse_probe_json(json).is_err());
    assert!(parse_probe_json(b"not json").is_err());
}

#[test]
fn missing_file_is_asset_unreadable() {
    let err = probe(Path::new("definitely/not/here.mp4")).unwrap_err();
    assert!(matches!(err, ReelError::AssetUnreadable(_)));
}
