use super::*;
use crate::media::encode::InMemorySink;

/// Image whose every row is tagged with its own index in the red channel.
fn row_tagged_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |_, y| Rgba([(y % 256) as u8, 0, 0, 255]))
}

#[test]
fn frame_count_is_ceil_of_duration_times_fps() {
    assert_eq!(ScrollParams::new(2.0, 10).frame_count(), 60);
    assert_eq!(ScrollParams::new(2.01, 10).frame_count(), 61);
    assert_eq!(ScrollParams::new(0.01, 10).frame_count(), 1);
}

#[test]
fn offsets_are_monotonic_and_end_at_bottom() {
    let total = 61;
    let (hi, h) = (200u32, 50u32);
    let mut prev = 0;
    for i in 0..total {
        let off = scroll_offset(i, total, hi, h);
        assert!(off >= prev);
        assert!(off <= hi - h);
        prev = off;
    }
    assert_eq!(scroll_offset(0, total, hi, h), 0);
    assert_eq!(scroll_offset(total - 1, total, hi, h), hi - h);
}

#[test]
fn short_images_never_scroll() {
    for i in 0..10 {
        assert_eq!(scroll_offset(i, 10, 40, 50), 0);
        assert_eq!(scroll_offset(i, 10, 50, 50), 0);
    }
}

#[test]
fn rendered_frames_are_viewport_slices() {
    let image = row_tagged_image(6, 120);
    let params = ScrollParams::new(1.0, 20);
    let mut sink = InMemorySink::new();
    let n = render_scroll_frames(&image, &params, &mut sink).unwrap();

    assert_eq!(n, 30);
    assert_eq!(sink.frames().len(), 30);
    let cfg = sink.config().unwrap();
    assert_eq!(cfg.dims, Dims { width: 6, height: 20 });
    assert_eq!(cfg.fps, Fps { num: 30, den: 1 });

    let first = &sink.frames()[0].1;
    assert_eq!(first.get_pixel(0, 0)[0], 0);
    assert_eq!(first.get_pixel(5, 19)[0], 19);

    let last = &sink.frames()[29].1;
    assert_eq!(last.get_pixel(0, 0)[0], 100);
    assert_eq!(last.get_pixel(0, 19)[0], 119);

    let mut prev_top = 0u8;
    for (_, frame) in sink.frames() {
        let top = frame.get_pixel(0, 0)[0];
        assert!(top >= prev_top);
        prev_top = top;
    }
}

#[test]
fn short_image_frames_are_identical_and_padded() {
    let image = row_tagged_image(4, 10);
    let params = ScrollParams::new(0.5, 16);
    let mut sink = InMemorySink::new();
    render_scroll_frames(&image, &params, &mut sink).unwrap();

    let frames = sink.frames();
    assert_eq!(frames.len(), 15);
    assert!(frames.iter().all(|(_, f)| f == &frames[0].1));
    let f = &frames[0].1;
    assert_eq!(f.dimensions(), (4, 16));
    assert_eq!(f.get_pixel(0, 9)[0], 9);
    assert_eq!(f.get_pixel(0, 12), &Rgba([255, 255, 255, 255]));
}

#[test]
fn invalid_params_are_rejected() {
    let image = row_tagged_image(4, 10);
    let mut sink = InMemorySink::new();
    assert!(render_scroll_frames(&image, &ScrollParams::new(0.0, 5), &mut sink).is_err());
    assert!(render_scroll_frames(&image, &ScrollParams::new(f64::NAN, 5), &mut sink).is_err());
    assert!(render_scroll_frames(&image, &ScrollParams::new(1.0, 0), &mut sink).is_err());
}

#[test]
fn unreadable_image_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"definitely not a png").unwrap();
    let err = load_image(&path).unwrap_err();
    assert!(matches!(err, ReelError::ImageUnreadable(_)));
    let err = load_image(&dir.path().join("missing.png")).unwrap_err();
    assert!(matches!(err, ReelError::ImageUnreadable(_)));
}

#[test]
fn fit_width_keeps_aspect_ratio() {
    let img = row_tagged_image(200, 500);
    let fitted = fit_width(img.clone(), 100);
    assert_eq!(fitted.dimensions(), (100, 250));
    assert_eq!(fit_width(img, 200).dimensions(), (200, 500));
}
