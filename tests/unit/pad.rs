use super::*;
use crate::media::decode::VecFrameSource;
use crate::media::encode::InMemorySink;

fn fps30() -> Fps {
    Fps::new(30, 1).unwrap()
}

#[test]
fn layout_shrinks_by_margin_and_centres() {
    let layout = PadLayout::plan(
        Dims {
            width: 1080,
            height: 1920,
        },
        50,
    )
    .unwrap();
    assert_eq!(
        layout.canvas,
        Dims {
            width: 1080,
            height: 1920
        }
    );
    assert_eq!(
        layout.inner,
        Dims {
            width: 980,
            height: 1742
        }
    );
    assert_eq!((layout.x, layout.y), (50, 89));
}

#[test]
fn layout_rejects_margin_that_consumes_width() {
    let dims = Dims {
        width: 100,
        height: 100,
    };
    assert!(PadLayout::plan(dims, 50).is_err());
    assert!(PadLayout::plan(dims, u32::MAX).is_err());
    assert!(PadLayout::plan(dims, 49).is_ok());
}

#[test]
fn duration_check_is_deterministic() {
    assert!(check_durations(12.0, 12.0, 0.05).is_ok());
    assert!(check_durations(12.0, 12.04, 0.05).is_ok());
    let err = check_durations(12.0, 10.0, 0.05).unwrap_err();
    assert!(matches!(
        err,
        ReelError::DurationMismatch {
            foreground_secs,
            background_secs
        } if foreground_secs == 12.0 && background_secs == 10.0
    ));
    assert!(check_durations(12.0, 10.0, 0.05).is_err());
}

#[test]
fn output_follows_foreground_length_and_centres_it() {
    let canvas = Dims {
        width: 40,
        height: 60,
    };
    let layout = PadLayout::plan(canvas, 5).unwrap();
    let mut fg = VecFrameSource::solid(layout.inner, [255, 0, 0, 255], 6);
    // Background is shorter and in another size; it is resized and its last frame held.
    let mut bg = VecFrameSource::solid(
        Dims {
            width: 20,
            height: 20,
        },
        [0, 0, 255, 255],
        4,
    );
    let mut sink = InMemorySink::new();
    let n = pad_frames(&mut fg, &mut bg, layout, 9, fps30(), None, &mut sink).unwrap();

    assert_eq!(n, 6);
    assert_eq!(sink.config().unwrap().dims, canvas);
    let frame = &sink.frames()[5].1;
    assert_eq!(frame.dimensions(), (40, 60));
    assert_eq!(frame.get_pixel(0, 0).0, [0, 0, 255, 255]);
    assert_eq!(frame.get_pixel(20, 30).0, [255, 0, 0, 255]);
    assert_eq!(frame.get_pixel(layout.x, layout.y).0, [255, 0, 0, 255]);
    assert_eq!(frame.get_pixel(layout.x - 1, 30).0, [0, 0, 255, 255]);
}

#[test]
fn empty_background_is_an_error() {
    let layout = PadLayout::plan(
        Dims {
            width: 20,
            height: 20,
        },
        2,
    )
    .unwrap();
    let mut fg = VecFrameSource::solid(layout.inner, [255, 0, 0, 255], 2);
    let mut bg = VecFrameSource::solid(layout.canvas, [0, 0, 0, 255], 0);
    let mut sink = InMemorySink::new();
    assert!(pad_frames(&mut fg, &mut bg, layout, 5, fps30(), None, &mut sink).is_err());
}

#[test]
fn options_default_from_partial_json() {
    let opts: PadOptions = serde_json::from_str(r#"{"margin_px": 20}"#).unwrap();
    assert_eq!(opts.margin_px, 20);
    assert_eq!(opts.blur_kernel, 70);
}
