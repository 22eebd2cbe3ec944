//! Background pad compositor: a blurred copy of a secondary clip fills the canvas behind a
//! slightly shrunk, centred foreground.

use std::path::Path;

use image::RgbaImage;

use crate::blur::blur_frame;
use crate::foundation::core::{Dims, Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::geometry::{fit_frame, keep_aspect_height};
use crate::media::decode::{FfmpegFrameReader, FrameSource};
use crate::media::encode::{AudioInput, FfmpegSink, FfmpegSinkOpts, FrameSink, SinkConfig};
use crate::media::probe::MediaAsset;

/// Tuning for [`composite_with_background`].
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PadOptions {
    /// Gaussian kernel size in pixels; forced odd and at least 1.
    pub blur_kernel: u32,
    /// Pixels removed from each side of the foreground width before centring.
    pub margin_px: u32,
    /// Largest foreground/background duration difference treated as equal.
    pub duration_tolerance_secs: f64,
}

impl Default for PadOptions {
    fn default() -> Self {
        Self {
            blur_kernel: 70,
            margin_px: 50,
            duration_tolerance_secs: 0.05,
        }
    }
}

/// Placement of the shrunk foreground on the background canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PadLayout {
    /// Output canvas, equal to the original foreground size.
    pub canvas: Dims,
    /// Shrunk foreground size.
    pub inner: Dims,
    /// Left edge of the foreground.
    pub x: u32,
    /// Top edge of the foreground.
    pub y: u32,
}

impl PadLayout {
    /// Shrink `foreground` by `margin_px` per side (aspect preserved) and centre it.
    pub fn plan(foreground: Dims, margin_px: u32) -> ReelResult<Self> {
        let canvas = Dims::new(foreground.width, foreground.height)?;
        let inner_width = margin_px
            .checked_mul(2)
            .and_then(|m| canvas.width.checked_sub(m))
            .filter(|w| *w > 0)
            .ok_or_else(|| {
                ReelError::validation(format!(
                    "pad margin {margin_px}px leaves no room in a {canvas} foreground"
                ))
            })?;
        let inner = Dims {
            width: inner_width,
            height: keep_aspect_height(canvas.width, canvas.height, inner_width),
        };
        Ok(Self {
            canvas,
            inner,
            x: (canvas.width - inner.width) / 2,
            y: (canvas.height - inner.height) / 2,
        })
    }
}

/// Fail with [`ReelError::DurationMismatch`] unless the two durations agree within `tolerance`.
pub fn check_durations(foreground_secs: f64, background_secs: f64, tolerance: f64) -> ReelResult<()> {
    if (foreground_secs - background_secs).abs() > tolerance.max(0.0) {
        return Err(ReelError::DurationMismatch {
            foreground_secs,
            background_secs,
        });
    }
    Ok(())
}

/// Composite every foreground frame over a blurred background frame.
///
/// The output has exactly as many frames as `foreground`. If the background runs out first
/// its last frame is held.
pub fn pad_frames(
    foreground: &mut dyn FrameSource,
    background: &mut dyn FrameSource,
    layout: PadLayout,
    blur_kernel: u32,
    fps: Fps,
    audio: Option<AudioInput>,
    sink: &mut dyn FrameSink,
) -> ReelResult<u64> {
    sink.begin(SinkConfig {
        dims: layout.canvas,
        fps,
        audio,
    })?;

    let mut held_bg: Option<RgbaImage> = None;
    let mut idx = 0u64;
    while let Some(fg) = foreground.next_frame()? {
        if let Some(bg) = background.next_frame()? {
            let bg = fit_frame(bg, layout.canvas);
            held_bg = Some(blur_frame(&bg, blur_kernel)?);
        }
        let Some(bg) = held_bg.as_ref() else {
            return Err(ReelError::validation("background stream produced no frames"));
        };

        let mut frame = bg.clone();
        let fg = fit_frame(fg, layout.inner);
        image::imageops::replace(&mut frame, &fg, i64::from(layout.x), i64::from(layout.y));
        sink.push_frame(FrameIndex(idx), &frame)?;
        idx += 1;
    }

    sink.end()?;
    Ok(idx)
}

/// Build the blurred background from `background_path` and centre `foreground_path` on it.
///
/// Both inputs must already share the same duration. The output keeps the foreground's size,
/// frame rate and duration, and only the foreground's audio.
#[tracing::instrument(skip(opts), fields(fg = %foreground_path.display(), bg = %background_path.display()))]
pub fn composite_with_background(
    foreground_path: &Path,
    background_path: &Path,
    opts: &PadOptions,
    out_path: &Path,
) -> ReelResult<MediaAsset> {
    let fg = MediaAsset::open(foreground_path)?;
    let bg = MediaAsset::open(background_path)?;
    check_durations(
        fg.info.duration_secs,
        bg.info.duration_secs,
        opts.duration_tolerance_secs,
    )?;

    let layout = PadLayout::plan(fg.dims(), opts.margin_px)?;
    let fps = fg.info.video_fps()?;

    let mut fg_reader = FfmpegFrameReader::open(&fg.path, Some(layout.inner))?;
    let mut bg_reader = FfmpegFrameReader::open(&bg.path, Some(layout.canvas))?;
    let audio = fg.info.has_audio.then(|| AudioInput {
        path: fg.path.clone(),
        max_duration_secs: None,
    });
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(out_path));
    let frames = pad_frames(
        &mut fg_reader,
        &mut bg_reader,
        layout,
        opts.blur_kernel,
        fps,
        audio,
        &mut sink,
    )?;
    tracing::info!(
        frames,
        canvas = %layout.canvas,
        inner = %layout.inner,
        "composited foreground over blurred background"
    );

    MediaAsset::open(out_path)
}

#[cfg(test)]
#[path = "../tests/unit/pad.rs"]
mod tests;
