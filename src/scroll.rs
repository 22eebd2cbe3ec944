//! Scroll renderer: turns a tall still image into a constant-velocity scrolling video.
//!
//! The scroll speed is not fixed. It is derived from the target duration so that the last
//! frame shows the bottom of the image exactly when the narration ends.

use std::path::Path;

use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

use crate::foundation::core::{Dims, Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::linear_ramp_floor;
use crate::geometry::keep_aspect_height;
use crate::media::encode::{FfmpegSink, FfmpegSinkOpts, FrameSink, SinkConfig};
use crate::media::probe::MediaAsset;

/// Default output frame rate of scroll videos.
pub const SCROLL_FPS: u32 = 30;

/// Parameters for one scroll render.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScrollParams {
    /// Target duration in seconds.
    pub duration_secs: f64,
    /// Height of the visible viewport in pixels.
    pub viewport_height: u32,
    /// Output frame rate.
    pub fps: Fps,
    /// Fill used below images shorter than the viewport.
    pub fill_rgba: [u8; 4],
}

impl ScrollParams {
    /// Parameters at the default 30 fps with a white fill.
    pub fn new(duration_secs: f64, viewport_height: u32) -> Self {
        Self {
            duration_secs,
            viewport_height,
            fps: Fps {
                num: SCROLL_FPS,
                den: 1,
            },
            fill_rgba: [255, 255, 255, 255],
        }
    }

    fn validate(&self) -> ReelResult<()> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ReelError::validation(format!(
                "scroll duration must be a positive number of seconds, got {}",
                self.duration_secs
            )));
        }
        if self.viewport_height == 0 {
            return Err(ReelError::validation("scroll viewport height must be non-zero"));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        Ok(())
    }

    /// `ceil(duration * fps)`.
    pub fn frame_count(&self) -> u64 {
        self.fps.secs_to_frames_ceil(self.duration_secs).max(1)
    }
}

/// Vertical crop offset of frame `i` out of `total_frames`.
///
/// Advances linearly from `0` on the first frame to `image_height - viewport` on the last.
/// Images no taller than the viewport never scroll.
pub fn scroll_offset(i: u64, total_frames: u64, image_height: u32, viewport: u32) -> u32 {
    let travel = image_height.saturating_sub(viewport);
    linear_ramp_floor(i, total_frames, u64::from(travel)) as u32
}

/// Stream the scroll frames of `image` into `sink`. Returns the number of frames written.
pub fn render_scroll_frames(
    image: &RgbaImage,
    params: &ScrollParams,
    sink: &mut dyn FrameSink,
) -> ReelResult<u64> {
    params.validate()?;
    let (width, image_height) = image.dimensions();
    let dims = Dims::new(width, params.viewport_height)?;
    let total = params.frame_count();

    sink.begin(SinkConfig {
        dims,
        fps: params.fps,
        audio: None,
    })?;

    if image_height <= params.viewport_height {
        let frame = letterbox_short_image(image, params);
        for i in 0..total {
            sink.push_frame(FrameIndex(i), &frame)?;
        }
    } else {
        let mut frame = RgbaImage::new(width, params.viewport_height);
        let row_bytes = width as usize * 4;
        let src = image.as_raw();
        for i in 0..total {
            let offset = scroll_offset(i, total, image_height, params.viewport_height) as usize;
            let start = offset * row_bytes;
            let end = start + params.viewport_height as usize * row_bytes;
            frame.copy_from_slice(&src[start..end]);
            sink.push_frame(FrameIndex(i), &frame)?;
        }
    }

    sink.end()?;
    Ok(total)
}

fn letterbox_short_image(image: &RgbaImage, params: &ScrollParams) -> RgbaImage {
    let mut frame =
        RgbaImage::from_pixel(image.width(), params.viewport_height, Rgba(params.fill_rgba));
    image::imageops::replace(&mut frame, image, 0, 0);
    frame
}

/// Decode the still image at `image_path`. Fails with [`ReelError::ImageUnreadable`].
pub fn load_image(image_path: &Path) -> ReelResult<RgbaImage> {
    let img = image::open(image_path).map_err(|e| ReelError::image_unreadable(image_path, e))?;
    Ok(img.to_rgba8())
}

/// Scale `image` to `width` pixels wide, keeping its aspect ratio. No-op at the right width.
pub fn fit_width(image: RgbaImage, width: u32) -> RgbaImage {
    if image.width() == width || width == 0 {
        return image;
    }
    let height = keep_aspect_height(image.width(), image.height(), width);
    image::imageops::resize(&image, width, height, FilterType::CatmullRom)
}

/// Render `image_path` as a scrolling MP4 at `out_path`.
#[tracing::instrument(skip(params), fields(image = %image_path.display()))]
pub fn render_scroll(
    image_path: &Path,
    params: &ScrollParams,
    out_path: &Path,
) -> ReelResult<MediaAsset> {
    let image = load_image(image_path)?;
    render_scroll_image(&image, params, out_path)
}

/// Render an already decoded image as a scrolling MP4 at `out_path`.
pub fn render_scroll_image(
    image: &RgbaImage,
    params: &ScrollParams,
    out_path: &Path,
) -> ReelResult<MediaAsset> {
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(out_path));
    let frames = render_scroll_frames(image, params, &mut sink)?;
    tracing::info!(
        frames,
        width = image.width(),
        image_height = image.height(),
        viewport = params.viewport_height,
        "rendered scroll video"
    );
    MediaAsset::open(out_path)
}

#[cfg(test)]
#[path = "../tests/unit/scroll.rs"]
mod tests;
