//! Frame geometry utilities: probing and resizing media assets.

use std::path::Path;

use image::RgbaImage;
use image::imageops::FilterType;

use crate::foundation::core::{Dims, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::foundation::math::scale_round;
use crate::media::decode::{FfmpegFrameReader, FrameSource};
use crate::media::encode::{AudioInput, FfmpegSink, FfmpegSinkOpts, FrameSink, SinkConfig};
use crate::media::probe::MediaAsset;

/// Height that keeps `src_w:src_h` at `target_w`: `round(target_w * src_h / src_w)`, at least 1.
pub fn keep_aspect_height(src_w: u32, src_h: u32, target_w: u32) -> u32 {
    scale_round(target_w, src_h, src_w)
}

/// Resize `asset` to exactly `width x height` (aspect ratio not preserved) into `out_path`.
///
/// Frame rate and audio are carried over; the video is re-encoded.
#[tracing::instrument(skip(asset), fields(src = %asset.path.display()))]
pub fn resize(asset: &MediaAsset, width: u32, height: u32, out_path: &Path) -> ReelResult<MediaAsset> {
    let target = Dims::new(width, height)?;
    let fps = asset.info.video_fps()?;

    let mut reader = FfmpegFrameReader::open(&asset.path, Some(target))?;
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(out_path));
    let audio = asset.info.has_audio.then(|| AudioInput {
        path: asset.path.clone(),
        max_duration_secs: None,
    });
    let frames = pump(
        &mut reader,
        &mut sink,
        SinkConfig {
            dims: target,
            fps,
            audio,
        },
    )?;
    tracing::info!(frames, %target, "resized video");

    MediaAsset::open(out_path)
}

/// Resize `asset` to `target_width`, deriving the height from the source aspect ratio.
pub fn resize_keep_aspect(
    asset: &MediaAsset,
    target_width: u32,
    out_path: &Path,
) -> ReelResult<MediaAsset> {
    if target_width == 0 {
        return Err(ReelError::validation("resize target width must be non-zero"));
    }
    let height = keep_aspect_height(asset.info.width, asset.info.height, target_width);
    resize(asset, target_width, height, out_path)
}

/// Stretch `frame` to `dims` unless it already has that size.
pub(crate) fn fit_frame(frame: RgbaImage, dims: Dims) -> RgbaImage {
    if frame.width() == dims.width && frame.height() == dims.height {
        frame
    } else {
        image::imageops::resize(&frame, dims.width, dims.height, FilterType::Triangle)
    }
}

/// Copy every frame of `source` into `sink`, returning the number of frames written.
pub(crate) fn pump(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    cfg: SinkConfig,
) -> ReelResult<u64> {
    sink.begin(cfg)?;
    let mut idx = 0u64;
    while let Some(frame) = source.next_frame()? {
        sink.push_frame(FrameIndex(idx), &frame)?;
        idx += 1;
    }
    sink.end()?;
    Ok(idx)
}

#[cfg(test)]
#[path = "../tests/unit/geometry.rs"]
mod tests;
