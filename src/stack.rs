//! Vertical stream compositor: stacks two videos top/bottom into one canvas.

use std::path::Path;

use image::RgbaImage;

use crate::foundation::core::{Dims, Fps, FrameIndex};
use crate::foundation::error::{ReelError, ReelResult};
use crate::geometry::{fit_frame, keep_aspect_height};
use crate::media::decode::{FfmpegFrameReader, FrameSource};
use crate::media::encode::{FfmpegSink, FfmpegSinkOpts, FrameSink, SinkConfig};
use crate::media::probe::{MediaAsset, probe};

/// Output geometry of a vertical stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackLayout {
    /// Shared width, the smaller of the two input widths.
    pub width: u32,
    /// Top stream height after proportional scaling.
    pub top_height: u32,
    /// Bottom stream height after proportional scaling.
    pub bottom_height: u32,
}

impl StackLayout {
    /// Normalise both streams to the smaller width, each keeping its own aspect ratio.
    pub fn plan(top: Dims, bottom: Dims) -> ReelResult<Self> {
        Dims::new(top.width, top.height)?;
        Dims::new(bottom.width, bottom.height)?;
        let width = top.width.min(bottom.width);
        Ok(Self {
            width,
            top_height: keep_aspect_height(top.width, top.height, width),
            bottom_height: keep_aspect_height(bottom.width, bottom.height, width),
        })
    }

    /// Scaled size of the top band.
    pub fn top(&self) -> Dims {
        Dims {
            width: self.width,
            height: self.top_height,
        }
    }

    /// Scaled size of the bottom band.
    pub fn bottom(&self) -> Dims {
        Dims {
            width: self.width,
            height: self.bottom_height,
        }
    }

    /// Size of the stacked output.
    pub fn output(&self) -> Dims {
        Dims {
            width: self.width,
            height: self.top_height + self.bottom_height,
        }
    }
}

/// Stack frames pairwise until either source runs dry. Returns the frame count written.
///
/// Frames not already at their band size are resized here.
pub fn stack_frames(
    top: &mut dyn FrameSource,
    bottom: &mut dyn FrameSource,
    layout: StackLayout,
    fps: Fps,
    sink: &mut dyn FrameSink,
) -> ReelResult<u64> {
    let out_dims = layout.output();
    sink.begin(SinkConfig {
        dims: out_dims,
        fps,
        audio: None,
    })?;

    let mut canvas = RgbaImage::new(out_dims.width, out_dims.height);
    let split = layout.width as usize * layout.top_height as usize * 4;
    let mut idx = 0u64;
    loop {
        let (Some(a), Some(b)) = (top.next_frame()?, bottom.next_frame()?) else {
            break;
        };
        let a = fit_frame(a, layout.top());
        let b = fit_frame(b, layout.bottom());
        let buf: &mut [u8] = &mut canvas;
        buf[..split].copy_from_slice(a.as_raw());
        buf[split..].copy_from_slice(b.as_raw());
        sink.push_frame(FrameIndex(idx), &canvas)?;
        idx += 1;
    }

    sink.end()?;
    Ok(idx)
}

/// Stack `top_path` over `bottom_path` into `out_path`.
///
/// Output frame rate follows the top stream; the result has no audio track.
/// Fails with [`ReelError::StreamOpen`] when either input cannot be opened.
#[tracing::instrument(fields(top = %top_path.display(), bottom = %bottom_path.display()))]
pub fn stack_vertically(
    top_path: &Path,
    bottom_path: &Path,
    out_path: &Path,
) -> ReelResult<MediaAsset> {
    let top_info = probe(top_path).map_err(|e| ReelError::stream_open(top_path, e))?;
    let bottom_info = probe(bottom_path).map_err(|e| ReelError::stream_open(bottom_path, e))?;
    let fps = top_info
        .fps
        .ok_or_else(|| ReelError::stream_open(top_path, "no video frame rate"))?;

    let layout = StackLayout::plan(
        Dims {
            width: top_info.width,
            height: top_info.height,
        },
        Dims {
            width: bottom_info.width,
            height: bottom_info.height,
        },
    )
    .map_err(|e| ReelError::stream_open(top_path, e))?;

    let mut top = FfmpegFrameReader::open(top_path, Some(layout.top()))?;
    let mut bottom = FfmpegFrameReader::open(bottom_path, Some(layout.bottom()))?;
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(out_path));
    let frames = stack_frames(&mut top, &mut bottom, layout, fps, &mut sink)?;
    tracing::info!(frames, output = %layout.output(), "stacked videos");

    MediaAsset::open(out_path)
}

#[cfg(test)]
#[path = "../tests/unit/stack.rs"]
mod tests;
