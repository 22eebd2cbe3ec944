use std::path::{Path, PathBuf};

use crate::foundation::core::{Dims, Fps};
use crate::foundation::error::{ReelError, ReelResult};

/// A media file on disk plus the metadata derived from it.
///
/// Assets are never mutated in place; every transform writes a new file and probes it again.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaAsset {
    /// Location of the media file.
    pub path: PathBuf,
    /// Probed metadata.
    pub info: MediaInfo,
}

impl MediaAsset {
    /// Probe `path` and wrap the result.
    pub fn open(path: impl Into<PathBuf>) -> ReelResult<Self> {
        let path = path.into();
        let info = probe(&path)?;
        Ok(Self { path, info })
    }

    /// Pixel dimensions of the video stream.
    pub fn dims(&self) -> Dims {
        Dims {
            width: self.info.width,
            height: self.info.height,
        }
    }
}

/// Stream-level metadata reported by `ffprobe`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MediaInfo {
    /// Video width in pixels (0 for audio-only files).
    pub width: u32,
    /// Video height in pixels (0 for audio-only files).
    pub height: u32,
    /// Container duration in seconds.
    pub duration_secs: f64,
    /// Video frame rate; `None` for audio-only files.
    pub fps: Option<Fps>,
    /// Whether a video stream exists.
    pub has_video: bool,
    /// Whether at least one audio stream exists.
    pub has_audio: bool,
}

impl MediaInfo {
    /// Frame rate, or a validation error for audio-only media.
    pub fn video_fps(&self) -> ReelResult<Fps> {
        self.fps
            .ok_or_else(|| ReelError::validation("media has no video frame rate"))
    }
}

#[derive(serde::Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(serde::Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(serde::Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

/// Probe width, height, duration and frame rate of `path` through `ffprobe`.
///
/// Fails with [`ReelError::AssetUnreadable`] if the file cannot be opened or parsed.
pub fn probe(path: &Path) -> ReelResult<MediaInfo> {
    if !path.is_file() {
        return Err(ReelError::asset_unreadable(path, "file does not exist"));
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| ReelError::asset_unreadable(path, format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::asset_unreadable(
            path,
            String::from_utf8_lossy(&out.stderr).trim(),
        ));
    }

    parse_probe_json(&out.stdout).map_err(|e| ReelError::asset_unreadable(path, e))
}

fn parse_probe_json(bytes: &[u8]) -> Result<MediaInfo, String> {
    let parsed: ProbeOut =
        serde_json::from_slice(bytes).map_err(|e| format!("ffprobe json parse failed: {e}"))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    if video.is_none() && !has_audio {
        return Err("no audio or video stream found".to_string());
    }

    let parse_secs = |s: &Option<String>| s.as_deref().and_then(|v| v.trim().parse::<f64>().ok());
    let duration_secs = parse_secs(&parsed.format.duration)
        .or_else(|| parsed.streams.iter().find_map(|s| parse_secs(&s.duration)))
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| "missing duration from ffprobe".to_string())?;

    let (width, height, fps) = match video {
        Some(v) => {
            let width = v.width.ok_or("missing video width from ffprobe")?;
            let height = v.height.ok_or("missing video height from ffprobe")?;
            // `r_frame_rate` can read `0/0` for some containers; fall back to the average.
            let fps = [&v.r_frame_rate, &v.avg_frame_rate]
                .into_iter()
                .flatten()
                .find_map(|r| Fps::parse(r).ok());
            (width, height, fps)
        }
        None => (0, 0, None),
    };

    Ok(MediaInfo {
        width,
        height,
        duration_secs,
        fps,
        has_video: video.is_some(),
        has_audio,
    })
}

#[cfg(test)]
#[path = "../../tests/unit/media/probe.rs"]
mod tests;
