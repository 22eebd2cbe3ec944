//! Audio synchroniser: replaces a video's soundtrack with narration, trimmed to the picture.

use std::path::Path;

use crate::foundation::error::{ReelError, ReelResult};
use crate::media::ffmpeg::{ensure_parent_dir, ffmpeg_command, run_ffmpeg};
use crate::media::probe::MediaAsset;

/// What to do with a narration track relative to the picture it is laid under.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AudioPlan {
    /// Audio is longer than the video: cut it at this many seconds.
    TrimTo(f64),
    /// Audio fits: attach as-is; any remainder of the video is silent.
    AsIs,
}

impl AudioPlan {
    /// Decide from the two durations.
    pub fn for_durations(video_secs: f64, audio_secs: f64) -> Self {
        if audio_secs > video_secs {
            Self::TrimTo(video_secs)
        } else {
            Self::AsIs
        }
    }

    /// Audio duration expected in the output.
    pub fn output_audio_secs(self, audio_secs: f64) -> f64 {
        match self {
            Self::TrimTo(t) => t,
            Self::AsIs => audio_secs,
        }
    }
}

/// Mux `audio_path` under `video_path` into `out_path`, replacing any existing audio.
///
/// The picture is stream-copied; the narration is encoded to AAC.
#[tracing::instrument(fields(video = %video_path.display(), audio = %audio_path.display()))]
pub fn sync_audio(video_path: &Path, audio_path: &Path, out_path: &Path) -> ReelResult<MediaAsset> {
    let video = MediaAsset::open(video_path)?;
    let audio = MediaAsset::open(audio_path)?;
    if !video.info.has_video {
        return Err(ReelError::asset_unreadable(video_path, "no video stream"));
    }
    if !audio.info.has_audio {
        return Err(ReelError::asset_unreadable(audio_path, "no audio stream"));
    }

    let plan = AudioPlan::for_durations(video.info.duration_secs, audio.info.duration_secs);
    ensure_parent_dir(out_path)?;

    let mut cmd = ffmpeg_command();
    cmd.arg("-i").arg(video_path);
    if let AudioPlan::TrimTo(t) = plan {
        cmd.args(["-t", &format!("{t:.6}")]);
    }
    cmd.arg("-i").arg(audio_path).args([
        "-map",
        "0:v:0",
        "-map",
        "1:a:0",
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-b:a",
        "192k",
        "-movflags",
        "+faststart",
    ]);
    cmd.arg(out_path);
    run_ffmpeg(cmd, "audio sync")?;

    tracing::info!(
        video_secs = video.info.duration_secs,
        audio_secs = audio.info.duration_secs,
        ?plan,
        "attached narration"
    );
    MediaAsset::open(out_path)
}

#[cfg(test)]
#[path = "../tests/unit/audio_sync.rs"]
mod tests;
