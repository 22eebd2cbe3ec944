use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Stdio};
use std::thread::JoinHandle;

use image::RgbaImage;

use crate::foundation::core::Dims;
use crate::foundation::error::{ReelError, ReelResult};
use crate::media::ffmpeg::{drain_stderr, ffmpeg_command, join_stderr};
use crate::media::probe::probe;

/// Pull-based source of RGBA frames in presentation order.
pub trait FrameSource {
    /// Size of every frame this source yields.
    fn dims(&self) -> Dims;
    /// Next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> ReelResult<Option<RgbaImage>>;
}

/// In-memory frame source for tests and debugging.
#[derive(Debug, Default)]
pub struct VecFrameSource {
    dims: Option<Dims>,
    frames: VecDeque<RgbaImage>,
}

impl VecFrameSource {
    /// Wrap pre-built frames. All frames must share the first frame's size.
    pub fn new(frames: Vec<RgbaImage>) -> ReelResult<Self> {
        let dims = frames.first().map(|f| Dims {
            width: f.width(),
            height: f.height(),
        });
        if let Some(d) = dims
            && frames
                .iter()
                .any(|f| f.width() != d.width || f.height() != d.height)
        {
            return Err(ReelError::validation(
                "VecFrameSource frames must share identical dimensions",
            ));
        }
        Ok(Self {
            dims,
            frames: frames.into(),
        })
    }

    /// `count` copies of a solid-colour frame.
    pub fn solid(dims: Dims, rgba: [u8; 4], count: usize) -> Self {
        let frame = RgbaImage::from_pixel(dims.width, dims.height, image::Rgba(rgba));
        Self {
            dims: Some(dims),
            frames: std::iter::repeat_n(frame, count).collect(),
        }
    }
}

impl FrameSource for VecFrameSource {
    fn dims(&self) -> Dims {
        self.dims.unwrap_or(Dims {
            width: 0,
            height: 0,
        })
    }

    fn next_frame(&mut self) -> ReelResult<Option<RgbaImage>> {
        Ok(self.frames.pop_front())
    }
}

/// Streams decoded frames out of a system `ffmpeg` child process.
///
/// When `scale_to` is set, ffmpeg resamples every frame to that exact size (aspect not preserved).
pub struct FfmpegFrameReader {
    path: PathBuf,
    dims: Dims,
    frame_len: usize,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    frames_read: u64,
}

impl FfmpegFrameReader {
    /// Open `path` for decoding. Fails with [`ReelError::StreamOpen`] if it has no readable video.
    pub fn open(path: &Path, scale_to: Option<Dims>) -> ReelResult<Self> {
        let info = probe(path).map_err(|e| ReelError::stream_open(path, e))?;
        if !info.has_video || info.width == 0 || info.height == 0 {
            return Err(ReelError::stream_open(path, "no video stream"));
        }
        let dims = scale_to.unwrap_or(Dims {
            width: info.width,
            height: info.height,
        });
        Dims::new(dims.width, dims.height)?;

        let mut cmd = ffmpeg_command();
        cmd.arg("-i").arg(path);
        if let Some(d) = scale_to {
            cmd.args([
                "-vf",
                &format!("scale={}:{}:flags=bicubic,setsar=1", d.width, d.height),
            ]);
        }
        cmd.args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        tracing::debug!(?cmd, "spawning ffmpeg decoder");

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::stream_open(path, format!("failed to spawn ffmpeg decoder: {e}"))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::stream_open(path, "failed to open ffmpeg stdout"))?;
        let stderr_drain = drain_stderr(&mut child);

        Ok(Self {
            path: path.to_path_buf(),
            dims,
            frame_len: dims.width as usize * dims.height as usize * 4,
            child: Some(child),
            stdout: Some(stdout),
            stderr_drain,
            frames_read: 0,
        })
    }

    /// Number of frames yielded so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn finish(&mut self) -> ReelResult<()> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait().map_err(|e| {
            ReelError::stream_open(&self.path, format!("failed to wait for decoder: {e}"))
        })?;
        let stderr = join_stderr(self.stderr_drain.take());
        if !status.success() {
            return Err(ReelError::stream_open(
                &self.path,
                format!("ffmpeg decoder exited with status {status}: {stderr}"),
            ));
        }
        Ok(())
    }
}

impl FrameSource for FfmpegFrameReader {
    fn dims(&self) -> Dims {
        self.dims
    }

    fn next_frame(&mut self) -> ReelResult<Option<RgbaImage>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0usize;
        while filled < buf.len() {
            match stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ReelError::stream_open(
                        &self.path,
                        format!("failed reading decoded frame: {e}"),
                    ));
                }
            }
        }

        if filled < buf.len() {
            // Trailing partial frames are dropped; they only appear on truncated input.
            if filled > 0 {
                tracing::warn!(
                    path = %self.path.display(),
                    bytes = filled,
                    "discarding truncated trailing frame"
                );
            }
            self.finish()?;
            return Ok(None);
        }

        self.frames_read += 1;
        RgbaImage::from_raw(self.dims.width, self.dims.height, buf)
            .map(Some)
            .ok_or_else(|| ReelError::stream_open(&self.path, "decoded frame size mismatch"))
    }
}

impl Drop for FfmpegFrameReader {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            // Readers are routinely abandoned mid-stream when a paired stream ends first.
            let _ = child.kill();
            let _ = child.wait();
        }
        let _ = join_stderr(self.stderr_drain.take());
    }
}
