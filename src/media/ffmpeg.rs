use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use crate::foundation::error::{ReelError, ReelResult};

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    tool_runs("ffmpeg")
}

/// Return `true` when both `ffmpeg` and `ffprobe` can be invoked from `PATH`.
pub fn ffmpeg_available() -> bool {
    tool_runs("ffmpeg") && tool_runs("ffprobe")
}

fn tool_runs(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Base `ffmpeg` invocation: quiet, non-interactive, overwrite outputs.
pub(crate) fn ffmpeg_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]);
    cmd
}

/// Run a one-shot ffmpeg command to completion, surfacing stderr on failure.
pub(crate) fn run_ffmpeg(mut cmd: Command, what: &str) -> ReelResult<()> {
    tracing::debug!(?cmd, "running ffmpeg ({what})");
    let out = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            ReelError::encode(format!(
                "failed to spawn ffmpeg for {what} (is it installed and on PATH?): {e}"
            ))
        })?;
    if !out.status.success() {
        return Err(ReelError::encode(format!(
            "ffmpeg {what} exited with status {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    Ok(())
}

/// Drain a child's stderr on a background thread so a chatty process never blocks on a full pipe.
pub(crate) fn drain_stderr(child: &mut Child) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(bytes)
    }))
}

pub(crate) fn join_stderr(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> String {
    match handle {
        Some(h) => match h.join() {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Ok(Err(e)) => format!("<stderr read failed: {e}>"),
            Err(_) => "<stderr drain thread panicked>".to_string(),
        },
        None => String::new(),
    }
}
