use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::collab::Metadata;
use crate::foundation::error::{ReelError, ReelResult};

/// File name of the video inside an output directory.
pub const VIDEO_FILE: &str = "video.mp4";
/// File name of the metadata document inside an output directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Subdirectory of the output dir holding videos that never got metadata.
pub const UNPUBLISHED_DIR: &str = "unpublished";

const RENAME_ATTEMPTS: u32 = 16;

/// Next `n` such that `output_dir/video_<n>` is free: one past the highest existing index.
pub fn next_output_index(output_dir: &Path) -> ReelResult<u64> {
    let entries = match std::fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to list output dir '{}'", output_dir.display()))
                .into());
        }
    };
    let mut next = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let index = name
            .to_str()
            .and_then(|n| n.strip_prefix("video_"))
            .and_then(|n| n.parse::<u64>().ok());
        if let Some(i) = index {
            next = next.max(i + 1);
        }
    }
    Ok(next)
}

/// Move `video` and a `metadata` document into a new `output_dir/video_<n>` directory.
///
/// Both files are written into `output_dir/.staging-<run_id>` first and the directory is
/// renamed into place, so a `video_<n>` directory is never observed half-written.
pub fn persist_output(
    output_dir: &Path,
    run_id: &str,
    video: &Path,
    metadata: &Metadata,
) -> ReelResult<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir '{}'", output_dir.display()))?;
    let staging = output_dir.join(format!(".staging-{run_id}"));
    if staging.exists() {
        std::fs::remove_dir_all(&staging)
            .with_context(|| format!("failed to clear '{}'", staging.display()))?;
    }
    std::fs::create_dir(&staging)
        .with_context(|| format!("failed to create '{}'", staging.display()))?;

    let staged = (|| -> ReelResult<()> {
        move_file(video, &staging.join(VIDEO_FILE))?;
        let doc = serde_json::to_vec_pretty(metadata).context("failed to serialise metadata")?;
        std::fs::write(staging.join(METADATA_FILE), doc).context("failed to write metadata")?;
        Ok(())
    })();
    if let Err(e) = staged {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }

    for _ in 0..RENAME_ATTEMPTS {
        let target = output_dir.join(format!("video_{}", next_output_index(output_dir)?));
        if target.exists() {
            continue;
        }
        match std::fs::rename(&staging, &target) {
            Ok(()) => {
                tracing::info!(path = %target.display(), "persisted output");
                return Ok(target);
            }
            // Another generator took this index between the scan and the rename.
            Err(e) if target.exists() => {
                tracing::debug!(path = %target.display(), error = %e, "output index taken, retrying");
            }
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to move output into '{}'", target.display()))
                    .into());
            }
        }
    }

    let _ = std::fs::remove_dir_all(&staging);
    Err(ReelError::validation(format!(
        "could not find a free output index in '{}'",
        output_dir.display()
    )))
}

/// Keep a finished `video` that cannot be published as `output_dir/unpublished/<run_id>.mp4`.
///
/// The file is moved in under a hidden name and renamed into place, so the final name only
/// ever refers to a complete video. It sits outside the `video_<n>` layout.
pub fn keep_unpublished(output_dir: &Path, run_id: &str, video: &Path) -> ReelResult<PathBuf> {
    let dir = output_dir.join(UNPUBLISHED_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create '{}'", dir.display()))?;
    let partial = dir.join(format!(".{run_id}.mp4.part"));
    let target = dir.join(format!("{run_id}.mp4"));
    move_file(video, &partial)?;
    if let Err(e) = std::fs::rename(&partial, &target) {
        let _ = std::fs::remove_file(&partial);
        return Err(anyhow::Error::new(e)
            .context(format!("failed to move video into '{}'", target.display()))
            .into());
    }
    Ok(target)
}

// Rename when possible; copy then delete across filesystems.
fn move_file(from: &Path, to: &Path) -> ReelResult<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)
        .with_context(|| format!("failed to copy '{}' to '{}'", from.display(), to.display()))?;
    if let Err(e) = std::fs::remove_file(from) {
        tracing::debug!(path = %from.display(), error = %e, "could not remove moved source");
    }
    Ok(())
}
