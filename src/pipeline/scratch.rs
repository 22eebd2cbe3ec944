use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::ReelResult;

/// Run-private directory for intermediate media.
///
/// Lives at `<parent>/run-<uuid>`. It is removed by [`ScratchDir::cleanup`] or, failing
/// that, on drop.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    released: bool,
}

impl ScratchDir {
    /// Create a fresh, uniquely named scratch directory under `parent`.
    pub fn create(parent: &Path) -> ReelResult<Self> {
        let path = parent.join(format!("run-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create scratch dir '{}'", path.display()))?;
        Ok(Self {
            path,
            released: false,
        })
    }

    /// Directory location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `name` inside the directory.
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Delete the directory. Anything that cannot be removed is queued on `deferred`.
    pub fn cleanup(mut self, deferred: &mut DeferredDeletions) {
        self.released = true;
        if let Err(e) = remove_forcefully(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "scratch cleanup failed, deferring");
            deferred.push(self.path.clone());
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_forcefully(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "scratch cleanup failed");
        }
    }
}

/// Paths whose deletion failed, retried later.
#[derive(Debug, Default)]
pub struct DeferredDeletions {
    paths: Vec<PathBuf>,
}

impl DeferredDeletions {
    /// Queue `path`.
    pub fn push(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    /// Number of queued paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Try every queued deletion once; keeps the ones that still fail. Returns how many remain.
    pub fn retry(&mut self) -> usize {
        self.paths.retain(|path| match remove_forcefully(path) {
            Ok(()) => false,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "deferred deletion still failing");
                true
            }
        });
        self.paths.len()
    }
}

/// Remove a file or directory tree. On `PermissionDenied` the tree and its parent are made
/// writable and the removal is retried once. A missing path is not an error.
pub fn remove_forcefully(path: &Path) -> std::io::Result<()> {
    match remove_any(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::debug!(path = %path.display(), "permission denied, resetting permissions");
            if let Some(parent) = path.parent() {
                let _ = make_writable(parent);
            }
            make_writable_tree(path);
            match remove_any(path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
        Err(e) => Err(e),
    }
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn make_writable_tree(path: &Path) {
    let _ = make_writable(path);
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let child = entry.path();
            if entry.file_type().is_ok_and(|t| t.is_dir()) {
                make_writable_tree(&child);
            } else {
                let _ = make_writable(&child);
            }
        }
    }
}

fn make_writable(path: &Path) -> std::io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        return Ok(());
    }
    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        let extra = if meta.is_dir() { 0o700 } else { 0o600 };
        perms.set_mode(perms.mode() | extra);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    std::fs::set_permissions(path, perms)
}
