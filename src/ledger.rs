//! Usage ledger: durable record of consumed content identifiers.
//!
//! The ledger is a newline-delimited UTF-8 text file that is only ever appended to.
//! Duplicate lines are tolerated; readers treat the file as a set. Every operation holds an
//! advisory lock on a sibling `.lock` file so that several generator processes sharing one
//! ledger never hand out the same item twice.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use fs2::FileExt;

use crate::foundation::error::{ReelError, ReelResult};

/// Handle to a ledger file on disk.
#[derive(Clone, Debug)]
pub struct UsageLedger {
    path: PathBuf,
    lock_path: PathBuf,
}

struct LedgerLock(File);

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.0);
    }
}

impl UsageLedger {
    /// Open the ledger at `path`, creating an empty file (and parent dirs) if missing.
    pub fn open(path: impl Into<PathBuf>) -> ReelResult<Self> {
        let path = path.into();
        crate::media::ffmpeg::ensure_parent_dir(&path)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open usage ledger '{}'", path.display()))?;

        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Ok(Self { path, lock_path })
    }

    /// Location of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `id` has been recorded, by this or any other process.
    pub fn contains(&self, id: &str) -> ReelResult<bool> {
        let _lock = self.lock(false)?;
        let id = id.trim();
        Ok(self.read_entries()?.iter().any(|e| e == id))
    }

    /// Append `id`. Repeats are written as-is.
    pub fn record(&self, id: &str) -> ReelResult<()> {
        let id = validate_id(id)?;
        let _lock = self.lock(true)?;
        self.append(id)
    }

    /// Record `id` unless it is already present, atomically with respect to other processes.
    ///
    /// Returns `true` when this call claimed the identifier.
    pub fn claim(&self, id: &str) -> ReelResult<bool> {
        let id = validate_id(id)?;
        let _lock = self.lock(true)?;
        if self.read_entries()?.iter().any(|e| e == id) {
            return Ok(false);
        }
        self.append(id)?;
        Ok(true)
    }

    /// Distinct recorded identifiers.
    pub fn entries(&self) -> ReelResult<HashSet<String>> {
        let _lock = self.lock(false)?;
        Ok(self.read_entries()?.into_iter().collect())
    }

    fn lock(&self, exclusive: bool) -> ReelResult<LedgerLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| {
                format!("failed to open ledger lock '{}'", self.lock_path.display())
            })?;
        if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        }
        .with_context(|| format!("failed to lock usage ledger '{}'", self.path.display()))?;
        Ok(LedgerLock(file))
    }

    fn read_entries(&self) -> ReelResult<Vec<String>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read usage ledger '{}'", self.path.display()))
                    .into());
            }
        };
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line
                .with_context(|| format!("failed to read usage ledger '{}'", self.path.display()))?;
            let line = line.trim();
            if !line.is_empty() {
                out.push(line.to_string());
            }
        }
        Ok(out)
    }

    // Caller holds the exclusive lock.
    fn append(&self, id: &str) -> ReelResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open usage ledger '{}'", self.path.display()))?;

        // An unterminated last line (hand-edited file, torn write) must not absorb the new id.
        let mut line = String::with_capacity(id.len() + 2);
        let len = file.metadata().context("failed to stat usage ledger")?.len();
        if len > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))
                .and_then(|_| file.read_exact(&mut last))
                .context("failed to read usage ledger tail")?;
            if last[0] != b'\n' {
                line.push('\n');
            }
        }
        line.push_str(id);
        line.push('\n');
        file.write_all(line.as_bytes())
            .context("failed to append to usage ledger")?;
        file.flush().context("failed to flush usage ledger")?;
        Ok(())
    }
}

fn validate_id(id: &str) -> ReelResult<&str> {
    let id = id.trim();
    if id.is_empty() || id.contains(['\n', '\r']) {
        return Err(ReelError::validation(format!(
            "ledger identifiers must be non-empty single lines, got {id:?}"
        )));
    }
    Ok(id)
}

#[cfg(test)]
#[path = "../tests/unit/ledger.rs"]
mod tests;
