//! Single-run lock
//!
//! Advisory fd-lock on `<checkpoint>.run.lock`, held for the whole export so a second
//! process pointed at the same checkpoint fails fast. The OS drops the lock when the
//! process exits, so a crashed run never leaves a stale lock behind.

use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::state::ResumeError;

/// Run lock file for one checkpoint path
pub struct RunLock {
    path: PathBuf,
    lock: RwLock<File>,
}

/// Proof that the run lock is held; released on drop
pub struct RunLockGuard<'a> {
    _guard: RwLockWriteGuard<'a, File>,
}

impl RunLock {
    /// Open (creating if needed) the run lock file next to `checkpoint_path`
    pub fn open(checkpoint_path: &Path) -> Result<Self, ResumeError> {
        if let Some(parent) = checkpoint_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let path = checkpoint_path.with_extension("run.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ResumeError::LockError(format!("Failed to open lock file: {e}")))?;

        Ok(Self {
            path,
            lock: RwLock::new(file),
        })
    }

    /// Lock file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock without blocking.
    ///
    /// # Errors
    /// `ResumeError::AlreadyRunning` when another holder has it.
    pub fn try_acquire(&mut self) -> Result<RunLockGuard<'_>, ResumeError> {
        let path = self.path.clone();
        match self.lock.try_write() {
            Ok(guard) => {
                debug!(path = %path.display(), "Run lock acquired");
                Ok(RunLockGuard { _guard: guard })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(ResumeError::AlreadyRunning(path)),
            Err(e) => Err(ResumeError::LockError(format!(
                "Failed to acquire run lock: {e}"
            ))),
        }
    }
}
