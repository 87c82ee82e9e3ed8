//! Checkpoint persistence
//!
//! Atomic file writes via `tempfile::NamedTempFile::persist`, coordinated through an
//! fd-lock on `<checkpoint>.lock`. Loading is tolerant: an absent, unreadable or corrupt
//! file means "start from 0" and is never fatal.

use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::checkpoint::Checkpoint;

/// Maximum accepted checkpoint file size; anything larger is treated as corrupt
pub const MAX_CHECKPOINT_FILE_SIZE: u64 = 1024 * 1024;

/// Errors related to checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    /// Checkpoint file too large
    #[error("checkpoint file too large: {size} bytes (max: {max} bytes)")]
    StateTooLarge {
        /// Actual file size
        size: u64,
        /// Maximum allowed size
        max: u64,
    },

    /// Attempt to move the checkpoint backwards during a run
    #[error("checkpoint regression: current {current}, requested {requested}")]
    CheckpointRegression {
        /// Value already persisted
        current: usize,
        /// Lower value that was refused
        requested: usize,
    },

    /// Another export holds the run lock
    #[error("another export is already running against {0}")]
    AlreadyRunning(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// Lock error
    #[error("lock error: {0}")]
    LockError(String),
}

/// Reads and writes the checkpoint file for one export
///
/// Within a store's lifetime [`save`](Self::save) never writes a value lower than the
/// one loaded or last saved.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    floor: usize,
}

impl CheckpointStore {
    /// Create a store for `path`; nothing is read until [`load`](Self::load)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            floor: 0,
        }
    }

    /// Checkpoint file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Highest index loaded or saved so far
    pub fn current(&self) -> usize {
        self.floor
    }

    /// Load the checkpoint, falling back to 0 when absent or unreadable
    pub fn load(&mut self) -> usize {
        let index = match Self::read(&self.path) {
            Ok(Some(checkpoint)) => {
                info!(
                    path = %self.path.display(),
                    last_index = checkpoint.last_index(),
                    "Checkpoint loaded"
                );
                checkpoint.last_index()
            }
            Ok(None) => {
                info!(path = %self.path.display(), "No checkpoint found - starting from 0");
                0
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load checkpoint - starting from 0"
                );
                0
            }
        };

        self.floor = index;
        index
    }

    /// Read the checkpoint at `path` without side effects.
    ///
    /// `Ok(None)` when the file does not exist.
    pub fn read(path: &Path) -> Result<Option<Checkpoint>, ResumeError> {
        debug!(path = %path.display(), "Reading checkpoint");

        if !path.exists() {
            return Ok(None);
        }

        let lock_file = open_lock_file(path)?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let metadata = std::fs::metadata(path).map_err(|e| ResumeError::IoError(e.to_string()))?;
        if metadata.len() > MAX_CHECKPOINT_FILE_SIZE {
            return Err(ResumeError::StateTooLarge {
                size: metadata.len(),
                max: MAX_CHECKPOINT_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| ResumeError::IoError(e.to_string()))?;

        let checkpoint: Checkpoint = serde_json::from_str(&contents)
            .map_err(|e| ResumeError::DeserializationError(e.to_string()))?;

        Ok(Some(checkpoint))
    }

    /// Persist `index`, refusing to move backwards
    pub fn save(&mut self, index: usize) -> Result<(), ResumeError> {
        if index < self.floor {
            return Err(ResumeError::CheckpointRegression {
                current: self.floor,
                requested: index,
            });
        }

        self.write(index)
    }

    /// Persist `index` unconditionally; used by explicit operator commands
    pub fn overwrite(&mut self, index: usize) -> Result<(), ResumeError> {
        self.write(index)
    }

    fn write(&mut self, index: usize) -> Result<(), ResumeError> {
        let path = self.path.as_path();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ResumeError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(&Checkpoint::new(index))
            .map_err(|e| ResumeError::SerializationError(e.to_string()))?;

        let lock_file = open_lock_file(path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| ResumeError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let parent_dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| ResumeError::IoError(format!("Failed to create temp file: {e}")))?;

        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| ResumeError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| ResumeError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| ResumeError::IoError(format!("Failed to sync temp file: {e}")))?;

        temp_file
            .persist(path)
            .map_err(|e| ResumeError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = std::fs::File::open(parent_dir) {
            let _ = dir.sync_all();
        }

        self.floor = index;
        debug!(path = %path.display(), last_index = index, "Checkpoint saved");
        Ok(())
    }
}

fn open_lock_file(path: &Path) -> Result<std::fs::File, ResumeError> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path.with_extension("lock"))
        .map_err(|e| ResumeError::LockError(format!("Failed to create lock file: {e}")))
}
