//! Filesystem blob store

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{validate_blob_path, BlobStore, StorageError};

/// Stores blobs as files below a root directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create a store rooted at `root`; directories are created on first write
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_blob_path(path)?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[tracing::instrument(level = "debug", skip_all, fields(path = %path))]
    async fn store(&self, data: Bytes, path: &str) -> Result<String, StorageError> {
        let target = self.path_for(path)?;
        let io_err = |e: std::io::Error| StorageError::Io {
            path: target.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Write beside the target and rename so readers never see a half-written file
        let mut staging = target.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);
        tokio::fs::write(&staging, &data).await.map_err(io_err)?;
        tokio::fs::rename(&staging, &target).await.map_err(io_err)?;

        debug!(target = %target.display(), bytes = data.len(), "Stored blob");
        Ok(target.display().to_string())
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
