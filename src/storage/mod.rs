//! Blob storage backends
//!
//! Every backend implements [`BlobStore`]: write bytes at a relative path, overwrite
//! whatever is already there, and return the stored object's location.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::config::StorageSettings;

pub mod azure;
pub mod local;

pub use azure::{AzureBlobStore, AzureConnection, AzureCredential};
pub use local::LocalBlobStore;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Blob path rejected before any I/O
    #[error("invalid blob path '{0}'")]
    InvalidPath(String),

    /// Backend configuration is unusable
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Local filesystem failure
    #[error("IO error writing {path}: {reason}")]
    Io {
        /// Target path
        path: String,
        /// OS error message
        reason: String,
    },

    /// Request never reached the storage service
    #[error("upload request failed for {path}: {reason}")]
    RequestFailed {
        /// Blob path
        path: String,
        /// Transport error message
        reason: String,
    },

    /// Storage service answered with a non-success status
    #[error("upload of {path} rejected with HTTP {status}")]
    Rejected {
        /// Blob path
        path: String,
        /// HTTP status code
        status: u16,
    },
}

/// Object storage addressed by relative path
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` at `path`, replacing any existing object.
    ///
    /// Returns the location of the stored object.
    async fn store(&self, data: Bytes, path: &str) -> Result<String, StorageError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Reject empty, absolute, or parent-traversing blob paths
pub fn validate_blob_path(path: &str) -> Result<(), StorageError> {
    if path.trim().is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Build the configured backend
pub fn build_store(settings: &StorageSettings) -> Result<Arc<dyn BlobStore>, StorageError> {
    match settings {
        StorageSettings::Azure {
            connection_string,
            container,
        } => Ok(Arc::new(AzureBlobStore::from_connection_string(
            connection_string,
            container,
        )?)),
        StorageSettings::Local { root } => Ok(Arc::new(LocalBlobStore::new(root.clone()))),
    }
}
