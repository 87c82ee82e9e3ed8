//! CLI error types and conversions

use crate::config::ConfigError;
use crate::fetcher::FetcherError;
use crate::metrics::MetricsError;
use crate::output::OutputError;
use crate::pipeline::PipelineError;
use crate::resume::ResumeError;
use crate::storage::StorageError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration could not be loaded
    #[error("config error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Fetcher error
    #[error("fetcher error: {0}")]
    FetcherError(#[from] FetcherError),

    /// Storage error
    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Resume error
    #[error("resume error: {0}")]
    ResumeError(#[from] ResumeError),

    /// Pipeline error
    #[error("pipeline error: {0}")]
    PipelineError(#[from] PipelineError),

    /// Metrics error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}
