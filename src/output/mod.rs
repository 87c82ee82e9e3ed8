//! Outcome and failure-audit writers

use crate::pipeline::{AttachmentFailure, EventOutcome};
use crate::Event;

pub mod csv;

pub use self::csv::{CsvOutcomeRecorder, DOWNLOADS_HEADER, FAILURES_HEADER};

/// Output writer errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Buffer flush error
    #[error("flush error: {0}")]
    FlushError(String),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Sink for per-event results
///
/// The driver records an event before advancing the checkpoint past it, so a record
/// must be durable by the time the call returns.
pub trait OutcomeRecorder: Send {
    /// Record a completed event and where its files were stored
    fn record_event(&mut self, event: &Event, outcome: &EventOutcome) -> OutputResult<()>;

    /// Append one row to the failure audit
    fn record_failure(&mut self, failure: &AttachmentFailure) -> OutputResult<()>;

    /// Flush any buffered data to disk
    fn flush(&mut self) -> OutputResult<()>;
}
