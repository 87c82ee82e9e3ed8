//! Export pipeline
//!
//! [`PipelineDriver`] walks the event list from the persisted checkpoint, hands each
//! event to an [`EventHandler`], records the outcome and advances the checkpoint.
//! [`AttachmentHandler`] is the production handler: it lists an event's attachments,
//! downloads each file and writes it to blob storage.

pub mod driver;
pub mod handler;
pub mod progress;

pub use driver::{DriverOptions, PipelineDriver, RunSummary};
pub use handler::{
    Attachment, AttachmentFailure, AttachmentHandler, EventHandler, EventOutcome, HandlerError,
};
pub use progress::ProgressState;

use crate::resume::ResumeError;

/// Errors that stop a run before or instead of processing events
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Event list could not be retrieved
    #[error("failed to load events: {0}")]
    EventsUnavailable(String),

    /// Checkpoint or run-lock failure
    #[error(transparent)]
    Resume(#[from] ResumeError),
}
