//! # Spend Event Exporter Library
//!
//! Exports "event" records and their file attachments from a spend-management REST API
//! into blob storage. Progress is checkpointed after every event so a multi-hour run can
//! be interrupted and resumed without skipping or re-running completed work.
//!
//! ## Quick Start
//!
//! ```no_run
//! use spend_event_exporter::config::ExportConfig;
//! use spend_event_exporter::fetcher::SpendApiClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExportConfig::from_env()?;
//! let client = SpendApiClient::from_config(&config)?;
//!
//! let events = client.fetch_events(&config.api.events_endpoint).await;
//! println!("fetched {} events", events.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - Environment-sourced configuration with aggregated validation
//! - [`fetcher`] - Paginated API client with rate-limit and retry handling
//! - [`pipeline`] - Resumable sequential driver and the per-event attachment handler
//! - [`resume`] - Checkpoint persistence with atomic writes and run locking
//! - [`storage`] - Blob storage backends (local filesystem, Azure SAS)
//! - [`output`] - CSV outcome and failure-audit recorders
//!
//! Duplicate records returned by an unstable server-side pagination are passed through
//! unchanged; nothing in the library deduplicates by id.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// CLI command implementations
pub mod cli;

/// Environment configuration
pub mod config;

/// API client and pagination
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Outcome and failure-audit writers
pub mod output;

/// Export pipeline driver and per-event handling
pub mod pipeline;

/// Checkpoint persistence for resumable runs
pub mod resume;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Blob storage backends
pub mod storage;

pub use config::ExportConfig;
pub use fetcher::SpendApiClient;
pub use pipeline::PipelineDriver;

/// One exportable unit of work in the vendor system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque event identifier
    pub id: String,
    /// Human readable event title
    pub title: String,
}

impl Event {
    /// Create a new event
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }

    /// Build an event from a raw API record shaped `{"id": .., "attributes": {"title": ..}}`.
    ///
    /// Returns `None` when the record carries no usable id. Numeric ids are
    /// stringified; a missing title becomes the empty string.
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = match record.get("id")? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };

        let title = record
            .get("attributes")
            .and_then(|attrs| attrs.get("title"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self { id, title })
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.title.is_empty() {
            write!(f, "{}", self.id)
        } else {
            write!(f, "{} ({})", self.id, self.title)
        }
    }
}
