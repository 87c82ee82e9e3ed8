//! Per-event handling
//!
//! An [`EventHandler`] turns one event into an [`EventOutcome`]. Attachment-level
//! problems are collected in the outcome; only a failure that prevents handling the
//! event at all is returned as [`HandlerError`].

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::event_blob_path;
use crate::fetcher::{FetcherError, SpendApiClient};
use crate::storage::{BlobStore, StorageError};
use crate::Event;

/// One attachment that could not be exported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentFailure {
    /// Owning event
    pub event_id: String,
    /// Attachment id; empty when the whole event failed
    pub attachment_id: String,
    /// Human readable reason
    pub reason: String,
}

impl AttachmentFailure {
    /// Create a failure row
    pub fn new(
        event_id: impl Into<String>,
        attachment_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            attachment_id: attachment_id.into(),
            reason: reason.into(),
        }
    }

    /// Failure row for an event that could not be handled at all
    pub fn event_level(event_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(event_id, "", reason)
    }
}

/// Result of handling one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// Storage locations written, in attachment order
    pub locations: Vec<String>,
    /// Attachments that could not be exported
    pub failed_attachments: Vec<AttachmentFailure>,
}

/// Event-level handler failure
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Attachment list could not be retrieved
    #[error("failed to list attachments: {0}")]
    Fetch(#[from] FetcherError),

    /// Storage failure that affects the whole event
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Any other handler-specific failure
    #[error("{0}")]
    Other(String),
}

/// Processes one event
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle `event`, returning where its artifacts went
    async fn process_event(&self, event: &Event) -> Result<EventOutcome, HandlerError>;
}

/// Downloadable file attached to an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment identifier
    pub id: String,
    /// File name used in storage
    pub file_name: String,
    /// Absolute download URL
    pub download_url: String,
}

impl Attachment {
    /// Parse `{"id": .., "attributes": {"download_url": .., "file_name"|"title": ..}}`.
    ///
    /// Falls back to the percent-decoded last URL path segment when no name is given.
    /// Returns `None` without a download URL.
    pub fn from_record(record: &Value) -> Option<Self> {
        let attributes = record.get("attributes");
        let attr = |key: &str| {
            attributes
                .and_then(|a| a.get(key))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let download_url = attr("download_url")?.to_string();
        let id = match record.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        let file_name = attr("file_name")
            .or_else(|| attr("title"))
            .map(str::to_string)
            .or_else(|| file_name_from_url(&download_url))
            .map(|name| sanitize_file_name(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| {
                if id.is_empty() {
                    "attachment".to_string()
                } else {
                    format!("attachment-{id}")
                }
            });

        Some(Self {
            id,
            file_name,
            download_url,
        })
    }
}

/// Last path segment of `url`, percent-decoded; `None` when the path ends in `/`
pub fn file_name_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    let (_, path) = after_scheme.split_once('/')?;
    let segment = path.rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    Some(percent_decode_str(segment).decode_utf8_lossy().into_owned())
}

/// Replace path separators and reject dot-only names
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        String::new()
    } else {
        cleaned
    }
}

/// First name for `attachment` not yet in `used`, which then records it.
///
/// Tries the plain file name, then `{id}_{name}`, then numbered variants.
fn unique_file_name(used: &mut HashSet<String>, attachment: &Attachment) -> String {
    let prefix = if attachment.id.is_empty() {
        String::new()
    } else {
        format!("{}_", attachment.id)
    };

    let mut candidate = attachment.file_name.clone();
    if used.insert(candidate.clone()) {
        return candidate;
    }
    if !prefix.is_empty() {
        candidate = format!("{prefix}{}", attachment.file_name);
        if used.insert(candidate.clone()) {
            return candidate;
        }
    }

    let mut counter = 2u32;
    loop {
        candidate = format!("{prefix}{counter}_{}", attachment.file_name);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Exports every attachment of an event to blob storage
pub struct AttachmentHandler {
    client: Arc<SpendApiClient>,
    store: Arc<dyn BlobStore>,
    attachments_endpoint: String,
    blob_prefix: String,
}

impl AttachmentHandler {
    /// Create a handler.
    ///
    /// `attachments_endpoint` may contain an `{event_id}` placeholder.
    pub fn new(
        client: Arc<SpendApiClient>,
        store: Arc<dyn BlobStore>,
        attachments_endpoint: impl Into<String>,
        blob_prefix: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            attachments_endpoint: attachments_endpoint.into(),
            blob_prefix: blob_prefix.into(),
        }
    }

    fn endpoint_for(&self, event_id: &str) -> String {
        self.attachments_endpoint.replace("{event_id}", event_id)
    }

    async fn export_attachment(
        &self,
        event: &Event,
        attachment: &Attachment,
        file_name: &str,
    ) -> Result<String, String> {
        let data = self
            .client
            .download(&attachment.download_url)
            .await
            .map_err(|e| e.to_string())?;

        let path = event_blob_path(&self.blob_prefix, &event.id, file_name);
        self.store.store(data, &path).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl EventHandler for AttachmentHandler {
    async fn process_event(&self, event: &Event) -> Result<EventOutcome, HandlerError> {
        let endpoint = self.endpoint_for(&event.id);
        let pages = self.client.fetch_paginated(&endpoint).await?;
        if let Some(e) = pages.error {
            return Err(HandlerError::Fetch(e));
        }

        debug!(event_id = %event.id, records = pages.records.len(), "Listed attachments");

        let mut outcome = EventOutcome::default();
        let mut used_names = HashSet::new();

        for (index, record) in pages.records.iter().enumerate() {
            let Some(attachment) = Attachment::from_record(record) else {
                let attachment_id = record
                    .get("id")
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .unwrap_or_else(|| format!("#{index}"));
                warn!(event_id = %event.id, attachment_id = %attachment_id, "Attachment has no download URL");
                outcome.failed_attachments.push(AttachmentFailure::new(
                    &event.id,
                    attachment_id,
                    "missing download_url",
                ));
                continue;
            };

            // Two attachments with the same name would overwrite each other
            let file_name = unique_file_name(&mut used_names, &attachment);

            match self.export_attachment(event, &attachment, &file_name).await {
                Ok(location) => {
                    info!(
                        event_id = %event.id,
                        attachment_id = %attachment.id,
                        location = %location,
                        "Uploaded attachment"
                    );
                    outcome.locations.push(location);
                }
                Err(reason) => {
                    warn!(
                        event_id = %event.id,
                        attachment_id = %attachment.id,
                        url = %attachment.download_url,
                        reason = %reason,
                        "Attachment export failed"
                    );
                    outcome
                        .failed_attachments
                        .push(AttachmentFailure::new(&event.id, &attachment.id, reason));
                }
            }
        }

        Ok(outcome)
    }
}
