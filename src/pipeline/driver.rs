//! Resumable sequential driver
//!
//! Run phases:
//! 1. Load the checkpoint (absent or corrupt means 0)
//! 2. Slice `events[checkpoint..]`, optionally capped by a limit
//! 3. For each event: handle, record, then persist `index + 1`
//! 4. On normal completion persist the end of the slice and log a summary
//!
//! A failed event is logged, written to the failure audit and counted, and its index is
//! never persisted on its own. Shutdown is observed between events.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

use super::handler::{AttachmentFailure, EventHandler};
use super::progress::{format_duration, ProgressState};
use super::PipelineError;
use crate::metrics;
use crate::output::OutcomeRecorder;
use crate::resume::{CheckpointStore, RunLock};
use crate::shutdown::SharedShutdown;
use crate::Event;

/// Driver tunables
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Maximum number of events handled in one run
    pub limit: Option<usize>,
    /// Draw a terminal progress bar
    pub show_progress_bar: bool,
    /// Minimum interval between time-based `[PROGRESS]` log lines
    pub progress_interval: Duration,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            limit: None,
            show_progress_bar: false,
            progress_interval: Duration::from_secs(60),
        }
    }
}

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Events in the fetched list
    pub events_total: usize,
    /// Events before the loaded checkpoint
    pub events_skipped: usize,
    /// Events handled and recorded successfully
    pub events_processed: usize,
    /// Events whose handling or recording failed
    pub events_failed: usize,
    /// Files written to storage
    pub attachments_uploaded: usize,
    /// Attachments that could not be exported
    pub attachments_failed: usize,
    /// Checkpoint writes that failed
    pub checkpoint_failures: usize,
    /// Checkpoint value when the run ended, at most `events_total`
    pub final_checkpoint: usize,
    /// Persisted checkpoint left untouched because it lies beyond the event list
    pub stale_checkpoint: Option<usize>,
    /// Whether the run stopped early on a shutdown request
    pub interrupted: bool,
    /// Wall-clock duration
    pub duration: Duration,
}

impl RunSummary {
    /// One-line summary for the run log
    pub fn format_summary(&self) -> String {
        let stale = self
            .stale_checkpoint
            .map(|stored| format!(" (stored checkpoint {stored} is beyond the list)"))
            .unwrap_or_default();
        format!(
            "Export {}: {} processed, {} failed, {} skipped (checkpoint), {} attachment(s) uploaded, {} attachment failure(s), checkpoint at {}/{}{} in {}",
            if self.interrupted { "interrupted" } else { "completed" },
            self.events_processed,
            self.events_failed,
            self.events_skipped,
            self.attachments_uploaded,
            self.attachments_failed,
            self.final_checkpoint,
            self.events_total,
            stale,
            format_duration(self.duration),
        )
    }
}

/// Drives an export run over a fetched event list
pub struct PipelineDriver {
    handler: Arc<dyn EventHandler>,
    recorder: Box<dyn OutcomeRecorder>,
    checkpoint: CheckpointStore,
    options: DriverOptions,
    shutdown: Option<SharedShutdown>,
}

impl PipelineDriver {
    /// Create a driver
    pub fn new(
        handler: Arc<dyn EventHandler>,
        recorder: Box<dyn OutcomeRecorder>,
        checkpoint: CheckpointStore,
    ) -> Self {
        Self {
            handler,
            recorder,
            checkpoint,
            options: DriverOptions::default(),
            shutdown: None,
        }
    }

    /// Override driver options
    pub fn with_options(mut self, options: DriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Attach a shared shutdown handle for graceful cancellation
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Checkpoint store used by this driver
    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|s| s.is_shutdown_requested())
            .unwrap_or(false)
    }

    /// Process `events` from the persisted checkpoint onward.
    ///
    /// # Errors
    /// Only when another run holds the checkpoint's run lock. Per-event failures are
    /// counted in the summary.
    pub async fn run(&mut self, events: &[Event]) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let mut run_lock = RunLock::open(self.checkpoint.path())?;
        let _guard = run_lock.try_acquire()?;

        let start_index = self.checkpoint.load();
        let mut summary = RunSummary {
            events_total: events.len(),
            events_skipped: start_index.min(events.len()),
            final_checkpoint: start_index.min(events.len()),
            ..RunSummary::default()
        };

        if events.is_empty() {
            info!("No events to process");
            summary.duration = started.elapsed();
            return Ok(summary);
        }

        if start_index > events.len() {
            warn!(
                checkpoint = start_index,
                events = events.len(),
                "Checkpoint is beyond the event list - nothing to do"
            );
            summary.stale_checkpoint = Some(start_index);
            summary.duration = started.elapsed();
            info!("{}", summary.format_summary());
            return Ok(summary);
        }

        let remaining = &events[start_index..];
        let batch_len = self
            .options
            .limit
            .map_or(remaining.len(), |limit| limit.min(remaining.len()));
        let batch = &remaining[..batch_len];

        info!(
            total = events.len(),
            checkpoint = start_index,
            to_process = batch.len(),
            "Starting export"
        );

        let bar = self.progress_bar(batch.len() as u64);
        let mut progress = ProgressState::new(batch.len() as u64, start_index as u64)
            .with_cadence(self.options.progress_interval, 10.0);

        for (offset, event) in batch.iter().enumerate() {
            if self.shutdown_requested() {
                info!(
                    next_index = start_index + offset,
                    "Shutdown requested - stopping before next event"
                );
                summary.interrupted = true;
                break;
            }

            let index = start_index + offset;
            let span = info_span!("event", event_id = %event.id, index = index);
            self.process_one(index, event, &mut summary)
                .instrument(span)
                .await;

            progress.record_event();
            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }
            if let Some(bar) = &bar {
                bar.set_message(event.id.clone());
                bar.inc(1);
            }
        }

        if !summary.interrupted {
            let end = start_index + batch.len();
            if end > self.checkpoint.current() {
                self.save_checkpoint(end, &mut summary);
            }
        }
        summary.final_checkpoint = self.checkpoint.current();

        if let Err(e) = self.recorder.flush() {
            warn!(error = %e, "Failed to flush outcome files");
        }

        if let Some(bar) = bar {
            bar.finish_with_message(if summary.interrupted { "interrupted" } else { "done" });
        }

        summary.duration = started.elapsed();
        info!(
            events_total = summary.events_total,
            events_processed = summary.events_processed,
            events_failed = summary.events_failed,
            attachments_uploaded = summary.attachments_uploaded,
            attachments_failed = summary.attachments_failed,
            checkpoint = summary.final_checkpoint,
            duration_secs = summary.duration.as_secs_f64(),
            "{}",
            summary.format_summary()
        );

        Ok(summary)
    }

    async fn process_one(&mut self, index: usize, event: &Event, summary: &mut RunSummary) {
        info!("Processing event {}", event);

        let outcome = match self.handler.process_event(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Event failed");
                self.fail_event(event, e.to_string(), summary);
                return;
            }
        };

        summary.attachments_uploaded += outcome.locations.len();
        summary.attachments_failed += outcome.failed_attachments.len();
        metrics::record_attachments_uploaded(outcome.locations.len() as u64);
        metrics::record_attachments_failed(outcome.failed_attachments.len() as u64);

        for failure in &outcome.failed_attachments {
            if let Err(e) = self.recorder.record_failure(failure) {
                warn!(
                    attachment_id = %failure.attachment_id,
                    error = %e,
                    "Failed to write failure audit row"
                );
            }
        }

        if let Err(e) = self.recorder.record_event(event, &outcome) {
            error!(error = %e, "Failed to record event outcome");
            self.fail_event(event, format!("failed to record outcome: {e}"), summary);
            return;
        }

        summary.events_processed += 1;
        metrics::record_event_processed();
        info!(
            uploaded = outcome.locations.len(),
            failed = outcome.failed_attachments.len(),
            "Event completed"
        );

        self.save_checkpoint(index + 1, summary);
    }

    fn fail_event(&mut self, event: &Event, reason: String, summary: &mut RunSummary) {
        summary.events_failed += 1;
        metrics::record_event_failed();

        let failure = AttachmentFailure::event_level(&event.id, reason);
        if let Err(e) = self.recorder.record_failure(&failure) {
            warn!(error = %e, "Failed to write failure audit row");
        }
    }

    fn save_checkpoint(&mut self, index: usize, summary: &mut RunSummary) {
        match self.checkpoint.save(index) {
            Ok(()) => metrics::record_checkpoint(index),
            Err(e) => {
                error!(index = index, error = %e, "Failed to save checkpoint");
                summary.checkpoint_failures += 1;
            }
        }
    }

    fn progress_bar(&self, len: u64) -> Option<ProgressBar> {
        if !self.options.show_progress_bar {
            return None;
        }
        let bar = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        Some(bar)
    }
}
