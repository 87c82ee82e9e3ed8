//! Export command implementation

use bytes::Bytes;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{CliError, OutputFormat};
use crate::config::{manifest_blob_path, ExportConfig};
use crate::fetcher::SpendApiClient;
use crate::metrics;
use crate::output::CsvOutcomeRecorder;
use crate::pipeline::{AttachmentHandler, DriverOptions, PipelineDriver, PipelineError, RunSummary};
use crate::resume::CheckpointStore;
use crate::shutdown::SharedShutdown;
use crate::storage::{self, BlobStore};
use crate::Event;

/// Export command arguments
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Process at most this many events in this run
    #[arg(long)]
    pub limit: Option<usize>,

    /// Disable the terminal progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9000)
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,

    /// Override WD_API_MAX_RETRIES (range: 1-20)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_retries: Option<u32>,

    /// Skip uploading the events manifest
    #[arg(long, default_value_t = false)]
    pub skip_manifest: bool,
}

impl ExportArgs {
    /// Run an export with configuration from the environment
    pub async fn execute(
        &self,
        output_format: OutputFormat,
        shutdown: SharedShutdown,
    ) -> Result<RunSummary, CliError> {
        let mut config = ExportConfig::from_env()?;
        if let Some(max_retries) = self.max_retries {
            config.api.max_retries = max_retries;
        }

        let summary = self.run(&config, shutdown).await?;
        print_summary(output_format, &config, &summary);
        Ok(summary)
    }

    /// Run an export with an explicit configuration
    pub async fn run(
        &self,
        config: &ExportConfig,
        shutdown: SharedShutdown,
    ) -> Result<RunSummary, CliError> {
        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr)?;
        }

        let client = Arc::new(SpendApiClient::from_config(config)?);
        let store = storage::build_store(&config.storage)?;
        info!(
            base_url = %client.base_url(),
            storage = %store.describe(),
            progress_file = %config.paths.progress_file.display(),
            "Export configured"
        );

        let events = client
            .try_fetch_events(&config.api.events_endpoint)
            .await
            .map_err(|e| PipelineError::EventsUnavailable(e.to_string()))?;
        info!(count = events.len(), "Retrieved events");

        if !events.is_empty() && !self.skip_manifest {
            upload_manifest(store.as_ref(), &config.blob_prefix, &events).await;
        }

        let handler = Arc::new(AttachmentHandler::new(
            Arc::clone(&client),
            store,
            config.api.attachments_endpoint.clone(),
            config.blob_prefix.clone(),
        ));
        let recorder = CsvOutcomeRecorder::open(
            &config.paths.csv_file,
            &config.paths.failed_attachments_file,
        )?;

        let mut driver = PipelineDriver::new(
            handler,
            Box::new(recorder),
            CheckpointStore::new(&config.paths.progress_file),
        )
        .with_options(DriverOptions {
            limit: self.limit,
            show_progress_bar: !self.no_progress,
            ..DriverOptions::default()
        })
        .with_shutdown(shutdown);

        let summary = driver.run(&events).await?;

        let stats = client.stats();
        info!(
            requests = stats.requests,
            rate_limit_waits = stats.rate_limit_waits,
            retry_waits = stats.retry_waits,
            "API usage"
        );

        Ok(summary)
    }
}

/// Upload the event list as `[{"id", "title"}]`; failures are logged only
async fn upload_manifest(store: &dyn BlobStore, prefix: &str, events: &[Event]) {
    let path = manifest_blob_path(prefix);
    let body = match serde_json::to_vec_pretty(events) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "Failed to serialize events manifest");
            return;
        }
    };

    match store.store(Bytes::from(body), &path).await {
        Ok(location) => info!(location = %location, events = events.len(), "Uploaded events manifest"),
        Err(e) => warn!(path = %path, error = %e, "Events manifest upload failed"),
    }
}

fn print_summary(format: OutputFormat, config: &ExportConfig, summary: &RunSummary) {
    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "success": summary.events_failed == 0,
                "interrupted": summary.interrupted,
                "events_total": summary.events_total,
                "events_skipped": summary.events_skipped,
                "events_processed": summary.events_processed,
                "events_failed": summary.events_failed,
                "attachments_uploaded": summary.attachments_uploaded,
                "attachments_failed": summary.attachments_failed,
                "checkpoint": summary.final_checkpoint,
                "stale_checkpoint": summary.stale_checkpoint,
                "duration_secs": summary.duration.as_secs_f64(),
                "csv_file": config.paths.csv_file.display().to_string(),
                "failed_attachments_file": config.paths.failed_attachments_file.display().to_string(),
            });
            println!("{output}");
        }
        OutputFormat::Human => {
            if summary.interrupted {
                println!("\nExport interrupted - rerun to resume at event {}", summary.final_checkpoint);
            } else {
                println!("\nExport completed!");
            }
            println!("Events processed: {}", summary.events_processed);
            println!("Events skipped (checkpoint): {}", summary.events_skipped);
            println!("Attachments uploaded: {}", summary.attachments_uploaded);
            println!("Checkpoint: {}/{}", summary.final_checkpoint, summary.events_total);
            if let Some(stored) = summary.stale_checkpoint {
                println!("Stored checkpoint {stored} is beyond the event list and was left unchanged");
            }
            println!("Downloaded files: {}", config.paths.csv_file.display());
            if summary.events_failed > 0 || summary.attachments_failed > 0 {
                eprintln!(
                    "{} event(s) and {} attachment(s) failed - see {}",
                    summary.events_failed,
                    summary.attachments_failed,
                    config.paths.failed_attachments_file.display()
                );
                error!(
                    events_failed = summary.events_failed,
                    attachments_failed = summary.attachments_failed,
                    "Export finished with failures"
                );
            }
        }
    }
}
