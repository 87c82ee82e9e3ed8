//! Validation subcommand

use clap::Parser;

use super::{CliError, OutputFormat};
use crate::config::{ExportConfig, StorageSettings};
use crate::fetcher::SpendApiClient;
use crate::storage;

/// Check configuration without contacting the API or storage
#[derive(Parser, Debug)]
pub struct ValidateCommand {}

impl ValidateCommand {
    /// Validate the process environment
    pub fn execute(&self, output_format: OutputFormat) -> Result<(), CliError> {
        match validate(ExportConfig::from_env()) {
            Ok(config) => {
                report(&config, output_format);
                Ok(())
            }
            Err(e) => {
                eprintln!("Invalid configuration: {e}");
                Err(e)
            }
        }
    }
}

/// Check that a loaded configuration can build a client and a store
pub fn validate(
    config: Result<ExportConfig, crate::config::ConfigError>,
) -> Result<ExportConfig, CliError> {
    let config = config?;
    SpendApiClient::from_config(&config)?;
    storage::build_store(&config.storage)?;
    Ok(config)
}

fn report(config: &ExportConfig, output_format: OutputFormat) {
    let storage = match &config.storage {
        StorageSettings::Azure { container, .. } => format!("azure (container {container})"),
        StorageSettings::Local { root } => format!("local ({})", root.display()),
    };

    match output_format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "base_url": config.api.base_url,
                "events_endpoint": config.api.events_endpoint,
                "attachments_endpoint": config.api.attachments_endpoint,
                "storage": storage,
                "blob_prefix": config.blob_prefix,
                "progress_file": config.paths.progress_file.display().to_string(),
                "max_retries": config.api.max_retries,
                "page_size": config.api.page_size,
            });
            println!("{output}");
        }
        OutputFormat::Human => {
            println!("Configuration OK");
            println!("  API: {}{}", config.api.base_url, config.api.events_endpoint);
            println!("  Attachments: {}", config.api.attachments_endpoint);
            println!("  Storage: {storage}");
            if !config.blob_prefix.is_empty() {
                println!("  Blob prefix: {}", config.blob_prefix);
            }
            println!("  Checkpoint: {}", config.paths.progress_file.display());
            println!(
                "  Retries: {} (timeout {}s, page size {})",
                config.api.max_retries,
                config.api.timeout.as_secs(),
                config.api.page_size
            );
        }
    }
}
