//! Checkpoint subcommand
//!
//! Reads `PROGRESS_FILE` (default `progress.json`) without requiring the rest of the
//! export configuration. Changes take the run lock, so they fail while an export is
//! running against the same file.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use std::path::Path;
use tracing::info;

use super::{CliError, OutputFormat};
use crate::config::PathSettings;
use crate::resume::{CheckpointStore, RunLock};

/// Checkpoint operations
#[derive(Subcommand, Debug)]
pub enum CheckpointCommand {
    /// Print the next event index the export will start from
    Show,
    /// Start the next export from the first event
    Reset,
    /// Start the next export from `index`
    Set {
        /// Zero-based index of the next event to process
        index: usize,
    },
}

impl CheckpointCommand {
    /// Execute against the configured checkpoint file
    pub fn execute(&self, output_format: OutputFormat) -> Result<(), CliError> {
        let paths = PathSettings::from_env();
        self.execute_at(&paths.progress_file, output_format)
    }

    /// Execute against an explicit checkpoint file
    pub fn execute_at(&self, path: &Path, output_format: OutputFormat) -> Result<(), CliError> {
        match self {
            CheckpointCommand::Show => show(path, output_format),
            CheckpointCommand::Reset => write(path, 0, output_format),
            CheckpointCommand::Set { index } => write(path, *index, output_format),
        }
    }
}

fn show(path: &Path, output_format: OutputFormat) -> Result<(), CliError> {
    let checkpoint = CheckpointStore::read(path)?;
    let next_index = checkpoint.as_ref().map_or(0, |c| c.last_index());
    let updated_at = checkpoint
        .as_ref()
        .and_then(|c| c.updated_at())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339());

    match output_format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": path.display().to_string(),
                "exists": checkpoint.is_some(),
                "last_index": next_index,
                "updated_at": updated_at,
            });
            println!("{output}");
        }
        OutputFormat::Human => {
            if checkpoint.is_none() {
                println!("No checkpoint at {} - next export starts at event 0", path.display());
            } else {
                println!("Checkpoint: {}", path.display());
                println!("Next event index: {next_index}");
                if let Some(updated_at) = updated_at {
                    println!("Updated: {updated_at}");
                }
            }
        }
    }
    Ok(())
}

fn write(path: &Path, index: usize, output_format: OutputFormat) -> Result<(), CliError> {
    let mut run_lock = RunLock::open(path)?;
    let _guard = run_lock.try_acquire()?;

    let mut store = CheckpointStore::new(path);
    let previous = store.load();
    store.overwrite(index)?;
    info!(path = %path.display(), previous, index, "Checkpoint updated");

    match output_format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "path": path.display().to_string(),
                "previous_index": previous,
                "last_index": index,
            });
            println!("{output}");
        }
        OutputFormat::Human => {
            println!("Checkpoint {} set to {index} (was {previous})", path.display());
        }
    }
    Ok(())
}
