//! CLI command implementations

pub mod checkpoint;
pub mod error;
pub mod export;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use checkpoint::CheckpointCommand;
pub use error::CliError;
pub use export::ExportArgs;
pub use validate::ValidateCommand;

/// Spend event exporter CLI
#[derive(Parser, Debug)]
#[command(name = "spend-event-exporter")]
#[command(about = "Export spend events and their attachments to blob storage", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Load environment variables from this file instead of `./.env`
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Output format for the run summary (json or human)
    #[arg(long, global = true, default_value = "human")]
    pub output_format: OutputFormat,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export events and attachments
    Export(ExportArgs),

    /// Inspect or change the resume checkpoint
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),

    /// Validate configuration without contacting the API
    Validate(ValidateCommand),
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Human-readable output
    Human,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "human" => Ok(OutputFormat::Human),
            _ => Err(format!("Invalid output format: {s}")),
        }
    }
}

/// Load environment variables before configuration is read.
///
/// An explicit file must exist. Without one, a `.env` in the working directory (or a
/// parent) is loaded when present. Variables already set in the process win.
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, CliError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).map_err(|e| {
                CliError::ConfigurationError(format!(
                    "failed to load env file {}: {e}",
                    path.display()
                ))
            })?;
            Ok(Some(path.to_path_buf()))
        }
        None => Ok(dotenvy::dotenv().ok()),
    }
}
