//! Main entry point for the spend-event-exporter CLI

use clap::Parser;
use spend_event_exporter::cli::{load_env_file, Cli, Commands};
use spend_event_exporter::config::PathSettings;
use spend_event_exporter::shutdown::ShutdownCoordinator;
use std::path::Path;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Initialize console logging (human or `LOG_FORMAT=json`) and, when given, a run log
/// file. The returned guard must live until exit so buffered file lines are written.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spend_event_exporter=info"));

    let console = if json_format {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let (file_layer, guard) = match log_file.and_then(open_log_appender) {
        Some((writer, guard)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(false),
            ),
            Some(guard),
        ),
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();

    guard
}

fn open_log_appender(
    path: &Path,
) -> Option<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let file_name = path.file_name()?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("Failed to create log directory {}: {e}", dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Before tracing so RUST_LOG and LOG_FORMAT can come from the env file
    let env_file = load_env_file(cli.env_file.as_deref());

    let log_file = match cli.command {
        Commands::Export(_) => Some(PathSettings::from_env().log_file),
        _ => None,
    };
    let log_guard = init_tracing(log_file.as_deref());

    match &env_file {
        Ok(Some(path)) => info!(path = %path.display(), "Loaded environment file"),
        Ok(None) => {}
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }

    let shutdown = ShutdownCoordinator::shared();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - finishing current event and saving progress...");
                shutdown.request_shutdown();
            }
        }
    });

    let result = match cli.command {
        Commands::Export(ref args) => args
            .execute(cli.output_format, shutdown.clone())
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Checkpoint(ref cmd) => cmd
            .execute(cli.output_format)
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Validate(ref cmd) => cmd
            .execute(cli.output_format)
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}
