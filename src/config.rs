//! Export configuration
//!
//! Values are sourced from the process environment (optionally seeded from a `.env`
//! file) and validated once at startup. Every missing required value is reported in a
//! single aggregated [`ConfigError::Missing`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default sleep between retries (and after a 429) in seconds
pub const DEFAULT_RETRY_SLEEP_SECS: u64 = 1;

/// Default number of attempts per URL for non rate-limit errors
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default page size requested from paginated endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default delay between successive page fetches in milliseconds
pub const DEFAULT_PAGE_DELAY_MS: u64 = 250;

/// Default attachments endpoint template; `{event_id}` is substituted per event
pub const DEFAULT_ATTACHMENTS_ENDPOINT: &str = "/events/{event_id}/attachments";

/// Default checkpoint file
pub const DEFAULT_PROGRESS_FILE: &str = "progress.json";

/// Default downloaded-files CSV
pub const DEFAULT_CSV_FILE: &str = "downloaded_files.csv";

/// Default failure audit CSV
pub const DEFAULT_FAILED_ATTACHMENTS_FILE: &str = "failed_attachments.csv";

/// Default run log file
pub const DEFAULT_LOG_FILE: &str = "export.log";

/// Configuration errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required values are absent or empty
    #[error("missing required configuration values: {}", .0.join(", "))]
    Missing(Vec<String>),

    /// A value is present but cannot be used
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid {
        /// Environment key
        key: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Settings for the spend API client
#[derive(Debug, Clone)]
pub struct ApiSettings {
    /// Base URL, e.g. `https://api.us.workdayspend.com/services/events/v1`
    pub base_url: String,
    /// Endpoint listing events
    pub events_endpoint: String,
    /// Endpoint template listing attachments for an event
    pub attachments_endpoint: String,
    /// `X-Api-Key` header value
    pub api_key: String,
    /// `X-User-Token` header value
    pub user_token: String,
    /// `X-User-Email` header value
    pub user_email: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Sleep between retries and after rate limiting
    pub retry_interval: Duration,
    /// Attempts per URL for non rate-limit failures
    pub max_retries: u32,
    /// Page size query parameter
    pub page_size: u32,
    /// Delay between successive page fetches
    pub page_delay: Duration,
}

impl ApiSettings {
    /// Authentication headers sent with every API request
    pub fn auth_headers(&self) -> HashMap<String, String> {
        HashMap::from([
            ("X-Api-Key".to_string(), self.api_key.clone()),
            ("X-User-Token".to_string(), self.user_token.clone()),
            ("X-User-Email".to_string(), self.user_email.clone()),
        ])
    }
}

/// Blob storage backend selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageSettings {
    /// Azure Blob Storage addressed through a connection string
    Azure {
        /// Connection string with either `SharedAccessSignature` or `AccountKey`
        connection_string: String,
        /// Container name
        container: String,
    },
    /// Local filesystem directory, mainly for dry runs and tests
    Local {
        /// Root directory
        root: PathBuf,
    },
}

/// Local file locations
#[derive(Debug, Clone)]
pub struct PathSettings {
    /// Checkpoint file
    pub progress_file: PathBuf,
    /// Downloaded-files CSV
    pub csv_file: PathBuf,
    /// Failed-attachments audit CSV
    pub failed_attachments_file: PathBuf,
    /// Run log file
    pub log_file: PathBuf,
}

impl PathSettings {
    /// Resolve file locations; every key is optional
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = |key: &str, default: &str| {
            PathBuf::from(
                lookup(key)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| default.to_string()),
            )
        };

        Self {
            progress_file: path("PROGRESS_FILE", DEFAULT_PROGRESS_FILE),
            csv_file: path("CSV_FILE", DEFAULT_CSV_FILE),
            failed_attachments_file: path("FAILED_ATTACHMENTS_FILE", DEFAULT_FAILED_ATTACHMENTS_FILE),
            log_file: path("LOG_FILE", DEFAULT_LOG_FILE),
        }
    }

    /// Resolve file locations from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Complete export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// API client settings
    pub api: ApiSettings,
    /// Storage backend
    pub storage: StorageSettings,
    /// Prefix prepended to every blob path
    pub blob_prefix: String,
    /// Local paths
    pub paths: PathSettings,
}

impl ExportConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut required = |key: &str| -> String {
            match lookup(key).map(|v| v.trim().to_string()) {
                Some(value) if !value.is_empty() => value,
                _ => {
                    missing.push(key.to_string());
                    String::new()
                }
            }
        };

        let base_url = required("API_BASE_URL");
        let events_endpoint = required("API_EVENTS_ENDPOINT");
        let api_key = required("API_KEY");
        let user_token = required("USER_TOKEN");
        let user_email = required("USER_EMAIL");

        let backend = lookup("STORAGE_BACKEND")
            .map(|v| v.trim().to_lowercase())
            .unwrap_or_else(|| "azure".to_string());
        let storage = match backend.as_str() {
            "azure" | "" => StorageSettings::Azure {
                connection_string: required("AZURE_STORAGE_CONNECTION_STRING"),
                container: required("AZURE_CONTAINER_NAME"),
            },
            "local" => StorageSettings::Local {
                root: PathBuf::from(required("LOCAL_STORAGE_ROOT")),
            },
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORAGE_BACKEND".to_string(),
                    reason: format!("unknown backend '{other}' (expected azure or local)"),
                })
            }
        };

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let api = ApiSettings {
            base_url,
            events_endpoint,
            attachments_endpoint: optional("API_ATTACHMENTS_ENDPOINT", DEFAULT_ATTACHMENTS_ENDPOINT),
            api_key,
            user_token,
            user_email,
            timeout: Duration::from_secs(parse_int(&lookup, "WD_API_TIMEOUT", DEFAULT_TIMEOUT_SECS)),
            retry_interval: Duration::from_secs(parse_int(
                &lookup,
                "WD_API_RETRY_SLEEP",
                DEFAULT_RETRY_SLEEP_SECS,
            )),
            max_retries: parse_int(&lookup, "WD_API_MAX_RETRIES", DEFAULT_MAX_RETRIES).max(1),
            page_size: parse_int(&lookup, "WD_API_PAGE_SIZE", DEFAULT_PAGE_SIZE).max(1),
            page_delay: Duration::from_millis(parse_int(
                &lookup,
                "WD_API_PAGE_DELAY_MS",
                DEFAULT_PAGE_DELAY_MS,
            )),
        };

        let paths = PathSettings::from_lookup(&lookup);

        Ok(Self {
            api,
            storage,
            blob_prefix: optional("AZURE_BLOB_PREFIX", ""),
            paths,
        })
    }
}

/// Compose an event artifact path under an optional prefix
pub fn event_blob_path(prefix: &str, event_id: &str, file_name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("events/{event_id}/{file_name}")
    } else {
        format!("{prefix}/events/{event_id}/{file_name}")
    }
}

/// Location of the uploaded event list: `{prefix}/events/index.json`
pub fn manifest_blob_path(prefix: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        "events/index.json".to_string()
    } else {
        format!("{prefix}/events/index.json")
    }
}

/// Parse an integer value, falling back to `default` when absent or malformed
fn parse_int<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = key, value = %raw, default = %default, "Invalid integer, using default");
                default
            }
        },
    }
}
