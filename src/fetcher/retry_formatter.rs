//! Retry message formatting for the spend API client.
//!
//! Classifies failures into user-facing categories and renders consistent retry and
//! final-failure log lines, including a short remediation hint.

use reqwest::{Error as ReqwestError, StatusCode};
use std::time::Duration;

/// Classification of retry errors for user messaging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Network timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other client errors (4xx, except 429)
    ClientError(u16),
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimit,
            401 | 403 => Self::AuthFailed(status),
            500..=599 => Self::ServerError(status),
            400..=499 => Self::ClientError(status),
            _ => Self::NetworkGeneric,
        }
    }

    /// User-friendly description used inside retry log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::AuthFailed(_) => "authentication failed",
            Self::ClientError(404) => "resource not found",
            Self::ClientError(_) => "client error",
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation shown after the final failure.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check network connectivity or raise WD_API_TIMEOUT",
            Self::NetworkOffline => "Verify API_BASE_URL and DNS resolution",
            Self::RateLimit => "Raise WD_API_RETRY_SLEEP or WD_API_PAGE_DELAY_MS",
            Self::ServerError(_) => "The API may be degraded; re-run later to resume",
            Self::AuthFailed(_) => "Verify API_KEY, USER_TOKEN and USER_EMAIL",
            Self::ClientError(_) => "Check the configured endpoint paths",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Current attempt number (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Type of error that triggered the retry
    pub error_type: RetryErrorType,
    /// Wait until the next attempt
    pub backoff_duration: Duration,
    /// URL that failed
    pub url: String,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry logic.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        error_type: RetryErrorType,
        backoff_duration: Duration,
        url: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            error_type,
            backoff_duration,
            url: url.into(),
        }
    }

    /// Standardized retry message with attempt counters.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt + 1,
            self.max_attempts,
            self.error_type.description(),
            self.backoff_duration.as_secs_f64(),
            self.url
        )
    }

    /// Rate-limit wait message; no attempt budget is shown because waits are unbounded.
    pub fn format_rate_limited(&self) -> String {
        format!(
            "Rate limited - waiting {:.1} seconds before retrying {}",
            self.backoff_duration.as_secs_f64(),
            self.url
        )
    }

    /// Final failure summary with a remediation hint.
    pub fn format_failure(&self) -> String {
        format!(
            "[FAILED] Request failed after {} attempt(s): {} ({}). Suggestion: {}",
            self.attempt,
            self.error_type.description(),
            self.url,
            self.error_type.suggestion()
        )
    }
}

/// Extract a [`RetryErrorType`] from an HTTP status or reqwest error.
pub fn extract_error_type(
    status: Option<StatusCode>,
    err: Option<&ReqwestError>,
) -> RetryErrorType {
    if let Some(status) = status {
        return RetryErrorType::from_status(status.as_u16());
    }

    if let Some(err) = err {
        if err.is_timeout() {
            return RetryErrorType::NetworkTimeout;
        }

        if err.is_connect() {
            return RetryErrorType::NetworkOffline;
        }
    }

    RetryErrorType::NetworkGeneric
}
