//! Spend API client
//!
//! Issues authenticated GET requests with the configured timeout, walks `links.next`
//! pagination and drives every request through the [`RetryPolicy`] state machine:
//!
//! - 429 responses wait `retry_interval` and retry the same URL without limit
//! - other non-2xx statuses and transport failures retry up to `max_retries` attempts
//! - an unparseable 2xx body is terminal for that URL
//!
//! [`SpendApiClient::fetch`] never propagates errors; failures are logged and surface as
//! `None` (or as a partial record list when a later page fails).

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::pagination::{PageSet, PaginationHelper};
use super::retry::{AttemptOutcome, RequestState, RetryPolicy};
use super::retry_formatter::{RetryContext, RetryErrorType};
use super::transport::{HttpResponse, HttpTransport, ReqwestTransport};
use super::{FetchMode, FetchOutput, FetcherError, FetcherResult};
use crate::config::{self, ApiSettings, ExportConfig};
use crate::metrics;
use crate::Event;

/// Tunables for [`SpendApiClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Per-request timeout
    pub timeout: Duration,
    /// Wait between attempts (rate limit and failure alike)
    pub retry_interval: Duration,
    /// Total attempts per URL for non rate-limit failures
    pub max_retries: u32,
    /// Value sent as `page[size]` on paginated requests
    pub page_size: u32,
    /// Pause between successive page fetches
    pub page_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(config::DEFAULT_TIMEOUT_SECS),
            retry_interval: Duration::from_secs(config::DEFAULT_RETRY_SLEEP_SECS),
            max_retries: config::DEFAULT_MAX_RETRIES,
            page_size: config::DEFAULT_PAGE_SIZE,
            page_delay: Duration::from_millis(config::DEFAULT_PAGE_DELAY_MS),
        }
    }
}

impl From<&ApiSettings> for ClientOptions {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            timeout: settings.timeout,
            retry_interval: settings.retry_interval,
            max_retries: settings.max_retries,
            page_size: settings.page_size,
            page_delay: settings.page_delay,
        }
    }
}

/// Snapshot of client request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// HTTP attempts issued, including retries
    pub requests: u64,
    /// Waits caused by 429 responses
    pub rate_limit_waits: u64,
    /// Waits caused by other failures
    pub retry_waits: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    requests: AtomicU64,
    rate_limit_waits: AtomicU64,
    retry_waits: AtomicU64,
}

impl StatsCounters {
    fn snapshot(&self) -> ClientStats {
        ClientStats {
            requests: self.requests.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            retry_waits: self.retry_waits.load(Ordering::Relaxed),
        }
    }
}

/// HTTP client for the spend-management REST API
pub struct SpendApiClient {
    base_url: String,
    headers: HeaderMap,
    transport: Arc<dyn HttpTransport>,
    policy: RetryPolicy,
    options: ClientOptions,
    counters: StatsCounters,
}

impl SpendApiClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `base_url` - API root, e.g. `https://api.example.com/v1` (trailing `/` trimmed)
    /// * `headers` - Authentication headers sent with every API request
    /// * `options` - Timeout, retry and pagination tunables
    ///
    /// # Errors
    /// `FetcherError::Configuration` when the base URL is empty or unparseable, or the
    /// header map is empty or holds an invalid name/value.
    pub fn new(
        base_url: &str,
        headers: HashMap<String, String>,
        options: ClientOptions,
    ) -> FetcherResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(FetcherError::Configuration(
                "base URL must not be empty".to_string(),
            ));
        }
        Url::parse(&base_url).map_err(|e| {
            FetcherError::Configuration(format!("invalid base URL '{base_url}': {e}"))
        })?;

        if headers.is_empty() {
            return Err(FetcherError::Configuration(
                "authentication headers must not be empty".to_string(),
            ));
        }

        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in &headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                FetcherError::Configuration(format!("invalid header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                FetcherError::Configuration(format!("invalid value for header '{name}': {e}"))
            })?;
            header_map.insert(header_name, header_value);
        }

        Ok(Self {
            base_url,
            headers: header_map,
            transport: Arc::new(ReqwestTransport::new()),
            policy: RetryPolicy::new(options.max_retries, options.retry_interval),
            options,
            counters: StatsCounters::default(),
        })
    }

    /// Build a client from the loaded export configuration
    pub fn from_config(config: &ExportConfig) -> FetcherResult<Self> {
        Self::new(
            &config.api.base_url,
            config.api.auth_headers(),
            ClientOptions::from(&config.api),
        )
    }

    /// Replace the HTTP transport
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Normalized base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request counters since construction
    pub fn stats(&self) -> ClientStats {
        self.counters.snapshot()
    }

    /// Build the request URL for `endpoint`, appending `page[size]` when paginated
    pub fn build_url(&self, endpoint: &str, mode: FetchMode) -> FetcherResult<String> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(FetcherError::Configuration(
                "endpoint must not be empty".to_string(),
            ));
        }

        let mut url = if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        };

        if mode == FetchMode::Paginated {
            let separator = if url.contains('?') { '&' } else { '?' };
            url.push(separator);
            url.push_str(&format!("page[size]={}", self.options.page_size));
        }

        Ok(url)
    }

    /// Fetch `endpoint`, absorbing failures.
    ///
    /// Paginated fetches return [`FetchOutput::Records`], possibly partial when a later
    /// page failed. Single fetches return [`FetchOutput::Payload`]. `None` means nothing
    /// usable was retrieved; the reason has already been logged.
    pub async fn fetch(&self, endpoint: &str, mode: FetchMode) -> Option<FetchOutput> {
        match self.try_fetch(endpoint, mode).await {
            Ok(output) => Some(output),
            Err(e) => {
                error!(endpoint = %endpoint, error = %e, "API fetch failed");
                None
            }
        }
    }

    /// Fetch `endpoint`, returning the failure reason.
    ///
    /// A paginated fetch fails only when its first page fails; later page failures
    /// yield the records gathered so far.
    pub async fn try_fetch(&self, endpoint: &str, mode: FetchMode) -> FetcherResult<FetchOutput> {
        match mode {
            FetchMode::Paginated => {
                let set = self.fetch_paginated(endpoint).await?;
                match set.error {
                    Some(e) if set.pages == 0 => Err(e),
                    _ => Ok(FetchOutput::Records(set.records)),
                }
            }
            FetchMode::Single => {
                let url = self.build_url(endpoint, FetchMode::Single)?;
                let payload = self.fetch_page(&url).await?;
                let output = match payload {
                    Value::Object(mut body) if body.contains_key("data") => {
                        body.remove("data").unwrap_or_default()
                    }
                    other => other,
                };
                Ok(FetchOutput::Payload(output))
            }
        }
    }

    /// Walk every page of `endpoint`.
    ///
    /// Only a configuration problem is returned as `Err`; request failures end the walk
    /// and are reported through [`PageSet::error`].
    pub async fn fetch_paginated(&self, endpoint: &str) -> FetcherResult<PageSet> {
        let first_url = self.build_url(endpoint, FetchMode::Paginated)?;
        let start = Instant::now();

        let set = PaginationHelper::follow_next_links(first_url, self.options.page_delay, |url| {
            self.fetch_page_owned(url)
        })
        .await;

        if let Some(e) = &set.error {
            warn!(
                endpoint = %endpoint,
                pages = set.pages,
                records = set.records.len(),
                error = %e,
                "Pagination stopped early"
            );
        } else {
            info!(
                endpoint = %endpoint,
                pages = set.pages,
                records = set.records.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Fetched all pages"
            );
        }

        Ok(set)
    }

    /// Fetch the full event list, skipping records without a usable id
    pub async fn try_fetch_events(&self, endpoint: &str) -> FetcherResult<Vec<Event>> {
        let records = self.try_fetch(endpoint, FetchMode::Paginated).await?.into_records();
        Ok(records_to_events(&records))
    }

    /// Fetch the full event list; empty when the fetch failed
    pub async fn fetch_events(&self, endpoint: &str) -> Vec<Event> {
        self.fetch(endpoint, FetchMode::Paginated)
            .await
            .map(|output| records_to_events(&output.into_records()))
            .unwrap_or_default()
    }

    /// GET one absolute URL and parse its JSON body
    pub async fn fetch_page(&self, url: &str) -> FetcherResult<Value> {
        let response = self.get_with_retry(url, &self.headers).await?;
        if response.status == 204 {
            return Ok(Value::Null);
        }
        parse_json(url, &response.body)
    }

    async fn fetch_page_owned(&self, url: String) -> FetcherResult<Value> {
        self.fetch_page(&url).await
    }

    /// Download raw bytes from an absolute URL.
    ///
    /// Attachment URLs are pre-signed, so no API authentication headers are sent.
    /// The same retry policy applies.
    pub async fn download(&self, url: &str) -> FetcherResult<Bytes> {
        let response = self.get_with_retry(url, &HeaderMap::new()).await?;
        debug!(url = %url, bytes = response.body.len(), "Downloaded file");
        Ok(response.body)
    }

    async fn get_with_retry(&self, url: &str, headers: &HeaderMap) -> FetcherResult<HttpResponse> {
        let mut state = self.policy.initial();
        let mut response: Option<HttpResponse> = None;
        let mut last_failure: Option<FetcherError> = None;
        let mut error_type = RetryErrorType::NetworkGeneric;

        loop {
            state = match state {
                RequestState::Fetching { attempt } => {
                    self.counters.requests.fetch_add(1, Ordering::Relaxed);
                    metrics::record_api_request();

                    let started = Instant::now();
                    let outcome = match self.transport.get(url, headers, self.options.timeout).await
                    {
                        Ok(resp) => {
                            let outcome = AttemptOutcome::from_status(resp.status);
                            debug!(
                                url = %url,
                                status = resp.status,
                                attempt = attempt,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Received response"
                            );
                            if outcome != AttemptOutcome::Success {
                                error_type = RetryErrorType::from_status(resp.status);
                                last_failure = Some(if outcome == AttemptOutcome::RateLimited {
                                    FetcherError::RateLimited
                                } else {
                                    FetcherError::HttpError {
                                        status: resp.status,
                                        attempts: attempt,
                                        url: url.to_string(),
                                    }
                                });
                            }
                            response = Some(resp);
                            outcome
                        }
                        Err(e) => {
                            warn!(url = %url, attempt = attempt, error = %e, "Request failed");
                            error_type = RetryErrorType::NetworkGeneric;
                            last_failure = Some(e);
                            AttemptOutcome::Failed
                        }
                    };

                    self.policy.on_outcome(attempt, outcome)
                }
                RequestState::RateLimited { attempt } => {
                    let wait = self.policy.delay_for(state).unwrap_or_default();
                    let ctx = RetryContext::new(
                        attempt,
                        self.policy.max_retries(),
                        RetryErrorType::RateLimit,
                        wait,
                        url,
                    );
                    warn!(url = %url, attempt = attempt, "{}", ctx.format_rate_limited());
                    self.counters.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_rate_limited();

                    tokio::time::sleep(wait).await;
                    self.policy.after_wait(state)
                }
                RequestState::Retrying { attempt } => {
                    let wait = self.policy.delay_for(state).unwrap_or_default();
                    let ctx = RetryContext::new(
                        attempt,
                        self.policy.max_retries(),
                        error_type,
                        wait,
                        url,
                    );
                    warn!(url = %url, attempt = attempt, "{}", ctx.format_retry());
                    self.counters.retry_waits.fetch_add(1, Ordering::Relaxed);
                    metrics::record_retry();

                    tokio::time::sleep(wait).await;
                    self.policy.after_wait(state)
                }
                RequestState::Exhausted { attempts } => {
                    let ctx = RetryContext::new(
                        attempts,
                        self.policy.max_retries(),
                        error_type,
                        Duration::ZERO,
                        url,
                    );
                    error!(url = %url, attempts = attempts, "{}", ctx.format_failure());

                    return Err(match last_failure {
                        Some(FetcherError::HttpError { status, .. }) => FetcherError::HttpError {
                            status,
                            attempts,
                            url: url.to_string(),
                        },
                        Some(other) => other,
                        None => FetcherError::RequestFailed(format!(
                            "request to {url} failed after {attempts} attempt(s)"
                        )),
                    });
                }
                RequestState::Done => {
                    return response.take().ok_or_else(|| {
                        FetcherError::RequestFailed(format!("no response recorded for {url}"))
                    });
                }
            };
        }
    }
}

fn parse_json(url: &str, body: &[u8]) -> FetcherResult<Value> {
    serde_json::from_slice(body).map_err(|e| {
        error!(url = %url, error = %e, "Response body is not valid JSON");
        FetcherError::MalformedResponse {
            url: url.to_string(),
            reason: e.to_string(),
        }
    })
}

fn records_to_events(records: &[Value]) -> Vec<Event> {
    let mut events = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match Event::from_record(record) {
            Some(event) => events.push(event),
            None => warn!(index = index, "Skipping event record without an id"),
        }
    }
    events
}
