//! HTTP transport seam
//!
//! [`SpendApiClient`](super::SpendApiClient) never talks to reqwest directly. Everything
//! goes through [`HttpTransport`], so retry and pagination behavior can be exercised with
//! scripted responses.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::retry_formatter::extract_error_type;
use super::{FetcherError, FetcherResult};

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal GET transport used by the API client and attachment downloads
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET request.
    ///
    /// Returns `Ok` for any received status (including errors); `Err` only when no
    /// response arrived (connection, DNS, timeout).
    async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> FetcherResult<HttpResponse>;
}

/// reqwest-backed transport; one pooled client reused serially for every request
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport around a new client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> FetcherResult<HttpResponse> {
        let response = self
            .client
            .get(url)
            .headers(headers.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                let kind = extract_error_type(None, Some(&e));
                FetcherError::RequestFailed(format!("{}: {e}", kind.description()))
            })?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            let kind = extract_error_type(None, Some(&e));
            FetcherError::RequestFailed(format!("{}: {e}", kind.description()))
        })?;

        debug!(url = %url, status = status, bytes = body.len(), "GET completed");
        Ok(HttpResponse { status, body })
    }
}
