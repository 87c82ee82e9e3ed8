//! Spend API fetching
//!
//! The client issues authenticated GET requests through an [`HttpTransport`], follows
//! `links.next` pagination, and absorbs failures into logged outcomes so a single bad
//! request never aborts an export run.

use serde_json::Value;

pub mod api_client;
pub mod pagination;
pub mod retry;
pub mod retry_formatter;
pub mod transport;

pub use api_client::{ClientOptions, ClientStats, SpendApiClient};
pub use pagination::{PageResponse, PageSet, PaginationHelper};
pub use retry::{AttemptOutcome, RequestState, RetryPolicy};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

/// Fetcher errors
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetcherError {
    /// Missing or malformed client configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network, DNS, or timeout failure before a status was received
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Non-2xx status after exhausting the attempt budget
    #[error("HTTP error {status} after {attempts} attempt(s) for {url}")]
    HttpError {
        /// Last status observed
        status: u16,
        /// Attempts made
        attempts: u32,
        /// Requested URL
        url: String,
    },

    /// Body of a successful response is not valid JSON
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse {
        /// Requested URL
        url: String,
        /// Parser message
        reason: String,
    },

    /// Rate limit signalled by the server (429)
    #[error("rate limit exceeded")]
    RateLimited,
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// Whether a fetch follows pagination links
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Follow `links.next` until exhausted, aggregating `data` arrays
    Paginated,
    /// Issue exactly one logical request
    Single,
}

impl From<bool> for FetchMode {
    fn from(paginated: bool) -> Self {
        if paginated {
            FetchMode::Paginated
        } else {
            FetchMode::Single
        }
    }
}

/// Successful fetch output
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutput {
    /// Aggregated records from every page, in page order
    Records(Vec<Value>),
    /// Single payload: the `data` field when present, otherwise the whole body
    Payload(Value),
}

impl FetchOutput {
    /// Records of a paginated fetch; a single payload array is flattened, any other
    /// single payload becomes one record
    pub fn into_records(self) -> Vec<Value> {
        match self {
            FetchOutput::Records(records) => records,
            FetchOutput::Payload(Value::Array(items)) => items,
            FetchOutput::Payload(Value::Null) => Vec::new(),
            FetchOutput::Payload(value) => vec![value],
        }
    }
}
