//! Next-link pagination
//!
//! Paginated endpoints answer with `{"data": [...], "links": {"next": <url|null>}}`.
//! [`PaginationHelper::follow_next_links`] walks those links until the server stops
//! supplying one, appending records in page order.
//!
//! Safety mechanisms:
//! - Maximum page count to stop runaway next-link cycles
//! - A failed page ends the walk but keeps the records collected so far

use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetcherError, FetcherResult};

/// Maximum number of pages followed for one fetch
pub const MAX_PAGES: usize = 10_000;

/// One parsed page of a paginated response
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    /// Records carried by the page
    pub records: Vec<Value>,
    /// Absolute URL of the following page, if any
    pub next_link: Option<String>,
}

impl PageResponse {
    /// Parse a page body.
    ///
    /// A missing or null `data` yields no records; a non-array `data` is kept as a
    /// single record. `links.next` is only honored when it is a non-empty string.
    pub fn parse(mut payload: Value) -> Self {
        let records = match payload.get_mut("data").map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };

        let next_link = payload
            .get("links")
            .and_then(|links| links.get("next"))
            .and_then(Value::as_str)
            .filter(|next| !next.is_empty())
            .map(str::to_string);

        Self { records, next_link }
    }
}

/// Aggregated result of a paginated walk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageSet {
    /// Records from every successful page, in page order
    pub records: Vec<Value>,
    /// Pages fetched successfully
    pub pages: usize,
    /// Failure that ended the walk early, if any
    pub error: Option<FetcherError>,
}

impl PageSet {
    /// Whether every page up to the last `next` link was fetched
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Pagination helper for next-link APIs
pub struct PaginationHelper;

impl PaginationHelper {
    /// Follow `links.next` starting at `first_url`.
    ///
    /// # Arguments
    /// * `first_url` - URL of the first page, page-size parameter already applied
    /// * `page_delay` - Pause between successive page fetches
    /// * `fetch_fn` - Fetches and parses one page body
    ///
    /// Never fails: a page error is stored in [`PageSet::error`] alongside the
    /// records gathered before it.
    pub async fn follow_next_links<F, Fut>(
        first_url: String,
        page_delay: Duration,
        mut fetch_fn: F,
    ) -> PageSet
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = FetcherResult<Value>>,
    {
        let mut set = PageSet::default();
        let mut next_url = Some(first_url);

        while let Some(url) = next_url.take() {
            if set.pages >= MAX_PAGES {
                warn!(
                    pages = set.pages,
                    url = %url,
                    "Maximum page count reached - stopping pagination"
                );
                set.error = Some(FetcherError::MalformedResponse {
                    url,
                    reason: format!("pagination exceeded {MAX_PAGES} pages"),
                });
                break;
            }

            if set.pages > 0 && !page_delay.is_zero() {
                tokio::time::sleep(page_delay).await;
            }

            debug!(page = set.pages + 1, url = %url, "Fetching page");

            match fetch_fn(url).await {
                Ok(payload) => {
                    let page = PageResponse::parse(payload);
                    debug!(
                        page = set.pages + 1,
                        records = page.records.len(),
                        has_next = page.next_link.is_some(),
                        "Received page"
                    );
                    set.records.extend(page.records);
                    set.pages += 1;
                    next_url = page.next_link;
                }
                Err(e) => {
                    warn!(
                        pages = set.pages,
                        records = set.records.len(),
                        error = %e,
                        "Page fetch failed - returning partial results"
                    );
                    set.error = Some(e);
                    break;
                }
            }
        }

        debug!(
            pages = set.pages,
            records = set.records.len(),
            complete = set.is_complete(),
            "Pagination finished"
        );

        set
    }
}
