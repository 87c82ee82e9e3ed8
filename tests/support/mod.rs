//! Shared fixtures: a URL-routed scripted transport and client builders

#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Value};
use spend_event_exporter::fetcher::{
    ClientOptions, FetcherResult, HttpResponse, HttpTransport, SpendApiClient,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BASE_URL: &str = "https://api.example.com/v1";

/// One request seen by the transport
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// Answers each URL from its own response queue; unknown URLs get 404
#[derive(Default)]
pub struct RoutedTransport {
    routes: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl RoutedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue responses for `url`, served in order
    pub fn route(&self, url: &str, responses: Vec<HttpResponse>) {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(responses);
    }

    /// Queue one 200 JSON response for `url`
    pub fn json(&self, url: &str, body: Value) {
        self.route(url, vec![HttpResponse::new(200, body.to_string())]);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }
}

#[async_trait]
impl HttpTransport for RoutedTransport {
    async fn get(
        &self,
        url: &str,
        headers: &HeaderMap,
        _timeout: Duration,
    ) -> FetcherResult<HttpResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers: headers.clone(),
        });
        let response = self
            .routes
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| HttpResponse::new(404, "not found"));
        Ok(response)
    }
}

pub fn auth_headers() -> HashMap<String, String> {
    HashMap::from([
        ("X-Api-Key".to_string(), "key".to_string()),
        ("X-User-Token".to_string(), "token".to_string()),
        ("X-User-Email".to_string(), "ops@example.com".to_string()),
    ])
}

/// Client with short waits, two attempts per URL and page size 100
pub fn test_client(transport: Arc<RoutedTransport>) -> SpendApiClient {
    let options = ClientOptions {
        retry_interval: Duration::from_millis(10),
        max_retries: 2,
        page_delay: Duration::ZERO,
        ..ClientOptions::default()
    };
    SpendApiClient::new(BASE_URL, auth_headers(), options)
        .unwrap()
        .with_transport(transport)
}

/// Paginated listing URL as the client builds it
pub fn listing_url(endpoint: &str) -> String {
    format!("{BASE_URL}{endpoint}?page[size]=100")
}

/// `{"data": [...], "links": {"next": next}}`
pub fn page(records: Vec<Value>, next: Option<&str>) -> Value {
    json!({"data": records, "links": {"next": next}})
}

pub fn event_record(id: &str, title: &str) -> Value {
    json!({"id": id, "type": "events", "attributes": {"title": title}})
}

pub fn attachment_record(id: &str, file_name: &str, url: &str) -> Value {
    json!({
        "id": id,
        "type": "attachments",
        "attributes": {"file_name": file_name, "download_url": url}
    })
}
