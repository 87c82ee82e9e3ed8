//! Unit tests for paginated fetching through the API client

use serde_json::json;
use spend_event_exporter::fetcher::{
    ClientOptions, FetchMode, FetchOutput, FetcherError, HttpResponse, SpendApiClient,
};
use std::sync::Arc;
use std::time::Duration;

use crate::support::{auth_headers, event_record, listing_url, page, test_client, RoutedTransport, BASE_URL};

const PAGE_2: &str = "https://api.example.com/v1/events?page[cursor]=2";
const PAGE_3: &str = "https://api.example.com/v1/events?page[cursor]=3";

fn serve_three_pages(transport: &RoutedTransport) {
    transport.json(
        &listing_url("/events"),
        page(vec![event_record("1", "a"), event_record("2", "b")], Some(PAGE_2)),
    );
    transport.json(PAGE_2, page(vec![event_record("3", "c")], Some(PAGE_3)));
    transport.json(PAGE_3, page(vec![event_record("4", "d")], None));
}

#[tokio::test(start_paused = true)]
async fn test_pages_fetched_in_order_with_delay() {
    let transport = RoutedTransport::new();
    serve_three_pages(&transport);

    let options = ClientOptions {
        page_delay: Duration::from_millis(250),
        ..ClientOptions::default()
    };
    let client = SpendApiClient::new(BASE_URL, auth_headers(), options)
        .unwrap()
        .with_transport(transport.clone());

    let started = tokio::time::Instant::now();
    let events = client.fetch_events("/events").await;

    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    assert!(started.elapsed() >= Duration::from_millis(500));

    let urls: Vec<String> = transport.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec![listing_url("/events"), PAGE_2.to_string(), PAGE_3.to_string()]);
}

#[tokio::test]
async fn test_failed_middle_page_keeps_earlier_records() {
    let transport = RoutedTransport::new();
    transport.json(
        &listing_url("/events"),
        page(vec![event_record("1", "a")], Some(PAGE_2)),
    );
    transport.route(PAGE_2, vec![HttpResponse::new(200, "<html>maintenance</html>")]);

    let client = test_client(transport.clone());
    let set = client.fetch_paginated("/events").await.unwrap();

    assert_eq!(set.pages, 1);
    assert_eq!(set.records.len(), 1);
    assert!(!set.is_complete());
    assert!(matches!(set.error, Some(FetcherError::MalformedResponse { .. })));
    // Malformed JSON is not retried
    assert_eq!(transport.count(PAGE_2), 1);

    // The lenient fetch returns the partial list
    transport.json(
        &listing_url("/events"),
        page(vec![event_record("1", "a")], Some(PAGE_2)),
    );
    let records = client
        .fetch("/events", FetchMode::Paginated)
        .await
        .unwrap()
        .into_records();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn test_first_page_failure_yields_nothing() {
    let transport = RoutedTransport::new();
    let client = test_client(transport.clone());

    assert!(client.fetch("/events", FetchMode::Paginated).await.is_none());
    assert!(client.fetch_events("/events").await.is_empty());
    assert!(matches!(
        client.try_fetch_events("/events").await,
        Err(FetcherError::HttpError { status: 404, attempts: 2, .. })
    ));
}

#[tokio::test]
async fn test_single_fetch_returns_data_object() {
    let transport = RoutedTransport::new();
    transport.json(
        &format!("{BASE_URL}/events/E1"),
        json!({"data": {"id": "E1", "attributes": {"title": "Laptops"}}}),
    );

    let client = test_client(Arc::clone(&transport));
    let output = client.try_fetch("/events/E1", FetchMode::Single).await.unwrap();

    assert_eq!(
        output,
        FetchOutput::Payload(json!({"id": "E1", "attributes": {"title": "Laptops"}}))
    );
    assert!(!transport.requests()[0].url.contains("page[size]"));
}

#[tokio::test]
async fn test_empty_listing_body_is_an_error() {
    let transport = RoutedTransport::new();
    transport.route(&listing_url("/events"), vec![HttpResponse::new(200, "")]);

    let client = test_client(transport.clone());
    let result = client.try_fetch_events("/events").await;

    assert!(matches!(result, Err(FetcherError::MalformedResponse { .. })));
    assert_eq!(transport.count(&listing_url("/events")), 1);
}

#[tokio::test]
async fn test_repeated_records_across_pages_are_kept_in_order() {
    let transport = RoutedTransport::new();
    transport.json(
        &listing_url("/events"),
        page(vec![event_record("1", "a"), event_record("2", "b")], Some(PAGE_2)),
    );
    transport.json(
        PAGE_2,
        page(vec![event_record("2", "b"), event_record("1", "a")], None),
    );

    let client = test_client(transport);
    let events = client.try_fetch_events("/events").await.unwrap();

    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "2", "1"]);
}
