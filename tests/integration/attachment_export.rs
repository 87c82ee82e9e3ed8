//! Integration tests for exporting one event's attachments to local blob storage

use bytes::Bytes;
use serde_json::json;
use spend_event_exporter::fetcher::{FetcherError, HttpResponse};
use spend_event_exporter::pipeline::{AttachmentHandler, EventHandler, HandlerError};
use spend_event_exporter::storage::{BlobStore, LocalBlobStore};
use spend_event_exporter::Event;
use std::sync::Arc;
use tempfile::TempDir;

use crate::support::{attachment_record, listing_url, page, test_client, RoutedTransport};

const ATTACHMENTS_TEMPLATE: &str = "/events/{event_id}/attachments";

fn handler(transport: Arc<RoutedTransport>, root: &TempDir, prefix: &str) -> AttachmentHandler {
    let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(root.path()));
    AttachmentHandler::new(
        Arc::new(test_client(transport)),
        store,
        ATTACHMENTS_TEMPLATE,
        prefix,
    )
}

#[tokio::test]
async fn test_uploads_every_attachment_under_event_path() {
    let transport = RoutedTransport::new();
    let first_page = listing_url("/events/E1/attachments");
    let second_page = "https://api.example.com/v1/events/E1/attachments?page[number]=2";

    transport.json(
        &first_page,
        page(
            vec![attachment_record("a1", "quote.pdf", "https://files.example.com/a1")],
            Some(second_page),
        ),
    );
    transport.json(
        second_page,
        page(
            vec![attachment_record("a2", "terms.docx", "https://files.example.com/a2")],
            None,
        ),
    );
    transport.route("https://files.example.com/a1", vec![HttpResponse::new(200, "PDF")]);
    transport.route("https://files.example.com/a2", vec![HttpResponse::new(200, "DOCX")]);

    let root = TempDir::new().unwrap();
    let outcome = handler(transport.clone(), &root, "exports")
        .process_event(&Event::new("E1", "Office supplies"))
        .await
        .unwrap();

    let quote = root.path().join("exports/events/E1/quote.pdf");
    let terms = root.path().join("exports/events/E1/terms.docx");
    assert_eq!(
        outcome.locations,
        vec![quote.display().to_string(), terms.display().to_string()]
    );
    assert!(outcome.failed_attachments.is_empty());
    assert_eq!(std::fs::read(&quote).unwrap(), b"PDF");
    assert_eq!(std::fs::read(&terms).unwrap(), b"DOCX");
}

#[tokio::test]
async fn test_attachment_failures_are_reported_individually() {
    let transport = RoutedTransport::new();
    transport.json(
        &listing_url("/events/E2/attachments"),
        page(
            vec![
                attachment_record("ok", "ok.txt", "https://files.example.com/ok"),
                attachment_record("broken", "broken.txt", "https://files.example.com/broken"),
                json!({"id": "no-url", "attributes": {"title": "orphan"}}),
            ],
            None,
        ),
    );
    transport.route("https://files.example.com/ok", vec![HttpResponse::new(200, "fine")]);
    transport.route(
        "https://files.example.com/broken",
        vec![HttpResponse::new(500, ""), HttpResponse::new(500, "")],
    );

    let root = TempDir::new().unwrap();
    let outcome = handler(transport.clone(), &root, "")
        .process_event(&Event::new("E2", ""))
        .await
        .unwrap();

    assert_eq!(outcome.locations.len(), 1);
    assert!(root.path().join("events/E2/ok.txt").exists());
    assert!(!root.path().join("events/E2/broken.txt").exists());

    let failed: Vec<&str> = outcome
        .failed_attachments
        .iter()
        .map(|f| f.attachment_id.as_str())
        .collect();
    assert_eq!(failed, vec!["broken", "no-url"]);
    assert!(outcome.failed_attachments.iter().all(|f| f.event_id == "E2"));

    // Two attempts, the client's retry budget
    assert_eq!(transport.count("https://files.example.com/broken"), 2);
}

#[tokio::test]
async fn test_listing_failure_fails_the_event() {
    let transport = RoutedTransport::new();
    let root = TempDir::new().unwrap();

    let result = handler(transport.clone(), &root, "")
        .process_event(&Event::new("E3", ""))
        .await;

    assert!(matches!(result, Err(HandlerError::Fetch(_))));
    assert_eq!(transport.count(&listing_url("/events/E3/attachments")), 2);
}

#[tokio::test]
async fn test_duplicate_file_names_do_not_overwrite() {
    let transport = RoutedTransport::new();
    transport.json(
        &listing_url("/events/E4/attachments"),
        page(
            vec![
                attachment_record("a1", "invoice.pdf", "https://files.example.com/1"),
                attachment_record("a2", "invoice.pdf", "https://files.example.com/2"),
            ],
            None,
        ),
    );
    transport.route("https://files.example.com/1", vec![HttpResponse::new(200, "one")]);
    transport.route("https://files.example.com/2", vec![HttpResponse::new(200, "two")]);

    let root = TempDir::new().unwrap();
    let outcome = handler(transport, &root, "")
        .process_event(&Event::new("E4", ""))
        .await
        .unwrap();

    assert_eq!(outcome.locations.len(), 2);
    assert_eq!(std::fs::read(root.path().join("events/E4/invoice.pdf")).unwrap(), b"one");
    assert_eq!(std::fs::read(root.path().join("events/E4/a2_invoice.pdf")).unwrap(), b"two");
}

#[tokio::test]
async fn test_auth_headers_only_sent_to_api() {
    let transport = RoutedTransport::new();
    transport.json(
        &listing_url("/events/E5/attachments"),
        page(
            vec![attachment_record("a1", "a.txt", "https://files.example.com/signed?sig=x")],
            None,
        ),
    );
    transport.route(
        "https://files.example.com/signed?sig=x",
        vec![HttpResponse::new(200, Bytes::from_static(b"a"))],
    );

    let root = TempDir::new().unwrap();
    handler(transport.clone(), &root, "")
        .process_event(&Event::new("E5", ""))
        .await
        .unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let header = |name: &str| requests[0].headers.get(name).and_then(|v| v.to_str().ok());
    assert_eq!(header("X-Api-Key"), Some("key"));
    assert_eq!(header("X-User-Email"), Some("ops@example.com"));
    assert!(requests[1].headers.get("X-Api-Key").is_none());
}

#[tokio::test]
async fn test_empty_listing_body_fails_the_event() {
    let transport = RoutedTransport::new();
    transport.route(
        &listing_url("/events/E6/attachments"),
        vec![HttpResponse::new(200, "")],
    );

    let root = TempDir::new().unwrap();
    let result = handler(transport.clone(), &root, "")
        .process_event(&Event::new("E6", ""))
        .await;

    assert!(matches!(
        result,
        Err(HandlerError::Fetch(FetcherError::MalformedResponse { .. }))
    ));
    assert_eq!(transport.count(&listing_url("/events/E6/attachments")), 1);
}

#[tokio::test]
async fn test_same_name_without_ids_keeps_every_file() {
    let transport = RoutedTransport::new();
    let record = |url: &str| {
        json!({"id": "", "attributes": {"file_name": "invoice.pdf", "download_url": url}})
    };
    transport.json(
        &listing_url("/events/E7/attachments"),
        page(
            vec![
                record("https://files.example.com/1"),
                record("https://files.example.com/2"),
                record("https://files.example.com/3"),
            ],
            None,
        ),
    );
    for (n, body) in [(1, "one"), (2, "two"), (3, "three")] {
        transport.route(
            &format!("https://files.example.com/{n}"),
            vec![HttpResponse::new(200, body)],
        );
    }

    let root = TempDir::new().unwrap();
    let outcome = handler(transport, &root, "")
        .process_event(&Event::new("E7", ""))
        .await
        .unwrap();

    assert_eq!(outcome.locations.len(), 3);
    let dir = root.path().join("events/E7");
    assert_eq!(std::fs::read(dir.join("invoice.pdf")).unwrap(), b"one");
    assert_eq!(std::fs::read(dir.join("2_invoice.pdf")).unwrap(), b"two");
    assert_eq!(std::fs::read(dir.join("3_invoice.pdf")).unwrap(), b"three");
}
