//! Integration tests for resumable export runs: driver, attachment handler, CSV outcome
//! files and the checkpoint file together

use spend_event_exporter::fetcher::HttpResponse;
use spend_event_exporter::output::CsvOutcomeRecorder;
use spend_event_exporter::pipeline::{AttachmentHandler, DriverOptions, PipelineDriver};
use spend_event_exporter::resume::CheckpointStore;
use spend_event_exporter::storage::{BlobStore, LocalBlobStore};
use spend_event_exporter::{Event, SpendApiClient};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use crate::support::{
    attachment_record, event_record, listing_url, page, test_client, RoutedTransport,
};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn progress(&self) -> PathBuf {
        self.dir.path().join("state/progress.json")
    }

    fn downloads(&self) -> PathBuf {
        self.dir.path().join("downloaded_files.csv")
    }

    fn failures(&self) -> PathBuf {
        self.dir.path().join("failed_attachments.csv")
    }

    fn blobs(&self) -> PathBuf {
        self.dir.path().join("blobs")
    }

    fn driver(&self, client: Arc<SpendApiClient>, limit: Option<usize>) -> PipelineDriver {
        let store: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(self.blobs()));
        let handler = Arc::new(AttachmentHandler::new(
            client,
            store,
            "/events/{event_id}/attachments",
            "",
        ));
        let recorder = CsvOutcomeRecorder::open(&self.downloads(), &self.failures()).unwrap();
        PipelineDriver::new(handler, Box::new(recorder), CheckpointStore::new(self.progress()))
            .with_options(DriverOptions {
                limit,
                ..DriverOptions::default()
            })
    }
}

fn csv_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

fn checkpoint(path: &Path) -> usize {
    CheckpointStore::read(path).unwrap().unwrap().last_index()
}

/// Serve the event list
fn serve_event_list(transport: &RoutedTransport, ids: &[&str]) {
    transport.json(
        &listing_url("/events"),
        page(ids.iter().map(|id| event_record(id, &format!("Event {id}"))).collect(), None),
    );
}

/// Serve one attachment named `{id}.txt` for the event
fn serve_attachment(transport: &RoutedTransport, id: &str) {
    let file_url = format!("https://files.example.com/{id}");
    transport.json(
        &listing_url(&format!("/events/{id}/attachments")),
        page(
            vec![attachment_record(&format!("att-{id}"), &format!("{id}.txt"), &file_url)],
            None,
        ),
    );
    transport.route(&file_url, vec![HttpResponse::new(200, id.to_string())]);
}

fn serve_events(transport: &RoutedTransport, ids: &[&str]) {
    serve_event_list(transport, ids);
    for id in ids {
        serve_attachment(transport, id);
    }
}

async fn fetch_events(client: &SpendApiClient) -> Vec<Event> {
    client.try_fetch_events("/events").await.unwrap()
}

#[tokio::test]
async fn test_resume_from_checkpoint_processes_only_remaining_events() {
    let ws = Workspace::new();
    let transport = RoutedTransport::new();
    serve_events(&transport, &["E0", "E1", "E2"]);
    CheckpointStore::new(ws.progress()).overwrite(2).unwrap();

    let client = Arc::new(test_client(transport.clone()));
    let events = fetch_events(&client).await;
    assert_eq!(events.len(), 3);

    let summary = ws.driver(client, None).run(&events).await.unwrap();

    assert_eq!(summary.events_skipped, 2);
    assert_eq!(summary.events_processed, 1);
    assert_eq!(summary.final_checkpoint, 3);
    assert_eq!(checkpoint(&ws.progress()), 3);

    assert_eq!(transport.count(&listing_url("/events/E0/attachments")), 0);
    assert_eq!(transport.count(&listing_url("/events/E1/attachments")), 0);
    assert_eq!(transport.count(&listing_url("/events/E2/attachments")), 1);
    assert!(ws.blobs().join("events/E2/E2.txt").exists());
    assert!(!ws.blobs().join("events/E0/E0.txt").exists());

    let rows = csv_rows(&ws.downloads());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec!["event_id", "title", "file1", "file2", "file3"]);
    assert_eq!(rows[1][0], "E2");
    assert_eq!(rows[1][1], "Event E2");
}

#[tokio::test]
async fn test_failed_event_is_audited_and_run_continues() {
    let ws = Workspace::new();
    let transport = RoutedTransport::new();
    serve_event_list(&transport, &["E0", "E1", "E2"]);
    // E1's attachments endpoint is unknown to the server
    serve_attachment(&transport, "E0");
    serve_attachment(&transport, "E2");

    let client = Arc::new(test_client(transport.clone()));
    let events = fetch_events(&client).await;
    assert_eq!(events.len(), 3);

    let summary = ws.driver(client, None).run(&events).await.unwrap();

    assert_eq!(summary.events_processed, 2);
    assert_eq!(summary.events_failed, 1);
    assert_eq!(summary.final_checkpoint, 3);
    assert!(ws.blobs().join("events/E0/E0.txt").exists());
    assert!(ws.blobs().join("events/E2/E2.txt").exists());

    let failures = csv_rows(&ws.failures());
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0], vec!["event_id", "attachment_id", "reason"]);
    assert_eq!(failures[1][0], "E1");
    assert_eq!(failures[1][1], "");
    assert!(!failures[1][2].is_empty());

    let downloads = csv_rows(&ws.downloads());
    let exported: Vec<&str> = downloads[1..].iter().map(|r| r[0].as_str()).collect();
    assert_eq!(exported, vec!["E0", "E2"]);
}

#[tokio::test]
async fn test_limited_runs_resume_where_previous_run_stopped() {
    let ws = Workspace::new();
    let transport = RoutedTransport::new();
    serve_events(&transport, &["E0", "E1", "E2"]);

    let client = Arc::new(test_client(transport.clone()));
    let events = fetch_events(&client).await;

    let first = ws.driver(client.clone(), Some(1)).run(&events).await.unwrap();
    assert_eq!(first.events_processed, 1);
    assert_eq!(checkpoint(&ws.progress()), 1);

    let second = ws.driver(client, None).run(&events).await.unwrap();
    assert_eq!(second.events_skipped, 1);
    assert_eq!(second.events_processed, 2);
    assert_eq!(checkpoint(&ws.progress()), 3);

    // Header once, one row per event across both runs
    let rows = csv_rows(&ws.downloads());
    let exported: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(exported, vec!["event_id", "E0", "E1", "E2"]);
    for id in ["E0", "E1", "E2"] {
        assert_eq!(transport.count(&listing_url(&format!("/events/{id}/attachments"))), 1);
    }
}

#[tokio::test]
async fn test_corrupt_checkpoint_restarts_from_zero() {
    let ws = Workspace::new();
    std::fs::create_dir_all(ws.progress().parent().unwrap()).unwrap();
    std::fs::write(ws.progress(), "{not json").unwrap();

    let transport = RoutedTransport::new();
    serve_events(&transport, &["E0", "E1"]);
    let client = Arc::new(test_client(transport.clone()));
    let events = fetch_events(&client).await;

    let summary = ws.driver(client, None).run(&events).await.unwrap();

    assert_eq!(summary.events_skipped, 0);
    assert_eq!(summary.events_processed, 2);
    assert_eq!(checkpoint(&ws.progress()), 2);
}
