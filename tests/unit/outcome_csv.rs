//! Unit tests for the CSV outcome files through the `OutcomeRecorder` trait

use spend_event_exporter::output::{CsvOutcomeRecorder, OutcomeRecorder};
use spend_event_exporter::pipeline::{AttachmentFailure, EventOutcome};
use spend_event_exporter::Event;
use tempfile::TempDir;

fn read_rows(path: &std::path::Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[test]
fn test_titles_with_separators_survive_round_trip() {
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("out/downloaded_files.csv");
    let failures = dir.path().join("out/failed_attachments.csv");

    let mut recorder: Box<dyn OutcomeRecorder> =
        Box::new(CsvOutcomeRecorder::open(&downloads, &failures).unwrap());

    let event = Event::new("E-7", "Pens, \"blue\"\nand black");
    let outcome = EventOutcome {
        locations: vec!["events/E-7/a.pdf".to_string()],
        failed_attachments: vec![],
    };
    recorder.record_event(&event, &outcome).unwrap();
    recorder
        .record_failure(&AttachmentFailure::new("E-7", "att-2", "HTTP 500, 3 attempts"))
        .unwrap();
    recorder.flush().unwrap();
    drop(recorder);

    let rows = read_rows(&downloads);
    assert_eq!(
        rows,
        vec![vec!["E-7", "Pens, \"blue\"\nand black", "events/E-7/a.pdf", "", ""]]
    );

    let rows = read_rows(&failures);
    assert_eq!(rows, vec![vec!["E-7", "att-2", "HTTP 500, 3 attempts"]]);
}

#[test]
fn test_event_without_attachments_still_recorded() {
    let dir = TempDir::new().unwrap();
    let downloads = dir.path().join("downloaded_files.csv");
    let failures = dir.path().join("failed_attachments.csv");

    let mut recorder = CsvOutcomeRecorder::open(&downloads, &failures).unwrap();
    recorder
        .record_event(&Event::new("E-1", "Empty"), &EventOutcome::default())
        .unwrap();

    assert_eq!(recorder.events_written(), 1);
    assert_eq!(recorder.failures_written(), 0);
    assert_eq!(read_rows(&downloads), vec![vec!["E-1", "Empty", "", "", ""]]);
    // Failure file exists with only its header
    assert!(read_rows(&failures).is_empty());
}
