//! CSV outcome recorder
//!
//! Two append-only files:
//! - downloaded files: `event_id,title,file1,file2,file3`
//! - failure audit: `event_id,attachment_id,reason`
//!
//! Both survive resumed runs; the header is written only when a file is new or empty.

use csv::{Writer, WriterBuilder};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{OutcomeRecorder, OutputError, OutputResult};
use crate::pipeline::{AttachmentFailure, EventOutcome};
use crate::Event;

/// Header of the downloaded-files CSV
pub const DOWNLOADS_HEADER: [&str; 5] = ["event_id", "title", "file1", "file2", "file3"];

/// Header of the failure audit CSV
pub const FAILURES_HEADER: [&str; 3] = ["event_id", "attachment_id", "reason"];

#[derive(Debug, Serialize)]
struct DownloadRecord<'a> {
    event_id: &'a str,
    title: &'a str,
    file1: &'a str,
    file2: &'a str,
    file3: String,
}

impl<'a> DownloadRecord<'a> {
    fn new(event: &'a Event, locations: &'a [String]) -> Self {
        let slot = |i: usize| locations.get(i).map(String::as_str).unwrap_or_default();
        Self {
            event_id: &event.id,
            title: &event.title,
            file1: slot(0),
            file2: slot(1),
            file3: locations.get(2..).map(|rest| rest.join(";")).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct FailureRecord<'a> {
    event_id: &'a str,
    attachment_id: &'a str,
    reason: &'a str,
}

impl<'a> From<&'a AttachmentFailure> for FailureRecord<'a> {
    fn from(failure: &'a AttachmentFailure) -> Self {
        Self {
            event_id: &failure.event_id,
            attachment_id: &failure.attachment_id,
            reason: &failure.reason,
        }
    }
}

/// One append-mode CSV file
struct AppendCsv {
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
    rows_written: u64,
}

impl AppendCsv {
    fn open(path: &Path, header: &[&str]) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                OutputError::IoError(format!("Failed to open {}: {e}", path.display()))
            })?;
        let is_empty = file
            .metadata()
            .map_err(|e| OutputError::IoError(e.to_string()))?
            .len()
            == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));

        if is_empty {
            writer
                .write_record(header)
                .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
            writer
                .flush()
                .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))?;
        }

        debug!(path = %path.display(), new_file = is_empty, "Opened CSV for append");

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows_written: 0,
        })
    }

    fn append<T: Serialize>(&mut self, record: &T) -> OutputResult<()> {
        self.writer
            .serialize(record)
            .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        self.flush()?;
        self.rows_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }
}

/// Records outcomes into the downloaded-files CSV and failures into the audit CSV
pub struct CsvOutcomeRecorder {
    downloads: AppendCsv,
    failures: AppendCsv,
}

impl CsvOutcomeRecorder {
    /// Open (or create) both files for appending
    pub fn open(downloads_path: &Path, failures_path: &Path) -> OutputResult<Self> {
        info!(
            downloads = %downloads_path.display(),
            failures = %failures_path.display(),
            "Opening outcome CSV files"
        );
        Ok(Self {
            downloads: AppendCsv::open(downloads_path, &DOWNLOADS_HEADER)?,
            failures: AppendCsv::open(failures_path, &FAILURES_HEADER)?,
        })
    }

    /// Rows appended to the downloaded-files CSV by this recorder
    pub fn events_written(&self) -> u64 {
        self.downloads.rows_written
    }

    /// Rows appended to the failure audit by this recorder
    pub fn failures_written(&self) -> u64 {
        self.failures.rows_written
    }

    /// Location of the failure audit
    pub fn failures_path(&self) -> &Path {
        &self.failures.path
    }
}

impl OutcomeRecorder for CsvOutcomeRecorder {
    fn record_event(&mut self, event: &Event, outcome: &EventOutcome) -> OutputResult<()> {
        self.downloads
            .append(&DownloadRecord::new(event, &outcome.locations))
    }

    fn record_failure(&mut self, failure: &AttachmentFailure) -> OutputResult<()> {
        self.failures.append(&FailureRecord::from(failure))
    }

    fn flush(&mut self) -> OutputResult<()> {
        self.downloads.flush()?;
        self.failures.flush()
    }
}
