//! Checkpoint document

use serde::{Deserialize, Serialize};

/// Persisted export progress
///
/// `last_index` is the index of the next event to process, which equals the number of
/// events at the front of the list that are finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    last_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<i64>,
}

impl Checkpoint {
    /// Create a checkpoint stamped with the current time
    pub fn new(last_index: usize) -> Self {
        Self {
            last_index,
            updated_at: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    /// Index of the next event to process
    pub fn last_index(&self) -> usize {
        self.last_index
    }

    /// Unix millis of the write, absent in files written by older tools
    pub fn updated_at(&self) -> Option<i64> {
        self.updated_at
    }
}
