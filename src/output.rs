//! Result types of a harvest run.

use crate::error::ChunkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How a single document ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Every chunk was attempted; recipes persisted and the ledger updated.
    Processed,
    /// Checksum already in the ledger. No provider calls were made.
    Skipped,
    /// At least one chunk hit a transport or payload failure. Nothing persisted;
    /// the next run retries the whole file.
    Incomplete,
    /// The document could not be read at all.
    Failed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStatus::Processed => "processed",
            FileStatus::Skipped => "skipped",
            FileStatus::Incomplete => "incomplete",
            FileStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-document result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub filename: String,
    pub status: FileStatus,
    pub pages: usize,
    pub chunks_attempted: usize,
    /// Distinct recipes after merge.
    pub recipes_extracted: usize,
    /// Newly inserted recipes.
    pub recipes_saved: usize,
    /// Recipes already in the store under the same name.
    pub recipes_merged: usize,
    pub chunk_errors: Vec<ChunkError>,
    /// Document-level failure or per-recipe persistence failures.
    pub errors: Vec<String>,
}

impl FileOutcome {
    pub fn new(filename: impl Into<String>, status: FileStatus) -> Self {
        Self {
            filename: filename.into(),
            status,
            pages: 0,
            chunks_attempted: 0,
            recipes_extracted: 0,
            recipes_saved: 0,
            recipes_merged: 0,
            chunk_errors: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn error_count(&self) -> usize {
        self.chunk_errors.len() + self.errors.len()
    }
}

/// Aggregate report printed at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub files_seen: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub files_incomplete: usize,
    pub files_failed: usize,
    pub chunks_attempted: usize,
    pub recipes_extracted: usize,
    pub recipes_saved: usize,
    pub recipes_merged: usize,
    pub errors: usize,
    pub cancelled: bool,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub files: Vec<FileOutcome>,
}

impl RunSummary {
    /// Fold one file's outcome into the totals.
    pub fn record(&mut self, outcome: FileOutcome) {
        self.files_seen += 1;
        match outcome.status {
            FileStatus::Processed => self.files_processed += 1,
            FileStatus::Skipped => self.files_skipped += 1,
            FileStatus::Incomplete => self.files_incomplete += 1,
            FileStatus::Failed => self.files_failed += 1,
        }
        self.chunks_attempted += outcome.chunks_attempted;
        self.recipes_extracted += outcome.recipes_extracted;
        self.recipes_saved += outcome.recipes_saved;
        self.recipes_merged += outcome.recipes_merged;
        self.errors += outcome.error_count();
        self.files.push(outcome);
    }
}

/// Snapshot of a running harvest, for polling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub is_running: bool,
    pub files_processed: usize,
    pub recipes_saved: usize,
    pub errors: usize,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
