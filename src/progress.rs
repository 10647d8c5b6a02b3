//! Run observation: push callbacks and a pollable status.
//!
//! Two ways to watch a harvest:
//!
//! * Inject an [`Arc<dyn HarvestProgressCallback>`] via
//!   [`crate::config::HarvestConfigBuilder::progress_callback`] to receive
//!   events as the pipeline moves through files and chunks.
//! * Poll a shared [`StatusTracker`] from another task or thread with
//!   [`StatusTracker::snapshot`]. The same tracker carries the cooperative
//!   cancellation flag.
//!
//! # Example
//!
//! ```rust
//! use recipe_harvest::StatusTracker;
//! use std::sync::Arc;
//!
//! let status = Arc::new(StatusTracker::new());
//! let poller = Arc::clone(&status);
//!
//! status.start();
//! status.add_recipes_saved(3);
//! status.file_finished();
//!
//! let snap = poller.snapshot();
//! assert!(snap.is_running);
//! assert_eq!(snap.recipes_saved, 3);
//! ```

use crate::error::ChunkError;
use crate::output::{FileOutcome, ProcessingStatus, RunSummary};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Called by the harvester as it processes files and chunks.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Processing is sequential, but implementations must
/// still be `Send + Sync` because the run lives on a Tokio task.
pub trait HarvestProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called after the ledger check passed and before page extraction.
    ///
    /// # Arguments
    /// * `file_num`    — 1-indexed position in the run
    /// * `total_files` — files in the run
    fn on_file_start(&self, file_num: usize, total_files: usize, filename: &str) {
        let _ = (file_num, total_files, filename);
    }

    /// Called when the ledger already holds the file's checksum.
    fn on_file_skipped(&self, file_num: usize, total_files: usize, filename: &str) {
        let _ = (file_num, total_files, filename);
    }

    /// Called when a chunk returned (possibly zero) recipes.
    ///
    /// # Arguments
    /// * `chunk`        — 0-based chunk index
    /// * `total_chunks` — chunks in this file
    /// * `recipes`      — candidates in the chunk's record
    fn on_chunk_complete(&self, chunk: usize, total_chunks: usize, recipes: usize) {
        let _ = (chunk, total_chunks, recipes);
    }

    /// Called when a chunk failed. Parse failures also arrive here.
    fn on_chunk_error(&self, chunk: usize, total_chunks: usize, error: &ChunkError) {
        let _ = (chunk, total_chunks, error);
    }

    /// Called once per file, whatever its status.
    fn on_file_complete(&self, outcome: &FileOutcome) {
        let _ = outcome;
    }

    /// Called once after the last file or after cancellation.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl HarvestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::HarvestConfig`].
pub type ProgressCallback = Arc<dyn HarvestProgressCallback>;

/// Pollable counters of a run plus its cancellation flag.
#[derive(Debug, Default)]
pub struct StatusTracker {
    running: AtomicBool,
    cancel: AtomicBool,
    files_processed: AtomicUsize,
    recipes_saved: AtomicUsize,
    errors: AtomicUsize,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters and mark the run as started.
    ///
    /// A cancel requested before this call (e.g. while the input directory
    /// was still being scanned) stays in effect.
    pub fn start(&self) {
        self.files_processed.store(0, Ordering::SeqCst);
        self.recipes_saved.store(0, Ordering::SeqCst);
        self.errors.store(0, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Mark the run as over and clear any cancel request for the next one.
    pub fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub fn file_finished(&self) {
        self.files_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_recipes_saved(&self, n: usize) {
        self.recipes_saved.fetch_add(n, Ordering::SeqCst);
    }

    pub fn add_errors(&self, n: usize) {
        self.errors.fetch_add(n, Ordering::SeqCst);
    }

    /// Ask the run to stop at the next file boundary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProcessingStatus {
        ProcessingStatus {
            is_running: self.running.load(Ordering::SeqCst),
            files_processed: self.files_processed.load(Ordering::SeqCst),
            recipes_saved: self.recipes_saved.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }
}
