//! Error types for the recipe-harvest library.
//!
//! Three error types map onto three blast radii:
//!
//! * [`HarvestError`], **fatal**: the run cannot start or a whole document
//!   cannot be read (bad configuration, missing file, not a PDF). Returned as
//!   `Err(HarvestError)` from the top-level entry points. A document-level
//!   error inside a run marks only that file as failed.
//!
//! * [`ChunkError`], **non-fatal**: one chunk of one document failed (the
//!   model answered with garbage, the provider kept timing out). Stored in
//!   [`crate::output::FileOutcome`]; the pipeline moves on to the next chunk.
//!
//! * [`StoreError`]: a single persistence operation failed. Inside a run this
//!   affects one recipe; the rest of the batch is still attempted.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// All fatal errors returned by the recipe-harvest library.
#[derive(Debug, Error)]
pub enum HarvestError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// Settings or builder validation failed. Stops the whole run.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// Reading or hashing a file failed midway.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt, or the password is missing/wrong.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// No pdfium library could be bound.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/dir/with/libpdfium or install pdfium system-wide."
    )]
    PdfiumUnavailable(String),

    // ── Provider errors ───────────────────────────────────────────────────
    /// The selected provider could not be constructed (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Storage ───────────────────────────────────────────────────────────
    /// The recipe store or ledger could not be opened or queried.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarvestError {
    /// `true` when the whole run must stop rather than skipping one file.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::InvalidConfiguration(_)
                | HarvestError::PdfiumUnavailable(_)
                | HarvestError::ProviderNotConfigured { .. }
                | HarvestError::Storage(_)
        )
    }

    /// The file this error is about, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            HarvestError::FileNotFound { path }
            | HarvestError::PermissionDenied { path }
            | HarvestError::NotAPdf { path, .. }
            | HarvestError::Io { path, .. }
            | HarvestError::CorruptPdf { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// A non-fatal error for a single chunk.
///
/// `chunk` is the 0-based chunk index within its document.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ChunkError {
    /// The response was not valid JSON of the expected shape, even after salvage.
    #[error("Chunk {chunk}: could not parse model response: {detail}")]
    ParseFailure { chunk: usize, detail: String },

    /// The provider call failed after all retries.
    #[error("Chunk {chunk}: provider call failed after {attempts} attempt(s): {detail}")]
    TransportFailure {
        chunk: usize,
        attempts: u32,
        detail: String,
    },

    /// The provider refused this particular request (400, payload too large).
    /// Sending it again would fail the same way.
    #[error("Chunk {chunk}: provider rejected the request: {detail}")]
    Rejected { chunk: usize, detail: String },

    /// The PDF slice or page images for this chunk could not be produced.
    #[error("Chunk {chunk}: could not build provider payload: {detail}")]
    PayloadFailure { chunk: usize, detail: String },
}

impl ChunkError {
    /// Parse failures and rejections are final; transport and payload
    /// failures may succeed on a later run.
    pub fn is_retryable_later(&self) -> bool {
        !matches!(
            self,
            ChunkError::ParseFailure { .. } | ChunkError::Rejected { .. }
        )
    }
}

/// A failed provider call, classified for the retry loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeout, 5xx, rate limit or network failure. Retried.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider refused this request (400, 413, 422). Not retried; the
    /// chunk is skipped.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The provider refused the credentials (401, 403, invalid key). Stops
    /// the run: every further request would be refused too.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Persistence failures from any [`crate::store`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not (de)serialise embedded document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("recipe rejected: {0}")]
    InvalidRecipe(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("malformed stored data: {0}")]
    Corrupt(String),

    #[error("could not prepare database location: {0}")]
    Io(#[from] std::io::Error),
}
