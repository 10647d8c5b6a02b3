//! Input discovery: find PDFs, validate them and fingerprint their contents.
//!
//! A [`SourceDocument`] is identified by its ledger filename plus the SHA-256
//! of its bytes. We validate the PDF magic bytes (`%PDF`) here so callers get
//! a meaningful error rather than a pdfium failure deep inside the run.

use crate::error::HarvestError;
use crate::model::SourceDocument;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recursively list `*.pdf` files (case-insensitive) under `dir`, sorted by path.
///
/// Unreadable directory entries are logged and skipped.
pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>, HarvestError> {
    if !dir.exists() {
        return Err(HarvestError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() && has_pdf_extension(entry.path()) {
            found.push(entry.into_path());
        }
    }
    found.sort();
    debug!("Found {} PDF(s) under {}", found.len(), dir.display());
    Ok(found)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Scan `dir` and load every PDF found as a [`SourceDocument`].
///
/// Files that fail validation are returned separately so the run can report
/// them without stopping.
pub fn discover(dir: &Path) -> Result<(Vec<SourceDocument>, Vec<HarvestError>), HarvestError> {
    let mut docs = Vec::new();
    let mut rejected = Vec::new();
    for path in scan_dir(dir)? {
        let filename = ledger_name(dir, &path);
        match load_document(&path, filename) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                warn!("{}", e);
                rejected.push(e);
            }
        }
    }
    Ok((docs, rejected))
}

/// Ledger key for `path`: relative to `root` with `/` separators.
pub fn ledger_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Validate `path` as a PDF and compute its checksum and size.
pub fn load_document(path: &Path, filename: impl Into<String>) -> Result<SourceDocument, HarvestError> {
    let mut file = File::open(path).map_err(|e| open_error(path, e))?;

    let mut magic = [0u8; 4];
    let read = read_prefix(&mut file, &mut magic).map_err(|e| io_error(path, e))?;
    if read < 4 || &magic != b"%PDF" {
        return Err(HarvestError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    let mut hasher = Sha256::new();
    hasher.update(magic);
    let rest = io::copy(&mut file, &mut hasher).map_err(|e| io_error(path, e))?;
    let checksum = format!("{:x}", hasher.finalize());

    let doc = SourceDocument {
        path: path.to_path_buf(),
        filename: filename.into(),
        checksum,
        size: rest + 4,
    };
    debug!(
        "Loaded {} ({} bytes, sha256 {})",
        doc.filename,
        doc.size,
        &doc.checksum[..12]
    );
    Ok(doc)
}

/// Hex SHA-256 of an in-memory buffer.
pub fn checksum_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn read_prefix(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn open_error(path: &Path, e: io::Error) -> HarvestError {
    match e.kind() {
        io::ErrorKind::NotFound => HarvestError::FileNotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => HarvestError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => io_error(path, e),
    }
}

fn io_error(path: &Path, source: io::Error) -> HarvestError {
    HarvestError::Io {
        path: path.to_path_buf(),
        source,
    }
}
