//! Pipeline stages for recipe extraction.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ pages ──▶ chunker ──▶ encode ──▶ llm ──▶ salvage
//! (sha256)  (pdfium)  (windows)   (base64)   (AI)    (JSON)
//! ```
//!
//! 1. [`input`]   — find PDFs, check the `%PDF` magic, fingerprint contents
//! 2. [`pages`]   — per-page text, PDF slices and renders; blocking pdfium work
//! 3. [`chunker`] — split page texts into provider-sized windows
//! 4. [`encode`]  — base64-wrap PDF slices or PNG renders for the request body
//! 5. [`llm`]     — drive the provider call with retry; the only stage with
//!    network I/O
//! 6. [`salvage`] — strict JSON parse with one best-effort repair pass

pub mod chunker;
pub mod encode;
pub mod input;
pub mod llm;
pub mod pages;
pub mod salvage;
