//! Page access: per-page text, PDF slices and page renders via pdfium.
//!
//! The harvester only talks to the [`PageSource`] trait, so tests can feed it
//! canned page text without a pdfium library on the machine.
//!
//! ## Why blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async contexts.
//! Every method here is synchronous; the harvester runs them inside
//! `tokio::task::spawn_blocking`.

use crate::error::HarvestError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// External PDF capability consumed by the harvester.
pub trait PageSource: Send + Sync {
    /// Ordered plain text of every page.
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, HarvestError>;

    /// A standalone PDF holding only `pages` (0-based, half-open).
    fn pdf_slice(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: Range<usize>,
    ) -> Result<Vec<u8>, HarvestError>;

    /// Render `pages` with the longest edge capped at `max_pixels`.
    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: Range<usize>,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, HarvestError>;
}

/// [`PageSource`] backed by a dynamically loaded pdfium library.
///
/// The library is searched in `lib_dir` (or `PDFIUM_LIB_PATH`) first, then in
/// the system library paths.
#[derive(Debug, Clone, Default)]
pub struct PdfiumPageSource {
    lib_dir: Option<PathBuf>,
}

impl PdfiumPageSource {
    pub fn new(lib_dir: Option<PathBuf>) -> Self {
        Self { lib_dir }
    }

    /// Read `PDFIUM_LIB_PATH` from the environment.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from))
    }

    /// Fail early with [`HarvestError::PdfiumUnavailable`] if no library can be bound.
    pub fn probe(&self) -> Result<(), HarvestError> {
        self.bind().map(|_| ())
    }

    fn bind(&self) -> Result<Pdfium, HarvestError> {
        let bindings = match &self.lib_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                .or_else(|_| Pdfium::bind_to_system_library()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| HarvestError::PdfiumUnavailable(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }
}

fn open<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, HarvestError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{e:?}");
        let detail = if detail.to_lowercase().contains("password") {
            match password {
                Some(_) => "wrong password".to_string(),
                None => "password required (set a password in the extraction settings)".to_string(),
            }
        } else {
            detail
        };
        HarvestError::CorruptPdf {
            path: path.to_path_buf(),
            detail,
        }
    })
}

fn check_range(path: &Path, pages: &Range<usize>, total: usize) -> Result<(), HarvestError> {
    if pages.is_empty() || pages.end > total {
        return Err(HarvestError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!(
                "page range {}..{} outside document of {} pages",
                pages.start, pages.end, total
            ),
        });
    }
    Ok(())
}

impl PageSource for PdfiumPageSource {
    fn page_texts(&self, path: &Path, password: Option<&str>) -> Result<Vec<String>, HarvestError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, path, password)?;
        let pages = document.pages();
        let total = pages.len() as usize;
        info!("PDF loaded: {} pages", total);

        let mut texts = Vec::with_capacity(total);
        for idx in 0..total {
            let page = pages
                .get(idx as PdfPageIndex)
                .map_err(|e| HarvestError::CorruptPdf {
                    path: path.to_path_buf(),
                    detail: format!("page {}: {e:?}", idx + 1),
                })?;
            // A page without a text layer (scanned image) yields an empty string.
            let text = page.text().map(|t| t.all()).unwrap_or_default();
            debug!("Page {}: {} chars of text", idx + 1, text.len());
            texts.push(text);
        }
        Ok(texts)
    }

    fn pdf_slice(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: Range<usize>,
    ) -> Result<Vec<u8>, HarvestError> {
        let pdfium = self.bind()?;
        let source = open(&pdfium, path, password)?;
        check_range(path, &pages, source.pages().len() as usize)?;

        let slice_err = |e: PdfiumError| HarvestError::CorruptPdf {
            path: path.to_path_buf(),
            detail: format!("slicing pages {}..{}: {e:?}", pages.start, pages.end),
        };

        let mut slice = pdfium.create_new_pdf().map_err(slice_err)?;
        slice
            .pages_mut()
            .copy_page_range_from_document(
                &source,
                (pages.start as PdfPageIndex)..=((pages.end - 1) as PdfPageIndex),
                0,
            )
            .map_err(slice_err)?;
        let bytes = slice.save_to_bytes().map_err(slice_err)?;
        debug!(
            "Sliced pages {}-{} → {} bytes",
            pages.start + 1,
            pages.end,
            bytes.len()
        );
        Ok(bytes)
    }

    fn render_pages(
        &self,
        path: &Path,
        password: Option<&str>,
        pages: Range<usize>,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, HarvestError> {
        let pdfium = self.bind()?;
        let document = open(&pdfium, path, password)?;
        let all = document.pages();
        check_range(path, &pages, all.len() as usize)?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut images = Vec::with_capacity(pages.len());
        for idx in pages {
            let render_err = |e: PdfiumError| HarvestError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("rendering page {}: {e:?}", idx + 1),
            };
            let page = all.get(idx as PdfPageIndex).map_err(render_err)?;
            let image = page
                .render_with_config(&render_config)
                .map_err(render_err)?
                .as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }
        Ok(images)
    }
}
