//! Page-window chunker.
//!
//! Splits a document's per-page text into consecutive windows of at most
//! `max_pages_per_chunk` pages. A page is never split; the last window may be
//! shorter. Chunks borrow the page texts and are produced lazily.

use crate::error::HarvestError;
use crate::model::Chunk;
use std::iter::{Enumerate, FusedIterator};
use std::slice;

/// Lazy sequence of [`Chunk`]s over a page list.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    inner: Enumerate<slice::Chunks<'a, String>>,
    size: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(index, pages)| Chunk {
            index,
            first_page: index * self.size,
            pages,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Chunks<'_> {}
impl FusedIterator for Chunks<'_> {}

/// Split `pages` into windows of at most `max_pages_per_chunk` pages.
///
/// Fails with [`HarvestError::InvalidConfiguration`] when `max_pages_per_chunk` is 0.
/// An empty page list yields no chunks.
pub fn chunk(pages: &[String], max_pages_per_chunk: usize) -> Result<Chunks<'_>, HarvestError> {
    if max_pages_per_chunk == 0 {
        return Err(HarvestError::InvalidConfiguration(
            "max pages per chunk must be ≥ 1".into(),
        ));
    }
    Ok(Chunks {
        inner: pages.chunks(max_pages_per_chunk).enumerate(),
        size: max_pages_per_chunk,
    })
}
