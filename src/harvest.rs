//! Harvest orchestration: documents in, recipes and ledger rows out.
//!
//! A [`Harvester`] walks its documents one at a time. For every document it
//! consults the ledger, reads the page text, cuts it into chunks, asks the
//! provider about each chunk in turn, merges the answers and persists the
//! result. Nothing runs concurrently: one provider call is in flight at most.
//!
//! A document whose chunks all reached the provider is `Processed`: its
//! recipes are persisted and the ledger records it. A chunk the provider
//! rejected outright, or answered with garbage, is skipped. If any chunk could
//! not be sent (transport failure after retries, payload failure) the
//! document is `Incomplete`. Nothing of it is persisted and the ledger is left
//! alone, so the next run retries the whole document without inserting
//! duplicates. Refused credentials stop the run.
//!
//! A recipe whose name is already in the store (from an earlier week's plan,
//! say) is not inserted again; its stored row only gains the fields it was
//! missing.

use crate::config::{HarvestConfig, ProviderSettings};
use crate::error::{ChunkError, HarvestError, StoreError};
use crate::merge::{self, MealTypeResolver};
use crate::model::{Chunk, ExtractionRecord, NewRecipe, SourceDocument};
use crate::output::{FileOutcome, FileStatus, RunSummary};
use crate::pipeline::llm::{self, ExtractionProvider, ProviderRequest};
use crate::pipeline::pages::PageSource;
use crate::pipeline::{chunker, encode, input};
use crate::progress::{HarvestProgressCallback, StatusTracker};
use crate::prompts;
use crate::store::{ProcessingLedger, RecipeStore, Store};
use edgequake_llm::ImageData;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Runs the extraction pipeline over a set of documents.
pub struct Harvester {
    config: HarvestConfig,
    provider_settings: ProviderSettings,
    provider: Arc<dyn ExtractionProvider>,
    pages: Arc<dyn PageSource>,
    recipes: Arc<dyn RecipeStore>,
    ledger: Arc<dyn ProcessingLedger>,
    status: Arc<StatusTracker>,
    resolver: MealTypeResolver,
    instruction: String,
}

impl Harvester {
    /// Wire a harvester from its parts. Recipes and ledger may live in
    /// different stores.
    pub fn new(
        config: HarvestConfig,
        provider_settings: ProviderSettings,
        provider: Arc<dyn ExtractionProvider>,
        pages: Arc<dyn PageSource>,
        recipes: Arc<dyn RecipeStore>,
        ledger: Arc<dyn ProcessingLedger>,
    ) -> Self {
        let resolver = MealTypeResolver::new(config.default_meal_type);
        let instruction = prompts::extraction_instruction(config.system_prompt.as_deref());
        Self {
            config,
            provider_settings,
            provider,
            pages,
            recipes,
            ledger,
            status: Arc::new(StatusTracker::new()),
            resolver,
            instruction,
        }
    }

    /// Same as [`Harvester::new`] with one backend serving recipes and ledger.
    pub fn with_store<S>(
        config: HarvestConfig,
        provider_settings: ProviderSettings,
        provider: Arc<dyn ExtractionProvider>,
        pages: Arc<dyn PageSource>,
        store: Arc<S>,
    ) -> Self
    where
        S: Store + 'static,
    {
        let recipes: Arc<dyn RecipeStore> = store.clone();
        let ledger: Arc<dyn ProcessingLedger> = store;
        Self::new(config, provider_settings, provider, pages, recipes, ledger)
    }

    /// Share an existing tracker, e.g. one a UI is already polling.
    pub fn with_status(mut self, status: Arc<StatusTracker>) -> Self {
        self.status = status;
        self
    }

    /// The tracker this harvester reports to. Poll it or cancel through it.
    pub fn status(&self) -> Arc<StatusTracker> {
        Arc::clone(&self.status)
    }

    fn callback(&self) -> Option<&dyn HarvestProgressCallback> {
        self.config.progress_callback.as_deref()
    }

    /// Discover every PDF under `dir` and harvest it.
    ///
    /// Files that fail validation (not a PDF, unreadable) are reported as
    /// failed outcomes; the rest of the directory is still processed.
    pub async fn run_dir(&self, dir: &Path) -> Result<RunSummary, HarvestError> {
        let (docs, rejected) = input::discover(dir)?;
        let rejected = rejected
            .into_iter()
            .map(|e| {
                let name = e
                    .path()
                    .map(|p| input::ledger_name(dir, p))
                    .unwrap_or_else(|| dir.display().to_string());
                failed_outcome(name, &e)
            })
            .collect();
        self.run_inner(&docs, rejected).await
    }

    /// Harvest `docs` in order.
    ///
    /// Returns `Err` only for errors that make further work pointless: invalid
    /// configuration, no pdfium library, an unusable store. Everything else is
    /// reported in the [`RunSummary`].
    pub async fn run(&self, docs: &[SourceDocument]) -> Result<RunSummary, HarvestError> {
        self.run_inner(docs, Vec::new()).await
    }

    async fn run_inner(
        &self,
        docs: &[SourceDocument],
        rejected: Vec<FileOutcome>,
    ) -> Result<RunSummary, HarvestError> {
        let started = Instant::now();
        if self.provider_settings.max_pages_per_chunk == 0 {
            return Err(HarvestError::InvalidConfiguration(format!(
                "provider '{}': max_pages_per_chunk must be ≥ 1",
                self.provider_settings.name
            )));
        }

        let total = docs.len() + rejected.len();
        info!(
            "Starting harvest: {} file(s) with {} (≤ {} pages per chunk)",
            total,
            self.provider.name(),
            self.provider_settings.max_pages_per_chunk
        );
        self.status.start();
        if let Some(cb) = self.callback() {
            cb.on_run_start(total);
        }

        let mut summary = RunSummary::default();
        for outcome in rejected {
            self.finish_file(&mut summary, outcome);
        }

        let offset = summary.files_seen;
        let mut calls_made = 0usize;
        for (i, doc) in docs.iter().enumerate() {
            if self.status.is_cancel_requested() {
                info!("Cancelled before {}; {} file(s) left", doc.filename, docs.len() - i);
                summary.cancelled = true;
                break;
            }

            let file_num = offset + i + 1;
            let outcome = match self.process_file(doc, file_num, total, &mut calls_made).await {
                Ok(outcome) => outcome,
                Err(e) if e.is_run_fatal() => {
                    self.status.finish();
                    return Err(e);
                }
                Err(e) => {
                    warn!("{}: {}", doc.filename, e);
                    failed_outcome(doc.filename.clone(), &e)
                }
            };
            self.finish_file(&mut summary, outcome);
        }

        summary.duration = started.elapsed();
        self.status.finish();
        info!(
            "Harvest complete: {} processed, {} skipped, {} incomplete, {} failed; \
             {} recipe(s) saved from {} chunk(s), {} error(s), {:?}",
            summary.files_processed,
            summary.files_skipped,
            summary.files_incomplete,
            summary.files_failed,
            summary.recipes_saved,
            summary.chunks_attempted,
            summary.errors,
            summary.duration
        );
        if let Some(cb) = self.callback() {
            cb.on_run_complete(&summary);
        }
        Ok(summary)
    }

    fn finish_file(&self, summary: &mut RunSummary, outcome: FileOutcome) {
        if outcome.status == FileStatus::Processed {
            self.status.file_finished();
        }
        self.status.add_errors(outcome.error_count());
        if let Some(cb) = self.callback() {
            cb.on_file_complete(&outcome);
        }
        summary.record(outcome);
    }

    async fn process_file(
        &self,
        doc: &SourceDocument,
        file_num: usize,
        total_files: usize,
        calls_made: &mut usize,
    ) -> Result<FileOutcome, HarvestError> {
        // ── Step 1: Ledger check ─────────────────────────────────────────────
        if !self.ledger.should_process(doc).await? {
            info!("Skipping {}: already processed", doc.filename);
            if let Some(cb) = self.callback() {
                cb.on_file_skipped(file_num, total_files, &doc.filename);
            }
            return Ok(FileOutcome::new(doc.filename.clone(), FileStatus::Skipped));
        }

        info!("Processing {} ({}/{})", doc.filename, file_num, total_files);
        if let Some(cb) = self.callback() {
            cb.on_file_start(file_num, total_files, &doc.filename);
        }

        // ── Step 2: Page text ────────────────────────────────────────────────
        let page_texts = self.page_texts(doc).await?;
        let mut outcome = FileOutcome::new(doc.filename.clone(), FileStatus::Processed);
        outcome.pages = page_texts.len();

        // ── Step 3: Chunk and extract ────────────────────────────────────────
        let chunks = chunker::chunk(&page_texts, self.provider_settings.max_pages_per_chunk)?;
        let total_chunks = chunks.len();
        let mut records: Vec<ExtractionRecord> = Vec::with_capacity(total_chunks);

        for chunk in chunks {
            outcome.chunks_attempted += 1;
            let (record, error) = self.extract(doc, chunk, calls_made).await?;

            match error {
                Some(err) => {
                    if let Some(cb) = self.callback() {
                        cb.on_chunk_error(chunk.index, total_chunks, &err);
                    }
                    outcome.chunk_errors.push(err);
                }
                None => {
                    if let Some(cb) = self.callback() {
                        cb.on_chunk_complete(chunk.index, total_chunks, record.recipes.len());
                    }
                }
            }
            records.push(record);
        }

        // ── Step 4: Merge ────────────────────────────────────────────────────
        let report = merge::merge(&records, &self.resolver);
        outcome.recipes_extracted = report.recipes.len();
        for name in &report.dropped {
            debug!("{}: dropped candidate '{}'", doc.filename, name);
        }

        if outcome.chunk_errors.iter().any(ChunkError::is_retryable_later) {
            warn!(
                "{}: {} chunk(s) unreachable; nothing saved, file will be retried",
                doc.filename,
                outcome
                    .chunk_errors
                    .iter()
                    .filter(|e| e.is_retryable_later())
                    .count()
            );
            outcome.status = FileStatus::Incomplete;
            return Ok(outcome);
        }

        // ── Step 5: Persist ──────────────────────────────────────────────────
        for recipe in &report.recipes {
            match self.persist(recipe).await {
                Ok(Persisted::Inserted) => {
                    outcome.recipes_saved += 1;
                    self.status.add_recipes_saved(1);
                }
                Ok(Persisted::Merged) => outcome.recipes_merged += 1,
                Err(e) => {
                    warn!("{}: could not save '{}': {}", doc.filename, recipe.name, e);
                    outcome.errors.push(format!("{}: {}", recipe.name, e));
                }
            }
        }

        // ── Step 6: Ledger ───────────────────────────────────────────────────
        self.ledger
            .record_completion(doc, outcome.recipes_extracted)
            .await?;

        info!(
            "{}: {} page(s), {} chunk(s), {} recipe(s) saved, {} merged into existing",
            doc.filename,
            outcome.pages,
            outcome.chunks_attempted,
            outcome.recipes_saved,
            outcome.recipes_merged
        );
        Ok(outcome)
    }

    /// Insert a new recipe, or fold it into the stored one with the same name.
    async fn persist(&self, recipe: &NewRecipe) -> Result<Persisted, StoreError> {
        let Some(mut existing) = self.recipes.find_by_name(&recipe.name).await? else {
            let saved = self.recipes.insert(recipe).await?;
            debug!("Saved '{}' ({})", saved.name, saved.meal_type);
            return Ok(Persisted::Inserted);
        };
        if merge::absorb(&mut existing, recipe) {
            self.recipes.update(&existing).await?;
            debug!("Filled missing fields of '{}' ({})", existing.name, existing.id);
        } else {
            debug!("'{}' already stored as {}", existing.name, existing.id);
        }
        Ok(Persisted::Merged)
    }

    async fn page_texts(&self, doc: &SourceDocument) -> Result<Vec<String>, HarvestError> {
        let pages = Arc::clone(&self.pages);
        let path = doc.path.clone();
        let password = self.config.password.clone();
        tokio::task::spawn_blocking(move || pages.page_texts(&path, password.as_deref()))
            .await
            .map_err(|e| HarvestError::Internal(format!("page text task panicked: {e}")))?
    }

    /// One chunk: wait out the call delay, build the payload, call the provider.
    ///
    /// `Err` only when the provider refuses the credentials.
    async fn extract(
        &self,
        doc: &SourceDocument,
        chunk: Chunk<'_>,
        calls_made: &mut usize,
    ) -> Result<(ExtractionRecord, Option<ChunkError>), HarvestError> {
        let attachments = match self.payload(doc, &chunk).await {
            Ok(a) => a,
            Err(detail) => {
                warn!("{}: chunk {} payload failed: {}", doc.filename, chunk.index, detail);
                return Ok((
                    ExtractionRecord::empty(),
                    Some(ChunkError::PayloadFailure {
                        chunk: chunk.index,
                        detail,
                    }),
                ));
            }
        };

        let range = chunk.page_range();
        let request = ProviderRequest {
            instruction: self.instruction.clone(),
            message: prompts::chunk_message(&chunk.text(), range.start + 1, range.end),
            attachments,
        };

        if *calls_made > 0 {
            sleep(self.config.call_delay()).await;
        }
        let result =
            llm::extract_chunk(self.provider.as_ref(), chunk.index, &request, &self.config).await?;
        *calls_made += result.attempts as usize;

        debug!(
            "{}: chunk {} (pages {}-{}) → {} candidate(s) in {} attempt(s)",
            doc.filename,
            chunk.index,
            range.start + 1,
            range.end,
            result.record.recipes.len(),
            result.attempts
        );
        Ok((result.record, result.error))
    }

    /// PDF slice for providers that read PDFs, rendered pages for the rest.
    async fn payload(&self, doc: &SourceDocument, chunk: &Chunk<'_>) -> Result<Vec<ImageData>, String> {
        let pages = Arc::clone(&self.pages);
        let path = doc.path.clone();
        let password = self.config.password.clone();
        let range = chunk.page_range();
        let direct_pdf = self.provider_settings.supports_direct_pdf;
        let max_pixels = self.config.max_rendered_pixels;

        tokio::task::spawn_blocking(move || {
            if direct_pdf {
                let bytes = pages
                    .pdf_slice(&path, password.as_deref(), range)
                    .map_err(|e| e.to_string())?;
                Ok(vec![encode::encode_pdf(&bytes)])
            } else {
                let images = pages
                    .render_pages(&path, password.as_deref(), range, max_pixels)
                    .map_err(|e| e.to_string())?;
                images
                    .iter()
                    .map(|img| encode::encode_page(img).map_err(|e| format!("image encoding failed: {e}")))
                    .collect()
            }
        })
        .await
        .map_err(|e| format!("payload task panicked: {e}"))?
    }
}

enum Persisted {
    Inserted,
    /// Same name already stored; at most its missing fields were filled.
    Merged,
}

fn failed_outcome(filename: String, error: &HarvestError) -> FileOutcome {
    let mut outcome = FileOutcome::new(filename, FileStatus::Failed);
    outcome.errors.push(error.to_string());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use image::DynamicImage;
    use std::ops::Range;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct Pages(Vec<String>);

    impl PageSource for Pages {
        fn page_texts(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>, HarvestError> {
            Ok(self.0.clone())
        }

        fn pdf_slice(&self, _: &Path, _: Option<&str>, pages: Range<usize>) -> Result<Vec<u8>, HarvestError> {
            Ok(format!("%PDF slice {}..{}", pages.start, pages.end).into_bytes())
        }

        fn render_pages(
            &self,
            _: &Path,
            _: Option<&str>,
            pages: Range<usize>,
            _: u32,
        ) -> Result<Vec<DynamicImage>, HarvestError> {
            Ok(pages.map(|_| DynamicImage::new_rgb8(4, 4)).collect())
        }
    }

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl ExtractionProvider for Recorder {
        async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(r#"{"recipes": []}"#.to_string())
        }
    }

    fn doc() -> SourceDocument {
        SourceDocument {
            path: PathBuf::from("plan.pdf"),
            filename: "plan.pdf".into(),
            checksum: "abc".into(),
            size: 1,
        }
    }

    fn harvester(settings: ProviderSettings, provider: Arc<Recorder>) -> Harvester {
        let config = HarvestConfig::builder().call_delay_ms(0).retry_delay_ms(0).build().unwrap();
        let pages: Vec<String> = (1..=5).map(|i| format!("strona {i}")).collect();
        Harvester::with_store(
            config,
            settings,
            provider,
            Arc::new(Pages(pages)),
            Arc::new(InMemoryStore::new()),
        )
    }

    #[tokio::test]
    async fn image_mode_attaches_one_png_per_page() {
        let provider = Arc::new(Recorder::default());
        let mut settings = ProviderSettings::new("fake");
        settings.max_pages_per_chunk = 2;
        harvester(settings, provider.clone()).run(&[doc()]).await.unwrap();

        let requests = provider.requests.lock().unwrap();
        let counts: Vec<usize> = requests.iter().map(|r| r.attachments.len()).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert!(requests[0].attachments.iter().all(|a| a.mime_type == "image/png"));
        assert!(requests[1].message.starts_with("Pages 3-4"));
        assert!(requests[1].message.contains("--- page 3 ---"));
    }

    #[tokio::test]
    async fn direct_pdf_mode_attaches_a_slice_per_chunk() {
        let provider = Arc::new(Recorder::default());
        let mut settings = ProviderSettings::new("fake");
        settings.max_pages_per_chunk = 3;
        settings.supports_direct_pdf = true;
        harvester(settings, provider.clone()).run(&[doc()]).await.unwrap();

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        for r in requests.iter() {
            assert_eq!(r.attachments.len(), 1);
            assert_eq!(r.attachments[0].mime_type, encode::PDF_MIME);
        }
        assert!(requests[0].instruction.contains("\"recipes\""));
    }

    #[tokio::test]
    async fn zero_page_chunks_stop_the_run() {
        let provider = Arc::new(Recorder::default());
        let mut settings = ProviderSettings::new("fake");
        settings.max_pages_per_chunk = 0;
        let harvester = harvester(settings, provider.clone());
        let err = harvester.run(&[doc()]).await.unwrap_err();
        assert!(matches!(err, HarvestError::InvalidConfiguration(_)));
        assert!(provider.requests.lock().unwrap().is_empty());
        assert!(!harvester.status().snapshot().is_running);
    }
}
