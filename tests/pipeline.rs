//! Integration tests for the harvest pipeline.
//!
//! Provider and PDF access are replaced by in-process fakes, so these run
//! without network access or a pdfium library. Scenarios that matter for
//! persistence run against both store backends.

use async_trait::async_trait;
use image::DynamicImage;
use recipe_harvest::output::FileOutcome;
use recipe_harvest::{
    ChunkError, ExtractionProvider, FileStatus, HarvestConfig, HarvestError, HarvestProgressCallback,
    Harvester, InMemoryStore, MealType, PageSource, ProcessingLedger, ProviderError,
    ProviderRequest, ProviderSettings, RecipeStore, SourceDocument, SqliteStore, StatusTracker,
    Store,
};
use serde_json::json;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Canned page text per document path.
#[derive(Default)]
struct FakePages {
    docs: HashMap<PathBuf, Vec<String>>,
}

impl FakePages {
    fn with(mut self, path: impl Into<PathBuf>, pages: &[&str]) -> Self {
        self.docs
            .insert(path.into(), pages.iter().map(|p| p.to_string()).collect());
        self
    }

    fn lookup(&self, path: &Path) -> Result<&Vec<String>, HarvestError> {
        self.docs.get(path).ok_or_else(|| HarvestError::CorruptPdf {
            path: path.to_path_buf(),
            detail: "no such fixture".into(),
        })
    }
}

impl PageSource for FakePages {
    fn page_texts(&self, path: &Path, _: Option<&str>) -> Result<Vec<String>, HarvestError> {
        self.lookup(path).cloned()
    }

    fn pdf_slice(&self, path: &Path, _: Option<&str>, pages: Range<usize>) -> Result<Vec<u8>, HarvestError> {
        self.lookup(path)?;
        Ok(format!("%PDF-1.7 pages {pages:?}").into_bytes())
    }

    fn render_pages(
        &self,
        path: &Path,
        _: Option<&str>,
        pages: Range<usize>,
        _: u32,
    ) -> Result<Vec<DynamicImage>, HarvestError> {
        self.lookup(path)?;
        Ok(pages.map(|_| DynamicImage::new_rgb8(2, 2)).collect())
    }
}

type Responder = dyn Fn(&ProviderRequest) -> Result<String, ProviderError> + Send + Sync;

/// Provider answering from a closure and recording every request.
struct FakeProvider {
    respond: Box<Responder>,
    calls: AtomicUsize,
    messages: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new(respond: impl Fn(&ProviderRequest) -> Result<String, ProviderError> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            messages: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionProvider for FakeProvider {
    async fn invoke(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push(request.message.clone());
        (self.respond)(request)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Answer with one recipe per `Przepis: <name>` line found in the chunk text.
fn recipes_from_text(request: &ProviderRequest) -> Result<String, ProviderError> {
    let recipes: Vec<_> = request
        .message
        .lines()
        .filter_map(|l| l.strip_prefix("Przepis: "))
        .map(|name| {
            json!({
                "name": name,
                "ingredients": ["Płatki owsiane 50 g", "Mleko 200 ml"],
                "calories": "320",
                "protein": "11,5",
                "mealType": "Śniadanie"
            })
        })
        .collect();
    Ok(json!({ "recipes": recipes }).to_string())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn doc(name: &str) -> SourceDocument {
    SourceDocument {
        path: PathBuf::from(name),
        filename: name.to_string(),
        checksum: format!("sha-{name}"),
        size: 100,
    }
}

fn config() -> HarvestConfig {
    HarvestConfig::builder()
        .max_retries(2)
        .retry_delay_ms(0)
        .call_delay_ms(0)
        .build()
        .unwrap()
}

fn provider_settings(max_pages: usize) -> ProviderSettings {
    let mut settings = ProviderSettings::new("fake");
    settings.max_pages_per_chunk = max_pages;
    settings
}

fn harvester<S: Store + 'static>(
    store: &Arc<S>,
    provider: &Arc<FakeProvider>,
    pages: FakePages,
    max_pages: usize,
) -> Harvester {
    Harvester::with_store(
        config(),
        provider_settings(max_pages),
        provider.clone(),
        Arc::new(pages),
        store.clone(),
    )
}

fn seven_pages() -> FakePages {
    FakePages::default().with(
        "plan.pdf",
        &[
            "Przepis: Owsianka",
            "Składniki...",
            "Przepis: Jaglanka",
            "Przepis: Koktajl",
            "",
            "Przepis: Omlet",
            "Przepis: Kanapki",
        ],
    )
}

// ── Chunking and extraction ─────────────────────────────────────────────────

#[tokio::test]
async fn seven_pages_three_per_chunk_make_three_calls() {
    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(recipes_from_text);
    let summary = harvester(&store, &provider, seven_pages(), 3)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();

    let messages = provider.messages();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("Pages 1-3"), "{}", messages[0]);
    assert!(messages[1].starts_with("Pages 4-6"), "{}", messages[1]);
    assert!(messages[2].starts_with("Pages 7-7"), "{}", messages[2]);
    assert!(messages[2].contains("--- page 7 ---"));

    assert_eq!(summary.chunks_attempted, 3);
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.recipes_saved, 5);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.files[0].pages, 7);
}

#[tokio::test]
async fn decoded_fields_reach_the_store() {
    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(recipes_from_text);
    harvester(&store, &provider, seven_pages(), 10)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();

    let recipes = store.list_by_meal_type(Some(MealType::Breakfast)).await.unwrap();
    assert_eq!(recipes.len(), 5);
    let first = &recipes[0];
    assert_eq!(first.name, "Owsianka");
    assert_eq!(first.calories, 320);
    assert!((first.protein - 11.5).abs() < 1e-9);
    assert_eq!(first.ingredients, "Płatki owsiane 50 g\nMleko 200 ml");
    assert_eq!(first.fat, 0.0);
}

async fn dedup_across_chunks<S: Store + 'static>(store: Arc<S>) {
    let pages = FakePages::default().with("a.pdf", &["pierwsza", "druga"]);
    let provider = FakeProvider::new(|request| {
        let body = if request.message.contains("pierwsza") {
            json!({ "recipes": [{
                "name": "Owsianka z jabłkiem",
                "ingredients": ["Płatki owsiane 40 g", "Jabłko 1 szt"],
                "mealType": "Sniadanie"
            }]})
        } else {
            json!({ "recipes": [
                { "name": "  owsianka Z   JABŁKIEM ", "calories": "350.5", "fat": 6,
                  "ingredients": ["ignored"], "mealType": "Kolacja" },
                { "name": "Kisiel", "ingredients": ["Kisiel 1 opak"], "mealType": "Deser" }
            ]})
        };
        Ok(body.to_string())
    });

    let summary = harvester(&store, &provider, pages, 1)
        .run(&[doc("a.pdf")])
        .await
        .unwrap();
    assert_eq!(provider.calls(), 2);
    assert_eq!(summary.recipes_extracted, 2);
    assert_eq!(summary.recipes_saved, 2);

    let all = store.list_by_meal_type(None).await.unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Owsianka z jabłkiem", "Kisiel"]);

    let oats = &all[0];
    assert_eq!(oats.calories, 351);
    assert_eq!(oats.fat, 6.0);
    assert_eq!(oats.ingredients, "Płatki owsiane 40 g\nJabłko 1 szt");
    assert_eq!(oats.meal_type, MealType::Breakfast);
    assert_eq!(all[1].meal_type, MealType::Dessert);

    let records = store.list_processed().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].filename, "a.pdf");
    assert_eq!(records[0].recipes_extracted, 2);
}

#[tokio::test]
async fn dedup_across_chunks_in_memory() {
    dedup_across_chunks(Arc::new(InMemoryStore::new())).await;
}

#[tokio::test]
async fn dedup_across_chunks_sqlite() {
    dedup_across_chunks(Arc::new(SqliteStore::open_in_memory().await.unwrap())).await;
}

#[tokio::test]
async fn unknown_label_uses_configured_default() {
    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(|_| {
        Ok(r#"{"recipes":[{"name":"Sałatka","ingredients":"Rukola\nPomidor","mealType":"Przekąska"}]}"#.into())
    });
    let config = HarvestConfig::builder()
        .call_delay_ms(0)
        .default_meal_type(MealType::Dinner)
        .build()
        .unwrap();
    let harvester = Harvester::with_store(
        config,
        provider_settings(5),
        provider.clone(),
        Arc::new(FakePages::default().with("s.pdf", &["x"])),
        store.clone(),
    );
    harvester.run(&[doc("s.pdf")]).await.unwrap();

    let saved = store.list_by_meal_type(None).await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].meal_type, MealType::Dinner);
    assert_eq!(saved[0].ingredients, "Rukola\nPomidor");
}

// ── Ledger: idempotence and resumability ─────────────────────────────────────

async fn rerun_is_idempotent<S: Store + 'static>(store: Arc<S>) {
    let provider = FakeProvider::new(recipes_from_text);
    let first = harvester(&store, &provider, seven_pages(), 3)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();
    assert_eq!(first.files_processed, 1);
    let calls = provider.calls();
    let count = store.count().await.unwrap();

    let second = harvester(&store, &provider, seven_pages(), 3)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();
    assert_eq!(second.files_skipped, 1);
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.chunks_attempted, 0);
    assert_eq!(provider.calls(), calls, "no provider calls on rerun");
    assert_eq!(store.count().await.unwrap(), count, "no duplicate recipes");
    assert_eq!(second.files[0].status, FileStatus::Skipped);
}

#[tokio::test]
async fn rerun_is_idempotent_in_memory() {
    rerun_is_idempotent(Arc::new(InMemoryStore::new())).await;
}

#[tokio::test]
async fn rerun_is_idempotent_sqlite() {
    rerun_is_idempotent(Arc::new(SqliteStore::open_in_memory().await.unwrap())).await;
}

#[tokio::test]
async fn resumes_at_first_unprocessed_file() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    store.record_completion(&doc("a.pdf"), 4).await.unwrap();

    let pages = FakePages::default()
        .with("a.pdf", &["Przepis: Z pliku A"])
        .with("b.pdf", &["Przepis: Z pliku B"]);
    let provider = FakeProvider::new(recipes_from_text);
    let summary = harvester(&store, &provider, pages, 10)
        .run(&[doc("a.pdf"), doc("b.pdf")])
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert!(provider.messages()[0].contains("Z pliku B"));
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_processed, 1);

    let names: Vec<String> = store
        .list_by_meal_type(None)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["Z pliku B"]);
    assert_eq!(store.list_processed().await.unwrap().len(), 2);
}

#[tokio::test]
async fn changed_file_is_processed_again() {
    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(recipes_from_text);
    let pages = || FakePages::default().with("plan.pdf", &["Przepis: Owsianka"]);

    harvester(&store, &provider, pages(), 5)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();

    let mut edited = doc("plan.pdf");
    edited.checksum = "sha-edited".into();
    let summary = harvester(&store, &provider, pages(), 5)
        .run(&[edited])
        .await
        .unwrap();
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.recipes_saved, 0);
    assert_eq!(summary.recipes_merged, 1);
    assert_eq!(store.count().await.unwrap(), 1);

    let records = store.list_processed().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].checksum, "sha-edited");
}

async fn repeated_recipe_across_files<S: Store + 'static>(store: Arc<S>) {
    let pages = FakePages::default()
        .with("week1.pdf", &["tydzień 1"])
        .with("week2.pdf", &["tydzień 2"]);
    let provider = FakeProvider::new(|request| {
        let body = if request.message.contains("tydzień 1") {
            json!({ "recipes": [
                { "name": "Owsianka", "ingredients": ["Płatki owsiane 50 g"], "mealType": "Śniadanie" },
                { "name": "Leczo", "ingredients": ["Papryka 2 szt"], "mealType": "Obiad" }
            ]})
        } else {
            json!({ "recipes": [{
                "name": "owsianka ",
                "ingredients": ["Płatki jaglane 50 g"],
                "calories": "310",
                "instructions": "Ugotuj na mleku.",
                "mealType": "Kolacja"
            }]})
        };
        Ok(body.to_string())
    });

    let summary = harvester(&store, &provider, pages, 5)
        .run(&[doc("week1.pdf"), doc("week2.pdf")])
        .await
        .unwrap();

    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.recipes_extracted, 3);
    assert_eq!(summary.recipes_saved, 2);
    assert_eq!(summary.recipes_merged, 1);
    assert_eq!(store.count().await.unwrap(), 2);

    let oats = store.find_by_name("OWSIANKA").await.unwrap().unwrap();
    assert_eq!(oats.name, "Owsianka");
    assert_eq!(oats.ingredients, "Płatki owsiane 50 g", "populated field kept");
    assert_eq!(oats.meal_type, MealType::Breakfast);
    assert_eq!(oats.calories, 310, "missing field filled");
    assert_eq!(oats.instructions, "Ugotuj na mleku.");

    let records = store.list_processed().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].filename, "week2.pdf");
    assert_eq!(records[1].recipes_extracted, 1);
}

#[tokio::test]
async fn repeated_recipe_across_files_in_memory() {
    repeated_recipe_across_files(Arc::new(InMemoryStore::new())).await;
}

#[tokio::test]
async fn repeated_recipe_across_files_sqlite() {
    repeated_recipe_across_files(Arc::new(SqliteStore::open_in_memory().await.unwrap())).await;
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transport_failure_leaves_file_incomplete_and_retryable() {
    let store = Arc::new(InMemoryStore::new());
    let pages = || {
        FakePages::default().with(
            "plan.pdf",
            &["Przepis: Owsianka", "Przepis: Omlet", "Przepis: Zupa"],
        )
    };
    let flaky = FakeProvider::new(|request| {
        if request.message.contains("Omlet") {
            Err(ProviderError::Transport("HTTP 503 Service Unavailable".into()))
        } else {
            recipes_from_text(request)
        }
    });

    let h = harvester(&store, &flaky, pages(), 1);
    let summary = h.run(&[doc("plan.pdf")]).await.unwrap();

    // Chunk 0 once, chunk 1 three times (2 retries), chunk 2 once.
    assert_eq!(flaky.calls(), 5);
    assert_eq!(summary.files_incomplete, 1);
    assert_eq!(summary.recipes_saved, 0);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.files[0].status, FileStatus::Incomplete);
    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.should_process(&doc("plan.pdf")).await.unwrap());

    let status = h.status().snapshot();
    assert!(!status.is_running);
    assert_eq!(status.errors, 1);
    assert_eq!(status.files_processed, 0);

    // Provider back: the whole file goes through, no duplicates.
    let healthy = FakeProvider::new(recipes_from_text);
    let summary = harvester(&store, &healthy, pages(), 1)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();
    assert_eq!(summary.files_processed, 1);
    assert_eq!(store.count().await.unwrap(), 3);
}

#[tokio::test]
async fn rejected_chunk_is_skipped_and_file_completes() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let pages = || FakePages::default().with("plan.pdf", &["Przepis: Omlet", "Przepis: Owsianka"]);
    let provider = FakeProvider::new(|request| {
        if request.message.contains("Omlet") {
            Err(ProviderError::Rejected("HTTP 400 Bad Request: payload too large".into()))
        } else {
            recipes_from_text(request)
        }
    });

    let first = harvester(&store, &provider, pages(), 1)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();
    assert_eq!(provider.calls(), 2, "rejected chunk is not retried");
    assert_eq!(first.files_processed, 1);
    assert_eq!(first.recipes_saved, 1);
    assert_eq!(first.errors, 1);
    assert!(matches!(
        first.files[0].chunk_errors[0],
        ChunkError::Rejected { chunk: 0, .. }
    ));

    for _ in 0..2 {
        let again = harvester(&store, &provider, pages(), 1)
            .run(&[doc("plan.pdf")])
            .await
            .unwrap();
        assert_eq!(again.files_skipped, 1);
    }
    assert_eq!(provider.calls(), 2, "later runs make no calls");
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn refused_credentials_stop_the_run() {
    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(|_| Err(ProviderError::Unauthorized("HTTP 401 invalid api key".into())));
    let pages = FakePages::default()
        .with("a.pdf", &["Przepis: A"])
        .with("b.pdf", &["Przepis: B"]);
    let h = harvester(&store, &provider, pages, 5);

    let err = h.run(&[doc("a.pdf"), doc("b.pdf")]).await.unwrap_err();
    assert!(matches!(err, HarvestError::ProviderNotConfigured { .. }));
    assert_eq!(provider.calls(), 1, "no call spent on the second file");
    assert!(!h.status().snapshot().is_running);
    assert!(store.list_processed().await.unwrap().is_empty());
}

#[tokio::test]
async fn salvage_and_parse_failures_do_not_block_completion() {
    let store = Arc::new(InMemoryStore::new());
    let pages = FakePages::default().with("plan.pdf", &["fenced", "garbage", "bare"]);
    let provider = FakeProvider::new(|request| {
        let reply = if request.message.contains("fenced") {
            "Oto przepisy:\n```json\n{\"recipes\": [{\"name\": \"Leczo\", \"ingredients\": [\"Papryka 2 szt\"], \"mealType\": \"Obiad\"}]}\n```\nSmacznego!"
        } else if request.message.contains("garbage") {
            "I could not find any recipes, sorry."
        } else {
            "[{\"name\": \"Lemoniada\", \"ingredients\": [\"Cytryna 1 szt\", \"Woda 500 ml\"], \"mealType\": \"Napój\"}, 42]"
        };
        Ok(reply.to_string())
    });

    let summary = harvester(&store, &provider, pages, 1)
        .run(&[doc("plan.pdf")])
        .await
        .unwrap();

    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.recipes_saved, 2);
    assert_eq!(summary.errors, 1, "one parse failure");
    assert!(!store.should_process(&doc("plan.pdf")).await.unwrap());

    let lunch = store.list_by_meal_type(Some(MealType::Lunch)).await.unwrap();
    assert_eq!(lunch[0].name, "Leczo");
    let drinks = store.list_by_meal_type(Some(MealType::Drink)).await.unwrap();
    assert_eq!(drinks[0].name, "Lemoniada");
}

#[tokio::test]
async fn unreadable_document_fails_alone() {
    let store = Arc::new(InMemoryStore::new());
    let pages = FakePages::default().with("good.pdf", &["Przepis: Owsianka"]);
    let provider = FakeProvider::new(recipes_from_text);
    let summary = harvester(&store, &provider, pages, 5)
        .run(&[doc("broken.pdf"), doc("good.pdf")])
        .await
        .unwrap();

    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.files[0].status, FileStatus::Failed);
    assert!(summary.files[0].errors[0].contains("no such fixture"));
    assert_eq!(store.count().await.unwrap(), 1);
}

// ── Directory runs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn run_dir_reports_non_pdfs_and_keys_by_relative_path() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join("week1")).unwrap();
    let good = dir.path().join("week1").join("plan.PDF");
    std::fs::write(&good, b"%PDF-1.4\nfake body").unwrap();
    std::fs::write(dir.path().join("notes.pdf"), b"PK\x03\x04zip").unwrap();

    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(recipes_from_text);
    let pages = FakePages::default().with(good.clone(), &["Przepis: Owsianka"]);
    let summary = harvester(&store, &provider, pages, 5)
        .run_dir(dir.path())
        .await
        .unwrap();

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.files_processed, 1);
    let failed = summary
        .files
        .iter()
        .find(|f| f.status == FileStatus::Failed)
        .unwrap();
    assert_eq!(failed.filename, "notes.pdf");

    let records = store.list_processed().await.unwrap();
    assert_eq!(records[0].filename, "week1/plan.PDF");
    assert_eq!(records[0].size, 18);
}

#[tokio::test]
async fn missing_directory_is_fatal() {
    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(recipes_from_text);
    let err = harvester(&store, &provider, FakePages::default(), 5)
        .run_dir(Path::new("/no/such/dir"))
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::FileNotFound { .. }));
}

// ── Status and cancellation ──────────────────────────────────────────────────

/// Requests cancellation once the first file completes.
struct CancelAfterFirst {
    status: Arc<StatusTracker>,
    completed: Mutex<Vec<String>>,
}

impl HarvestProgressCallback for CancelAfterFirst {
    fn on_file_complete(&self, outcome: &FileOutcome) {
        self.completed.lock().unwrap().push(outcome.filename.clone());
        self.status.request_cancel();
    }
}

#[tokio::test]
async fn cancellation_stops_between_files() {
    let store = Arc::new(InMemoryStore::new());
    let status = Arc::new(StatusTracker::new());
    let callback = Arc::new(CancelAfterFirst {
        status: status.clone(),
        completed: Mutex::new(Vec::new()),
    });
    let config = HarvestConfig::builder()
        .call_delay_ms(0)
        .progress_callback(callback.clone())
        .build()
        .unwrap();

    let pages = FakePages::default()
        .with("a.pdf", &["Przepis: A1", "Przepis: A2"])
        .with("b.pdf", &["Przepis: B1"]);
    let provider = FakeProvider::new(recipes_from_text);
    let harvester = Harvester::with_store(
        config,
        provider_settings(1),
        provider.clone(),
        Arc::new(pages),
        store.clone(),
    )
    .with_status(status.clone());

    let summary = harvester.run(&[doc("a.pdf"), doc("b.pdf")]).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.files_seen, 1);
    // Both chunks of the first file ran; cancellation does not cut a file short.
    assert_eq!(provider.calls(), 2);
    assert_eq!(*callback.completed.lock().unwrap(), vec!["a.pdf".to_string()]);
    assert!(store.should_process(&doc("b.pdf")).await.unwrap());

    let snapshot = status.snapshot();
    assert!(!snapshot.is_running);
    assert_eq!(snapshot.files_processed, 1);
    assert_eq!(snapshot.recipes_saved, 2);
    assert_eq!(snapshot.errors, 0);
}

#[tokio::test]
async fn cancel_before_start_is_honoured_once() {
    let store = Arc::new(InMemoryStore::new());
    let provider = FakeProvider::new(recipes_from_text);
    let pages = || FakePages::default().with("a.pdf", &["Przepis: A"]);
    let status = Arc::new(StatusTracker::new());

    // E.g. Ctrl-C while the input directory is still being hashed.
    status.request_cancel();
    let summary = harvester(&store, &provider, pages(), 5)
        .with_status(status.clone())
        .run(&[doc("a.pdf")])
        .await
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.files_seen, 0);
    assert_eq!(provider.calls(), 0);
    assert!(!status.is_cancel_requested());

    let summary = harvester(&store, &provider, pages(), 5)
        .with_status(status.clone())
        .run(&[doc("a.pdf")])
        .await
        .unwrap();
    assert!(!summary.cancelled);
    assert_eq!(summary.files_processed, 1);
}

#[tokio::test]
async fn status_is_running_during_provider_calls() {
    let status = Arc::new(StatusTracker::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (status_in, seen_in) = (status.clone(), seen.clone());
    let provider = FakeProvider::new(move |request| {
        seen_in.lock().unwrap().push(status_in.snapshot());
        recipes_from_text(request)
    });

    let store = Arc::new(InMemoryStore::new());
    let pages = FakePages::default()
        .with("a.pdf", &["Przepis: A"])
        .with("b.pdf", &["Przepis: B"]);
    harvester(&store, &provider, pages, 5)
        .with_status(status.clone())
        .run(&[doc("a.pdf"), doc("b.pdf")])
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.iter().all(|s| s.is_running));
    assert_eq!(seen[0].files_processed, 0);
    assert_eq!(seen[1].files_processed, 1);
    assert_eq!(seen[1].recipes_saved, 1);
    assert_eq!(status.snapshot().files_processed, 2);
}
