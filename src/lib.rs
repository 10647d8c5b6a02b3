//! # recipe-harvest
//!
//! Extract structured recipes from diet-plan PDFs with an LLM, keep them in a
//! local SQLite database, and build meal plans and shopping lists from them.
//!
//! ## Pipeline Overview
//!
//! ```text
//! directory of PDFs
//!  │
//!  ├─ 1. Input    scan, check %PDF magic, sha256 fingerprint
//!  ├─ 2. Ledger   skip files whose checksum was already processed
//!  ├─ 3. Pages    per-page text via pdfium (spawn_blocking)
//!  ├─ 4. Chunk    windows of ≤ max_pages_per_chunk pages
//!  ├─ 5. Extract  one provider call per chunk, sequential, with retry
//!  ├─ 6. Salvage  strict JSON parse, one repair pass
//!  ├─ 7. Merge    dedup by normalised name, map Polish meal labels
//!  └─ 8. Persist  insert recipes, then record the file in the ledger
//! ```
//!
//! Re-running over an unchanged directory makes zero provider calls. A run
//! that dies halfway resumes at the first file the ledger does not know.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recipe_harvest::{
//!     EdgequakeProvider, HarvestConfig, Harvester, PdfiumPageSource, ProviderSettings, SqliteStore,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarvestConfig::default();
//!     let settings = ProviderSettings::new("openai");
//!     let provider = EdgequakeProvider::from_name("openai", None, &config)?;
//!     let store = Arc::new(SqliteStore::open(Path::new("recipes.db")).await?);
//!
//!     let harvester = Harvester::with_store(
//!         config,
//!         settings,
//!         Arc::new(provider),
//!         Arc::new(PdfiumPageSource::from_env()),
//!         store,
//!     );
//!     let summary = harvester.run_dir(Path::new("diet-plans")).await?;
//!     eprintln!("{} recipes saved, {} errors", summary.recipes_saved, summary.errors);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `recipe-harvest` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! recipe-harvest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod decode;
pub mod error;
pub mod harvest;
pub mod merge;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod planner;
pub mod progress;
pub mod prompts;
pub mod settings;
pub mod shopping;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{select_provider, HarvestConfig, HarvestConfigBuilder, ProviderSettings};
pub use error::{ChunkError, HarvestError, ProviderError, StoreError};
pub use harvest::Harvester;
pub use merge::{merge, MealTypeResolver, MergeReport};
pub use model::{
    CandidateRecipe, Chunk, ExtractionRecord, MealType, NewRecipe, NutritionVariant,
    ProcessedFileRecord, Recipe, SourceDocument,
};
pub use output::{FileOutcome, FileStatus, ProcessingStatus, RunSummary};
pub use pipeline::llm::{EdgequakeProvider, ExtractionProvider, ProviderRequest};
pub use pipeline::pages::{PageSource, PdfiumPageSource};
pub use planner::{generate_plan, MealPlan, MealPlanDay, MealPlanEntry, MealPlanSummary, PlanOutcome, PlanRequest};
pub use progress::{HarvestProgressCallback, NoopProgressCallback, ProgressCallback, StatusTracker};
pub use settings::Settings;
pub use shopping::{build_shopping_list, Category, ShoppingListItem};
pub use store::{InMemoryStore, MealPlanStore, ProcessingLedger, RecipeStore, SqliteStore, Store};
