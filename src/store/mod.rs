//! Storage abstraction for recipes, the processing ledger and meal plans.
//!
//! Three traits split the storage surface by concern; the harvester needs
//! [`RecipeStore`] and [`ProcessingLedger`], the planner commands need
//! [`MealPlanStore`]. Both backends implement all three:
//!
//! * [`SqliteStore`]: sqlx over a SQLite file (or `sqlite::memory:`)
//! * [`InMemoryStore`]: `RwLock`ed collections for tests and embedding
//!
//! Every write is its own atomic operation. Implementations must be
//! `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod migrate;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use migrate::run_migrations;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::model::{MealType, NewRecipe, ProcessedFileRecord, Recipe, SourceDocument};
use crate::planner::{MealPlan, MealPlanSummary};
use crate::shopping::ShoppingListItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// The five recipe operations the pipeline relies on, plus lookups by id
/// and by name.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Validate, assign an id and creation time, and store.
    async fn insert(&self, recipe: &NewRecipe) -> Result<Recipe, StoreError>;

    /// Replace every field except `id` and `created_at`.
    async fn update(&self, recipe: &Recipe) -> Result<(), StoreError>;

    /// Delete a recipe and any plan entries that use it.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Recipe>, StoreError>;

    /// The earliest stored recipe with the same dedup key as `name`
    /// (see [`crate::merge::dedup_key`]).
    async fn find_by_name(&self, name: &str) -> Result<Option<Recipe>, StoreError>;

    /// Recipes in insertion order, optionally only those of one primary meal type.
    async fn list_by_meal_type(&self, meal_type: Option<MealType>) -> Result<Vec<Recipe>, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// Checksum-based record of completed documents.
#[async_trait]
pub trait ProcessingLedger: Send + Sync {
    /// `false` when any completed record carries the document's checksum.
    async fn should_process(&self, doc: &SourceDocument) -> Result<bool, StoreError>;

    /// Upsert by filename: a changed file replaces its earlier record.
    async fn record_completion(
        &self,
        doc: &SourceDocument,
        recipes_extracted: usize,
    ) -> Result<ProcessedFileRecord, StoreError>;

    /// Records ordered by filename.
    async fn list_processed(&self) -> Result<Vec<ProcessedFileRecord>, StoreError>;

    /// Drop the record so the file is processed again. `false` if there was none.
    async fn forget(&self, filename: &str) -> Result<bool, StoreError>;
}

/// Persisted meal plans. Deleting a plan removes its days and entries.
#[async_trait]
pub trait MealPlanStore: Send + Sync {
    async fn save_plan(&self, plan: &MealPlan) -> Result<(), StoreError>;

    async fn get_plan(&self, id: Uuid) -> Result<Option<MealPlan>, StoreError>;

    /// Newest first.
    async fn list_plans(&self) -> Result<Vec<MealPlanSummary>, StoreError>;

    async fn delete_plan(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Replace the plan's stored shopping list.
    async fn save_shopping_list(&self, plan_id: Uuid, items: &[ShoppingListItem]) -> Result<(), StoreError>;
}

/// Everything a full backend provides.
pub trait Store: RecipeStore + ProcessingLedger + MealPlanStore {}

impl<T> Store for T where T: RecipeStore + ProcessingLedger + MealPlanStore {}

pub(crate) fn validated(recipe: &NewRecipe) -> Result<(), StoreError> {
    recipe.validate().map_err(StoreError::InvalidRecipe)
}

/// Current time truncated to milliseconds, the precision stored on disk.
pub(crate) fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
