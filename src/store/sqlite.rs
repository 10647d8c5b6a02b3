//! SQLite-backed store.
//!
//! Wraps a [`SqlitePool`] and translates every trait method into one or more
//! SQL statements against the schema in [`super::migrate`]. Timestamps are
//! stored as Unix milliseconds.

use super::{migrate, now_millis, validated, MealPlanStore, ProcessingLedger, RecipeStore};
use crate::error::StoreError;
use crate::merge::dedup_key;
use crate::model::{
    MealType, NewRecipe, NutritionVariant, ProcessedFileRecord, Recipe, SourceDocument,
};
use crate::planner::{MealPlan, MealPlanDay, MealPlanEntry, MealPlanSummary};
use crate::shopping::ShoppingListItem;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// SQLite implementation of [`RecipeStore`], [`ProcessingLedger`] and [`MealPlanStore`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. The schema must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database file and bring the schema up to date.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrate::run_migrations(&pool).await?;
        debug!("Opened recipe database at {}", path.display());
        Ok(Self { pool })
    }

    /// A private in-memory database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        // One connection that never expires: the database lives as long as it does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {ms}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("bad id '{s}': {e}")))
}

fn parse_meal_type(s: &str) -> Result<MealType, StoreError> {
    s.parse().map_err(StoreError::Corrupt)
}

fn recipe_from_row(row: &SqliteRow) -> Result<Recipe, StoreError> {
    let id: String = row.try_get("id")?;
    let meal_type: String = row.try_get("meal_type")?;
    let alternate: Option<String> = row.try_get("alternate_meal_type")?;
    let variants: String = row.try_get("nutrition_variants")?;
    let variants: Vec<NutritionVariant> = serde_json::from_str(&variants)?;

    Ok(Recipe {
        id: parse_uuid(&id)?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        ingredients: row.try_get("ingredients")?,
        instructions: row.try_get("instructions")?,
        calories: row.try_get("calories")?,
        protein: row.try_get("protein")?,
        carbs: row.try_get("carbs")?,
        fat: row.try_get("fat")?,
        servings: row.try_get("servings")?,
        meal_type: parse_meal_type(&meal_type)?,
        alternate_meal_type: alternate.as_deref().map(parse_meal_type).transpose()?,
        nutrition_variants: variants,
        image_ref: row.try_get("image_ref")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}

fn ledger_from_row(row: &SqliteRow) -> Result<ProcessedFileRecord, StoreError> {
    let size: i64 = row.try_get("size")?;
    let extracted: i64 = row.try_get("recipes_extracted")?;
    Ok(ProcessedFileRecord {
        filename: row.try_get("filename")?,
        checksum: row.try_get("checksum")?,
        size: u64::try_from(size).map_err(|_| StoreError::Corrupt(format!("negative size {size}")))?,
        processed_at: from_millis(row.try_get("processed_at")?)?,
        recipes_extracted: usize::try_from(extracted)
            .map_err(|_| StoreError::Corrupt(format!("negative recipe count {extracted}")))?,
    })
}

const RECIPE_COLUMNS: &str = "id, name, description, ingredients, instructions, calories, \
     protein, carbs, fat, servings, meal_type, alternate_meal_type, nutrition_variants, \
     image_ref, created_at";

// ── Recipes ──────────────────────────────────────────────────────────────

#[async_trait]
impl RecipeStore for SqliteStore {
    async fn insert(&self, recipe: &NewRecipe) -> Result<Recipe, StoreError> {
        validated(recipe)?;
        let stored = recipe.clone().into_recipe(Uuid::new_v4(), now_millis());
        let variants = serde_json::to_string(&stored.nutrition_variants)?;

        sqlx::query(&format!(
            "INSERT INTO recipes ({RECIPE_COLUMNS}, name_key) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(stored.id.to_string())
        .bind(&stored.name)
        .bind(&stored.description)
        .bind(&stored.ingredients)
        .bind(&stored.instructions)
        .bind(stored.calories)
        .bind(stored.protein)
        .bind(stored.carbs)
        .bind(stored.fat)
        .bind(stored.servings)
        .bind(stored.meal_type.as_str())
        .bind(stored.alternate_meal_type.map(|m| m.as_str()))
        .bind(variants)
        .bind(&stored.image_ref)
        .bind(to_millis(stored.created_at))
        .bind(dedup_key(&stored.name))
        .execute(&self.pool)
        .await?;

        Ok(stored)
    }

    async fn update(&self, recipe: &Recipe) -> Result<(), StoreError> {
        validated(&recipe.to_new())?;
        let variants = serde_json::to_string(&recipe.nutrition_variants)?;

        let result = sqlx::query(
            r#"
            UPDATE recipes SET
                name = ?, name_key = ?, description = ?, ingredients = ?, instructions = ?,
                calories = ?, protein = ?, carbs = ?, fat = ?, servings = ?,
                meal_type = ?, alternate_meal_type = ?, nutrition_variants = ?, image_ref = ?
            WHERE id = ?
            "#,
        )
        .bind(&recipe.name)
        .bind(dedup_key(&recipe.name))
        .bind(&recipe.description)
        .bind(&recipe.ingredients)
        .bind(&recipe.instructions)
        .bind(recipe.calories)
        .bind(recipe.protein)
        .bind(recipe.carbs)
        .bind(recipe.fat)
        .bind(recipe.servings)
        .bind(recipe.meal_type.as_str())
        .bind(recipe.alternate_meal_type.map(|m| m.as_str()))
        .bind(variants)
        .bind(&recipe.image_ref)
        .bind(recipe.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "recipe",
                id: recipe.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "recipe",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        let row = sqlx::query(&format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(recipe_from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Recipe>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE name_key = ? ORDER BY created_at, rowid LIMIT 1"
        ))
        .bind(dedup_key(name))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(recipe_from_row).transpose()
    }

    async fn list_by_meal_type(&self, meal_type: Option<MealType>) -> Result<Vec<Recipe>, StoreError> {
        let rows = match meal_type {
            Some(m) => {
                sqlx::query(&format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes WHERE meal_type = ? ORDER BY created_at, rowid"
                ))
                .bind(m.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY created_at, rowid"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(recipe_from_row).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes")
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as usize)
    }
}

// ── Ledger ───────────────────────────────────────────────────────────────

#[async_trait]
impl ProcessingLedger for SqliteStore {
    async fn should_process(&self, doc: &SourceDocument) -> Result<bool, StoreError> {
        let seen: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_files WHERE checksum = ?")
            .bind(&doc.checksum)
            .fetch_one(&self.pool)
            .await?;
        Ok(seen == 0)
    }

    async fn record_completion(
        &self,
        doc: &SourceDocument,
        recipes_extracted: usize,
    ) -> Result<ProcessedFileRecord, StoreError> {
        let record = ProcessedFileRecord {
            filename: doc.filename.clone(),
            checksum: doc.checksum.clone(),
            size: doc.size,
            processed_at: now_millis(),
            recipes_extracted,
        };

        sqlx::query(
            r#"
            INSERT INTO processed_files (filename, checksum, size, processed_at, recipes_extracted)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                checksum = excluded.checksum,
                size = excluded.size,
                processed_at = excluded.processed_at,
                recipes_extracted = excluded.recipes_extracted
            "#,
        )
        .bind(&record.filename)
        .bind(&record.checksum)
        .bind(record.size as i64)
        .bind(to_millis(record.processed_at))
        .bind(record.recipes_extracted as i64)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_processed(&self) -> Result<Vec<ProcessedFileRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT filename, checksum, size, processed_at, recipes_extracted \
             FROM processed_files ORDER BY filename",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(ledger_from_row).collect()
    }

    async fn forget(&self, filename: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM processed_files WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Meal plans ───────────────────────────────────────────────────────────

#[async_trait]
impl MealPlanStore for SqliteStore {
    async fn save_plan(&self, plan: &MealPlan) -> Result<(), StoreError> {
        let shopping = serde_json::to_string(&plan.shopping_list)?;
        let mut tx = self.pool.begin().await?;

        // Re-saving replaces the plan; the cascade clears its old days.
        sqlx::query("DELETE FROM meal_plans WHERE id = ?")
            .bind(plan.id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO meal_plans (id, name, created_at, shopping_list) VALUES (?, ?, ?, ?)")
            .bind(plan.id.to_string())
            .bind(&plan.name)
            .bind(to_millis(plan.created_at))
            .bind(shopping)
            .execute(&mut *tx)
            .await?;

        for day in &plan.days {
            let day_id = sqlx::query("INSERT INTO meal_plan_days (plan_id, day_number) VALUES (?, ?)")
                .bind(plan.id.to_string())
                .bind(day.day_number as i64)
                .execute(&mut *tx)
                .await?
                .last_insert_rowid();

            for (position, entry) in day.entries.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO meal_plan_entries (day_id, position, slot, recipe_id) VALUES (?, ?, ?, ?)",
                )
                .bind(day_id)
                .bind(position as i64)
                .bind(entry.slot.as_str())
                .bind(entry.recipe_id.to_string())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_plan(&self, id: Uuid) -> Result<Option<MealPlan>, StoreError> {
        let Some(row) = sqlx::query("SELECT id, name, created_at, shopping_list FROM meal_plans WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let shopping: String = row.try_get("shopping_list")?;
        let mut plan = MealPlan {
            id,
            name: row.try_get("name")?,
            created_at: from_millis(row.try_get("created_at")?)?,
            days: Vec::new(),
            shopping_list: serde_json::from_str::<Vec<ShoppingListItem>>(&shopping)?,
        };

        let rows = sqlx::query(
            r#"
            SELECT d.day_number, e.slot, e.recipe_id, r.name AS recipe_name
            FROM meal_plan_days d
            LEFT JOIN meal_plan_entries e ON e.day_id = d.id
            LEFT JOIN recipes r ON r.id = e.recipe_id
            WHERE d.plan_id = ?
            ORDER BY d.day_number, e.position
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        for row in &rows {
            let day_number: i64 = row.try_get("day_number")?;
            let day_number = u32::try_from(day_number)
                .map_err(|_| StoreError::Corrupt(format!("bad day number {day_number}")))?;
            if plan.days.last().map(|d| d.day_number) != Some(day_number) {
                plan.days.push(MealPlanDay {
                    day_number,
                    entries: Vec::new(),
                });
            }

            let slot: Option<String> = row.try_get("slot")?;
            let recipe_id: Option<String> = row.try_get("recipe_id")?;
            if let (Some(slot), Some(recipe_id), Some(day)) = (slot, recipe_id, plan.days.last_mut()) {
                day.entries.push(MealPlanEntry {
                    slot: parse_meal_type(&slot)?,
                    recipe_id: parse_uuid(&recipe_id)?,
                    recipe_name: row
                        .try_get::<Option<String>, _>("recipe_name")?
                        .unwrap_or_default(),
                });
            }
        }

        Ok(Some(plan))
    }

    async fn list_plans(&self) -> Result<Vec<MealPlanSummary>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.created_at,
                (SELECT COUNT(*) FROM meal_plan_days d WHERE d.plan_id = p.id) AS days,
                (SELECT COUNT(*) FROM meal_plan_entries e
                    JOIN meal_plan_days d ON e.day_id = d.id
                    WHERE d.plan_id = p.id) AS entries
            FROM meal_plans p
            ORDER BY p.created_at DESC, p.rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let days: i64 = row.try_get("days")?;
                let entries: i64 = row.try_get("entries")?;
                Ok(MealPlanSummary {
                    id: parse_uuid(&id)?,
                    name: row.try_get("name")?,
                    created_at: from_millis(row.try_get("created_at")?)?,
                    days: days.max(0) as usize,
                    entries: entries.max(0) as usize,
                })
            })
            .collect()
    }

    async fn delete_plan(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM meal_plans WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_shopping_list(&self, plan_id: Uuid, items: &[ShoppingListItem]) -> Result<(), StoreError> {
        let json = serde_json::to_string(items)?;
        let result = sqlx::query("UPDATE meal_plans SET shopping_list = ? WHERE id = ?")
            .bind(json)
            .bind(plan_id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "meal plan",
                id: plan_id.to_string(),
            });
        }
        Ok(())
    }
}
