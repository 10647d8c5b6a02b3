//! Idempotent schema creation.
//!
//! Macro fields are plain numeric columns. Nutrition variants and shopping
//! lists are stored as JSON text because they are always read and written
//! whole. `recipes.name_key` holds the dedup key of the name; SQLite's
//! `lower()` only folds ASCII, so the key is computed in Rust.

use crate::error::StoreError;
use sqlx::SqlitePool;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS recipes (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        name_key TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        ingredients TEXT NOT NULL,
        instructions TEXT NOT NULL DEFAULT '',
        calories INTEGER NOT NULL DEFAULT 0 CHECK (calories >= 0),
        protein REAL NOT NULL DEFAULT 0 CHECK (protein >= 0),
        carbs REAL NOT NULL DEFAULT 0 CHECK (carbs >= 0),
        fat REAL NOT NULL DEFAULT 0 CHECK (fat >= 0),
        servings INTEGER,
        meal_type TEXT NOT NULL,
        alternate_meal_type TEXT,
        nutrition_variants TEXT NOT NULL DEFAULT '[]',
        image_ref TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_recipes_meal_type ON recipes(meal_type)",
    "CREATE INDEX IF NOT EXISTS idx_recipes_name_key ON recipes(name_key)",
    r#"
    CREATE TABLE IF NOT EXISTS processed_files (
        filename TEXT PRIMARY KEY,
        checksum TEXT NOT NULL,
        size INTEGER NOT NULL,
        processed_at INTEGER NOT NULL,
        recipes_extracted INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_processed_files_checksum ON processed_files(checksum)",
    r#"
    CREATE TABLE IF NOT EXISTS meal_plans (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        shopping_list TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS meal_plan_days (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plan_id TEXT NOT NULL,
        day_number INTEGER NOT NULL,
        UNIQUE(plan_id, day_number),
        FOREIGN KEY (plan_id) REFERENCES meal_plans(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS meal_plan_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        day_id INTEGER NOT NULL,
        position INTEGER NOT NULL,
        slot TEXT NOT NULL,
        recipe_id TEXT NOT NULL,
        FOREIGN KEY (day_id) REFERENCES meal_plan_days(id) ON DELETE CASCADE,
        FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_meal_plan_entries_recipe ON meal_plan_entries(recipe_id)",
];

/// Create every table and index that does not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    debug!("Schema up to date ({} statements)", SCHEMA.len());
    Ok(())
}
