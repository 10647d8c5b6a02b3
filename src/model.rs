//! Domain types that flow through the extraction pipeline.
//!
//! ```text
//! SourceDocument ──▶ Chunk ──▶ ExtractionRecord ──▶ NewRecipe ──▶ Recipe
//!   (file+sha256)    (pages)    (untrusted JSON)    (merged)     (stored)
//! ```

use crate::decode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ── Source documents ─────────────────────────────────────────────────────

/// A PDF discovered at scan time. Immutable once recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub path: PathBuf,
    /// Ledger key: the file name relative to the scanned directory.
    pub filename: String,
    /// Lower-case hex SHA-256 of the file contents.
    pub checksum: String,
    pub size: u64,
}

/// One row per document that completed extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedFileRecord {
    pub filename: String,
    pub checksum: String,
    pub size: u64,
    pub processed_at: DateTime<Utc>,
    pub recipes_extracted: usize,
}

// ── Chunks ───────────────────────────────────────────────────────────────

/// A window of consecutive pages of one document. Borrowed, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// 0-based position of this chunk within its document.
    pub index: usize,
    /// 0-based index of the first page in this chunk.
    pub first_page: usize,
    pub pages: &'a [String],
}

impl Chunk<'_> {
    /// 0-based, half-open page range covered by this chunk.
    pub fn page_range(&self) -> Range<usize> {
        self.first_page..self.first_page + self.pages.len()
    }

    /// Page texts joined with 1-based page markers.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (offset, page) in self.pages.iter().enumerate() {
            if offset > 0 {
                out.push('\n');
            }
            out.push_str(&format!("--- page {} ---\n", self.first_page + offset + 1));
            out.push_str(page.trim_end());
            out.push('\n');
        }
        out
    }
}

// ── Meal types ───────────────────────────────────────────────────────────

/// Fixed meal categories a recipe can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Dessert,
    Drink,
}

impl MealType {
    pub const ALL: [MealType; 5] = [
        MealType::Breakfast,
        MealType::Lunch,
        MealType::Dinner,
        MealType::Dessert,
        MealType::Drink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Dessert => "dessert",
            MealType::Drink => "drink",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MealType::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown meal type '{s}' (expected breakfast, lunch, dinner, dessert or drink)")
            })
    }
}

// ── Extraction records (untrusted) ───────────────────────────────────────

/// An alternate macro set printed next to a recipe (e.g. "wersja 1800 kcal").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionVariant {
    #[serde(default, deserialize_with = "decode::deserialize_text")]
    pub label: String,
    #[serde(default, deserialize_with = "decode::deserialize_int")]
    pub calories: i64,
    #[serde(default, deserialize_with = "decode::deserialize_float")]
    pub protein: f64,
    #[serde(default, alias = "carbohydrates", deserialize_with = "decode::deserialize_float")]
    pub carbs: f64,
    #[serde(default, deserialize_with = "decode::deserialize_float")]
    pub fat: f64,
}

/// One recipe as the model reported it. Numbers are `None` when absent or unreadable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecipe {
    #[serde(deserialize_with = "decode::deserialize_text")]
    pub name: String,
    #[serde(default, deserialize_with = "decode::deserialize_text")]
    pub description: String,
    #[serde(default, deserialize_with = "decode::deserialize_lines")]
    pub ingredients: Vec<String>,
    #[serde(default, deserialize_with = "decode::deserialize_text")]
    pub instructions: String,
    #[serde(default, deserialize_with = "decode::deserialize_opt_int")]
    pub calories: Option<i64>,
    #[serde(default, deserialize_with = "decode::deserialize_opt_float")]
    pub protein: Option<f64>,
    #[serde(
        default,
        alias = "carbohydrates",
        deserialize_with = "decode::deserialize_opt_float"
    )]
    pub carbs: Option<f64>,
    #[serde(default, deserialize_with = "decode::deserialize_opt_float")]
    pub fat: Option<f64>,
    #[serde(default, deserialize_with = "decode::deserialize_opt_int")]
    pub servings: Option<i64>,
    #[serde(default, alias = "meal_type", alias = "category")]
    pub meal_type: Option<String>,
    #[serde(default, alias = "alternate_meal_type")]
    pub alternate_meal_type: Option<String>,
    #[serde(default, alias = "nutrition_variants")]
    pub nutrition_variants: Vec<NutritionVariant>,
}

/// The raw output of one provider call for one chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub recipes: Vec<CandidateRecipe>,
}

impl ExtractionRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }
}

// ── Canonical recipes ────────────────────────────────────────────────────

/// A merged recipe that has not been stored yet (no id, no timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    pub name: String,
    pub description: String,
    /// Newline-joined ingredient lines.
    pub ingredients: String,
    pub instructions: String,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub servings: Option<i64>,
    pub meal_type: MealType,
    pub alternate_meal_type: Option<MealType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nutrition_variants: Vec<NutritionVariant>,
    pub image_ref: Option<String>,
}

impl NewRecipe {
    /// Check the persisted-entity invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is empty".into());
        }
        if self.ingredients.trim().is_empty() {
            return Err(format!("'{}' has no ingredients", self.name));
        }
        if self.calories < 0 {
            return Err(format!("'{}' has negative calories", self.name));
        }
        for (label, v) in [("protein", self.protein), ("carbs", self.carbs), ("fat", self.fat)] {
            if !v.is_finite() || v < 0.0 {
                return Err(format!("'{}' has invalid {label}: {v}", self.name));
            }
        }
        Ok(())
    }

    pub fn into_recipe(self, id: Uuid, created_at: DateTime<Utc>) -> Recipe {
        Recipe {
            id,
            name: self.name,
            description: self.description,
            ingredients: self.ingredients,
            instructions: self.instructions,
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            servings: self.servings,
            meal_type: self.meal_type,
            alternate_meal_type: self.alternate_meal_type,
            nutrition_variants: self.nutrition_variants,
            image_ref: self.image_ref,
            created_at,
        }
    }
}

/// A persisted recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub ingredients: String,
    pub instructions: String,
    pub calories: i64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub servings: Option<i64>,
    pub meal_type: MealType,
    pub alternate_meal_type: Option<MealType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nutrition_variants: Vec<NutritionVariant>,
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Recipe {
    pub fn ingredient_lines(&self) -> impl Iterator<Item = &str> {
        self.ingredients
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    /// `true` if the recipe can fill a slot of the given meal type.
    pub fn fits(&self, slot: MealType) -> bool {
        self.meal_type == slot || self.alternate_meal_type == Some(slot)
    }

    pub fn to_new(&self) -> NewRecipe {
        NewRecipe {
            name: self.name.clone(),
            description: self.description.clone(),
            ingredients: self.ingredients.clone(),
            instructions: self.instructions.clone(),
            calories: self.calories,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            servings: self.servings,
            meal_type: self.meal_type,
            alternate_meal_type: self.alternate_meal_type,
            nutrition_variants: self.nutrition_variants.clone(),
            image_ref: self.image_ref.clone(),
        }
    }
}
