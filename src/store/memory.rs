//! In-memory store for tests and embedding.
//!
//! Uses `Vec` and `BTreeMap` behind `std::sync::RwLock`. Behaviour matches
//! [`super::SqliteStore`], including the cascade from recipes to plan entries.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{now_millis, validated, MealPlanStore, ProcessingLedger, RecipeStore};
use crate::error::StoreError;
use crate::merge::dedup_key;
use crate::model::{MealType, NewRecipe, ProcessedFileRecord, Recipe, SourceDocument};
use crate::planner::{MealPlan, MealPlanSummary};
use crate::shopping::ShoppingListItem;

/// In-memory implementation of every store trait.
pub struct InMemoryStore {
    recipes: RwLock<Vec<Recipe>>,
    ledger: RwLock<BTreeMap<String, ProcessedFileRecord>>,
    plans: RwLock<Vec<MealPlan>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            recipes: RwLock::new(Vec::new()),
            ledger: RwLock::new(BTreeMap::new()),
            plans: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// A panic while holding a lock leaves the data consistent: every write below
// is a single push, retain or assignment.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn recipe_not_found(id: Uuid) -> StoreError {
    StoreError::NotFound {
        entity: "recipe",
        id: id.to_string(),
    }
}

#[async_trait]
impl RecipeStore for InMemoryStore {
    async fn insert(&self, recipe: &NewRecipe) -> Result<Recipe, StoreError> {
        validated(recipe)?;
        let stored = recipe.clone().into_recipe(Uuid::new_v4(), now_millis());
        write(&self.recipes).push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, recipe: &Recipe) -> Result<(), StoreError> {
        validated(&recipe.to_new())?;
        let mut recipes = write(&self.recipes);
        let slot = recipes
            .iter_mut()
            .find(|r| r.id == recipe.id)
            .ok_or_else(|| recipe_not_found(recipe.id))?;
        let created_at = slot.created_at;
        *slot = Recipe {
            created_at,
            ..recipe.clone()
        };
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        {
            let mut recipes = write(&self.recipes);
            let before = recipes.len();
            recipes.retain(|r| r.id != id);
            if recipes.len() == before {
                return Err(recipe_not_found(id));
            }
        }
        for plan in write(&self.plans).iter_mut() {
            for day in &mut plan.days {
                day.entries.retain(|e| e.recipe_id != id);
            }
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Recipe>, StoreError> {
        Ok(read(&self.recipes).iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Recipe>, StoreError> {
        let key = dedup_key(name);
        Ok(read(&self.recipes)
            .iter()
            .find(|r| dedup_key(&r.name) == key)
            .cloned())
    }

    async fn list_by_meal_type(&self, meal_type: Option<MealType>) -> Result<Vec<Recipe>, StoreError> {
        Ok(read(&self.recipes)
            .iter()
            .filter(|r| meal_type.is_none_or(|m| r.meal_type == m))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(read(&self.recipes).len())
    }
}

#[async_trait]
impl ProcessingLedger for InMemoryStore {
    async fn should_process(&self, doc: &SourceDocument) -> Result<bool, StoreError> {
        Ok(!read(&self.ledger).values().any(|r| r.checksum == doc.checksum))
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
        write(&self.ledger).insert(record.filename.clone(), record.clone());
        Ok(record)
    }

    async fn list_processed(&self) -> Result<Vec<ProcessedFileRecord>, StoreError> {
        Ok(read(&self.ledger).values().cloned().collect())
    }

    async fn forget(&self, filename: &str) -> Result<bool, StoreError> {
        Ok(write(&self.ledger).remove(filename).is_some())
    }
}

#[async_trait]
impl MealPlanStore for InMemoryStore {
    async fn save_plan(&self, plan: &MealPlan) -> Result<(), StoreError> {
        {
            let recipes = read(&self.recipes);
            if let Some(missing) = plan
                .entries()
                .find(|e| !recipes.iter().any(|r| r.id == e.recipe_id))
            {
                return Err(recipe_not_found(missing.recipe_id));
            }
        }
        let mut plans = write(&self.plans);
        plans.retain(|p| p.id != plan.id);
        plans.push(plan.clone());
        Ok(())
    }

    async fn get_plan(&self, id: Uuid) -> Result<Option<MealPlan>, StoreError> {
        let Some(mut plan) = read(&self.plans).iter().find(|p| p.id == id).cloned() else {
            return Ok(None);
        };
        // Names follow the recipe, as the SQL join does.
        let recipes = read(&self.recipes);
        for day in &mut plan.days {
            for entry in &mut day.entries {
                if let Some(r) = recipes.iter().find(|r| r.id == entry.recipe_id) {
                    entry.recipe_name.clone_from(&r.name);
                }
            }
        }
        Ok(Some(plan))
    }

    async fn list_plans(&self) -> Result<Vec<MealPlanSummary>, StoreError> {
        let plans = read(&self.plans);
        let mut summaries: Vec<(usize, MealPlanSummary)> = plans
            .iter()
            .enumerate()
            .map(|(i, p)| (i, MealPlanSummary::from(p)))
            .collect();
        summaries.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
        Ok(summaries.into_iter().map(|(_, s)| s).collect())
    }

    async fn delete_plan(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut plans = write(&self.plans);
        let before = plans.len();
        plans.retain(|p| p.id != id);
        Ok(plans.len() != before)
    }

    async fn save_shopping_list(&self, plan_id: Uuid, items: &[ShoppingListItem]) -> Result<(), StoreError> {
        let mut plans = write(&self.plans);
        let plan = plans
            .iter_mut()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "meal plan",
                id: plan_id.to_string(),
            })?;
        plan.shopping_list = items.to_vec();
        Ok(())
    }
}
