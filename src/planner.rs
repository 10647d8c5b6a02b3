//! Meal-plan generation over the recipe collection.
//!
//! A plan is an owned value: callers generate it, pass it around, persist it
//! through [`crate::store::MealPlanStore`] and derive a shopping list from it.
//! Nothing here holds a "current plan".

use crate::error::HarvestError;
use crate::model::{MealType, Recipe};
use crate::shopping::ShoppingListItem;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MAX_PLAN_DAYS: u32 = 31;

/// One slot of one day, filled with a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanEntry {
    pub slot: MealType,
    pub recipe_id: Uuid,
    pub recipe_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanDay {
    /// 1-based.
    pub day_number: u32,
    pub entries: Vec<MealPlanEntry>,
}

/// A plan owns its days; each day owns its entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlan {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub days: Vec<MealPlanDay>,
    #[serde(default)]
    pub shopping_list: Vec<ShoppingListItem>,
}

impl MealPlan {
    pub fn entries(&self) -> impl Iterator<Item = &MealPlanEntry> {
        self.days.iter().flat_map(|d| d.entries.iter())
    }
}

/// Listing row for stored plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanSummary {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub days: usize,
    pub entries: usize,
}

impl From<&MealPlan> for MealPlanSummary {
    fn from(plan: &MealPlan) -> Self {
        Self {
            id: plan.id,
            name: plan.name.clone(),
            created_at: plan.created_at,
            days: plan.days.len(),
            entries: plan.entries().count(),
        }
    }
}

/// What to generate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub name: Option<String>,
    /// 1 to [`MAX_PLAN_DAYS`].
    pub days: u32,
    /// Ordered meal slots of every day.
    pub slots: Vec<MealType>,
    /// Fixes the choice of recipes. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for PlanRequest {
    fn default() -> Self {
        Self {
            name: None,
            days: 7,
            slots: vec![MealType::Breakfast, MealType::Lunch, MealType::Dinner],
            seed: None,
        }
    }
}

impl PlanRequest {
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.days == 0 || self.days > MAX_PLAN_DAYS {
            return Err(HarvestError::InvalidConfiguration(format!(
                "plan length must be 1–{MAX_PLAN_DAYS} days, got {}",
                self.days
            )));
        }
        if self.slots.is_empty() {
            return Err(HarvestError::InvalidConfiguration(
                "a plan needs at least one meal slot".into(),
            ));
        }
        Ok(())
    }
}

/// A slot no recipe could fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptySlot {
    pub day_number: u32,
    pub slot: MealType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutcome {
    pub plan: MealPlan,
    pub empty_slots: Vec<EmptySlot>,
}

/// Fill every day/slot with a recipe whose meal type or alternate fits.
///
/// A recipe is not reused within the plan until every candidate for that slot
/// has been used once. With a seed the result depends only on the seed and the
/// order of `recipes`.
pub fn generate_plan(recipes: &[Recipe], request: &PlanRequest) -> Result<PlanOutcome, HarvestError> {
    request.validate()?;

    let mut rng = match request.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut used: HashSet<Uuid> = HashSet::new();
    let mut days = Vec::with_capacity(request.days as usize);
    let mut empty_slots = Vec::new();

    for day_number in 1..=request.days {
        let mut entries = Vec::with_capacity(request.slots.len());
        for &slot in &request.slots {
            let pool: Vec<&Recipe> = recipes.iter().filter(|r| r.fits(slot)).collect();
            let fresh: Vec<&Recipe> = pool
                .iter()
                .copied()
                .filter(|r| !used.contains(&r.id))
                .collect();
            let pick = if fresh.is_empty() {
                pool.choose(&mut rng)
            } else {
                fresh.choose(&mut rng)
            };

            match pick {
                Some(recipe) => {
                    used.insert(recipe.id);
                    entries.push(MealPlanEntry {
                        slot,
                        recipe_id: recipe.id,
                        recipe_name: recipe.name.clone(),
                    });
                }
                None => empty_slots.push(EmptySlot { day_number, slot }),
            }
        }
        days.push(MealPlanDay {
            day_number,
            entries,
        });
    }

    if !empty_slots.is_empty() {
        warn!("{} slot(s) left empty: no matching recipes", empty_slots.len());
    }

    let created_at = crate::store::now_millis();
    let name = request
        .name
        .clone()
        .unwrap_or_else(|| format!("Plan {}", created_at.format("%Y-%m-%d")));
    let plan = MealPlan {
        id: Uuid::new_v4(),
        name,
        created_at,
        days,
        shopping_list: Vec::new(),
    };
    debug!(
        "Generated plan '{}' with {} entries over {} day(s)",
        plan.name,
        plan.entries().count(),
        plan.days.len()
    );
    Ok(PlanOutcome { plan, empty_slots })
}
