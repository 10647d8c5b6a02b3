//! Merge/dedup of extracted recipes, within a document and against the store.
//!
//! Recipes often straddle chunk boundaries: the name and ingredients land in
//! one chunk, the macros in the next. Merging is keyed on the recipe name
//! (case-insensitive, whitespace-normalised) and only ever fills gaps; a
//! populated field is never replaced by an empty one.
//!
//! Output order is first-appearance order, so the same input sequence always
//! yields the same output. Across documents, [`absorb`] applies the same
//! gap-filling rule to a recipe already in the store.

use crate::model::{
    CandidateRecipe, ExtractionRecord, MealType, NewRecipe, NutritionVariant, Recipe,
};
use std::collections::HashMap;
use tracing::debug;

/// Dedup key: lower-cased name with runs of whitespace collapsed.
pub fn dedup_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ── Meal types ───────────────────────────────────────────────────────────

/// Maps free-text meal labels to [`MealType`].
///
/// Known labels are matched exactly after trimming, ignoring case. Polish
/// labels are accepted with and without diacritics, as are the English names.
#[derive(Debug, Clone, Copy)]
pub struct MealTypeResolver {
    default: MealType,
}

const LABELS: &[(&str, MealType)] = &[
    ("sniadanie", MealType::Breakfast),
    ("śniadanie", MealType::Breakfast),
    ("obiad", MealType::Lunch),
    ("kolacja", MealType::Dinner),
    ("deser", MealType::Dessert),
    ("napoj", MealType::Drink),
    ("napój", MealType::Drink),
    ("breakfast", MealType::Breakfast),
    ("lunch", MealType::Lunch),
    ("dinner", MealType::Dinner),
    ("dessert", MealType::Dessert),
    ("drink", MealType::Drink),
];

impl MealTypeResolver {
    pub fn new(default: MealType) -> Self {
        Self { default }
    }

    pub fn default_meal_type(&self) -> MealType {
        self.default
    }

    /// Known label → its meal type; anything else → `None`.
    pub fn lookup(label: &str) -> Option<MealType> {
        let needle = label.trim().to_lowercase();
        LABELS
            .iter()
            .find(|(known, _)| *known == needle)
            .map(|(_, meal)| *meal)
    }

    /// Primary meal type: unknown or missing labels fall back to the default.
    pub fn resolve(&self, label: Option<&str>) -> MealType {
        label.and_then(Self::lookup).unwrap_or(self.default)
    }
}

impl Default for MealTypeResolver {
    fn default() -> Self {
        Self::new(MealType::Lunch)
    }
}

// ── Merge ────────────────────────────────────────────────────────────────

/// Result of merging one document's extraction records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    /// Distinct recipes, in first-appearance order.
    pub recipes: Vec<NewRecipe>,
    /// Candidates dropped for lacking a name or ingredients.
    pub dropped: Vec<String>,
    /// Collisions folded into an earlier candidate.
    pub duplicates: usize,
}

/// Merge records in order into canonical recipes.
pub fn merge<'a, I>(records: I, resolver: &MealTypeResolver) -> MergeReport
where
    I: IntoIterator<Item = &'a ExtractionRecord>,
{
    let mut merged: Vec<CandidateRecipe> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut report = MergeReport::default();

    for candidate in records.into_iter().flat_map(|r| r.recipes.iter()) {
        let key = dedup_key(&candidate.name);
        if key.is_empty() {
            report.dropped.push("<unnamed>".to_string());
            continue;
        }
        match index.get(&key) {
            Some(&pos) => {
                fill_missing(&mut merged[pos], candidate);
                report.duplicates += 1;
            }
            None => {
                index.insert(key, merged.len());
                merged.push(candidate.clone());
            }
        }
    }

    for candidate in merged {
        match finalise(candidate, resolver) {
            Ok(recipe) => report.recipes.push(recipe),
            Err(name) => report.dropped.push(name),
        }
    }

    debug!(
        "Merged into {} recipe(s): {} duplicate(s), {} dropped",
        report.recipes.len(),
        report.duplicates,
        report.dropped.len()
    );
    report
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn fill_text(target: &mut String, later: &str) {
    if blank(target) && !blank(later) {
        *target = later.to_string();
    }
}

fn fill_label(target: &mut Option<String>, later: &Option<String>) {
    if target.as_deref().is_none_or(blank) && later.as_deref().is_some_and(|l| !blank(l)) {
        target.clone_from(later);
    }
}

fn fill_number<T: Copy + PartialEq + Default>(target: &mut Option<T>, later: Option<T>) {
    let absent = target.is_none_or(|v| v == T::default());
    if absent && later.is_some() {
        *target = later;
    }
}

/// Copy into `target` every field that is absent there but present in `later`.
fn fill_missing(target: &mut CandidateRecipe, later: &CandidateRecipe) {
    fill_text(&mut target.description, &later.description);
    fill_text(&mut target.instructions, &later.instructions);
    if target.ingredients.is_empty() {
        target.ingredients.clone_from(&later.ingredients);
    }
    fill_number(&mut target.calories, later.calories);
    fill_number(&mut target.protein, later.protein);
    fill_number(&mut target.carbs, later.carbs);
    fill_number(&mut target.fat, later.fat);
    fill_number(&mut target.servings, later.servings);
    fill_label(&mut target.meal_type, &later.meal_type);
    fill_label(&mut target.alternate_meal_type, &later.alternate_meal_type);
    if target.nutrition_variants.is_empty() {
        target.nutrition_variants.clone_from(&later.nutrition_variants);
    }
}

/// Fill the gaps of a stored recipe from a later extraction of the same dish.
///
/// Zero macros, blank text and empty lists count as absent. The primary meal
/// type is kept. Returns `true` when anything changed.
pub fn absorb(existing: &mut Recipe, later: &NewRecipe) -> bool {
    let before = existing.clone();

    fill_text(&mut existing.description, &later.description);
    fill_text(&mut existing.ingredients, &later.ingredients);
    fill_text(&mut existing.instructions, &later.instructions);
    if existing.calories == 0 {
        existing.calories = later.calories;
    }
    for (target, value) in [
        (&mut existing.protein, later.protein),
        (&mut existing.carbs, later.carbs),
        (&mut existing.fat, later.fat),
    ] {
        if *target == 0.0 {
            *target = value;
        }
    }
    if existing.servings.is_none() {
        existing.servings = later.servings;
    }
    if existing.alternate_meal_type.is_none() {
        existing.alternate_meal_type = later
            .alternate_meal_type
            .filter(|alt| *alt != existing.meal_type);
    }
    if existing.nutrition_variants.is_empty() {
        existing.nutrition_variants.clone_from(&later.nutrition_variants);
    }
    if existing.image_ref.is_none() {
        existing.image_ref.clone_from(&later.image_ref);
    }

    *existing != before
}

fn non_negative(v: Option<f64>) -> f64 {
    v.unwrap_or(0.0).max(0.0)
}

/// Candidate → canonical recipe, or the name of a candidate that must be dropped.
fn finalise(c: CandidateRecipe, resolver: &MealTypeResolver) -> Result<NewRecipe, String> {
    let name = c.name.split_whitespace().collect::<Vec<_>>().join(" ");
    let ingredients: Vec<&str> = c
        .ingredients
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();
    if ingredients.is_empty() {
        return Err(name);
    }

    let meal_type = resolver.resolve(c.meal_type.as_deref());
    let alternate_meal_type = c
        .alternate_meal_type
        .as_deref()
        .and_then(MealTypeResolver::lookup)
        .filter(|alt| *alt != meal_type);

    let nutrition_variants = c
        .nutrition_variants
        .into_iter()
        .map(|v| NutritionVariant {
            label: v.label.trim().to_string(),
            calories: v.calories.max(0),
            protein: v.protein.max(0.0),
            carbs: v.carbs.max(0.0),
            fat: v.fat.max(0.0),
        })
        .collect();

    Ok(NewRecipe {
        name,
        description: c.description.trim().to_string(),
        ingredients: ingredients.join("\n"),
        instructions: c.instructions.trim().to_string(),
        calories: c.calories.unwrap_or(0).max(0),
        protein: non_negative(c.protein),
        carbs: non_negative(c.carbs),
        fat: non_negative(c.fat),
        servings: c.servings.filter(|s| *s > 0),
        meal_type,
        alternate_meal_type,
        nutrition_variants,
        image_ref: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str) -> CandidateRecipe {
        CandidateRecipe {
            name: name.to_string(),
            ingredients: vec!["Płatki owsiane 50 g".into()],
            ..Default::default()
        }
    }

    fn record(recipes: Vec<CandidateRecipe>) -> ExtractionRecord {
        ExtractionRecord { recipes }
    }

    #[test]
    fn key_ignores_case_and_spacing() {
        assert_eq!(dedup_key(" Owsianka "), "owsianka");
        assert_eq!(dedup_key("Zupa   Krem\tz dyni"), dedup_key("zupa krem z DYNI"));
    }

    #[test]
    fn duplicate_names_collapse_and_fields_survive() {
        let mut first = candidate(" Owsianka ");
        first.calories = Some(350);
        let mut second = candidate("Owsianka");
        second.ingredients.clear();
        second.protein = Some(12.5);
        second.instructions = "Zalej mlekiem.".into();
        second.calories = Some(999);

        let report = merge(&[record(vec![first]), record(vec![second])], &MealTypeResolver::default());
        assert_eq!(report.recipes.len(), 1);
        assert_eq!(report.duplicates, 1);

        let r = &report.recipes[0];
        assert_eq!(r.name, "Owsianka");
        assert_eq!(r.calories, 350, "populated field must not be overwritten");
        assert_eq!(r.protein, 12.5);
        assert_eq!(r.instructions, "Zalej mlekiem.");
        assert_eq!(r.ingredients, "Płatki owsiane 50 g");
    }

    #[test]
    fn zero_counts_as_absent() {
        let mut first = candidate("Zupa");
        first.calories = Some(0);
        let mut second = candidate("zupa");
        second.calories = Some(210);
        let report = merge(&[record(vec![first, second])], &MealTypeResolver::default());
        assert_eq!(report.recipes[0].calories, 210);
    }

    #[test]
    fn first_appearance_order_is_kept() {
        let recs = [
            record(vec![candidate("B"), candidate("A")]),
            record(vec![candidate("C"), candidate("b")]),
        ];
        let names: Vec<String> = merge(&recs, &MealTypeResolver::default())
            .recipes
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[test]
    fn ingredients_joined_by_newline() {
        let mut c = candidate("Kanapka");
        c.ingredients = vec!["Chleb 2 kromki".into(), "  ".into(), "Masło 5 g".into()];
        let report = merge(&[record(vec![c])], &MealTypeResolver::default());
        assert_eq!(report.recipes[0].ingredients, "Chleb 2 kromki\nMasło 5 g");
    }

    #[test]
    fn invalid_candidates_are_dropped() {
        let mut no_ingredients = candidate("Sałatka");
        no_ingredients.ingredients.clear();
        let report = merge(
            &[record(vec![candidate("   "), no_ingredients, candidate("Koktajl")])],
            &MealTypeResolver::default(),
        );
        assert_eq!(report.recipes.len(), 1);
        assert_eq!(report.dropped, vec!["<unnamed>", "Sałatka"]);
    }

    #[test]
    fn negative_values_are_clamped() {
        let mut c = candidate("Deser");
        c.calories = Some(-5);
        c.fat = Some(-1.0);
        let r = &merge(&[record(vec![c])], &MealTypeResolver::default()).recipes[0];
        assert_eq!(r.calories, 0);
        assert_eq!(r.fat, 0.0);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn polish_labels_map_to_meal_types() {
        let r = MealTypeResolver::default();
        assert_eq!(r.resolve(Some("Sniadanie")), MealType::Breakfast);
        assert_eq!(r.resolve(Some("Śniadanie")), MealType::Breakfast);
        assert_eq!(r.resolve(Some(" Obiad ")), MealType::Lunch);
        assert_eq!(r.resolve(Some("Kolacja")), MealType::Dinner);
        assert_eq!(r.resolve(Some("Deser")), MealType::Dessert);
        assert_eq!(r.resolve(Some("Napoj")), MealType::Drink);
        assert_eq!(r.resolve(Some("Przekąska")), MealType::Lunch);
        assert_eq!(r.resolve(None), MealType::Lunch);
    }

    #[test]
    fn default_meal_type_is_configurable() {
        let r = MealTypeResolver::new(MealType::Dinner);
        assert_eq!(r.resolve(Some("II śniadanie")), MealType::Dinner);
    }

    #[test]
    fn alternate_meal_type_never_defaults() {
        let mut c = candidate("Jajecznica");
        c.meal_type = Some("Sniadanie".into());
        c.alternate_meal_type = Some("Kolacja".into());
        let mut d = candidate("Omlet");
        d.alternate_meal_type = Some("brunch".into());

        let report = merge(&[record(vec![c, d])], &MealTypeResolver::default());
        assert_eq!(report.recipes[0].alternate_meal_type, Some(MealType::Dinner));
        assert_eq!(report.recipes[1].alternate_meal_type, None);
    }

    #[test]
    fn absorb_fills_gaps_only() {
        let first = merge(&[record(vec![candidate("Owsianka")])], &MealTypeResolver::default());
        let mut stored = first.recipes[0]
            .clone()
            .into_recipe(uuid::Uuid::new_v4(), chrono::Utc::now());
        stored.fat = 4.0;

        let mut later = stored.to_new();
        later.name = "owsianka".into();
        later.ingredients = "Coś innego".into();
        later.calories = 320;
        later.fat = 9.0;
        later.instructions = "Ugotuj na mleku.".into();
        later.alternate_meal_type = Some(MealType::Dinner);

        assert!(absorb(&mut stored, &later));
        assert_eq!(stored.name, "Owsianka");
        assert_eq!(stored.ingredients, "Płatki owsiane 50 g");
        assert_eq!(stored.calories, 320);
        assert_eq!(stored.fat, 4.0);
        assert_eq!(stored.instructions, "Ugotuj na mleku.");
        assert_eq!(stored.meal_type, MealType::Lunch);
        assert_eq!(stored.alternate_meal_type, Some(MealType::Dinner));

        assert!(!absorb(&mut stored, &later), "second pass has nothing to add");
    }

    #[test]
    fn merge_is_deterministic() {
        let recs = vec![
            record(vec![candidate("A"), candidate("B")]),
            record(vec![candidate("a")]),
        ];
        let resolver = MealTypeResolver::default();
        assert_eq!(merge(&recs, &resolver), merge(&recs, &resolver));
    }
}
