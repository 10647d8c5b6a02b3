//! Shopping lists derived from a meal plan.
//!
//! Every ingredient line of every planned recipe is parsed into
//! `(name, amount, unit)`, aggregated by normalised name and unit, put into a
//! store-aisle category and sorted. The list is never authored by hand; it is
//! rebuilt from the plan whenever asked.

use crate::model::Recipe;
use crate::planner::MealPlan;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;
use uuid::Uuid;

/// Store-aisle grouping. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Vegetables,
    Fruit,
    Dairy,
    MeatFish,
    Bakery,
    Grains,
    Spices,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Vegetables => "vegetables",
            Category::Fruit => "fruit",
            Category::Dairy => "dairy",
            Category::MeatFish => "meat & fish",
            Category::Bakery => "bakery",
            Category::Grains => "grains",
            Category::Spices => "spices",
            Category::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingListItem {
    pub name: String,
    /// Summed amount with unit ("350 g"); empty when no line carried a quantity.
    pub quantity: String,
    pub category: Category,
}

/// One parsed ingredient line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIngredient {
    pub name: String,
    pub amount: Option<f64>,
    pub unit: Option<String>,
}

// ── Line parsing ─────────────────────────────────────────────────────────

const NUM: &str = r"(?P<qty>\d+/\d+|\d+(?:[.,]\d+)?)";
const UNIT: &str = r"(?P<unit>kg|g|ml|l|szt|sztuk[ai]?|łyżk[aię]|łyżek|łyżeczk[aię]|łyżeczek|szklank[aię]|szklanek|plaster(?:ek|ki|ków)?|plastr[ayów]*|garś[cć]|garści|kromk[aię]|kromek|opakowani[ae]|pęczek|pęczki|ząbek|ząbki|ząbków|tbsp|tsp|cups?|pcs)\b\.?";

static RE_LEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^{NUM}\s*(?:{UNIT})?\s+(?P<name>.+)$")).unwrap()
});

static RE_TRAILING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)^(?P<name>.+?)[\s(:–-]+{NUM}\s*(?:{UNIT})?\s*\)?\.?$"
    ))
    .unwrap()
});

/// Parse quantities at either end: `200 g kurczaka`, `Mleko 250 ml`, `2 jajka`.
pub fn parse_ingredient(line: &str) -> ParsedIngredient {
    let line = line.trim();
    let caps = RE_LEADING
        .captures(line)
        .or_else(|| RE_TRAILING.captures(line));

    match caps {
        Some(c) => ParsedIngredient {
            name: clean_name(&c["name"]),
            amount: c.name("qty").and_then(|q| parse_amount(q.as_str())),
            unit: c.name("unit").map(|u| canonical_unit(u.as_str())),
        },
        None => ParsedIngredient {
            name: clean_name(line),
            amount: None,
            unit: None,
        },
    }
}

fn clean_name(raw: &str) -> String {
    raw.trim()
        .trim_end_matches([',', '.', ':', '(', '-', '–'])
        .trim()
        .to_string()
}

fn parse_amount(q: &str) -> Option<f64> {
    match q.split_once('/') {
        Some((n, d)) => {
            let (n, d) = (n.parse::<f64>().ok()?, d.parse::<f64>().ok()?);
            (d != 0.0).then(|| n / d)
        }
        None => crate::decode::parse_float(q),
    }
}

fn canonical_unit(unit: &str) -> String {
    let u = unit.trim_end_matches('.').to_lowercase();
    let canonical = match u.as_str() {
        "sztuka" | "sztuki" | "sztuk" | "pcs" => "szt",
        s if s.starts_with("łyżeczk") || s == "łyżeczek" || s == "tsp" => "łyżeczka",
        s if s.starts_with("łyżk") || s == "łyżek" || s == "tbsp" => "łyżka",
        s if s.starts_with("szklan") || s.starts_with("cup") => "szklanka",
        s if s.starts_with("plast") => "plaster",
        s if s.starts_with("garś") => "garść",
        s if s.starts_with("krom") => "kromka",
        s if s.starts_with("opakowani") => "opakowanie",
        s if s.starts_with("pęcz") => "pęczek",
        s if s.starts_with("ząb") => "ząbek",
        other => other,
    };
    canonical.to_string()
}

/// kg → g and l → ml so both spellings aggregate together.
fn to_base_unit(amount: f64, unit: &str) -> (f64, String) {
    match unit {
        "kg" => (amount * 1000.0, "g".to_string()),
        "l" => (amount * 1000.0, "ml".to_string()),
        other => (amount, other.to_string()),
    }
}

// ── Categorisation ───────────────────────────────────────────────────────

const CATEGORY_STEMS: &[(Category, &[&str])] = &[
    (
        Category::Spices,
        &[
            "sól", "pieprz", "przypraw", "cynamon", "kurkum", "oregano", "tymianek", "majeranek",
            "zioła", "kmin", "gałka", "chili", "salt", "cinnamon",
        ],
    ),
    (
        Category::Dairy,
        &[
            "mlek", "mleko", "jogurt", "ser", "twaróg", "twarog", "śmietan", "masło", "masła",
            "kefir", "maślank", "skyr", "mozzarell", "feta", "jaj", "milk", "yogurt", "cheese",
            "butter", "egg",
        ],
    ),
    (
        Category::MeatFish,
        &[
            "kurczak", "indyk", "wołow", "wieprz", "szynk", "łosoś", "łososi", "tuńczyk", "dorsz",
            "ryb", "krewet", "mięs", "boczek", "kiełbas", "pierś", "chicken", "beef", "pork",
            "salmon", "tuna", "fish", "ham",
        ],
    ),
    (
        Category::Bakery,
        &["chleb", "bułk", "bagiet", "tortill", "pieczyw", "grahamk", "bread"],
    ),
    (
        Category::Grains,
        &[
            "płatki", "kasz", "ryż", "makaron", "mąk", "otręb", "quinoa", "komos", "musli",
            "granol", "oat", "rice", "pasta", "flour",
        ],
    ),
    (
        Category::Fruit,
        &[
            "jabłk", "banan", "trusk", "malin", "borówk", "jagod", "cytryn", "pomarańcz", "kiwi",
            "gruszk", "winogr", "mango", "ananas", "awokado", "śliwk", "brzoskwin", "apple",
            "banana", "berr", "lemon", "orange",
        ],
    ),
    (
        Category::Vegetables,
        &[
            "pomidor", "ogór", "marchew", "cebul", "czosn", "papryk", "sałat", "szpinak",
            "brokuł", "kalafior", "cukini", "bakłażan", "dyni", "dynia", "ziemniak", "batat",
            "pietruszk", "seler", "rzodkiew", "kapust", "fasol", "groszek", "ciecierzyc",
            "soczewic", "rukol", "tomato", "cucumber", "carrot", "onion", "garlic", "lettuce",
            "spinach", "broccoli", "potato",
        ],
    ),
];

/// First category whose keyword stem occurs in the name.
pub fn categorize(name: &str) -> Category {
    let lower = name.to_lowercase();
    CATEGORY_STEMS
        .iter()
        .find(|(_, stems)| stems.iter().any(|s| lower.contains(s)))
        .map(|(cat, _)| *cat)
        .unwrap_or(Category::Other)
}

// ── Aggregation ──────────────────────────────────────────────────────────

fn name_key(name: &str) -> String {
    crate::merge::dedup_key(name)
}

fn format_amount(v: f64) -> String {
    let rounded = (v * 100.0).round() / 100.0;
    format!("{rounded}")
}

#[derive(Default)]
struct Tally {
    display: String,
    amount: f64,
    has_amount: bool,
}

/// Build the shopping list for `plan` from the ingredient lines of `recipes`.
///
/// Entries referring to recipes not in `recipes` are skipped with a warning.
pub fn build_shopping_list(plan: &MealPlan, recipes: &[Recipe]) -> Vec<ShoppingListItem> {
    let by_id: HashMap<Uuid, &Recipe> = recipes.iter().map(|r| (r.id, r)).collect();
    let mut order: Vec<(String, String)> = Vec::new();
    let mut tallies: HashMap<(String, String), Tally> = HashMap::new();

    for entry in plan.entries() {
        let Some(recipe) = by_id.get(&entry.recipe_id) else {
            warn!(
                "Plan '{}' references missing recipe {} ('{}')",
                plan.name, entry.recipe_id, entry.recipe_name
            );
            continue;
        };
        for line in recipe.ingredient_lines() {
            let parsed = parse_ingredient(line);
            if parsed.name.is_empty() {
                continue;
            }
            let (amount, unit) = match (parsed.amount, parsed.unit.as_deref()) {
                (Some(a), Some(u)) => {
                    let (a, u) = to_base_unit(a, u);
                    (Some(a), u)
                }
                (Some(a), None) => (Some(a), String::new()),
                (None, u) => (None, u.unwrap_or_default().to_string()),
            };

            let key = (name_key(&parsed.name), unit);
            let tally = tallies.entry(key.clone()).or_insert_with(|| {
                order.push(key.clone());
                Tally {
                    display: parsed.name.clone(),
                    ..Default::default()
                }
            });
            if let Some(a) = amount {
                tally.amount += a;
                tally.has_amount = true;
            }
        }
    }

    let mut items: Vec<ShoppingListItem> = order
        .into_iter()
        .filter_map(|key| {
            let tally = tallies.remove(&key)?;
            let (_, unit) = key;
            let quantity = match (tally.has_amount, unit.is_empty()) {
                (false, _) => String::new(),
                (true, true) => format_amount(tally.amount),
                (true, false) => format!("{} {}", format_amount(tally.amount), unit),
            };
            Some(ShoppingListItem {
                category: categorize(&tally.display),
                name: tally.display,
                quantity,
            })
        })
        .collect();

    items.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MealType, NewRecipe};
    use crate::planner::{MealPlanDay, MealPlanEntry};
    use chrono::Utc;

    fn parsed(name: &str, amount: Option<f64>, unit: Option<&str>) -> ParsedIngredient {
        ParsedIngredient {
            name: name.into(),
            amount,
            unit: unit.map(str::to_string),
        }
    }

    #[test]
    fn parses_leading_and_trailing_quantities() {
        assert_eq!(parse_ingredient("200 g kurczaka"), parsed("kurczaka", Some(200.0), Some("g")));
        assert_eq!(parse_ingredient("Mleko 250 ml"), parsed("Mleko", Some(250.0), Some("ml")));
        assert_eq!(parse_ingredient("2 jajka"), parsed("jajka", Some(2.0), None));
        assert_eq!(
            parse_ingredient("Oliwa z oliwek 1 łyżka"),
            parsed("Oliwa z oliwek", Some(1.0), Some("łyżka"))
        );
        assert_eq!(
            parse_ingredient("Płatki owsiane (40 g)"),
            parsed("Płatki owsiane", Some(40.0), Some("g"))
        );
        assert_eq!(
            parse_ingredient("Banan - 1 szt."),
            parsed("Banan", Some(1.0), Some("szt"))
        );
        assert_eq!(parse_ingredient("1/2 awokado"), parsed("awokado", Some(0.5), None));
        assert_eq!(parse_ingredient("Sól, pieprz"), parsed("Sól, pieprz", None, None));
    }

    #[test]
    fn unit_spellings_are_canonical() {
        assert_eq!(parse_ingredient("Miód 2 łyżeczki").unit.as_deref(), Some("łyżeczka"));
        assert_eq!(parse_ingredient("3 plasterki szynki").unit.as_deref(), Some("plaster"));
        assert_eq!(parse_ingredient("Chleb 2 kromki").unit.as_deref(), Some("kromka"));
    }

    #[test]
    fn categories() {
        assert_eq!(categorize("Pomidor"), Category::Vegetables);
        assert_eq!(categorize("jogurt naturalny"), Category::Dairy);
        assert_eq!(categorize("Pierś z kurczaka"), Category::MeatFish);
        assert_eq!(categorize("Płatki owsiane"), Category::Grains);
        assert_eq!(categorize("Banan"), Category::Fruit);
        assert_eq!(categorize("Chleb żytni"), Category::Bakery);
        assert_eq!(categorize("Sól"), Category::Spices);
        assert_eq!(categorize("Woda"), Category::Other);
    }

    fn recipe(name: &str, ingredients: &str) -> Recipe {
        NewRecipe {
            name: name.into(),
            description: String::new(),
            ingredients: ingredients.into(),
            instructions: String::new(),
            calories: 0,
            protein: 0.0,
            carbs: 0.0,
            fat: 0.0,
            servings: None,
            meal_type: MealType::Lunch,
            alternate_meal_type: None,
            nutrition_variants: Vec::new(),
            image_ref: None,
        }
        .into_recipe(Uuid::new_v4(), Utc::now())
    }

    fn plan_for(recipes: &[&Recipe]) -> MealPlan {
        MealPlan {
            id: Uuid::new_v4(),
            name: "test".into(),
            created_at: Utc::now(),
            days: vec![MealPlanDay {
                day_number: 1,
                entries: recipes
                    .iter()
                    .map(|r| MealPlanEntry {
                        slot: MealType::Lunch,
                        recipe_id: r.id,
                        recipe_name: r.name.clone(),
                    })
                    .collect(),
            }],
            shopping_list: Vec::new(),
        }
    }

    #[test]
    fn aggregates_sums_and_sorts() {
        let a = recipe("Owsianka", "Płatki owsiane 50 g\nMleko 200 ml\nBanan 1 szt.");
        let b = recipe("Koktajl", "Mleko 0,3 l\nbanan 1 szt.\nSól");
        let list = build_shopping_list(&plan_for(&[&a, &b]), &[a.clone(), b.clone()]);

        let find = |n: &str| list.iter().find(|i| i.name.eq_ignore_ascii_case(n)).unwrap();
        assert_eq!(find("Mleko").quantity, "500 ml");
        assert_eq!(find("Banan").quantity, "2 szt");
        assert_eq!(find("Płatki owsiane").quantity, "50 g");
        assert_eq!(find("Sól").quantity, "");

        let cats: Vec<Category> = list.iter().map(|i| i.category).collect();
        let mut sorted = cats.clone();
        sorted.sort();
        assert_eq!(cats, sorted);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn repeated_recipe_doubles_amounts() {
        let a = recipe("Jajecznica", "3 jajka\nMasło 10 g");
        let list = build_shopping_list(&plan_for(&[&a, &a]), std::slice::from_ref(&a));
        assert_eq!(list.iter().find(|i| i.name == "jajka").unwrap().quantity, "6");
        assert_eq!(list.iter().find(|i| i.name == "Masło").unwrap().quantity, "20 g");
    }

    #[test]
    fn missing_recipes_are_skipped() {
        let a = recipe("Zupa", "Marchew 1 szt.");
        assert!(build_shopping_list(&plan_for(&[&a]), &[]).is_empty());
    }
}
