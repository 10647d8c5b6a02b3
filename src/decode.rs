//! Flexible decoding of numeric fields in model output.
//!
//! Models asked for `"calories": 450` answer with `450`, `"450"`, `"450.0"`,
//! `"449,5"`, `""` or `"n/a"` depending on mood. Every numeric field of an
//! extracted recipe therefore passes through one of the pure functions here:
//!
//! | Input | [`decode_int`] | [`parse_int`] (nullable) | [`decode_float`] |
//! |-------|---------------|--------------------------|------------------|
//! | `"42"` | 42 | `Some(42)` | 42.0 |
//! | `"794.5"` | 795 | `Some(795)` | 794.5 |
//! | `"12,5"` | 13 | `Some(13)` | 12.5 |
//! | `""` / `"  "` | 0 | `None` | 0.0 |
//! | `"abc"` | 0 | `None` | 0.0 |
//!
//! Rounding is half-away-from-zero ([`f64::round`]). Decoding never fails:
//! an unreadable value degrades to zero (or `None`) so the rest of the recipe
//! survives.
//!
//! The `deserialize_*` adapters plug these functions into serde via
//! `#[serde(deserialize_with = "...")]` and accept JSON numbers, strings,
//! booleans and `null`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse an integer from text: integer first, then decimal rounded to nearest.
///
/// Returns `None` for empty, whitespace-only or unparsable text.
pub fn parse_int(text: &str) -> Option<i64> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Ok(n) = t.parse::<i64>() {
        return Some(n);
    }
    parse_float(t).map(round_to_i64)
}

/// Integer field decoding; unparsable input yields `0`.
pub fn decode_int(text: &str) -> i64 {
    parse_int(text).unwrap_or(0)
}

/// Parse a finite decimal from text. A lone decimal comma is accepted.
pub fn parse_float(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    let parsed = match t.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) if t.matches(',').count() == 1 && !t.contains('.') => {
            t.replace(',', ".").parse::<f64>().ok()
        }
        Err(_) => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Float field decoding; unparsable input yields `0.0`.
pub fn decode_float(text: &str) -> f64 {
    parse_float(text).unwrap_or(0.0)
}

fn round_to_i64(v: f64) -> i64 {
    // `as` saturates at the i64 bounds.
    v.round() as i64
}

/// Nullable integer from an arbitrary JSON value.
///
/// Native numbers are taken as-is (floats truncated toward zero).
pub fn int_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => parse_int(s),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Nullable float from an arbitrary JSON value.
pub fn float_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_float(s),
        _ => None,
    }
}

/// Ingredient list from an array, a newline-separated string, or `null`.
///
/// Blank entries are dropped; every entry is trimmed.
pub fn lines_from_value(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                Value::Object(map) => map
                    .get("name")
                    .and_then(Value::as_str)
                    .map(|name| match map.get("quantity").and_then(Value::as_str) {
                        Some(q) if !q.trim().is_empty() => format!("{} {}", name, q.trim()),
                        _ => name.to_string(),
                    }),
                other => Some(other.to_string()),
            })
            .collect(),
        Value::String(s) => s.lines().map(str::to_string).collect(),
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(|s| s.trim().trim_start_matches(['-', '•', '*']).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── serde adapters ───────────────────────────────────────────────────────

/// `deserialize_with` for non-nullable integer fields.
pub fn deserialize_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(int_from_value(&value).unwrap_or(0))
}

/// `deserialize_with` for nullable integer fields. Pair with `#[serde(default)]`.
pub fn deserialize_opt_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(int_from_value(&value))
}

/// `deserialize_with` for non-nullable float fields.
pub fn deserialize_float<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(float_from_value(&value).unwrap_or(0.0))
}

/// `deserialize_with` for nullable float fields. Pair with `#[serde(default)]`.
pub fn deserialize_opt_float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(float_from_value(&value))
}

/// `deserialize_with` for ingredient lists. Pair with `#[serde(default)]`.
pub fn deserialize_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(lines_from_value(&value))
}

/// `deserialize_with` for free-text fields that may arrive as numbers or `null`.
pub fn deserialize_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn int_decoding_table() {
        assert_eq!(decode_int("42"), 42);
        assert_eq!(decode_int("  42 "), 42);
        assert_eq!(decode_int("794.5"), 795);
        assert_eq!(decode_int("794.4"), 794);
        assert_eq!(decode_int("-2.5"), -3);
        assert_eq!(decode_int(""), 0);
        assert_eq!(decode_int("   "), 0);
        assert_eq!(decode_int("abc"), 0);
        assert_eq!(decode_int("450 kcal"), 0);
    }

    #[test]
    fn nullable_int_yields_none_for_blank_and_garbage() {
        assert_eq!(parse_int("2"), Some(2));
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("two"), None);
    }

    #[test]
    fn float_decoding_table() {
        assert_eq!(decode_float("3.14"), 3.14);
        assert_eq!(decode_float(" 12,5 "), 12.5);
        assert_eq!(decode_float(""), 0.0);
        assert_eq!(decode_float("x"), 0.0);
        assert_eq!(decode_float("NaN"), 0.0);
        assert_eq!(decode_float("inf"), 0.0);
        assert_eq!(decode_float("1,234.5"), 0.0);
    }

    #[test]
    fn decimal_comma_rounds_for_ints() {
        assert_eq!(decode_int("12,5"), 13);
    }

    #[test]
    fn native_json_numbers() {
        assert_eq!(int_from_value(&json!(7)), Some(7));
        assert_eq!(int_from_value(&json!(7.9)), Some(7));
        assert_eq!(int_from_value(&json!("7.5")), Some(8));
        assert_eq!(int_from_value(&json!(null)), None);
        assert_eq!(float_from_value(&json!(2)), Some(2.0));
        assert_eq!(float_from_value(&json!("2.25")), Some(2.25));
        assert_eq!(float_from_value(&json!([1])), None);
    }

    #[test]
    fn ingredient_lines_from_all_shapes() {
        assert_eq!(
            lines_from_value(&json!(["  Płatki owsiane 50 g ", "", "- Mleko 200 ml"])),
            vec!["Płatki owsiane 50 g", "Mleko 200 ml"]
        );
        assert_eq!(
            lines_from_value(&json!("Jajko 2 szt.\n\nSól")),
            vec!["Jajko 2 szt.", "Sól"]
        );
        assert_eq!(
            lines_from_value(&json!([{"name": "Banan", "quantity": "1 szt."}])),
            vec!["Banan 1 szt."]
        );
        assert!(lines_from_value(&json!(null)).is_empty());
    }

    #[derive(Deserialize)]
    struct Probe {
        #[serde(deserialize_with = "deserialize_int")]
        kcal: i64,
        #[serde(default, deserialize_with = "deserialize_opt_int")]
        servings: Option<i64>,
        #[serde(deserialize_with = "deserialize_float")]
        fat: f64,
        #[serde(default, deserialize_with = "deserialize_text")]
        note: String,
    }

    #[test]
    fn serde_adapters_never_fail_on_bad_numbers() {
        let p: Probe =
            serde_json::from_value(json!({"kcal": "bad", "fat": "1,5", "note": 3})).unwrap();
        assert_eq!(p.kcal, 0);
        assert_eq!(p.servings, None);
        assert_eq!(p.fat, 1.5);
        assert_eq!(p.note, "3");

        let p: Probe = serde_json::from_value(
            json!({"kcal": 512.0, "servings": "2", "fat": 3, "note": null}),
        )
        .unwrap();
        assert_eq!(p.kcal, 512);
        assert_eq!(p.servings, Some(2));
        assert_eq!(p.fat, 3.0);
        assert_eq!(p.note, "");
    }
}
