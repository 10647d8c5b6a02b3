//! Response parsing: strict JSON first, then one best-effort salvage pass.
//!
//! Even with "output only JSON" in the prompt, models occasionally:
//!
//! - wrap the object in ` ```json ... ``` ` fences
//! - add a sentence before or after it ("Here are the recipes:")
//! - emit a bare array instead of `{"recipes": [...]}`
//! - return one malformed recipe among many valid ones
//! - prepend a BOM or sprinkle zero-width spaces
//!
//! The salvage pass undoes these in order. It runs once; if the result still
//! doesn't parse, the chunk is a parse failure with an empty record.

use crate::model::{CandidateRecipe, ExtractionRecord};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// A successfully parsed response.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub record: ExtractionRecord,
    /// `true` when the strict parse failed and salvage recovered the record.
    pub salvaged: bool,
    /// Recipe entries that were discarded because they did not fit the schema.
    pub dropped: usize,
}

/// Parse a raw model response into an [`ExtractionRecord`].
///
/// Returns the strict-parse error message when salvage also fails.
pub fn parse_response(raw: &str) -> Result<Parsed, String> {
    let strict_err = match serde_json::from_str::<ExtractionRecord>(raw) {
        Ok(record) => {
            return Ok(Parsed {
                record,
                salvaged: false,
                dropped: 0,
            })
        }
        Err(e) => e.to_string(),
    };
    debug!("Strict parse failed ({}); attempting salvage", strict_err);

    salvage(raw).ok_or(strict_err)
}

fn salvage(raw: &str) -> Option<Parsed> {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    let s = strip_code_fences(&s);
    let candidate = cut_to_json(&s)?;

    let value: Value = serde_json::from_str(candidate).ok()?;
    let items = match value {
        Value::Object(mut map) => match map.remove("recipes") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(_) => return None,
            // A single recipe object without the wrapper.
            None if map.contains_key("name") => vec![Value::Object(map)],
            None => return None,
        },
        Value::Array(items) => items,
        _ => return None,
    };

    let total = items.len();
    let recipes: Vec<CandidateRecipe> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    let dropped = total - recipes.len();
    if total > 0 && recipes.is_empty() {
        return None;
    }

    Some(Parsed {
        record: ExtractionRecord { recipes },
        salvaged: true,
        dropped,
    })
}

// ── Salvage rules ────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

/// Characters that break `serde_json` but are invisible in logs.
const INVISIBLE: &[char] = &[
    '\u{FEFF}', // BOM
    '\u{200B}', // zero-width space
    '\u{200C}', // zero-width non-joiner
    '\u{200D}', // zero-width joiner
    '\u{2060}', // word joiner
    '\u{00AD}', // soft hyphen
];

fn remove_invisible_chars(input: &str) -> String {
    input.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

static RE_FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\n(.*?)\n[ \t]*```").unwrap());

/// Keep the contents of the first fenced block, wherever it sits.
fn strip_code_fences(input: &str) -> String {
    match RE_FENCED.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

/// Slice from the first opening bracket to its last matching closer.
///
/// An object wins over an array when both appear, unless the array opens first.
fn cut_to_json(input: &str) -> Option<&str> {
    let obj = input.find('{');
    let arr = input.find('[');
    let (open, close) = match (obj, arr) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return None,
    };
    let end = input.rfind(close)?;
    (end > open).then(|| &input[open..=end])
}
