//! Instructions sent to the model with every chunk.
//!
//! Callers can override the instruction via
//! [`crate::config::HarvestConfig::system_prompt`]; the constants here are used
//! only when no override is provided. The JSON schema is appended in either case.

/// Default extraction instruction.
pub const EXTRACTION_PROMPT: &str = r#"You are a precise data-extraction assistant. The input is part of a diet plan (usually in Polish) containing recipes, one per section.

Extract EVERY recipe that appears in the provided pages.

Rules:
1. Copy names, ingredients and instructions exactly as printed. Do not translate.
2. One ingredient per array element, including its quantity and unit (e.g. "Płatki owsiane 50 g").
3. Nutrition values are per serving: calories in kcal, protein/carbs/fat in grams. Use numbers, not strings. If a value is not printed, use null.
4. mealType is the section label printed in the plan: "Sniadanie", "Obiad", "Kolacja", "Deser" or "Napoj". If none is printed, use null.
5. If the plan prints alternative calorie versions of the same recipe, list them in nutritionVariants.
6. A recipe that continues from a previous page fragment must still be returned with whatever fields are visible.
7. If the pages contain no recipes, return {"recipes": []}.

Output ONLY the JSON object. No markdown fences, no commentary."#;

/// Shape of the expected response.
pub const RESPONSE_SCHEMA: &str = r#"{
  "recipes": [
    {
      "name": "string",
      "description": "string",
      "ingredients": ["string"],
      "instructions": "string",
      "calories": 0,
      "protein": 0.0,
      "carbs": 0.0,
      "fat": 0.0,
      "servings": 1,
      "mealType": "string | null",
      "alternateMealType": "string | null",
      "nutritionVariants": [
        {"label": "string", "calories": 0, "protein": 0.0, "carbs": 0.0, "fat": 0.0}
      ]
    }
  ]
}"#;

/// Full instruction: the base prompt followed by the response schema.
pub fn extraction_instruction(custom: Option<&str>) -> String {
    format!(
        "{}\n\nRespond with JSON matching this schema exactly:\n{}",
        custom.unwrap_or(EXTRACTION_PROMPT),
        RESPONSE_SCHEMA
    )
}

/// User message body for one chunk.
///
/// `page_text` is the chunk's text with page markers; `first_page..=last_page`
/// is 1-based and lets the model relate attached PDF pages or images to it.
pub fn chunk_message(page_text: &str, first_page: usize, last_page: usize) -> String {
    format!(
        "Pages {first_page}-{last_page} of the document.\n\nExtracted page text:\n\"\"\"\n{page_text}\"\"\""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_always_carries_schema() {
        let default = extraction_instruction(None);
        assert!(default.starts_with(EXTRACTION_PROMPT));
        assert!(default.contains("\"recipes\""));

        let custom = extraction_instruction(Some("Extract recipes."));
        assert!(custom.starts_with("Extract recipes."));
        assert!(custom.contains("nutritionVariants"));
    }

    #[test]
    fn prompt_lists_known_meal_labels() {
        for label in ["Sniadanie", "Obiad", "Kolacja", "Deser", "Napoj"] {
            assert!(EXTRACTION_PROMPT.contains(label), "missing {label}");
        }
    }

    #[test]
    fn chunk_message_names_page_range() {
        let msg = chunk_message("--- page 4 ---\nOwsianka\n", 4, 6);
        assert!(msg.starts_with("Pages 4-6"));
        assert!(msg.contains("Owsianka"));
    }
}
