//! Embedding text synthesis.
//!
//! Builds one bounded prose string from whichever recipe fields are
//! present, with labeled segments so the embedding captures field
//! semantics rather than undifferentiated text.

use crate::models::Recipe;

/// Maximum synthesized text length in characters.
pub const MAX_TEXT_LEN: usize = 8000;

/// Synthesize the embedding input for a recipe.
///
/// Returns `None` when no field yields non-empty text; callers treat that
/// as a skip, not an error. The assembled string is truncated to
/// [`MAX_TEXT_LEN`] on a char boundary.
pub fn synthesize(recipe: &Recipe) -> Option<String> {
    synthesize_with_limit(recipe, MAX_TEXT_LEN)
}

pub fn synthesize_with_limit(recipe: &Recipe, max_len: usize) -> Option<String> {
    let mut segments: Vec<String> = Vec::new();

    if let Some(title) = non_empty(&recipe.title) {
        segments.push(title.to_string());
    }
    if let Some(description) = non_empty(&recipe.description) {
        segments.push(description.to_string());
    }
    if !recipe.ingredients.is_empty() {
        segments.push(format!("Ingredients: {}", recipe.ingredients.join(", ")));
    }
    if !recipe.instructions.is_empty() {
        segments.push(format!("Instructions: {}", recipe.instructions.join(" ")));
    }
    if let Some(recipe_yield) = non_empty(&recipe.recipe_yield) {
        segments.push(format!("Yield: {}", recipe_yield));
    }

    let timing: Vec<String> = [
        ("Prep", &recipe.prep_time),
        ("Cook", &recipe.cook_time),
        ("Total", &recipe.total_time),
    ]
    .iter()
    .filter_map(|(label, time)| non_empty(time).map(|t| format!("{}: {}", label, t)))
    .collect();
    if !timing.is_empty() {
        segments.push(format!("Timing: {}", timing.join(", ")));
    }

    if let Some(keywords) = non_empty(&recipe.keywords) {
        segments.push(format!("Keywords: {}", keywords));
    }
    if let Some(category) = non_empty(&recipe.category) {
        segments.push(format!("Category: {}", category));
    }
    if let Some(cuisine) = non_empty(&recipe.cuisine) {
        segments.push(format!("Cuisine: {}", cuisine));
    }

    if segments.is_empty() {
        return None;
    }

    Some(truncate_chars(segments.join("\n"), max_len))
}

/// Truncate to at most `max_len` characters without splitting a char.
fn truncate_chars(text: String, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text;
    }
    text.chars().take(max_len).collect()
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
