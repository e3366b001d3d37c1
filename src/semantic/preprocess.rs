//! Text preprocessing for embedding input.
//!
//! Prepares proposition text for the embedding model:
//! 1. Trim whitespace
//! 2. Truncate to a character budget with ellipsis
//! 3. Prepend the task prefix the model was trained with

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

/// Prefix `text` with a task marker such as `search_document:`.
///
/// An empty prefix leaves the text unchanged.
pub fn apply_prefix(prefix: &str, text: &str) -> String {
    let prefix = prefix.trim();
    let text = text.trim();
    if prefix.is_empty() {
        text.to_string()
    } else {
        format!("{prefix} {text}")
    }
}

/// Truncate content to `max_chars` characters, adding ellipsis if truncated.
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }

    let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.len());
    let truncated: String = content.chars().take(keep).collect();

    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

/// Full preparation: trim, truncate, then prefix.
pub fn prepare_input(prefix: &str, text: &str, max_chars: usize) -> String {
    apply_prefix(prefix, &truncate_content(text.trim(), max_chars))
}
