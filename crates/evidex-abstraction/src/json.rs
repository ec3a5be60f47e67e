//! Recovery of JSON payloads from free-form model text.
//!
//! Chat-style backends wrap JSON in markdown fences or surround it with prose
//! even when asked not to.

use crate::BackendError;

/// Parses a JSON object out of model text.
///
/// Strips a leading/trailing markdown fence, then takes the span from the first
/// `{` to the last `}`.
///
/// # Errors
/// Returns `BackendError::InvalidResponse` if no valid JSON object is found.
pub fn parse_json_strict(text: &str) -> Result<serde_json::Value, BackendError> {
    let mut cleaned = text.trim();

    if cleaned.starts_with("```") {
        // Drop the opening fence line (which may carry a language tag)
        cleaned = cleaned.split_once('\n').map_or("", |(_, rest)| rest);
        cleaned = cleaned.trim_end();
        if let Some(stripped) = cleaned.strip_suffix("```") {
            cleaned = stripped;
        }
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            cleaned = &cleaned[start..=end];
        }
    }

    serde_json::from_str(cleaned)
        .map_err(|e| BackendError::InvalidResponse(format!("Invalid JSON response: {}", e)))
}
