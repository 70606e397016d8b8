//! Shared utility functions for JSON extraction and diagnostics.
//!
//! ## JSON Extraction Helpers
//!
//! Provides ergonomic helpers for extracting values from `serde_json::Value`:
//! - `json_string` - Extract strings (numbers are stringified)
//! - `json_string_array` - Extract string arrays
//! - `json_bool` - Extract booleans with a default

// =============================================================================
// JSON Value Extraction Helpers
// =============================================================================

/// Extract a non-empty, trimmed string from a JSON value by key.
///
/// Models frequently emit numbers where strings were asked for ("day": -28),
/// so numbers are accepted and stringified.
#[inline]
pub fn json_string(value: &serde_json::Value, key: &str) -> Option<String> {
    let s = match value.get(key)? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

/// Extract string array from JSON value by key.
///
/// A single string is treated as a one-element array.
#[inline]
pub fn json_string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(serde_json::Value::Array(arr)) => arr
            .iter()
            .filter_map(|s| s.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Extract boolean with default.
///
/// Accepts "yes"/"no"/"true"/"false" strings as well.
#[inline]
pub fn json_bool(value: &serde_json::Value, key: &str, default: bool) -> bool {
    match value.get(key) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" => true,
            "false" | "no" | "n" => false,
            _ => default,
        },
        _ => default,
    }
}

// =============================================================================
// String Utilities
// =============================================================================

/// Bounded excerpt of arbitrary text for diagnostics.
///
/// Cuts on a char boundary and appends "..." when truncated.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
