//! JSON Repair Mechanism
//!
//! Unified JSON extraction and repair for model responses.
//!
//! Handles the damage hosted models actually produce:
//! - Markdown code fence wrapping (```json ... ``` or bare ```)
//! - JSON embedded in explanatory text
//! - Trailing commas
//! - Output cut off mid-string, mid-key or mid-value
//! - Missing closing braces/brackets
//!
//! Repair assumes the only damage is truncation near the end of the payload.
//! Corruption in the middle of the document is not detected and can yield
//! structurally valid but wrong data.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{GatewayError, GatewayResult};

static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```json[ \t]*\r?\n?(.*?)(?:```|\z)").expect("json fence pattern is valid")
});

static GENERIC_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*\r?\n?(.*?)(?:```|\z)").expect("fence pattern is valid")
});

// =============================================================================
// Convenience Functions
// =============================================================================

/// Extract and parse JSON from a model response
///
/// This is the primary entry point for parsing model output.
/// Returns the parsed value and whether the repair pass was needed.
pub fn parse_model_json(raw: &str) -> GatewayResult<(Value, bool)> {
    let candidate = extract_json_block(raw);

    if candidate.is_empty() {
        return Err(GatewayError::parse_failed(
            "response contains no JSON object",
            raw,
        ));
    }

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok((value, false));
    }

    debug!("Initial JSON parse failed, attempting repair");
    let repaired = repair_json(candidate);

    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            warn!(
                original_len = candidate.len(),
                repaired_len = repaired.len(),
                "Model JSON repaired"
            );
            Ok((value, true))
        }
        Err(e) => Err(GatewayError::parse_failed(
            format!("JSON still invalid after repair: {}", e),
            raw,
        )),
    }
}

/// Locate the JSON payload inside a raw model response.
///
/// Order: ```json fenced block, then a bare ``` fenced block, then the first
/// `{...}` span. An unterminated fence (truncated output) runs to the end.
/// Prose after the first complete top-level value is dropped.
pub fn extract_json_block(raw: &str) -> &str {
    let raw = raw.trim_start_matches('\u{feff}');

    let fenced = JSON_FENCE
        .captures(raw)
        .or_else(|| GENERIC_FENCE.captures(raw))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim());

    let body = fenced.unwrap_or(raw).trim();

    let start = if body.starts_with('[') {
        0
    } else {
        match body.find('{') {
            Some(start) => start,
            None => return "",
        }
    };

    value_span(&body[start..])
}

/// Leading `{...}` or `[...]` up to its matching closer, or the whole
/// (truncated) text when the value never closes
fn value_span(s: &str) -> &str {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &s[..=i];
                }
            }
            _ => {}
        }
    }

    s.trim_end()
}

// =============================================================================
// Repair Pass
// =============================================================================

/// Best-effort repair of truncated JSON text.
///
/// Pure string-in, string-out. Steps, in order:
/// 1. Drop trailing commas before `]` / `}`
/// 2. Close an unterminated string literal
/// 3. Strip a trailing incomplete key/value pair
/// 4. Append missing closers, innermost first
///
/// Valid JSON passes through unchanged.
pub fn repair_json(s: &str) -> String {
    let result = remove_trailing_commas(s);
    let result = close_dangling_string(result);
    let result = strip_incomplete_tail(result);
    append_missing_closers(result)
}

/// Scanner state at the end of a JSON fragment
struct Scan {
    /// Unmatched openers, outermost first
    stack: Vec<char>,
    in_string: bool,
    escape_pending: bool,
    last_string: Option<StringSpan>,
}

/// Most recently opened string literal
#[derive(Clone, Copy)]
struct StringSpan {
    /// Byte offset of the opening quote
    start: usize,
    /// Opened in key position of an object
    is_key: bool,
}

fn scan(s: &str) -> Scan {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut last_significant: Option<char> = None;
    let mut last_string = None;

    for (i, ch) in s.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
                last_significant = Some('"');
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                let is_key = stack.last() == Some(&'{')
                    && matches!(last_significant, Some('{') | Some(','));
                last_string = Some(StringSpan { start: i, is_key });
            }
            '{' | '[' => {
                stack.push(ch);
                last_significant = Some(ch);
            }
            '}' | ']' => {
                stack.pop();
                last_significant = Some(ch);
            }
            c if c.is_whitespace() => {}
            c => last_significant = Some(c),
        }
    }

    Scan {
        stack,
        in_string,
        escape_pending: escape,
        last_string,
    }
}

/// Remove commas directly followed (modulo whitespace) by `]` or `}`
fn remove_trailing_commas(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len());
    let mut in_string = false;
    let mut escape = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            result.push(ch);
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some(']') | Some('}')) {
                continue;
            }
        }

        result.push(ch);
    }

    result
}

/// Close a string literal left open by truncation.
///
/// A dangling backslash or a partial `\uXXXX` escape is dropped first so the
/// closing quote is not swallowed by the escape.
fn close_dangling_string(mut s: String) -> String {
    let state = scan(&s);
    if !state.in_string {
        return s;
    }

    if state.escape_pending {
        s.pop();
    }

    if let Some(span) = state.last_string
        && let Some(cut) = partial_unicode_escape(&s[span.start + 1..])
    {
        s.truncate(span.start + 1 + cut);
    }

    s.push('"');
    s
}

/// Offset of a trailing, incomplete `\u` escape within open string content
fn partial_unicode_escape(content: &str) -> Option<usize> {
    let idx = content.rfind("\\u")?;
    let tail = &content[idx + 2..];
    if tail.len() >= 4 || !tail.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    // The backslash must itself be unescaped
    let preceding = content[..idx].chars().rev().take_while(|&c| c == '\\').count();
    if preceding % 2 == 0 { Some(idx) } else { None }
}

/// Strip whatever incomplete key/value fragment truncation left at the end.
///
/// Handles dangling `,` and `:`, bare object keys, partial `true`/`false`/`null`
/// literals and numbers cut after a sign, dot or exponent marker.
fn strip_incomplete_tail(mut s: String) -> String {
    loop {
        let trimmed = s.trim_end().len();
        s.truncate(trimmed);

        let Some(last) = s.chars().last() else {
            break;
        };

        match last {
            ',' | ':' | '-' | '+' | '.' => {
                s.pop();
            }
            '"' => match scan(&s).last_string {
                Some(span) if span.is_key => s.truncate(span.start),
                _ => break,
            },
            'e' | 'E' if preceded_by_digit(&s) => {
                s.pop();
            }
            c if c.is_ascii_alphabetic() => {
                let word_start = s
                    .char_indices()
                    .rev()
                    .take_while(|(_, c)| c.is_ascii_alphabetic())
                    .last()
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                if is_partial_literal(&s[word_start..]) {
                    s.truncate(word_start);
                } else {
                    break;
                }
            }
            _ => break,
        }
    }

    s
}

fn preceded_by_digit(s: &str) -> bool {
    let mut rev = s.chars().rev();
    rev.next();
    rev.next().is_some_and(|c| c.is_ascii_digit() || c == '.')
}

fn is_partial_literal(word: &str) -> bool {
    ["true", "false", "null"]
        .iter()
        .any(|lit| lit.len() > word.len() && lit.starts_with(word))
}

/// Append closers for every unmatched opener, innermost first
fn append_missing_closers(mut s: String) -> String {
    let state = scan(&s);
    for opener in state.stack.iter().rev() {
        s.push(if *opener == '{' { '}' } else { ']' });
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn repaired_value(input: &str) -> Value {
        serde_json::from_str(&repair_json(input))
            .unwrap_or_else(|e| panic!("repair of {input:?} produced invalid JSON: {e}"))
    }

    #[test]
    fn test_parse_valid_json() {
        let (value, repaired) = parse_model_json(r#"{"key": "value"}"#).unwrap();
        assert!(!repaired);
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_strip_json_fence() {
        let input = "Here you go:\n```json\n{\"key\": \"value\"}\n```\nDone.";
        let (value, repaired) = parse_model_json(input).unwrap();
        assert!(!repaired);
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_strip_generic_fence() {
        let input = "```\n{\"key\": 1}\n```";
        assert_eq!(extract_json_block(input), "{\"key\": 1}");
    }

    #[test]
    fn test_unterminated_fence_is_truncated_output() {
        let input = "```json\n{\"visits\": [{\"name\": \"Screening\"}";
        let (value, repaired) = parse_model_json(input).unwrap();
        assert!(repaired);
        assert_eq!(value["visits"][0]["name"], "Screening");
    }

    #[test]
    fn test_extract_from_mixed() {
        let input = r#"Sure! The criteria are {"inclusion_criteria": []} hope it helps"#;
        assert_eq!(extract_json_block(input), r#"{"inclusion_criteria": []}"#);
    }

    #[test]
    fn test_note_after_unfenced_json_is_dropped() {
        let input = "{\"subject_number\": \"01-003\"}\n\nNote: the number appears on page 2.";
        assert_eq!(extract_json_block(input), r#"{"subject_number": "01-003"}"#);

        let (value, repaired) = parse_model_json(input).unwrap();
        assert!(!repaired);
        assert_eq!(value["subject_number"], "01-003");
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_the_value() {
        let input = r#"{"text": "see {note} and \"}\"", "n": 1} trailing {x}"#;
        let (value, _) = parse_model_json(input).unwrap();
        assert_eq!(value["n"], 1);
        assert_eq!(value["text"], "see {note} and \"}\"");
    }

    #[test]
    fn test_no_json_is_parse_failure() {
        let err = parse_model_json("I could not find any medications.").unwrap_err();
        assert!(matches!(err, GatewayError::ParseFailed { .. }));
    }

    #[test]
    fn test_fix_trailing_comma() {
        assert_eq!(
            repaired_value(r#"{"files": [{"path": "a"},], }"#),
            json!({"files": [{"path": "a"}]})
        );
    }

    #[test]
    fn test_trailing_comma_inside_string_untouched() {
        let input = r#"{"text": "a,]", "n": 1}"#;
        assert_eq!(repair_json(input), input);
    }

    #[test]
    fn test_missing_braces() {
        assert_eq!(
            repaired_value(r#"{"a": {"b": {"c": 1"#),
            json!({"a": {"b": {"c": 1}}})
        );
    }

    #[test]
    fn test_missing_brackets() {
        assert_eq!(repaired_value(r#"[[[1, 2"#), json!([[[1, 2]]]));
    }

    #[test]
    fn test_innermost_closer_first() {
        assert_eq!(
            repair_json(r#"{"visits": [{"procedures": ["ECG""#),
            r#"{"visits": [{"procedures": ["ECG"]}]}"#
        );
    }

    #[test]
    fn test_unterminated_string_value() {
        assert_eq!(
            repaired_value(r#"{"name": "Metfor"#),
            json!({"name": "Metfor"})
        );
    }

    #[test]
    fn test_unterminated_key_is_dropped() {
        assert_eq!(
            repaired_value(r#"{"name": "Metformin", "do"#),
            json!({"name": "Metformin"})
        );
    }

    #[test]
    fn test_dangling_colon_is_dropped() {
        assert_eq!(
            repaired_value(r#"{"name": "Metformin", "dose":"#),
            json!({"name": "Metformin"})
        );
    }

    #[test]
    fn test_partial_literals() {
        assert_eq!(
            repaired_value(r#"{"a": true, "b": fal"#),
            json!({"a": true})
        );
        assert_eq!(repaired_value(r#"[1, nu"#), json!([1]));
        assert_eq!(repaired_value(r#"{"ok": true"#), json!({"ok": true}));
    }

    #[test]
    fn test_partial_numbers() {
        assert_eq!(repaired_value(r#"{"a": 1."#), json!({"a": 1}));
        assert_eq!(repaired_value(r#"{"a": -"#), json!({}));
        assert_eq!(repaired_value(r#"{"a": 2e+"#), json!({"a": 2}));
    }

    #[test]
    fn test_dangling_escape() {
        assert_eq!(repaired_value(r#"{"a": "x\"#), json!({"a": "x"}));
        assert_eq!(repaired_value(r#"{"a": "x\u00"#), json!({"a": "x"}));
        assert_eq!(repaired_value(r#"{"a": "x\\"#), json!({"a": "x\\"}));
    }

    #[test]
    fn test_truncated_mid_array() {
        // {"a": 1, "b": [1, 2,  ->  b closed as [1, 2]
        let (value, repaired) = parse_model_json(r#"{"a": 1, "b": [1, 2,"#).unwrap();
        assert!(repaired);
        assert_eq!(value, json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn test_combined_damage() {
        let input = r#"{"medications": [{"name": "Aspirin", "dose": "100 mg",}, {"name": "Ibupro"#;
        let value = repaired_value(input);
        assert_eq!(value["medications"][0]["dose"], "100 mg");
        assert_eq!(value["medications"][1]["name"], "Ibupro");
    }

    #[test]
    fn test_valid_json_unchanged() {
        for input in [
            r#"{"a": [1, 2, {"b": "c,}"}], "d": null}"#,
            r#"[true, false, null, -1.5e3, "\"q\""]"#,
            r#"{}"#,
        ] {
            assert_eq!(repair_json(input), input);
        }
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            (-1000.0f64..1000.0).prop_map(|f| json!(f)),
            "[a-zA-Z0-9 ,:{}\\[\\]\"\\\\é]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z\"]{0,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_valid_json_is_never_altered(value in arb_json()) {
            let text = serde_json::to_string(&value).unwrap();
            prop_assert_eq!(repair_json(&text), text);
        }

        #[test]
        fn prop_any_truncation_repairs_to_valid_json(
            map in prop::collection::btree_map("[a-z]{1,4}", arb_json(), 1..4),
            cut in any::<prop::sample::Index>(),
        ) {
            let text = serde_json::to_string(&Value::Object(map.into_iter().collect())).unwrap();
            let boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).skip(1).collect();
            let end = boundaries[cut.index(boundaries.len())];
            let repaired = repair_json(&text[..end]);
            prop_assert!(
                serde_json::from_str::<Value>(&repaired).is_ok(),
                "prefix {:?} repaired to invalid {:?}", &text[..end], repaired
            );
        }

        #[test]
        fn prop_completed_entries_survive_truncation(
            map in prop::collection::btree_map("[a-z]{1,4}", arb_json(), 2..5),
            extra in "[a-z]{1,6}",
        ) {
            // Truncate inside a final string entry; all earlier entries must survive.
            let full = serde_json::to_string(&Value::Object(map.clone().into_iter().collect())).unwrap();
            let expected: Value = serde_json::from_str(&full).unwrap();
            let mut text = full.clone();
            text.pop();
            text.push_str(&format!(",\"zzzzz\":\"{}", extra));
            let value: Value = serde_json::from_str(&repair_json(&text)).unwrap();
            for k in map.keys() {
                prop_assert_eq!(&value[k], &expected[k]);
            }
            prop_assert_eq!(&value["zzzzz"], &json!(extra));
        }
    }
}
