//! Generic model JSON -> typed records.
//!
//! Arrays are read leniently: an item that cannot be turned into a record is
//! skipped, a missing top-level key yields an empty list, and only a non-object
//! root fails the whole extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{
    Criterion, CriterionCategory, Extraction, Medication, RecordedDate, ReviewStatus,
    SubjectNumber, SubjectVisitDate, SubjectVisitItem, Visit,
};
use crate::ai::prompt::PromptKind;
use crate::types::{GatewayError, GatewayResult, json_bool, json_string, json_string_array};

/// "1. text", "2) text", "3a、text"
static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+[a-zA-Z]?)\s*[.)、:]\s*(\S.*)$").expect("valid numbered-item regex")
});

/// Map a parsed model response onto the typed shape for `kind`
pub fn transform(kind: PromptKind, value: &Value) -> GatewayResult<Extraction> {
    if !value.is_object() {
        return Err(GatewayError::parse_failed(
            format!("Expected a JSON object for {}", kind),
            &value.to_string(),
        ));
    }

    let extraction = match kind {
        PromptKind::Criteria => {
            let mut criteria = lenient_items(value, "inclusion_criteria", |item| {
                parse_criterion(item, CriterionCategory::Inclusion)
            });
            criteria.extend(lenient_items(value, "exclusion_criteria", |item| {
                parse_criterion(item, CriterionCategory::Exclusion)
            }));
            Extraction::Criteria(criteria)
        }
        PromptKind::VisitSchedule => {
            Extraction::VisitSchedule(lenient_items(value, "visits", parse_visit))
        }
        PromptKind::Medications => {
            Extraction::Medications(lenient_items(value, "medications", parse_medication))
        }
        PromptKind::SubjectNumber => Extraction::SubjectNumber(SubjectNumber {
            value: json_string(value, "subject_number"),
            review: ReviewStatus::AiPending,
        }),
        PromptKind::SubjectVisitDates => Extraction::SubjectVisitDates(lenient_items(
            value,
            "visit_dates",
            parse_visit_date,
        )),
        PromptKind::SubjectVisitItems => Extraction::SubjectVisitItems(lenient_items(
            value,
            "visit_items",
            parse_visit_item,
        )),
    };

    debug!(kind = %kind, records = extraction.len(), "Transformed model output");
    Ok(extraction)
}

/// Collect the array under `key`, skipping items `parse` rejects
fn lenient_items<T>(value: &Value, key: &str, parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    let items = match value.get(key) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => return Vec::new(),
        Some(other) => {
            warn!(key, found = json_type(other), "Expected an array, ignoring");
            return Vec::new();
        }
    };

    let parsed: Vec<T> = items.iter().filter_map(&parse).collect();
    let skipped = items.len() - parsed.len();
    if skipped > 0 {
        warn!(key, skipped, kept = parsed.len(), "Skipped malformed items");
    }
    parsed
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn json_date(value: &Value, key: &str) -> Option<RecordedDate> {
    json_string(value, key).map(|raw| RecordedDate::parse(&raw))
}

// =============================================================================
// Per-kind parsers
// =============================================================================

fn parse_criterion(item: &Value, category: CriterionCategory) -> Option<Criterion> {
    let (number, text) = match item {
        Value::String(s) => split_numbered(s)?,
        Value::Object(_) => {
            let text = json_string(item, "text").or_else(|| json_string(item, "content"))?;
            (json_string(item, "number"), text)
        }
        _ => return None,
    };

    Some(Criterion {
        category,
        number,
        text,
        review: ReviewStatus::AiPending,
    })
}

fn split_numbered(s: &str) -> Option<(Option<String>, String)> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    match NUMBERED_ITEM.captures(trimmed) {
        Some(caps) => Some((Some(caps[1].to_string()), caps[2].trim().to_string())),
        None => Some((None, trimmed.to_string())),
    }
}

fn parse_visit(item: &Value) -> Option<Visit> {
    Some(Visit {
        name: json_string(item, "name")?,
        day: json_string(item, "day"),
        window: json_string(item, "window"),
        procedures: json_string_array(item, "procedures"),
        assessments: json_string_array(item, "assessments"),
        review: ReviewStatus::AiPending,
    })
}

fn parse_medication(item: &Value) -> Option<Medication> {
    let end_date = json_date(item, "end_date");
    let ongoing = json_bool(item, "ongoing", end_date.is_none());

    Some(Medication {
        name: json_string(item, "name")?,
        dose: json_string(item, "dose"),
        unit: json_string(item, "unit"),
        route: json_string(item, "route"),
        frequency: json_string(item, "frequency"),
        start_date: json_date(item, "start_date"),
        end_date,
        indication: json_string(item, "indication"),
        ongoing,
        review: ReviewStatus::AiPending,
    })
}

fn parse_visit_date(item: &Value) -> Option<SubjectVisitDate> {
    Some(SubjectVisitDate {
        visit_name: json_string(item, "visit_name")?,
        date: json_date(item, "date"),
        review: ReviewStatus::AiPending,
    })
}

fn parse_visit_item(item: &Value) -> Option<SubjectVisitItem> {
    Some(SubjectVisitItem {
        visit_name: json_string(item, "visit_name")?,
        item: json_string(item, "item")?,
        performed: json_bool(item, "performed", false),
        date: json_date(item, "date"),
        result: json_string(item, "result"),
        review: ReviewStatus::AiPending,
    })
}
