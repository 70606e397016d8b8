//! Prompt Construction
//!
//! Every extraction kind has a fixed template. Building a prompt is plain
//! `{placeholder}` substitution with no control flow:
//!
//! 1. Truncate the document to the input token budget
//! 2. Substitute `{text}` plus the kind's request parameters
//! 3. Pair the result with the shared system message
//!
//! ## Token Budget
//!
//! The budget uses a fixed heuristic of 2 characters per token, which is
//! conservative for CJK-heavy clinical text. Truncation always lands on a
//! char boundary.

mod templates;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::truncation;

/// Value substituted for a declared placeholder the caller did not supply
const MISSING_PARAM: &str = "not specified";

// =============================================================================
// Prompt Kind
// =============================================================================

/// Extraction kinds, each with its own template and output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Inclusion/exclusion criteria from a protocol
    Criteria,
    /// Visit schedule from a protocol
    VisitSchedule,
    /// Medications from a subject record
    Medications,
    /// Subject identifier from a subject record
    SubjectNumber,
    /// Per-visit dates from a subject record
    SubjectVisitDates,
    /// Per-visit performed items from a subject record
    SubjectVisitItems,
}

impl PromptKind {
    pub const ALL: [PromptKind; 6] = [
        PromptKind::Criteria,
        PromptKind::VisitSchedule,
        PromptKind::Medications,
        PromptKind::SubjectNumber,
        PromptKind::SubjectVisitDates,
        PromptKind::SubjectVisitItems,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::Criteria => "criteria",
            PromptKind::VisitSchedule => "visit_schedule",
            PromptKind::Medications => "medications",
            PromptKind::SubjectNumber => "subject_number",
            PromptKind::SubjectVisitDates => "subject_visit_dates",
            PromptKind::SubjectVisitItems => "subject_visit_items",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            PromptKind::Criteria => templates::CRITERIA,
            PromptKind::VisitSchedule => templates::VISIT_SCHEDULE,
            PromptKind::Medications => templates::MEDICATIONS,
            PromptKind::SubjectNumber => templates::SUBJECT_NUMBER,
            PromptKind::SubjectVisitDates => templates::SUBJECT_VISIT_DATES,
            PromptKind::SubjectVisitItems => templates::SUBJECT_VISIT_ITEMS,
        }
    }

    /// Request parameters this kind's template refers to
    pub fn params(&self) -> &'static [&'static str] {
        match self {
            PromptKind::Criteria | PromptKind::VisitSchedule | PromptKind::SubjectNumber => &[],
            PromptKind::Medications => &["subject"],
            PromptKind::SubjectVisitDates | PromptKind::SubjectVisitItems => {
                &["subject", "visits"]
            }
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PromptKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        PromptKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = PromptKind::ALL.iter().map(|k| k.as_str()).collect();
                format!(
                    "Unknown prompt kind: {}. Valid values: {}",
                    s,
                    valid.join(", ")
                )
            })
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// System and user messages ready for the transport
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
    /// Whether the document was cut to fit the token budget
    pub truncated: bool,
}

/// Build the prompt for `kind` from the document text and request parameters
pub fn render_prompt(
    kind: PromptKind,
    text: &str,
    params: &BTreeMap<String, String>,
    max_input_tokens: usize,
) -> RenderedPrompt {
    let (text, truncated) = truncate_to_token_budget(text, max_input_tokens);

    let mut vars: BTreeMap<&str, &str> = kind
        .params()
        .iter()
        .map(|name| {
            let value = params
                .get(*name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or(MISSING_PARAM);
            (*name, value)
        })
        .collect();
    vars.insert("text", text);

    RenderedPrompt {
        system: templates::SYSTEM.to_string(),
        user: substitute(kind.template(), &vars),
        truncated,
    }
}

/// Replace `{name}` tokens whose name is in `vars`.
///
/// Single pass: substituted values are never rescanned, and unknown or
/// malformed placeholders are copied through untouched.
pub fn substitute(template: &str, vars: &BTreeMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        if name_len > 0
            && after[name_len..].starts_with('}')
            && let Some(value) = vars.get(name)
        {
            out.push_str(value);
            rest = &after[name_len + 1..];
        } else {
            out.push('{');
            rest = after;
        }
    }

    out.push_str(rest);
    out
}

/// Cut `text` to at most `max_tokens * 2` characters on a char boundary
pub fn truncate_to_token_budget(text: &str, max_tokens: usize) -> (&str, bool) {
    let max_chars = max_tokens.saturating_mul(truncation::CHARS_PER_TOKEN);

    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            tracing::warn!(
                original_chars = text.chars().count(),
                kept_chars = max_chars,
                "Input exceeds token budget, truncating"
            );
            (&text[..byte_idx], true)
        }
        None => (text, false),
    }
}
