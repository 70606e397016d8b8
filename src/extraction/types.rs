//! Typed extraction records.
//!
//! Every record produced from model output starts as
//! [`ReviewStatus::AiPending`]; only a reviewer moves it to `Confirmed` or
//! `UserEdited`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ai::prompt::PromptKind;
use crate::types::{ErrorInfo, GatewayResult};

// =============================================================================
// Request
// =============================================================================

/// One extraction: document text, kind, and template parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub raw_text: String,
    pub prompt_kind: PromptKind,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ExtractionRequest {
    pub fn new(prompt_kind: PromptKind, raw_text: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            prompt_kind,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Review Flag
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Produced by the model, not yet seen by a reviewer
    #[default]
    AiPending,
    /// Accepted unchanged by a reviewer
    Confirmed,
    /// Corrected by a reviewer
    UserEdited,
}

impl ReviewStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ReviewStatus::AiPending)
    }

    /// Accept the value; edited records stay edited
    pub fn confirm(&mut self) {
        if self.is_pending() {
            *self = ReviewStatus::Confirmed;
        }
    }

    pub fn mark_edited(&mut self) {
        *self = ReviewStatus::UserEdited;
    }
}

// =============================================================================
// Dates
// =============================================================================

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d-%b-%Y",
    "%d/%m/%Y",
    "%Y年%m月%d日",
];

/// A date as written in the source, with its parsed value when unambiguous
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedDate {
    pub raw: String,
    pub date: Option<NaiveDate>,
}

impl RecordedDate {
    /// Parse common clinical date layouts; partial or unknown layouts keep only `raw`
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let date = DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok());
        Self {
            raw: raw.to_string(),
            date,
        }
    }
}

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionCategory {
    Inclusion,
    Exclusion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub category: CriterionCategory,
    pub number: Option<String>,
    pub text: String,
    pub review: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub name: String,
    /// Nominal study day as written ("-28", "1")
    pub day: Option<String>,
    /// Allowed deviation ("±3 days")
    pub window: Option<String>,
    pub procedures: Vec<String>,
    pub assessments: Vec<String>,
    pub review: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    pub dose: Option<String>,
    pub unit: Option<String>,
    pub route: Option<String>,
    pub frequency: Option<String>,
    pub start_date: Option<RecordedDate>,
    pub end_date: Option<RecordedDate>,
    pub indication: Option<String>,
    pub ongoing: bool,
    pub review: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectNumber {
    /// `None` when the record carries no subject number
    pub value: Option<String>,
    pub review: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectVisitDate {
    pub visit_name: String,
    pub date: Option<RecordedDate>,
    pub review: ReviewStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectVisitItem {
    pub visit_name: String,
    pub item: String,
    pub performed: bool,
    pub date: Option<RecordedDate>,
    pub result: Option<String>,
    pub review: ReviewStatus,
}

// =============================================================================
// Extraction
// =============================================================================

/// Typed result of one extraction, one variant per [`PromptKind`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum Extraction {
    Criteria(Vec<Criterion>),
    VisitSchedule(Vec<Visit>),
    Medications(Vec<Medication>),
    SubjectNumber(SubjectNumber),
    SubjectVisitDates(Vec<SubjectVisitDate>),
    SubjectVisitItems(Vec<SubjectVisitItem>),
}

impl Extraction {
    pub fn kind(&self) -> PromptKind {
        match self {
            Extraction::Criteria(_) => PromptKind::Criteria,
            Extraction::VisitSchedule(_) => PromptKind::VisitSchedule,
            Extraction::Medications(_) => PromptKind::Medications,
            Extraction::SubjectNumber(_) => PromptKind::SubjectNumber,
            Extraction::SubjectVisitDates(_) => PromptKind::SubjectVisitDates,
            Extraction::SubjectVisitItems(_) => PromptKind::SubjectVisitItems,
        }
    }

    /// Number of extracted records
    pub fn len(&self) -> usize {
        match self {
            Extraction::Criteria(items) => items.len(),
            Extraction::VisitSchedule(items) => items.len(),
            Extraction::Medications(items) => items.len(),
            Extraction::SubjectNumber(number) => usize::from(number.value.is_some()),
            Extraction::SubjectVisitDates(items) => items.len(),
            Extraction::SubjectVisitItems(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Serializable tagged union handed to consumers:
/// `{"status":"ok","data":...}` or `{"status":"error","error":{...}}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome<T> {
    Ok { data: T },
    Error { error: ErrorInfo },
}

impl<T> From<GatewayResult<T>> for ExtractionOutcome<T> {
    fn from(result: GatewayResult<T>) -> Self {
        match result {
            Ok(data) => ExtractionOutcome::Ok { data },
            Err(err) => ExtractionOutcome::Error {
                error: err.to_info(),
            },
        }
    }
}
