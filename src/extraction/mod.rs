//! Extraction Records
//!
//! Typed output of the gateway and the per-kind transformation from generic
//! model JSON. Records are stamped as AI-originated until a reviewer confirms
//! or edits them.

mod transform;
mod types;

pub use transform::transform;
pub use types::{
    Criterion, CriterionCategory, Extraction, ExtractionOutcome, ExtractionRequest, Medication,
    RecordedDate, ReviewStatus, SubjectNumber, SubjectVisitDate, SubjectVisitItem, Visit,
};
