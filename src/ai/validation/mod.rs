//! Model Response Validation
//!
//! Turns raw model output into a JSON value:
//! - Fenced-block and embedded-object extraction
//! - Best-effort repair of truncated JSON
//!
//! ## Design Philosophy
//! - Strict parse first; repair is only a fallback
//! - Repair is a pure string function, testable in isolation
//! - Failures carry a bounded excerpt of the raw response

mod json_repair;

pub use json_repair::{extract_json_block, parse_model_json, repair_json};

use serde_json::Value;

use crate::types::GatewayResult;

/// Parsed model response
#[derive(Debug, Clone)]
pub struct ProcessedResponse {
    /// Parsed (and possibly repaired) JSON value
    pub value: Value,
    /// Whether the repair pass was needed
    pub was_repaired: bool,
}

impl ProcessedResponse {
    /// Parse raw model content, repairing truncation if necessary
    pub fn from_raw(raw: &str) -> GatewayResult<Self> {
        let (value, was_repaired) = parse_model_json(raw)?;
        Ok(Self {
            value,
            was_repaired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processed_valid_response() {
        let processed = ProcessedResponse::from_raw(r#"{"subject_number": "01-003"}"#).unwrap();
        assert!(!processed.was_repaired);
        assert_eq!(processed.value["subject_number"], "01-003");
    }

    #[test]
    fn test_processed_repairs_json() {
        let processed = ProcessedResponse::from_raw(r#"{"visits": [{"name": "V1"}"#).unwrap();
        assert!(processed.was_repaired);
    }
}
