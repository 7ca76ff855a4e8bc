//! Advisory record recovered from generated text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Explanation used when no strategy could read the generated text.
pub const PARSE_FAILED: &str = "parse failed";

/// Install/hold advice with a 0..1 score.
///
/// Always fully populated: fields that could not be read carry the
/// degraded defaults (empty string, 0, empty string) instead of being absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResult {
    pub final_recommendation: String,
    pub score: f64,
    pub explanation_text: String,
}

impl AdvisoryResult {
    /// The record returned when recovery fails outright.
    pub fn parse_failed() -> Self {
        Self {
            final_recommendation: String::new(),
            score: 0.0,
            explanation_text: PARSE_FAILED.to_string(),
        }
    }

    /// Read the three fields out of a JSON object, defaulting any that are
    /// missing or of the wrong type.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let score = match object.get("score") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            // Generated text sometimes quotes the score.
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        Self {
            final_recommendation: text("final_recommendation"),
            score,
            explanation_text: text("explanation_text"),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.final_recommendation.is_empty() && self.explanation_text == PARSE_FAILED
    }
}
