//! Field checks shared by the request handlers.

use serde_json::{Map, Value};
use thiserror::Error;

/// A request body field is missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("Request body must be a JSON object")]
    NotObject,

    #[error("Missing field: {0}")]
    Missing(String),

    #[error("Invalid field: {0} (expected a number)")]
    NotNumber(String),

    #[error("Invalid field: {0} (expected a string)")]
    NotString(String),

    #[error("Invalid field: {field} (expected {expected})")]
    OutOfRange { field: String, expected: String },
}

pub fn as_object(body: &Value) -> Result<&Map<String, Value>, FieldError> {
    body.as_object().ok_or(FieldError::NotObject)
}

pub fn require<'a>(body: &'a Map<String, Value>, field: &str) -> Result<&'a Value, FieldError> {
    body.get(field).ok_or_else(|| FieldError::Missing(field.to_string()))
}

/// A present, numeric field. JSON `null` counts as present but not a number.
pub fn require_number(body: &Map<String, Value>, field: &str) -> Result<f64, FieldError> {
    require(body, field)?
        .as_f64()
        .ok_or_else(|| FieldError::NotNumber(field.to_string()))
}

pub fn require_str<'a>(body: &'a Map<String, Value>, field: &str) -> Result<&'a str, FieldError> {
    require(body, field)?
        .as_str()
        .ok_or_else(|| FieldError::NotString(field.to_string()))
}
