//! Hydration errors

use thiserror::Error;

/// Errors raised while rebuilding a record from its serialized form
#[derive(Debug, Error)]
pub enum HydrateError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

impl HydrateError {
    /// Build a `NotAnObject` error naming the JSON type that was found
    pub(crate) fn not_an_object(value: &serde_json::Value) -> Self {
        let found = match value {
            serde_json::Value::Null => "null",
            serde_json::Value::Bool(_) => "boolean",
            serde_json::Value::Number(_) => "number",
            serde_json::Value::String(_) => "string",
            serde_json::Value::Array(_) => "array",
            serde_json::Value::Object(_) => "object",
        };
        HydrateError::NotAnObject(found)
    }
}
