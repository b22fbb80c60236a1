// SPDX-License-Identifier: MIT OR Apache-2.0
//! The immutable response envelope returned by executors.

use crate::ContractError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Immutable response envelope crossing the queue boundary.
///
/// `success = false` implies `error` is present; the serialized form omits
/// `error` entirely on success.
///
/// # Examples
///
/// ```
/// use docpipe_core::ExecutionResult;
///
/// let failed = ExecutionResult::failure("LLM adapter timeout");
/// assert!(!failed.success);
/// assert_eq!(failed.error.as_deref(), Some("LLM adapter timeout"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionResult {
    /// Whether the operation succeeded.
    pub success: bool,

    /// Operation output.
    #[serde(default)]
    pub data: Map<String, Value>,

    /// Timing, metrics, and trace information.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Failure description; present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A successful result carrying `data`.
    #[must_use]
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data,
            metadata: Map::new(),
            error: None,
        }
    }

    /// A successful result with a single data entry.
    #[must_use]
    pub fn ok_entry(key: impl Into<String>, value: Value) -> Self {
        let mut data = Map::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// The idiomatic failure constructor.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Map::new(),
            metadata: Map::new(),
            error: Some(error.into()),
        }
    }

    /// A failure carrying extra metadata (timings, retry counters).
    #[must_use]
    pub fn failure_with(error: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            metadata,
            ..Self::failure(error)
        }
    }

    /// Insert a metadata entry, replacing any previous value.
    pub fn insert_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Check the failure-implies-error invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::FailureWithoutError`] when `success` is false
    /// and `error` is absent or empty.
    pub fn validate(&self) -> Result<(), ContractError> {
        if !self.success && self.error.as_deref().is_none_or(str::is_empty) {
            return Err(ContractError::FailureWithoutError);
        }
        Ok(())
    }

    /// Serialize to the JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if serialization fails.
    pub fn to_wire(&self) -> Result<Value, ContractError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from the JSON wire form, validating the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] on malformed input and
    /// [`ContractError::FailureWithoutError`] when a failed result carries
    /// no error message.
    pub fn from_wire(value: Value) -> Result<Self, ContractError> {
        let result: Self = serde_json::from_value(value)?;
        result.validate()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_round_trip() {
        let mut data = Map::new();
        data.insert("output".into(), json!({"key": "value"}));
        let mut original = ExecutionResult::ok(data);
        original.insert_metadata("tokens", json!(150));

        let restored = ExecutionResult::from_wire(original.to_wire().unwrap()).unwrap();
        assert_eq!(restored, original);
        assert!(restored.error.is_none());
    }

    #[test]
    fn failure_round_trip() {
        let mut metadata = Map::new();
        metadata.insert("retry_count".into(), json!(2));
        let original = ExecutionResult::failure_with("LLM adapter timeout", metadata);

        let restored = ExecutionResult::from_wire(original.to_wire().unwrap()).unwrap();
        assert!(!restored.success);
        assert_eq!(restored.error.as_deref(), Some("LLM adapter timeout"));
        assert!(restored.data.is_empty());
    }

    #[test]
    fn failure_without_error_rejected_at_wire() {
        let err = ExecutionResult::from_wire(json!({"success": false})).unwrap_err();
        assert!(err.to_string().contains("error message is required"));
    }

    #[test]
    fn error_omitted_from_success_wire_form() {
        let wire = ExecutionResult::ok_entry("k", json!("v")).to_wire().unwrap();
        assert!(wire.as_object().unwrap().get("error").is_none());
    }

    #[test]
    fn error_present_in_failure_wire_form() {
        let wire = ExecutionResult::failure("fail").to_wire().unwrap();
        assert_eq!(wire["error"], json!("fail"));
    }

    #[test]
    fn from_wire_defaults_missing_optionals() {
        let result = ExecutionResult::from_wire(json!({"success": true})).unwrap();
        assert!(result.data.is_empty());
        assert!(result.metadata.is_empty());
        assert!(result.error.is_none());
    }

    #[test]
    fn operation_response_contracts_hold() {
        let extract = ExecutionResult::ok_entry("extracted_text", json!("The quick brown fox"));
        assert!(extract.data.contains_key("extracted_text"));

        let index = ExecutionResult::ok_entry("doc_id", json!("doc-abc-123"));
        assert!(index.data.contains_key("doc_id"));

        let mut data = Map::new();
        data.insert("output".into(), json!({"field1": "value1"}));
        data.insert("metadata".into(), json!({"confidence": 0.95}));
        data.insert("metrics".into(), json!({"tokens": 200}));
        let answer = ExecutionResult::ok(data);
        for key in ["output", "metadata", "metrics"] {
            assert!(answer.data.contains_key(key));
        }
    }
}
