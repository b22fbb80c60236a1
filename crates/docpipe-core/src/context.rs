// SPDX-License-Identifier: MIT OR Apache-2.0
//! The immutable request envelope submitted to executors.

use crate::ContractError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Immutable request envelope crossing the queue boundary.
///
/// All fields except `organization_id`, `request_id`, and `executor_params`
/// must be non-empty. The `operation` and `execution_source` fields are
/// stored as their canonical lower-snake wire strings — construct with either
/// the enum or a raw string, both normalize to the same stored value.
///
/// # Examples
///
/// ```
/// use docpipe_core::{ExecutionContext, ExecutionSource, Operation};
///
/// let ctx = ExecutionContext::new(
///     "legacy",
///     Operation::Extract,
///     "run-001",
///     ExecutionSource::Tool,
/// )
/// .unwrap();
///
/// assert_eq!(ctx.operation, "extract");
/// assert!(!ctx.request_id.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionContext {
    /// Selects a registered executor (e.g. `"legacy"`).
    pub executor_name: String,

    /// Canonical operation wire value (e.g. `"extract"`).
    pub operation: String,

    /// Stable per-file-execution identifier; threads logs and adapter usage.
    pub run_id: String,

    /// Trigger surface: `"ide"`, `"tool"`, or `"api"`.
    pub execution_source: String,

    /// Tenant scope; absent for public calls.
    #[serde(default)]
    pub organization_id: Option<String>,

    /// Operation-specific payload.
    #[serde(default)]
    pub executor_params: Map<String, Value>,

    /// Trace identifier; generated when absent, never overwritten when
    /// supplied.
    #[serde(default = "generate_request_id")]
    pub request_id: String,
}

impl ExecutionContext {
    /// Build a validated context. `operation` and `execution_source` accept
    /// either the enum or a raw string.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::MissingField`] when any required field is
    /// empty.
    pub fn new(
        executor_name: impl Into<String>,
        operation: impl Into<String>,
        run_id: impl Into<String>,
        execution_source: impl Into<String>,
    ) -> Result<Self, ContractError> {
        let ctx = Self {
            executor_name: executor_name.into(),
            operation: operation.into(),
            run_id: run_id.into(),
            execution_source: execution_source.into(),
            organization_id: None,
            executor_params: Map::new(),
            request_id: generate_request_id(),
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// Attach an operation-specific payload.
    #[must_use]
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.executor_params = params;
        self
    }

    /// Scope the context to a tenant.
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Supply an explicit trace identifier.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Look up a parameter by key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.executor_params.get(key)
    }

    /// Check the required-field invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::MissingField`] naming the first empty field.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.executor_name.is_empty() {
            return Err(ContractError::MissingField {
                field: "executor_name",
            });
        }
        if self.operation.is_empty() {
            return Err(ContractError::MissingField { field: "operation" });
        }
        if self.run_id.is_empty() {
            return Err(ContractError::MissingField { field: "run_id" });
        }
        if self.execution_source.is_empty() {
            return Err(ContractError::MissingField {
                field: "execution_source",
            });
        }
        Ok(())
    }

    /// Serialize to the JSON wire form (a pure JSON object — queue safe).
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] if serialization fails.
    pub fn to_wire(&self) -> Result<Value, ContractError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserialize from the JSON wire form.
    ///
    /// Missing optional fields (`organization_id`, `executor_params`,
    /// `request_id`) are tolerated; a missing or empty `request_id` is
    /// auto-assigned.
    ///
    /// # Errors
    ///
    /// Returns [`ContractError::Json`] on malformed input and
    /// [`ContractError::MissingField`] when a required field is empty.
    pub fn from_wire(value: Value) -> Result<Self, ContractError> {
        let mut ctx: Self = serde_json::from_value(value)?;
        if ctx.request_id.is_empty() {
            ctx.request_id = generate_request_id();
        }
        ctx.validate()?;
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecutionSource, Operation};
    use serde_json::json;

    fn make_context() -> ExecutionContext {
        ExecutionContext::new("legacy", Operation::Extract, "run-001", ExecutionSource::Tool)
            .unwrap()
            .with_organization("org-123")
            .with_request_id("req-abc")
    }

    #[test]
    fn enum_values_normalize_to_wire_strings() {
        let ctx = ExecutionContext::new(
            "legacy",
            Operation::AnswerPrompt,
            "run-1",
            ExecutionSource::Ide,
        )
        .unwrap();
        assert_eq!(ctx.operation, "answer_prompt");
        assert_eq!(ctx.execution_source, "ide");
    }

    #[test]
    fn raw_strings_accepted_without_coercion() {
        let ctx = ExecutionContext::new("legacy", "custom_op", "run-1", "tool").unwrap();
        assert_eq!(ctx.operation, "custom_op");
    }

    #[test]
    fn request_id_auto_generated() {
        let ctx =
            ExecutionContext::new("legacy", Operation::Extract, "run-1", ExecutionSource::Tool)
                .unwrap();
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn explicit_request_id_preserved() {
        assert_eq!(make_context().request_id, "req-abc");
    }

    #[test]
    fn empty_required_fields_rejected() {
        for (field, ctx) in [
            (
                "executor_name",
                ExecutionContext::new("", "extract", "run-1", "tool"),
            ),
            (
                "operation",
                ExecutionContext::new("legacy", "", "run-1", "tool"),
            ),
            (
                "run_id",
                ExecutionContext::new("legacy", "extract", "", "tool"),
            ),
            (
                "execution_source",
                ExecutionContext::new("legacy", "extract", "run-1", ""),
            ),
        ] {
            let err = ctx.unwrap_err();
            assert!(err.to_string().contains(field), "expected {field} in {err}");
        }
    }

    #[test]
    fn wire_round_trip_preserves_every_field() {
        let mut params = Map::new();
        params.insert("file_path".into(), json!("/data/doc.pdf"));
        params.insert(
            "outputs".into(),
            json!([{"prompt_key": "p1"}, {"prompt_key": "p2"}]),
        );
        let original = make_context().with_params(params);

        let restored = ExecutionContext::from_wire(original.to_wire().unwrap()).unwrap();
        assert_eq!(restored, original);
    }

    #[test]
    fn from_wire_tolerates_missing_optionals() {
        let ctx = ExecutionContext::from_wire(json!({
            "executor_name": "legacy",
            "operation": "extract",
            "run_id": "run-001",
            "execution_source": "tool",
        }))
        .unwrap();
        assert_eq!(ctx.organization_id, None);
        assert!(ctx.executor_params.is_empty());
        assert!(!ctx.request_id.is_empty());
    }

    #[test]
    fn organization_id_serialized_as_null_when_absent() {
        let ctx =
            ExecutionContext::new("legacy", Operation::Extract, "run-1", ExecutionSource::Tool)
                .unwrap();
        let wire = ctx.to_wire().unwrap();
        assert_eq!(wire["organization_id"], Value::Null);
    }
}
