// SPDX-License-Identifier: MIT OR Apache-2.0
//! `{{variable}}` template replacement.
//!
//! Two flavours: static variables resolved against the structured output
//! accumulated so far, and `{{custom_data.key}}` variables resolved against
//! caller-supplied custom data. Missing custom-data keys are a hard error;
//! unknown static variables are left untouched.

use crate::error::LegacyExecutorError;
use serde_json::{Map, Value};

/// Stateless `{{…}}` replacement service.
pub struct VariableReplacementService;

const CUSTOM_DATA_PREFIX: &str = "custom_data.";

impl VariableReplacementService {
    /// Whether the text contains any `{{…}}` occurrence.
    #[must_use]
    pub fn is_variables_present(text: &str) -> bool {
        !find_variables(text).is_empty()
    }

    /// Replace every `{{…}}` occurrence in `prompt`.
    ///
    /// # Errors
    ///
    /// [`LegacyExecutorError::CustomData`] when a `{{custom_data.key}}`
    /// variable references a key absent from `custom_data`.
    pub fn replace_variables_in_prompt(
        prompt: &str,
        structured_output: &Map<String, Value>,
        custom_data: &Map<String, Value>,
    ) -> Result<String, LegacyExecutorError> {
        let mut replaced = prompt.to_string();
        for variable in find_variables(prompt) {
            replaced = if variable.starts_with(CUSTOM_DATA_PREFIX) {
                Self::replace_custom_data_variable(&replaced, &variable, custom_data)?
            } else {
                Self::replace_static_variable(&replaced, structured_output, &variable)
            };
        }
        Ok(replaced)
    }

    /// Substitute one static variable from the structured output. Unknown
    /// variables are left in place.
    #[must_use]
    pub fn replace_static_variable(
        prompt: &str,
        structured_output: &Map<String, Value>,
        variable: &str,
    ) -> String {
        match structured_output.get(variable) {
            Some(value) => prompt.replace(&format!("{{{{{variable}}}}}"), &render_value(value)),
            None => prompt.to_string(),
        }
    }

    /// Substitute one `custom_data.*` variable.
    ///
    /// # Errors
    ///
    /// [`LegacyExecutorError::CustomData`] when the key is absent.
    pub fn replace_custom_data_variable(
        prompt: &str,
        variable: &str,
        custom_data: &Map<String, Value>,
    ) -> Result<String, LegacyExecutorError> {
        let key = variable.trim_start_matches(CUSTOM_DATA_PREFIX);
        let value = custom_data
            .get(key)
            .ok_or_else(|| LegacyExecutorError::CustomData {
                key: key.to_string(),
                variable: variable.to_string(),
            })?;
        Ok(prompt.replace(&format!("{{{{{variable}}}}}"), &render_value(value)))
    }
}

/// Scan for `{{…}}` variable names, in order of appearance.
fn find_variables(text: &str) -> Vec<String> {
    let mut variables = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            break;
        };
        let name = after[..close].trim();
        if !name.is_empty() {
            variables.push(name.to_string());
        }
        rest = &after[close + 2..];
    }
    variables
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn detects_variables() {
        assert!(VariableReplacementService::is_variables_present("Hello {{name}}"));
        assert!(!VariableReplacementService::is_variables_present("Hello world"));
        assert!(!VariableReplacementService::is_variables_present("Hello {name}"));
    }

    #[test]
    fn replaces_static_variable() {
        let result = VariableReplacementService::replace_static_variable(
            "Total is {{revenue}}",
            &object(json!({"revenue": "$1M"})),
            "revenue",
        );
        assert_eq!(result, "Total is $1M");
    }

    #[test]
    fn unknown_static_variable_left_in_place() {
        let result = VariableReplacementService::replace_static_variable(
            "Total is {{revenue}}",
            &Map::new(),
            "revenue",
        );
        assert_eq!(result, "Total is {{revenue}}");
    }

    #[test]
    fn replaces_custom_data_variable() {
        let result = VariableReplacementService::replace_custom_data_variable(
            "Company: {{custom_data.company_name}}",
            "custom_data.company_name",
            &object(json!({"company_name": "Acme Inc"})),
        )
        .unwrap();
        assert_eq!(result, "Company: Acme Inc");
    }

    #[test]
    fn missing_custom_data_key_errors() {
        let err = VariableReplacementService::replace_custom_data_variable(
            "{{custom_data.missing}}",
            "custom_data.missing",
            &object(json!({"other": "value"})),
        )
        .unwrap_err();
        assert!(matches!(err, LegacyExecutorError::CustomData { .. }));
    }

    #[test]
    fn replaces_mixed_variables_in_one_pass() {
        let result = VariableReplacementService::replace_variables_in_prompt(
            "{{greeting}}, {{custom_data.name}}!",
            &object(json!({"greeting": "Hello"})),
            &object(json!({"name": "Acme"})),
        )
        .unwrap();
        assert_eq!(result, "Hello, Acme!");
    }

    #[test]
    fn non_string_values_render_as_json() {
        let result = VariableReplacementService::replace_static_variable(
            "Count: {{total}}",
            &object(json!({"total": 42})),
            "total",
        );
        assert_eq!(result, "Count: 42");
    }
}
