// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed access into `executor_params`.

use serde_json::{Map, Value};

/// Read-only view over an operation payload.
#[derive(Clone, Copy)]
pub(crate) struct Params<'a>(pub &'a Map<String, Value>);

impl<'a> Params<'a> {
    pub(crate) fn str(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub(crate) fn string_or_empty(&self, key: &str) -> String {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    pub(crate) fn u32_or(&self, key: &str, default: u32) -> u32 {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(default)
    }

    pub(crate) fn bool_or(&self, key: &str, default: bool) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    pub(crate) fn array(&self, key: &str) -> &'a [Value] {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn object(&self, key: &str) -> Map<String, Value> {
        self.0
            .get(key)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn value(&self, key: &str) -> Option<&'a Value> {
        self.0.get(key)
    }

    /// Collect the subset of `keys` that are missing or empty.
    pub(crate) fn missing(&self, keys: &[&'static str]) -> Vec<&'static str> {
        keys.iter()
            .filter(|key| self.str(key).is_none())
            .copied()
            .collect()
    }
}

/// Render a missing-params failure message.
pub(crate) fn missing_params_error(missing: &[&'static str]) -> String {
    format!("Missing required params: {}", missing.join(", "))
}
