// SPDX-License-Identifier: MIT OR Apache-2.0
//! `METADATA.json` handling.
//!
//! The metadata file may already exist when a worker wants to create it — an
//! earlier tool pass can have written tool-produced metadata there. The rule
//! on every write path: existing content wins, writers only add.

use crate::{ExecutionPaths, FileStore, StorageError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The execution metadata document stored at `METADATA.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecMetadata {
    /// Name of the source file.
    pub source_name: String,
    /// Hex SHA-256 of the source content.
    pub source_hash: String,
    /// Tenant scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Workflow execution identifier.
    pub execution_id: String,
    /// File execution identifier.
    pub file_execution_id: String,
    /// Tags propagated from the execution.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Workflow start time, ISO-8601.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_start_time: Option<String>,
    /// LLM profile applied to this execution, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_profile_id: Option<String>,
    /// Caller-supplied custom data for `{{custom_data.*}}` variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
    /// Per-tool metadata appended as tools run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_metadata: Option<Vec<Value>>,
    /// Total elapsed time in seconds, recorded at completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_elapsed_time: Option<f64>,
    /// Whisper hash from highlight-capable extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_hash: Option<String>,
}

impl ExecMetadata {
    /// Write this document at the execution's `METADATA.json` **only if the
    /// file does not already exist**.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub async fn init(
        &self,
        store: &dyn FileStore,
        paths: &ExecutionPaths,
    ) -> Result<(), StorageError> {
        let path = paths.metadata();
        if store.exists(&path).await? {
            return Ok(());
        }
        let value = serde_json::to_value(self).map_err(|e| StorageError::Json {
            path: path.clone(),
            source: e,
        })?;
        store.json_dump(&path, &value).await
    }
}

/// Merge `patch` into the execution's `METADATA.json`.
///
/// Keys already present in the file are left untouched; only missing keys
/// are added. A missing file starts from an empty document.
///
/// # Errors
///
/// Propagates storage failures and malformed existing content.
pub async fn merge_metadata(
    store: &dyn FileStore,
    paths: &ExecutionPaths,
    patch: Map<String, Value>,
) -> Result<(), StorageError> {
    let path = paths.metadata();
    let mut current: Map<String, Value> = if store.exists(&path).await? {
        let text = store.read_to_string(&path).await?;
        serde_json::from_str(&text).map_err(|e| StorageError::Json {
            path: path.clone(),
            source: e,
        })?
    } else {
        Map::new()
    };
    for (key, value) in patch {
        current.entry(key).or_insert(value);
    }
    store.json_dump(&path, &Value::Object(current)).await
}

/// Read the execution's `METADATA.json` as a raw JSON object.
///
/// # Errors
///
/// Propagates storage failures and malformed content.
pub async fn read_metadata(
    store: &dyn FileStore,
    paths: &ExecutionPaths,
) -> Result<Map<String, Value>, StorageError> {
    let path = paths.metadata();
    if !store.exists(&path).await? {
        return Ok(Map::new());
    }
    let text = store.read_to_string(&path).await?;
    serde_json::from_str(&text).map_err(|e| StorageError::Json {
        path,
        source: e,
    })
}
