// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-workflow
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Logical entities consumed by the execution pipeline.

/// In-memory store implementation.
pub mod memory;
/// Store seams over the relational layer.
pub mod store;

pub use memory::MemoryWorkflowStore;
pub use store::{FileExecutionStore, FileHistoryStore, StoreError, WorkflowExecutionStore};

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle of a [`WorkflowExecution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Created, not yet picked up.
    Pending,
    /// Files are being processed.
    Executing,
    /// All files finished.
    Completed,
    /// At least one file failed terminally.
    Error,
    /// Cooperatively stopped by the user.
    Stopped,
}

impl ExecutionStatus {
    /// Statuses that make an execution "active" for the in-flight guard.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Executing)
    }

    /// Final states — the only ones notifications fire on.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Error | ExecutionStatus::Stopped
        )
    }
}

/// Lifecycle of a single [`WorkflowFileExecution`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileExecutionStatus {
    /// Row created, not yet queued.
    Pending,
    /// Task submitted to the broker.
    Queued,
    /// A worker is processing the file.
    Executing,
    /// Finished successfully.
    Completed,
    /// Failed terminally.
    Error,
    /// Stopped before completion.
    Stopped,
}

impl FileExecutionStatus {
    /// Whether a row in this status blocks a concurrent duplicate execution.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            FileExecutionStatus::Pending
                | FileExecutionStatus::Queued
                | FileExecutionStatus::Executing
        )
    }
}

/// How a source connector reaches its files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionType {
    /// A mounted or remote filesystem walked by the connector.
    Filesystem,
    /// Files uploaded through the API surface.
    Api,
}

// ---------------------------------------------------------------------------
// FileHash
// ---------------------------------------------------------------------------

/// A per-file record produced by the source connector.
///
/// Lifetime is one workflow execution: created during listing, enriched by
/// the pipeline driver (`file_number`, `mime_type`), gone afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileHash {
    /// Full path at the source.
    pub file_path: String,
    /// Base name of the file.
    pub file_name: String,
    /// Size in bytes as reported by the source.
    pub file_size: u64,
    /// Detected MIME type, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Hex SHA-256 of the content; computed during ingestion or by the first
    /// worker to open the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// Upstream-provider-supplied stable identifier, when the source exposes
    /// one (e.g. a drive file id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_file_uuid: Option<String>,
    /// Which connector produced this record.
    pub source_connection_type: ConnectionType,
    /// 1-based position in the listing; assigned when the listing completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_number: Option<u32>,
    /// Opaque connector metadata, carried through verbatim.
    #[serde(default)]
    pub fs_metadata: Value,
    /// Set when the hash matches a completed file-history row.
    #[serde(default)]
    pub is_executed: bool,
}

impl FileHash {
    /// A fresh record for a file found at `file_path`.
    #[must_use]
    pub fn new(
        file_path: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        source_connection_type: ConnectionType,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            file_name: file_name.into(),
            file_size,
            mime_type: None,
            file_hash: None,
            provider_file_uuid: None,
            source_connection_type,
            file_number: None,
            fs_metadata: Value::Null,
            is_executed: false,
        }
    }

    /// Attach the content hash.
    #[must_use]
    pub fn with_hash(mut self, file_hash: impl Into<String>) -> Self {
        self.file_hash = Some(file_hash.into());
        self
    }

    /// Attach the provider's stable identifier.
    #[must_use]
    pub fn with_provider_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.provider_file_uuid = Some(uuid.into());
        self
    }

    /// The cache key used against [`FileHistory`]: content hash when known,
    /// provider UUID otherwise.
    #[must_use]
    pub fn cache_key(&self) -> Option<&str> {
        self.file_hash
            .as_deref()
            .or(self.provider_file_uuid.as_deref())
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// The parent aggregate: one triggered run of a workflow over many files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowExecution {
    /// Unique execution identifier.
    pub execution_id: String,
    /// Workflow this execution belongs to.
    pub workflow_id: String,
    /// Tenant scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Current lifecycle status.
    pub status: ExecutionStatus,
    /// Number of files listed for this execution.
    #[serde(default)]
    pub total_files: u32,
    /// Retry attempts so far.
    #[serde(default)]
    pub attempts: u32,
    /// Wall-clock execution time in seconds, when finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    /// Terminal error message, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Tags propagated to adapter usage tracking.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set when a scheduled pipeline triggered this execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_id: Option<String>,
    /// Set when an API deployment triggered this execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_deployment_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecution {
    /// A pending execution for `workflow_id`.
    #[must_use]
    pub fn new(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            organization_id: None,
            status: ExecutionStatus::Pending,
            total_files: 0,
            attempts: 0,
            execution_time: None,
            error_message: None,
            tags: Vec::new(),
            pipeline_id: None,
            api_deployment_id: None,
            created_at: Utc::now(),
        }
    }

    /// Scope to a tenant.
    #[must_use]
    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// WorkflowFileExecution
// ---------------------------------------------------------------------------

/// One row per `(WorkflowExecution × FileHash)`.
///
/// Uniqueness over `(workflow_execution_id, file_hash, file_path)` and
/// `(workflow_execution_id, provider_file_uuid, file_path)` is what turns a
/// lost duplicate-suppression race into a deterministic insert error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowFileExecution {
    /// Unique row identifier.
    pub id: String,
    /// Parent execution.
    pub workflow_execution_id: String,
    /// Content hash, when known at insert time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    /// Path of the file at the source.
    pub file_path: String,
    /// Provider stable identifier, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_file_uuid: Option<String>,
    /// Row lifecycle status.
    pub status: FileExecutionStatus,
    /// Per-file execution time in seconds, when finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<f64>,
    /// Per-file error, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
}

impl WorkflowFileExecution {
    /// A pending row for `file` under `workflow_execution_id`.
    #[must_use]
    pub fn new(workflow_execution_id: impl Into<String>, file: &FileHash) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_execution_id: workflow_execution_id.into(),
            file_hash: file.file_hash.clone(),
            file_path: file.file_path.clone(),
            provider_file_uuid: file.provider_file_uuid.clone(),
            status: FileExecutionStatus::Pending,
            execution_time: None,
            execution_error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// FileHistory
// ---------------------------------------------------------------------------

/// A content-level cache entry recording a completed file.
///
/// Invariant: `is_completed` implies `result` is non-empty. Consulted only
/// when the listing caller opts in (`use_file_history`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileHistory {
    /// Workflow the completion belongs to.
    pub workflow_id: String,
    /// Content hash or provider UUID.
    pub cache_key: String,
    /// Path the file was processed under, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    /// Whether the file finished processing.
    pub is_completed: bool,
    /// Serialized result of the completed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// When the entry was recorded.
    pub created_at: DateTime<Utc>,
}

impl FileHistory {
    /// A completed entry carrying its result.
    #[must_use]
    pub fn completed(
        workflow_id: impl Into<String>,
        cache_key: impl Into<String>,
        file_path: Option<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            cache_key: cache_key.into(),
            file_path,
            is_completed: true,
            result: Some(result.into()),
            created_at: Utc::now(),
        }
    }
}
