// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store seams over the relational layer.
//!
//! Workers never hold explicit locks; mutual exclusion for "at most one
//! in-flight execution per (file, workflow)" comes from the in-flight query
//! plus the insert-time unique keys these seams expose.

use crate::{
    ExecutionStatus, FileExecutionStatus, FileHistory, WorkflowExecution, WorkflowFileExecution,
};
use async_trait::async_trait;

/// Errors surfaced by the workflow stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Insert collided with one of the unique keys — a concurrent worker won
    /// the race for this file.
    #[error("duplicate file execution for {key} in execution {workflow_execution_id}")]
    DuplicateFileExecution {
        /// Parent execution.
        workflow_execution_id: String,
        /// The colliding `(hash-or-uuid, path)` key, rendered for logs.
        key: String,
    },

    /// A completed file-history entry arrived without a result payload.
    #[error("completed file-history entry for {cache_key} requires a result")]
    IncompleteHistory {
        /// Cache key of the offending entry.
        cache_key: String,
    },

    /// The referenced row does not exist.
    #[error("no such {entity}: {id}")]
    NotFound {
        /// Entity kind (for diagnostics).
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },

    /// Backing store failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Access to [`WorkflowExecution`] aggregates.
#[async_trait]
pub trait WorkflowExecutionStore: Send + Sync {
    /// Fetch an execution by id.
    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Create or replace an execution.
    async fn upsert(&self, execution: WorkflowExecution) -> Result<(), StoreError>;

    /// Update only the status. Used by the callback worker and by the
    /// cooperative STOP checkpoints.
    async fn set_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> Result<(), StoreError>;

    /// Active (pending or executing) executions of a workflow, scoped to the
    /// organization when one is given.
    async fn active_for_workflow(
        &self,
        workflow_id: &str,
        organization_id: Option<&str>,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;
}

/// Access to per-file execution rows.
#[async_trait]
pub trait FileExecutionStore: Send + Sync {
    /// Insert a new row, enforcing both unique keys.
    ///
    /// # Errors
    ///
    /// [`StoreError::DuplicateFileExecution`] when another row already holds
    /// the same `(execution, file_hash, file_path)` or
    /// `(execution, provider_file_uuid, file_path)` key.
    async fn insert(&self, row: WorkflowFileExecution) -> Result<(), StoreError>;

    /// Update a row's status and error message.
    async fn update_status(
        &self,
        id: &str,
        status: FileExecutionStatus,
        execution_error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Find an in-flight row matching `(file_hash, file_path)` under the
    /// given execution.
    async fn find_in_flight_by_hash(
        &self,
        workflow_execution_id: &str,
        file_hash: &str,
        file_path: &str,
    ) -> Result<Option<WorkflowFileExecution>, StoreError>;

    /// Find an in-flight row matching `(provider_file_uuid, file_path)`
    /// under the given execution.
    async fn find_in_flight_by_provider_uuid(
        &self,
        workflow_execution_id: &str,
        provider_file_uuid: &str,
        file_path: &str,
    ) -> Result<Option<WorkflowFileExecution>, StoreError>;
}

/// Access to the content-level completion cache.
#[async_trait]
pub trait FileHistoryStore: Send + Sync {
    /// Look up history for `(workflow, cache_key)`, optionally narrowed to a
    /// path.
    async fn get(
        &self,
        workflow_id: &str,
        cache_key: &str,
        file_path: Option<&str>,
    ) -> Result<Option<FileHistory>, StoreError>;

    /// Record an entry.
    ///
    /// # Errors
    ///
    /// [`StoreError::IncompleteHistory`] when `is_completed` is set without
    /// a result payload.
    async fn record(&self, entry: FileHistory) -> Result<(), StoreError>;
}
