// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory workflow store for tests and single-process deployments.

use crate::store::{
    FileExecutionStore, FileHistoryStore, StoreError, WorkflowExecutionStore,
};
use crate::{
    ExecutionStatus, FileExecutionStatus, FileHistory, WorkflowExecution, WorkflowFileExecution,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    executions: BTreeMap<String, WorkflowExecution>,
    file_executions: Vec<WorkflowFileExecution>,
    history: Vec<FileHistory>,
}

/// One store implementing all three seams behind a mutex.
///
/// The duplicate-key check on insert mirrors the relational layer's unique
/// constraints, so race-condition tests behave like production.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    inner: Mutex<Inner>,
}

impl MemoryWorkflowStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("workflow store lock poisoned")
    }

    /// Snapshot of all file-execution rows (diagnostics and tests).
    #[must_use]
    pub fn file_executions(&self) -> Vec<WorkflowFileExecution> {
        self.lock().file_executions.clone()
    }
}

#[async_trait]
impl WorkflowExecutionStore for MemoryWorkflowStore {
    async fn get(&self, execution_id: &str) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.lock().executions.get(execution_id).cloned())
    }

    async fn upsert(&self, execution: WorkflowExecution) -> Result<(), StoreError> {
        self.lock()
            .executions
            .insert(execution.execution_id.clone(), execution);
        Ok(())
    }

    async fn set_status(
        &self,
        execution_id: &str,
        status: ExecutionStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let execution =
            inner
                .executions
                .get_mut(execution_id)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "workflow execution",
                    id: execution_id.to_string(),
                })?;
        execution.status = status;
        Ok(())
    }

    async fn active_for_workflow(
        &self,
        workflow_id: &str,
        organization_id: Option<&str>,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        Ok(self
            .lock()
            .executions
            .values()
            .filter(|e| e.workflow_id == workflow_id && e.status.is_active())
            .filter(|e| match organization_id {
                Some(org) => e.organization_id.as_deref() == Some(org),
                None => true,
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FileExecutionStore for MemoryWorkflowStore {
    async fn insert(&self, row: WorkflowFileExecution) -> Result<(), StoreError> {
        let mut inner = self.lock();
        for existing in &inner.file_executions {
            if existing.workflow_execution_id != row.workflow_execution_id
                || existing.file_path != row.file_path
            {
                continue;
            }
            let hash_collision =
                row.file_hash.is_some() && existing.file_hash == row.file_hash;
            let uuid_collision = row.provider_file_uuid.is_some()
                && existing.provider_file_uuid == row.provider_file_uuid;
            if hash_collision || uuid_collision {
                return Err(StoreError::DuplicateFileExecution {
                    workflow_execution_id: row.workflow_execution_id,
                    key: format!(
                        "({}, {})",
                        row.file_hash
                            .or(row.provider_file_uuid)
                            .unwrap_or_default(),
                        row.file_path
                    ),
                });
            }
        }
        inner.file_executions.push(row);
        Ok(())
    }

    async fn update_status(
        &self,
        id: &str,
        status: FileExecutionStatus,
        execution_error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let row = inner
            .file_executions
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "file execution",
                id: id.to_string(),
            })?;
        row.status = status;
        row.execution_error = execution_error;
        Ok(())
    }

    async fn find_in_flight_by_hash(
        &self,
        workflow_execution_id: &str,
        file_hash: &str,
        file_path: &str,
    ) -> Result<Option<WorkflowFileExecution>, StoreError> {
        Ok(self
            .lock()
            .file_executions
            .iter()
            .find(|r| {
                r.workflow_execution_id == workflow_execution_id
                    && r.file_hash.as_deref() == Some(file_hash)
                    && r.file_path == file_path
                    && r.status.is_in_flight()
            })
            .cloned())
    }

    async fn find_in_flight_by_provider_uuid(
        &self,
        workflow_execution_id: &str,
        provider_file_uuid: &str,
        file_path: &str,
    ) -> Result<Option<WorkflowFileExecution>, StoreError> {
        Ok(self
            .lock()
            .file_executions
            .iter()
            .find(|r| {
                r.workflow_execution_id == workflow_execution_id
                    && r.provider_file_uuid.as_deref() == Some(provider_file_uuid)
                    && r.file_path == file_path
                    && r.status.is_in_flight()
            })
            .cloned())
    }
}

#[async_trait]
impl FileHistoryStore for MemoryWorkflowStore {
    async fn get(
        &self,
        workflow_id: &str,
        cache_key: &str,
        file_path: Option<&str>,
    ) -> Result<Option<FileHistory>, StoreError> {
        Ok(self
            .lock()
            .history
            .iter()
            .find(|h| {
                h.workflow_id == workflow_id
                    && h.cache_key == cache_key
                    && match file_path {
                        Some(path) => h.file_path.as_deref() == Some(path),
                        None => true,
                    }
            })
            .cloned())
    }

    async fn record(&self, entry: FileHistory) -> Result<(), StoreError> {
        if entry.is_completed && entry.result.as_deref().is_none_or(str::is_empty) {
            return Err(StoreError::IncompleteHistory {
                cache_key: entry.cache_key,
            });
        }
        self.lock().history.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionType, FileHash};

    fn file(path: &str, hash: &str) -> FileHash {
        FileHash::new(path, path.rsplit('/').next().unwrap(), 42, ConnectionType::Filesystem)
            .with_hash(hash)
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_hash_and_path() {
        let store = MemoryWorkflowStore::new();
        let row = WorkflowFileExecution::new("exec-1", &file("/in/a.pdf", "h1"));
        store.insert(row.clone()).await.unwrap();

        let race = WorkflowFileExecution::new("exec-1", &file("/in/a.pdf", "h1"));
        let err = store.insert(race).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateFileExecution { .. }));
    }

    #[tokio::test]
    async fn insert_allows_same_hash_under_other_execution() {
        let store = MemoryWorkflowStore::new();
        store
            .insert(WorkflowFileExecution::new("exec-1", &file("/in/a.pdf", "h1")))
            .await
            .unwrap();
        store
            .insert(WorkflowFileExecution::new("exec-2", &file("/in/a.pdf", "h1")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn in_flight_lookup_ignores_terminal_rows() {
        let store = MemoryWorkflowStore::new();
        let row = WorkflowFileExecution::new("exec-1", &file("/in/a.pdf", "h1"));
        let id = row.id.clone();
        store.insert(row).await.unwrap();

        assert!(
            store
                .find_in_flight_by_hash("exec-1", "h1", "/in/a.pdf")
                .await
                .unwrap()
                .is_some()
        );

        store
            .update_status(&id, FileExecutionStatus::Completed, None)
            .await
            .unwrap();
        assert!(
            store
                .find_in_flight_by_hash("exec-1", "h1", "/in/a.pdf")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn completed_history_requires_result() {
        let store = MemoryWorkflowStore::new();
        let mut entry = FileHistory::completed("wf-1", "h1", None, "{}");
        entry.result = None;
        let err = store.record(entry).await.unwrap_err();
        assert!(matches!(err, StoreError::IncompleteHistory { .. }));
    }

    #[tokio::test]
    async fn active_executions_are_organization_scoped() {
        let store = MemoryWorkflowStore::new();
        store
            .upsert(WorkflowExecution::new("exec-1", "wf-1").with_organization("org-a"))
            .await
            .unwrap();
        store
            .upsert(WorkflowExecution::new("exec-2", "wf-1").with_organization("org-b"))
            .await
            .unwrap();

        let active = store.active_for_workflow("wf-1", Some("org-a")).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].execution_id, "exec-1");
    }
}
