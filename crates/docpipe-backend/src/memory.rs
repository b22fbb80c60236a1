// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process backend for tests and single-process development.
//!
//! Tasks execute on the local runtime the moment they are sent; results are
//! held in memory. The wire contract (one JSON payload in, one out, named
//! queues, blocking result waits) is identical to the broker-backed
//! transports so callers cannot tell the difference.

use crate::config::BackendType;
use crate::{BackendError, TaskBackend, TaskHandle, TaskHandler};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Poll interval while waiting on an in-memory result.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A record of one submitted task, kept for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct SentTask {
    /// Task name on the wire.
    pub name: String,
    /// Queue it was routed to.
    pub queue: String,
    /// The payload.
    pub payload: Value,
}

/// The in-process task backend.
#[derive(Default)]
pub struct MemoryBackend {
    tasks: RwLock<BTreeMap<String, TaskHandler>>,
    results: Arc<Mutex<HashMap<String, Result<Value, String>>>>,
    sent: Mutex<Vec<SentTask>>,
}

impl MemoryBackend {
    /// An empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task submitted so far, in order.
    #[must_use]
    pub fn sent_tasks(&self) -> Vec<SentTask> {
        self.sent.lock().expect("sent-task log poisoned").clone()
    }
}

#[async_trait]
impl TaskBackend for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Celery
    }

    fn register_task(&self, name: &str, handler: TaskHandler) {
        self.tasks
            .write()
            .expect("task registry poisoned")
            .insert(name.to_string(), handler);
    }

    async fn send_task(
        &self,
        name: &str,
        payload: Value,
        queue: &str,
    ) -> Result<TaskHandle, BackendError> {
        let handler = self
            .tasks
            .read()
            .expect("task registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::UnknownTask {
                name: name.to_string(),
            })?;

        self.sent.lock().expect("sent-task log poisoned").push(SentTask {
            name: name.to_string(),
            queue: queue.to_string(),
            payload: payload.clone(),
        });

        let task_id = Uuid::new_v4().to_string();
        let results = Arc::clone(&self.results);
        let id = task_id.clone();
        tokio::spawn(async move {
            let outcome = handler(payload).await.map_err(|e| e.to_string());
            results.lock().expect("result map poisoned").insert(id, outcome);
        });

        Ok(TaskHandle { task_id })
    }

    async fn wait_result(
        &self,
        handle: &TaskHandle,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(outcome) = self
                .results
                .lock()
                .expect("result map poisoned")
                .get(&handle.task_id)
                .cloned()
            {
                return outcome.map_err(|message| BackendError::Remote {
                    task_id: handle.task_id.clone(),
                    message,
                });
            }

            if tokio::time::Instant::now() + RESULT_POLL_INTERVAL > deadline {
                return Err(BackendError::ResultTimeout {
                    task_id: handle.task_id.clone(),
                    seconds: timeout.as_secs(),
                });
            }
            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
        }
    }

    async fn run_worker(&self, _queues: &[String], _concurrency: usize) -> Result<(), BackendError> {
        // Tasks run at send time; the worker loop just parks.
        futures::future::pending::<()>().await;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_handler() -> TaskHandler {
        Arc::new(|payload| Box::pin(async move { Ok(json!({"echo": payload})) }))
    }

    fn slow_handler(delay: Duration) -> TaskHandler {
        Arc::new(move |payload| {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(payload)
            })
        })
    }

    #[tokio::test]
    async fn send_and_wait_round_trip() {
        let backend = MemoryBackend::new();
        backend.register_task("execute_extract", echo_handler());

        let handle = backend
            .send_task("execute_extract", json!({"run_id": "r1"}), "executor")
            .await
            .unwrap();
        let result = backend
            .wait_result(&handle, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result, json!({"echo": {"run_id": "r1"}}));

        let sent = backend.sent_tasks();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].queue, "executor");
    }

    #[tokio::test]
    async fn unknown_task_is_rejected_at_send() {
        let backend = MemoryBackend::new();
        let err = backend
            .send_task("execute_unknown", json!({}), "executor")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnknownTask { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_task_times_out() {
        let backend = MemoryBackend::new();
        backend.register_task("slow", slow_handler(Duration::from_secs(5)));

        let handle = backend.send_task("slow", json!({}), "executor").await.unwrap();
        let err = backend
            .wait_result(&handle, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ResultTimeout { seconds: 1, .. }));
    }
}
