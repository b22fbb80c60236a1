// SPDX-License-Identifier: MIT OR Apache-2.0
//! Celery message protocol (v2) over a Redis broker.
//!
//! Producers `LPUSH` JSON envelopes onto queue lists; workers `BRPOP`,
//! decode, and run registered handlers; results land under
//! `celery-task-meta-<id>` keys with a TTL. The envelope layout matches
//! kombu's redis transport so messages interoperate with Celery-side
//! producers and consumers.

use crate::config::{BackendType, CeleryConfig};
use crate::{BackendError, HARD_TIME_LIMIT_SECS, TaskBackend, TaskHandle, TaskHandler};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

/// TTL applied to result keys.
const RESULT_EXPIRES_SECS: u64 = 86_400;

/// Poll interval while waiting on a result key.
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

fn result_key(task_id: &str) -> String {
    format!("celery-task-meta-{task_id}")
}

/// A decoded inbound task message.
struct InboundTask {
    task_name: String,
    task_id: String,
    payload: Value,
}

/// The Celery-protocol backend.
pub struct CeleryBackend {
    broker: redis::Client,
    results: redis::Client,
    broker_conn: Mutex<Option<ConnectionManager>>,
    result_conn: Mutex<Option<ConnectionManager>>,
    tasks: RwLock<BTreeMap<String, TaskHandler>>,
}

impl CeleryBackend {
    /// Validate the connection URLs and build the backend. No connection is
    /// opened until first use.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Broker`] for malformed URLs.
    pub fn new(config: CeleryConfig) -> Result<Self, BackendError> {
        Ok(Self {
            broker: redis::Client::open(config.broker_url.as_str())?,
            results: redis::Client::open(config.result_backend.as_str())?,
            broker_conn: Mutex::new(None),
            result_conn: Mutex::new(None),
            tasks: RwLock::new(BTreeMap::new()),
        })
    }

    async fn broker_conn(&self) -> Result<ConnectionManager, BackendError> {
        let mut slot = self.broker_conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.broker.get_connection_manager().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn result_conn(&self) -> Result<ConnectionManager, BackendError> {
        let mut slot = self.result_conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.results.get_connection_manager().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    fn encode_message(task_name: &str, task_id: &str, payload: &Value, queue: &str) -> String {
        let body = json!([
            [payload],
            {},
            {"callbacks": null, "errbacks": null, "chain": null, "chord": null}
        ]);
        let message = json!({
            "body": BASE64.encode(body.to_string()),
            "content-encoding": "utf-8",
            "content-type": "application/json",
            "headers": {
                "task": task_name,
                "id": task_id,
                "root_id": task_id,
                "parent_id": null,
                "group": null,
            },
            "properties": {
                "correlation_id": task_id,
                "reply_to": Uuid::new_v4().to_string(),
                "delivery_mode": 2,
                "delivery_info": {"exchange": "", "routing_key": queue},
                "priority": 0,
                "body_encoding": "base64",
                "delivery_tag": Uuid::new_v4().to_string(),
            },
        });
        message.to_string()
    }

    fn decode_message(raw: &str) -> Result<InboundTask, BackendError> {
        let message: Value = serde_json::from_str(raw)?;
        let headers = message
            .get("headers")
            .and_then(Value::as_object)
            .ok_or_else(|| BackendError::MalformedMessage("missing headers".into()))?;
        let task_name = headers
            .get("task")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::MalformedMessage("missing task header".into()))?
            .to_string();
        let task_id = headers
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::MalformedMessage("missing id header".into()))?
            .to_string();

        let body_raw = message
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::MalformedMessage("missing body".into()))?;
        let decoded = BASE64
            .decode(body_raw)
            .map_err(|e| BackendError::MalformedMessage(format!("body is not base64: {e}")))?;
        let body: Value = serde_json::from_slice(&decoded)?;
        // Body is [args, kwargs, embed]; our wire contract is one dict arg.
        let payload = body
            .get(0)
            .and_then(|args| args.get(0))
            .cloned()
            .ok_or_else(|| BackendError::MalformedMessage("body carries no args".into()))?;

        Ok(InboundTask {
            task_name,
            task_id,
            payload,
        })
    }

    async fn store_result(
        mut conn: ConnectionManager,
        task_id: &str,
        status: &str,
        result: Value,
    ) {
        let meta = json!({
            "status": status,
            "result": result,
            "traceback": null,
            "children": [],
            "date_done": chrono::Utc::now().to_rfc3339(),
            "task_id": task_id,
        });
        let stored: Result<(), redis::RedisError> = conn
            .set_ex(result_key(task_id), meta.to_string(), RESULT_EXPIRES_SECS)
            .await;
        if let Err(err) = stored {
            tracing::error!("failed to store result for task {task_id}: {err}");
        }
    }

    fn handler_for(&self, name: &str) -> Option<TaskHandler> {
        self.tasks
            .read()
            .expect("task registry poisoned")
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl TaskBackend for CeleryBackend {
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
        let task_id = Uuid::new_v4().to_string();
        let message = Self::encode_message(name, &task_id, &payload, queue);
        let mut conn = self.broker_conn().await?;
        let _: i64 = conn.lpush(queue, message).await?;
        tracing::debug!(task = name, task_id = %task_id, queue, "task submitted");
        Ok(TaskHandle { task_id })
    }

    async fn wait_result(
        &self,
        handle: &TaskHandle,
        timeout: Duration,
    ) -> Result<Value, BackendError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut conn = self.result_conn().await?;
        loop {
            let raw: Option<String> = conn.get(result_key(&handle.task_id)).await?;
            if let Some(raw) = raw {
                let meta: Value = serde_json::from_str(&raw)?;
                let status = meta.get("status").and_then(Value::as_str).unwrap_or("");
                match status {
                    "SUCCESS" => {
                        return Ok(meta.get("result").cloned().unwrap_or(Value::Null));
                    }
                    "FAILURE" => {
                        let message = meta
                            .get("result")
                            .and_then(|r| r.get("exc_message"))
                            .and_then(Value::as_str)
                            .unwrap_or("unknown remote failure")
                            .to_string();
                        return Err(BackendError::Remote {
                            task_id: handle.task_id.clone(),
                            message,
                        });
                    }
                    // PENDING / STARTED / RETRY keep polling.
                    _ => {}
                }
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

    async fn run_worker(&self, queues: &[String], concurrency: usize) -> Result<(), BackendError> {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut conn = self.broker_conn().await?;
        tracing::info!(?queues, concurrency, "celery worker consuming");

        loop {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("worker semaphore closed");

            // 1 s pop timeout keeps the loop responsive to shutdown signals.
            let popped: Option<(String, String)> = conn.brpop(queues.to_vec(), 1.0).await?;
            let Some((_queue, raw)) = popped else {
                continue;
            };

            let inbound = match Self::decode_message(&raw) {
                Ok(inbound) => inbound,
                Err(err) => {
                    tracing::warn!("dropping malformed queue message: {err}");
                    continue;
                }
            };

            let results = self.result_conn().await?;
            let Some(handler) = self.handler_for(&inbound.task_name) else {
                tracing::warn!(task = %inbound.task_name, "no handler registered");
                Self::store_result(
                    results,
                    &inbound.task_id,
                    "FAILURE",
                    json!({
                        "exc_type": "NotRegistered",
                        "exc_message": format!("no task registered under '{}'", inbound.task_name),
                    }),
                )
                .await;
                continue;
            };

            tokio::spawn(async move {
                let _permit = permit;
                let outcome = tokio::time::timeout(
                    Duration::from_secs(HARD_TIME_LIMIT_SECS),
                    handler(inbound.payload),
                )
                .await;
                let (status, result) = match outcome {
                    Ok(Ok(value)) => ("SUCCESS", value),
                    Ok(Err(err)) => (
                        "FAILURE",
                        json!({"exc_type": "TaskError", "exc_message": err.to_string()}),
                    ),
                    Err(_) => (
                        "FAILURE",
                        json!({
                            "exc_type": "TimeLimitExceeded",
                            "exc_message":
                                format!("hard time limit ({HARD_TIME_LIMIT_SECS} s) exceeded"),
                        }),
                    ),
                };
                Self::store_result(results, &inbound.task_id, status, result).await;
            });
        }
    }

    async fn is_connected(&self) -> bool {
        let Ok(mut conn) = self.broker_conn().await else {
            return false;
        };
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_encoding_round_trips() {
        let payload = json!({"executor_name": "legacy", "operation": "extract"});
        let raw = CeleryBackend::encode_message("execute_extract", "task-1", &payload, "executor");

        let inbound = CeleryBackend::decode_message(&raw).unwrap();
        assert_eq!(inbound.task_name, "execute_extract");
        assert_eq!(inbound.task_id, "task-1");
        assert_eq!(inbound.payload, payload);
    }

    #[test]
    fn message_envelope_matches_kombu_layout() {
        let raw = CeleryBackend::encode_message("execute_index", "task-2", &json!({}), "executor");
        let message: Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(message["content-type"], "application/json");
        assert_eq!(message["properties"]["body_encoding"], "base64");
        assert_eq!(
            message["properties"]["delivery_info"]["routing_key"],
            "executor"
        );
        assert_eq!(message["headers"]["task"], "execute_index");
    }

    #[test]
    fn malformed_messages_are_rejected() {
        assert!(CeleryBackend::decode_message("not json").is_err());
        assert!(CeleryBackend::decode_message("{}").is_err());
        let no_body = json!({"headers": {"task": "t", "id": "i"}}).to_string();
        assert!(matches!(
            CeleryBackend::decode_message(&no_body),
            Err(BackendError::MalformedMessage(_))
        ));
    }

    #[test]
    fn invalid_broker_url_is_a_construction_error() {
        let err = match CeleryBackend::new(CeleryConfig {
            broker_url: "not-a-url".into(),
            result_backend: "redis://localhost:6379/1".into(),
        }) {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, BackendError::Broker(_)));
    }
}
