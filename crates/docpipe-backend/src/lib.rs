// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-backend
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The Celery-protocol transport over Redis.
pub mod celery;
/// Backend selection and per-backend configuration.
pub mod config;
/// Startup health probes.
pub mod health;
/// In-process backend for tests and development.
pub mod memory;

pub use celery::CeleryBackend;
pub use config::{
    BackendConfig, BackendType, CeleryConfig, ConfigError, HatchetConfig, TemporalConfig,
};
pub use health::{HealthCheck, HealthChecker, HealthStatus, ProbeStatus};
pub use memory::MemoryBackend;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Default soft task time limit in seconds.
pub const SOFT_TIME_LIMIT_SECS: u64 = 7000;
/// Default hard task time limit in seconds.
pub const HARD_TIME_LIMIT_SECS: u64 = 7200;

/// A registered task body: one JSON payload in, one JSON payload out.
pub type TaskHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, BackendError>> + Send + Sync>;

/// Handle to a submitted task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Broker-assigned task identifier.
    pub task_id: String,
}

/// Errors surfaced by the backend layer.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Configuration problem (selection, missing or foreign fields).
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No task is registered under the requested name.
    #[error("no task registered under '{name}'")]
    UnknownTask {
        /// The unresolved task name.
        name: String,
    },

    /// Waiting for a task result exceeded the timeout.
    #[error("timed out after {seconds} s waiting for task {task_id}")]
    ResultTimeout {
        /// The awaited task.
        task_id: String,
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// The remote task reported failure.
    #[error("task {task_id} failed remotely: {message}")]
    Remote {
        /// The failed task.
        task_id: String,
        /// Remote failure description.
        message: String,
    },

    /// Broker transport failure.
    #[error("broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// Wire payload (de)serialization failure.
    #[error("payload serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// A malformed message arrived on the queue.
    #[error("malformed queue message: {0}")]
    MalformedMessage(String),

    /// The selected backend's transport is not bundled with this worker.
    #[error(
        "the {backend} transport is not bundled with this worker; \
         bind a {backend} runner or select the celery backend"
    )]
    TransportUnavailable {
        /// The backend lacking a transport.
        backend: &'static str,
    },
}

/// Uniform interface a worker binds to a queue broker through.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Which backend this is.
    fn backend_type(&self) -> BackendType;

    /// Bind a handler under `name`.
    fn register_task(&self, name: &str, handler: TaskHandler);

    /// Submit `payload` as task `name` on `queue`.
    async fn send_task(
        &self,
        name: &str,
        payload: Value,
        queue: &str,
    ) -> Result<TaskHandle, BackendError>;

    /// Block until the task result arrives or `timeout` elapses.
    async fn wait_result(
        &self,
        handle: &TaskHandle,
        timeout: Duration,
    ) -> Result<Value, BackendError>;

    /// Consume `queues` with at most `concurrency` tasks in flight. Blocks
    /// until the broker connection is lost or the worker is shut down.
    async fn run_worker(&self, queues: &[String], concurrency: usize) -> Result<(), BackendError>;

    /// Whether the broker currently answers.
    async fn is_connected(&self) -> bool;
}

/// Build the backend selected by `config`.
///
/// # Errors
///
/// Returns [`BackendError::TransportUnavailable`] for backends whose
/// transport is not bundled, and configuration errors from the transport
/// constructor.
pub fn build_backend(config: &BackendConfig) -> Result<Arc<dyn TaskBackend>, BackendError> {
    match config {
        BackendConfig::Celery(celery) => Ok(Arc::new(CeleryBackend::new(celery.clone())?)),
        BackendConfig::Hatchet(_) => Err(BackendError::TransportUnavailable { backend: "hatchet" }),
        BackendConfig::Temporal(_) => {
            Err(BackendError::TransportUnavailable { backend: "temporal" })
        }
    }
}
