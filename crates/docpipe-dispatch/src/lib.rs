// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-dispatch
#![deny(unsafe_code)]
#![warn(missing_docs)]

use docpipe_backend::{BackendError, TaskBackend};
use docpipe_core::{ExecutionContext, ExecutionResult};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Queue consumed by the classic executor operations.
pub const EXECUTOR_QUEUE: &str = "executor";
/// Queue consumed by the agentic executor.
pub const AGENTIC_EXECUTOR_QUEUE: &str = "agentic_executor";

/// Environment variable overriding the default result timeout.
pub const RESULT_TIMEOUT_ENV: &str = "EXECUTOR_RESULT_TIMEOUT";
/// Default result timeout in seconds.
pub const DEFAULT_RESULT_TIMEOUT_SECS: u64 = 3600;

/// The operation → queue routing table. Part of the stable wire contract
/// for queue naming.
#[must_use]
pub fn queue_for_operation(operation: &str) -> &'static str {
    match operation {
        "agentic_extraction" => AGENTIC_EXECUTOR_QUEUE,
        _ => EXECUTOR_QUEUE,
    }
}

/// The wire task name for an operation.
#[must_use]
pub fn task_name(operation: &str) -> String {
    format!("execute_{operation}")
}

/// Errors the dispatcher can actually raise.
///
/// [`ExecutionDispatcher::dispatch`] only ever returns
/// [`DispatchError::NoBackend`] — timeouts, broker failures, and remote
/// exceptions come back as failure results. The other variants belong to
/// [`ExecutionDispatcher::dispatch_async`], which has no result envelope to
/// wrap them in.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No task backend was configured for this dispatcher.
    #[error("no task backend is configured")]
    NoBackend,

    /// The context failed to serialize.
    #[error("context serialization failed: {0}")]
    Contract(#[from] docpipe_core::ContractError),

    /// Asynchronous submission failed at the broker.
    #[error("task submission failed: {0}")]
    Submit(#[from] BackendError),
}

/// Submits execution contexts across the process boundary.
pub struct ExecutionDispatcher {
    backend: Option<Arc<dyn TaskBackend>>,
}

impl ExecutionDispatcher {
    /// A dispatcher bound to `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A dispatcher with no backend; every dispatch fails with
    /// [`DispatchError::NoBackend`].
    #[must_use]
    pub fn unconfigured() -> Self {
        Self { backend: None }
    }

    /// Serialize `context`, submit it, and block on the result.
    ///
    /// Timeout resolution order: explicit argument →
    /// `EXECUTOR_RESULT_TIMEOUT` → 3600 s.
    ///
    /// # Errors
    ///
    /// Only [`DispatchError::NoBackend`]. Failed tasks come back as failure
    /// results.
    pub async fn dispatch(
        &self,
        context: &ExecutionContext,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, DispatchError> {
        let backend = self.backend.as_ref().ok_or(DispatchError::NoBackend)?;
        let timeout = resolve_timeout(timeout);
        let started = Instant::now();

        let wire = match context.to_wire() {
            Ok(wire) => wire,
            Err(err) => return Ok(failure_with_elapsed("ContractError", &err, started)),
        };
        let name = task_name(&context.operation);
        let queue = queue_for_operation(&context.operation);
        tracing::debug!(
            task = %name,
            queue,
            run_id = %context.run_id,
            request_id = %context.request_id,
            timeout_secs = timeout.as_secs(),
            "dispatching execution"
        );

        let handle = match backend.send_task(&name, wire, queue).await {
            Ok(handle) => handle,
            Err(err) => return Ok(failure_with_elapsed(error_kind(&err), &err, started)),
        };

        match backend.wait_result(&handle, timeout).await {
            Ok(value) => match ExecutionResult::from_wire(value) {
                Ok(result) => Ok(result),
                Err(err) => Ok(failure_with_elapsed("ContractError", &err, started)),
            },
            Err(err) => Ok(failure_with_elapsed(error_kind(&err), &err, started)),
        }
    }

    /// Submit without waiting; returns the broker task id.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoBackend`] when unconfigured; submission and
    /// serialization failures propagate typed (there is no result envelope
    /// to wrap them in).
    pub async fn dispatch_async(&self, context: &ExecutionContext) -> Result<String, DispatchError> {
        let backend = self.backend.as_ref().ok_or(DispatchError::NoBackend)?;
        let wire = context.to_wire()?;
        let name = task_name(&context.operation);
        let queue = queue_for_operation(&context.operation);
        let handle = backend.send_task(&name, wire, queue).await?;
        Ok(handle.task_id)
    }
}

/// Resolve the effective timeout: explicit → env → default.
#[must_use]
pub fn resolve_timeout(explicit: Option<Duration>) -> Duration {
    resolve_timeout_from(explicit, std::env::var(RESULT_TIMEOUT_ENV).ok().as_deref())
}

/// Pure form of [`resolve_timeout`] for tests.
#[must_use]
pub fn resolve_timeout_from(explicit: Option<Duration>, env_value: Option<&str>) -> Duration {
    if let Some(timeout) = explicit {
        return timeout;
    }
    if let Some(raw) = env_value {
        if let Ok(secs) = raw.trim().parse::<u64>() {
            return Duration::from_secs(secs);
        }
    }
    Duration::from_secs(DEFAULT_RESULT_TIMEOUT_SECS)
}

fn error_kind(err: &BackendError) -> &'static str {
    match err {
        BackendError::ResultTimeout { .. } => "TimeoutError",
        BackendError::Broker(_) => "BrokerError",
        BackendError::Remote { .. } => "RemoteExecutionError",
        BackendError::UnknownTask { .. } => "NotRegistered",
        BackendError::MalformedMessage(_) | BackendError::Serde(_) => "ContractError",
        BackendError::Config(_) => "ConfigurationError",
        BackendError::TransportUnavailable { .. } => "TransportUnavailable",
    }
}

fn failure_with_elapsed(
    kind: &str,
    err: &dyn std::fmt::Display,
    started: Instant,
) -> ExecutionResult {
    let mut result = ExecutionResult::failure(format!("{kind}: {err}"));
    result.insert_metadata("elapsed_seconds", json!(started.elapsed().as_secs_f64()));
    result
}
