// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process dispatch: registry lookup, panic trapping, elapsed-time
//! metadata.

use crate::{ExecutorEnv, ExecutorRegistry};
use docpipe_core::{ExecutionContext, ExecutionResult};
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

/// Runs executors in-process; what the worker-side task wraps.
///
/// The contract callers rely on:
/// - unknown executor → failure result, never an error
/// - panicking handler → `failure("panic: …")` with
///   `metadata.elapsed_seconds`
/// - handler-returned failure → passed through unwrapped
pub struct ExecutionOrchestrator {
    env: ExecutorEnv,
}

impl ExecutionOrchestrator {
    /// An orchestrator bound to the worker's seams.
    #[must_use]
    pub fn new(env: ExecutorEnv) -> Self {
        Self { env }
    }

    /// Execute `context` and always return an envelope.
    pub async fn execute(&self, context: &ExecutionContext) -> ExecutionResult {
        let started = Instant::now();

        let mut executor = match ExecutorRegistry::get(&context.executor_name) {
            Ok(executor) => executor,
            Err(err) => {
                tracing::warn!(
                    executor = %context.executor_name,
                    request_id = %context.request_id,
                    "executor lookup failed: {err}"
                );
                return ExecutionResult::failure(err.to_string());
            }
        };

        tracing::info!(
            executor = %context.executor_name,
            operation = %context.operation,
            run_id = %context.run_id,
            request_id = %context.request_id,
            "orchestrating execution"
        );

        let outcome = AssertUnwindSafe(executor.execute(context, &self.env))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic);
                tracing::error!(
                    executor = %context.executor_name,
                    operation = %context.operation,
                    "executor panicked: {message}"
                );
                let mut result = ExecutionResult::failure(format!("panic: {message}"));
                result.insert_metadata(
                    "elapsed_seconds",
                    json!(started.elapsed().as_secs_f64()),
                );
                result
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Executor, ExecutorEnv};
    use async_trait::async_trait;
    use docpipe_adapters::MockAdapterFactory;
    use docpipe_storage::StorageRoots;
    use docpipe_telemetry::NoopPublisher;
    use serial_test::serial;
    use std::sync::Arc;

    fn test_env() -> ExecutorEnv {
        ExecutorEnv {
            adapters: Arc::new(MockAdapterFactory::new()),
            storage: Arc::new(StorageRoots {
                permanent: std::env::temp_dir(),
                shared_temporary: std::env::temp_dir(),
                api: std::env::temp_dir(),
            }),
            publisher: Arc::new(NoopPublisher),
        }
    }

    fn context(executor_name: &str, operation: &str) -> docpipe_core::ExecutionContext {
        docpipe_core::ExecutionContext::new(executor_name, operation, "run-1", "tool").unwrap()
    }

    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        fn name(&self) -> &'static str {
            "echo"
        }
        async fn execute(
            &mut self,
            context: &docpipe_core::ExecutionContext,
            _env: &ExecutorEnv,
        ) -> docpipe_core::ExecutionResult {
            docpipe_core::ExecutionResult::ok_entry("echo", context.operation.clone().into())
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl Executor for PanickingExecutor {
        fn name(&self) -> &'static str {
            "boom"
        }
        async fn execute(
            &mut self,
            _context: &docpipe_core::ExecutionContext,
            _env: &ExecutorEnv,
        ) -> docpipe_core::ExecutionResult {
            panic!("kaboom")
        }
    }

    struct GracefulFailExecutor;

    #[async_trait]
    impl Executor for GracefulFailExecutor {
        fn name(&self) -> &'static str {
            "graceful_fail"
        }
        async fn execute(
            &mut self,
            _context: &docpipe_core::ExecutionContext,
            _env: &ExecutorEnv,
        ) -> docpipe_core::ExecutionResult {
            docpipe_core::ExecutionResult::failure("LLM rate limited")
        }
    }

    #[tokio::test]
    #[serial(executor_registry)]
    async fn routes_to_registered_executor() {
        ExecutorRegistry::clear();
        ExecutorRegistry::register_factory(|| Box::new(EchoExecutor)).unwrap();

        let orchestrator = ExecutionOrchestrator::new(test_env());
        let result = orchestrator.execute(&context("echo", "extract")).await;
        assert!(result.success);
        assert_eq!(result.data["echo"], "extract");
    }

    #[tokio::test]
    #[serial(executor_registry)]
    async fn unknown_executor_returns_failure_not_error() {
        ExecutorRegistry::clear();
        let orchestrator = ExecutionOrchestrator::new(test_env());
        let result = orchestrator.execute(&context("nonexistent", "extract")).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("nonexistent"));
    }

    #[tokio::test]
    #[serial(executor_registry)]
    async fn panic_is_trapped_with_elapsed_metadata() {
        ExecutorRegistry::clear();
        ExecutorRegistry::register_factory(|| Box::new(PanickingExecutor)).unwrap();

        let orchestrator = ExecutionOrchestrator::new(test_env());
        let result = orchestrator.execute(&context("boom", "extract")).await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("panic"));
        assert!(error.contains("kaboom"));
        assert!(result.metadata["elapsed_seconds"].is_f64());
    }

    #[tokio::test]
    #[serial(executor_registry)]
    async fn graceful_failure_is_not_double_wrapped() {
        ExecutorRegistry::clear();
        ExecutorRegistry::register_factory(|| Box::new(GracefulFailExecutor)).unwrap();

        let orchestrator = ExecutionOrchestrator::new(test_env());
        let result = orchestrator
            .execute(&context("graceful_fail", "extract"))
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("LLM rate limited"));
    }
}
