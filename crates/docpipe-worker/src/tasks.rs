// SPDX-License-Identifier: MIT OR Apache-2.0
//! Task registration: one `execute_<operation>` task per canonical
//! operation, each a wire-in → orchestrator → wire-out wrapper.

use docpipe_backend::{BackendError, TaskBackend, TaskHandler};
use docpipe_core::{ExecutionContext, Operation};
use docpipe_executor::{ExecutionOrchestrator, ExecutorEnv};
use std::sync::Arc;

/// Register every execution task on `backend`.
pub fn register_execution_tasks(backend: &dyn TaskBackend, env: ExecutorEnv) {
    let orchestrator = Arc::new(ExecutionOrchestrator::new(env));
    for operation in Operation::ALL {
        let orchestrator = Arc::clone(&orchestrator);
        let handler: TaskHandler = Arc::new(move |payload| {
            let orchestrator = Arc::clone(&orchestrator);
            Box::pin(async move {
                let context = ExecutionContext::from_wire(payload)
                    .map_err(|e| BackendError::MalformedMessage(e.to_string()))?;
                let result = orchestrator.execute(&context).await;
                result
                    .to_wire()
                    .map_err(|e| BackendError::MalformedMessage(e.to_string()))
            })
        });
        let name = docpipe_dispatch::task_name(operation.as_str());
        tracing::debug!("registering task '{name}'");
        backend.register_task(&name, handler);
    }
}
