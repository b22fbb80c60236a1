// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-executor
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The in-process dispatch wrapper.
pub mod orchestrator;
/// Process-global executor registry.
pub mod registry;
/// The tool context handed to adapter libraries.
pub mod shim;

pub use orchestrator::ExecutionOrchestrator;
pub use registry::{ExecutorRegistry, RegistryError};
pub use shim::{ExecutorToolShim, PLATFORM_API_KEY_ENV};

use async_trait::async_trait;
use docpipe_adapters::AdapterFactory;
use docpipe_core::{ExecutionContext, ExecutionResult};
use docpipe_storage::StorageRoots;
use docpipe_telemetry::LogPublisher;
use std::sync::Arc;

/// Seams an executor may use during one call.
///
/// Bundled so executors stay constructible fresh per call — per-request
/// state lives on the executor instance, shared infrastructure lives here.
#[derive(Clone)]
pub struct ExecutorEnv {
    /// Resolves adapter instance ids.
    pub adapters: Arc<dyn AdapterFactory>,
    /// Storage roots per execution source.
    pub storage: Arc<StorageRoots>,
    /// Telemetry channel binding.
    pub publisher: Arc<dyn LogPublisher>,
}

/// A registered handler owning one or more operations.
///
/// Executors are instance-scoped: the registry returns a fresh instance per
/// call so metrics and per-request state cannot leak between executions.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The short name this executor registers under (e.g. `"legacy"`).
    fn name(&self) -> &'static str;

    /// Run one operation. Expected failures come back as
    /// [`ExecutionResult::failure`]; only programmer errors may panic (the
    /// orchestrator traps and translates those).
    async fn execute(&mut self, context: &ExecutionContext, env: &ExecutorEnv) -> ExecutionResult;
}
