// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-telemetry
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Structured log streaming over a pub/sub channel keyed by execution id.

/// Publisher bindings (bus, redis, no-op, memory).
pub mod publisher;

pub use publisher::{BusPublisher, LogPublisher, MemoryPublisher, NoopPublisher, RedisPublisher};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Wire enums
// ---------------------------------------------------------------------------

/// Severity of an execution log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail, hidden by default.
    Debug,
    /// Routine progress.
    Info,
    /// Something unexpected but recoverable.
    Warn,
    /// A step failed.
    Error,
    /// The execution cannot continue.
    Fatal,
}

/// Pipeline stage a log line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogStage {
    /// Workflow compilation / project resolution.
    Compile,
    /// Input staging and validation.
    Build,
    /// Tool execution.
    Run,
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogStage::Compile => "COMPILE",
            LogStage::Build => "BUILD",
            LogStage::Run => "RUN",
        };
        f.write_str(s)
    }
}

/// UI state marker carried by update logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogState {
    /// Describes the input being processed.
    InputUpdate,
    /// Describes produced output.
    OutputUpdate,
    /// The step is running.
    Running,
    /// The step finished successfully.
    Success,
    /// The step failed.
    Error,
    /// Moving on to the next unit of work.
    Next,
}

// ---------------------------------------------------------------------------
// Event shapes
// ---------------------------------------------------------------------------

/// A regular per-step execution log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionLog {
    /// Pipeline stage.
    pub stage: LogStage,
    /// Log line text.
    pub message: String,
    /// Severity.
    pub level: LogLevel,
    /// Step number within the stage, when meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    /// Current iteration (e.g. file number), when meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
    /// Total iterations, when meaningful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_total: Option<u32>,
    /// Workflow execution this line belongs to.
    pub execution_id: String,
    /// Tenant scope, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

/// A UI update marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UpdateLog {
    /// State being announced.
    pub state: LogState,
    /// Markdown body shown in the UI component.
    pub message: String,
    /// Target UI component, when the consumer distinguishes several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
}

/// Any event published on the execution channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogEvent {
    /// A regular execution log line.
    Log(ExecutionLog),
    /// A UI update marker.
    Update(UpdateLog),
}

// ---------------------------------------------------------------------------
// WorkflowLogger
// ---------------------------------------------------------------------------

/// Channel-bound convenience wrapper used by workers.
///
/// Holds the channel identity for one file execution and forwards every line
/// both to the configured [`LogPublisher`] and to `tracing`.
#[derive(Clone)]
pub struct WorkflowLogger {
    publisher: Arc<dyn LogPublisher>,
    channel: String,
    stage: LogStage,
    execution_id: String,
    organization_id: Option<String>,
}

impl WorkflowLogger {
    /// Create a logger publishing on `channel` for `execution_id`.
    pub fn new(
        publisher: Arc<dyn LogPublisher>,
        channel: impl Into<String>,
        stage: LogStage,
        execution_id: impl Into<String>,
        organization_id: Option<String>,
    ) -> Self {
        Self {
            publisher,
            channel: channel.into(),
            stage,
            execution_id: execution_id.into(),
            organization_id,
        }
    }

    /// The channel this logger publishes on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish a regular log line at [`LogLevel::Info`].
    pub fn publish_log(&self, message: impl Into<String>) {
        self.publish_log_level(message, LogLevel::Info);
    }

    /// Publish a regular log line at the given level.
    pub fn publish_log_level(&self, message: impl Into<String>, level: LogLevel) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(execution_id = %self.execution_id, "{message}"),
            LogLevel::Info => tracing::info!(execution_id = %self.execution_id, "{message}"),
            LogLevel::Warn => tracing::warn!(execution_id = %self.execution_id, "{message}"),
            LogLevel::Error | LogLevel::Fatal => {
                tracing::error!(execution_id = %self.execution_id, "{message}");
            }
        }
        self.publisher.publish(
            &self.channel,
            &LogEvent::Log(ExecutionLog {
                stage: self.stage,
                message,
                level,
                step: None,
                iteration: None,
                iteration_total: None,
                execution_id: self.execution_id.clone(),
                organization_id: self.organization_id.clone(),
            }),
        );
    }

    /// Publish a UI update marker.
    pub fn publish_update_log(
        &self,
        state: LogState,
        message: impl Into<String>,
        component: Option<String>,
    ) {
        let message = message.into();
        tracing::info!(execution_id = %self.execution_id, state = ?state, "{message}");
        self.publisher.publish(
            &self.channel,
            &LogEvent::Update(UpdateLog {
                state,
                message,
                component,
            }),
        );
    }
}

impl fmt::Debug for WorkflowLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowLogger")
            .field("channel", &self.channel)
            .field("stage", &self.stage)
            .field("execution_id", &self.execution_id)
            .finish_non_exhaustive()
    }
}
