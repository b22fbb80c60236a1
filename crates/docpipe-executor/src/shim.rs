// SPDX-License-Identifier: MIT OR Apache-2.0
//! The tool context handed to adapter libraries.
//!
//! The shim lives in a worker: it must never exit the process, and it must
//! never carry per-request state beyond the identity fields listed on the
//! struct. One shim is constructed per task invocation.

use docpipe_adapters::{AdapterError, ToolContext};
use docpipe_telemetry::{LogLevel, LogState, WorkflowLogger};
use serde_json::{Map, Value};

/// Environment key answered from the shim's stored key instead of the
/// process environment.
pub const PLATFORM_API_KEY_ENV: &str = "PLATFORM_SERVICE_API_KEY";

/// Minimal tool context for adapter calls inside executor handlers.
#[derive(Default)]
pub struct ExecutorToolShim {
    platform_api_key: String,
    file_execution_id: String,
    execution_id: String,
    source_file_name: String,
    exec_metadata: Map<String, Value>,
    logger: Option<WorkflowLogger>,
}

impl ExecutorToolShim {
    /// A shim holding only the platform API key — enough for adapter
    /// construction inside executor handlers.
    #[must_use]
    pub fn new(platform_api_key: impl Into<String>) -> Self {
        Self {
            platform_api_key: platform_api_key.into(),
            ..Self::default()
        }
    }

    /// Attach execution identity (used by the structure worker).
    #[must_use]
    pub fn with_identity(
        mut self,
        execution_id: impl Into<String>,
        file_execution_id: impl Into<String>,
        source_file_name: impl Into<String>,
    ) -> Self {
        self.execution_id = execution_id.into();
        self.file_execution_id = file_execution_id.into();
        self.source_file_name = source_file_name.into();
        self
    }

    /// Attach execution metadata.
    #[must_use]
    pub fn with_exec_metadata(mut self, exec_metadata: Map<String, Value>) -> Self {
        self.exec_metadata = exec_metadata;
        self
    }

    /// Route `stream_log` / `stream_update` to a workflow logger in addition
    /// to `tracing`.
    #[must_use]
    pub fn with_logger(mut self, logger: WorkflowLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// File execution this shim belongs to.
    #[must_use]
    pub fn file_execution_id(&self) -> &str {
        &self.file_execution_id
    }

    /// Workflow execution this shim belongs to.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Source file being processed.
    #[must_use]
    pub fn source_file_name(&self) -> &str {
        &self.source_file_name
    }

    /// Execution metadata carried for adapter usage tracking.
    #[must_use]
    pub fn exec_metadata(&self) -> &Map<String, Value> {
        &self.exec_metadata
    }
}

impl ToolContext for ExecutorToolShim {
    fn get_env_or_die(&self, key: &str) -> Result<String, AdapterError> {
        if key == PLATFORM_API_KEY_ENV {
            if self.platform_api_key.is_empty() {
                return Err(AdapterError::Env {
                    key: key.to_string(),
                });
            }
            return Ok(self.platform_api_key.clone());
        }
        match std::env::var(key) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(AdapterError::Env {
                key: key.to_string(),
            }),
        }
    }

    fn stream_log(&self, message: &str, level: LogLevel) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error | LogLevel::Fatal => tracing::error!("{message}"),
        }
        if let Some(logger) = &self.logger {
            logger.publish_log_level(message, level);
        }
    }

    fn stream_update(&self, message: &str, state: LogState) {
        if let Some(logger) = &self.logger {
            logger.publish_update_log(state, message, None);
        } else {
            tracing::info!(state = ?state, "{message}");
        }
    }

    fn stream_error(&self, message: &str) -> AdapterError {
        tracing::error!("{message}");
        AdapterError::Tool(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_api_key_answered_from_shim() {
        let shim = ExecutorToolShim::new("sk-test-123");
        assert_eq!(
            shim.get_env_or_die(PLATFORM_API_KEY_ENV).unwrap(),
            "sk-test-123"
        );
    }

    #[test]
    fn missing_platform_api_key_errors() {
        let shim = ExecutorToolShim::new("");
        let err = shim.get_env_or_die(PLATFORM_API_KEY_ENV).unwrap_err();
        assert!(err.to_string().contains(PLATFORM_API_KEY_ENV));
    }

    #[test]
    fn other_keys_read_from_process_env() {
        // PATH is always set in a test environment.
        let shim = ExecutorToolShim::new("sk-test");
        assert_eq!(
            shim.get_env_or_die("PATH").unwrap(),
            std::env::var("PATH").unwrap()
        );
    }

    #[test]
    fn missing_env_var_errors() {
        let shim = ExecutorToolShim::new("sk-test");
        let err = shim.get_env_or_die("DOCPIPE_NONEXISTENT_VAR").unwrap_err();
        assert!(err.to_string().contains("DOCPIPE_NONEXISTENT_VAR"));
    }

    #[test]
    fn stream_error_returns_typed_error_without_exiting() {
        let shim = ExecutorToolShim::new("sk-test");
        let err = shim.stream_error("something failed");
        assert!(matches!(err, AdapterError::Tool(_)));
        assert!(err.to_string().contains("something failed"));
    }
}
