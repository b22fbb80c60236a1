// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed failure envelope for the legacy executor.

/// Expected failure modes of the legacy executor's handlers.
///
/// The executor's `execute` maps these to failure results; they never cross
/// the orchestrator as unwound panics.
#[derive(Debug, thiserror::Error)]
pub enum LegacyExecutorError {
    /// Text extraction failed at the adapter.
    #[error("Error from text extractor '{adapter}'. {message}")]
    Extraction {
        /// Adapter display name.
        adapter: String,
        /// Vendor-reported failure.
        message: String,
    },

    /// Vector indexing failed.
    #[error("Error while indexing: {0}")]
    Indexing(String),

    /// An adapter instance could not be resolved.
    #[error("Couldn't fetch adapter. {0}")]
    AdapterFetch(String),

    /// An LLM completion failed.
    #[error("Error fetching response for prompt: {0}")]
    Completion(String),

    /// The LLM rejected the call for rate reasons.
    #[error("Rate limit error. {0}")]
    RateLimit(String),

    /// A `{{custom_data.*}}` variable referenced a missing key.
    #[error("Custom data key '{key}' not found for variable '{variable}'")]
    CustomData {
        /// The missing key.
        key: String,
        /// The full variable expression.
        variable: String,
    },

    /// A `%name%` back-reference is not in the structured output.
    #[error("Variable {0} not found in structured output")]
    VariableNotFound(String),

    /// The operation needs a plugin that is not bundled.
    #[error("{0}")]
    PluginMissing(String),

    /// Summarization failed.
    #[error("Error during summarization: {0}")]
    Summarize(String),

    /// The prompt payload is malformed.
    #[error("Malformed prompt payload: {0}")]
    Payload(String),

    /// Reading or writing execution storage failed.
    #[error("Execution storage error: {0}")]
    Storage(#[from] docpipe_storage::StorageError),
}

impl LegacyExecutorError {
    /// HTTP-ish status code carried alongside the message for callers that
    /// key on it.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            LegacyExecutorError::Payload(_)
            | LegacyExecutorError::CustomData { .. }
            | LegacyExecutorError::VariableNotFound(_) => 400,
            LegacyExecutorError::RateLimit(_) => 429,
            _ => 500,
        }
    }
}
