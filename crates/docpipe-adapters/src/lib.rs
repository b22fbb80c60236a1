// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-adapters
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Scriptable mock adapters for tests.
pub mod mock;

pub use mock::MockAdapterFactory;

use async_trait::async_trait;
use docpipe_telemetry::{LogLevel, LogState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by adapter calls.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The vendor call failed.
    #[error("error from adapter '{adapter}': {message}")]
    Adapter {
        /// Adapter display name.
        adapter: String,
        /// Vendor-reported failure.
        message: String,
    },

    /// The vendor rejected the call for rate reasons.
    #[error("rate limit from adapter '{adapter}': {message}")]
    RateLimited {
        /// Adapter display name.
        adapter: String,
        /// Vendor-reported detail.
        message: String,
    },

    /// No adapter is configured under the given instance id.
    #[error("no adapter configured for instance '{instance_id}'")]
    UnknownInstance {
        /// The unresolved instance id.
        instance_id: String,
    },

    /// A required environment variable is missing or empty.
    #[error("env variable '{key}' is required")]
    Env {
        /// Name of the variable.
        key: String,
    },

    /// A tool-context error raised through `stream_error`.
    #[error("{0}")]
    Tool(String),
}

// ---------------------------------------------------------------------------
// ToolContext
// ---------------------------------------------------------------------------

/// The capability bundle adapter libraries consume.
///
/// A narrow interface, not an inheritance surface: environment access plus
/// log streaming. `stream_error` builds a typed error for the caller to
/// raise — it never exits the process (the implementor lives in a worker).
pub trait ToolContext: Send + Sync {
    /// Fetch a required environment value; missing or empty is an error.
    fn get_env_or_die(&self, key: &str) -> Result<String, AdapterError>;

    /// Stream a log line to the execution channel.
    fn stream_log(&self, message: &str, level: LogLevel);

    /// Stream a UI update marker.
    fn stream_update(&self, message: &str, state: LogState);

    /// Report a fatal condition, returning the error to raise.
    fn stream_error(&self, message: &str) -> AdapterError;
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Why an LLM call is being made; keys adapter usage tracking and the
/// per-prompt metrics shape (`<usage_reason>_llm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UsageReason {
    /// Field extraction prompts.
    Extraction,
    /// Challenge (verification) prompts.
    Challenge,
    /// Summarization prompts.
    Summarize,
}

impl UsageReason {
    /// The lower-snake wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageReason::Extraction => "extraction",
            UsageReason::Challenge => "challenge",
            UsageReason::Summarize => "summarize",
        }
    }
}

impl fmt::Display for UsageReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage counters captured by an LLM adapter across one handler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LlmMetrics {
    /// Total tokens consumed.
    pub tokens: u64,
    /// Cumulative call latency in milliseconds.
    pub latency_ms: u64,
    /// Number of completion calls made.
    pub calls: u32,
}

/// One completion response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Completion {
    /// The completion text.
    pub text: String,
    /// Highlight spans, when the extraction pipeline captured them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight_data: Option<Value>,
    /// Per-span confidence, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_data: Option<Value>,
    /// Source line numbers backing the answer, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_numbers: Option<Value>,
    /// Whisper hash of the highlighted extraction, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_hash: Option<String>,
}

/// A completion-capable model bound to one adapter instance.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// The adapter instance id this handle is bound to.
    fn id(&self) -> &str;

    /// Why this handle's calls are made.
    fn usage_reason(&self) -> UsageReason;

    /// Run one completion.
    async fn complete(&self, prompt: &str) -> Result<Completion, AdapterError>;

    /// Usage captured so far on this handle.
    fn metrics(&self) -> LlmMetrics;
}

// ---------------------------------------------------------------------------
// Embedding / vector DB
// ---------------------------------------------------------------------------

/// An embedding model bound to one adapter instance.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    /// The adapter instance id this handle is bound to.
    fn id(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError>;
}

/// A vector store handle, owning pooled remote connections.
///
/// A handle opened inside a handler invocation must be closed in that same
/// invocation; `close` is idempotent.
#[async_trait]
pub trait VectorDbAdapter: Send + Sync {
    /// The adapter instance id this handle is bound to.
    fn id(&self) -> &str;

    /// Whether `doc_id` already has indexed content.
    async fn is_indexed(&self, doc_id: &str) -> Result<bool, AdapterError>;

    /// Chunk `text` and index under `doc_id`; returns the chunk count.
    async fn index_chunks(
        &self,
        doc_id: &str,
        text: &str,
        chunk_size: u32,
        chunk_overlap: u32,
    ) -> Result<u32, AdapterError>;

    /// Top-k similarity search scoped to `doc_id`.
    async fn search(
        &self,
        doc_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, AdapterError>;

    /// Release pooled connections.
    async fn close(&self);
}

// ---------------------------------------------------------------------------
// X2Text
// ---------------------------------------------------------------------------

/// Inputs to one text extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractRequest {
    /// File to extract from.
    pub input_file_path: PathBuf,
    /// Where to persist the extracted text, when the adapter writes it.
    pub output_file_path: Option<PathBuf>,
    /// Capture highlight metadata (whisper-capable adapters only).
    pub enable_highlight: bool,
    /// Usage-tracking tags.
    pub tags: Vec<String>,
}

/// Result of one text extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Extraction {
    /// The extracted text.
    pub extracted_text: String,
    /// Whisper hash, when highlight capture ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whisper_hash: Option<String>,
}

/// A text-extraction adapter bound to one instance.
#[async_trait]
pub trait X2TextAdapter: Send + Sync {
    /// Human-readable adapter name (used in error messages).
    fn name(&self) -> &str;

    /// Whether this adapter can capture highlight metadata.
    fn supports_highlight(&self) -> bool;

    /// Extract text from the request's input file.
    async fn extract(&self, request: ExtractRequest) -> Result<Extraction, AdapterError>;
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Resolves adapter instance ids into live adapter handles.
///
/// The worker binds one factory at startup; tests bind
/// [`MockAdapterFactory`].
pub trait AdapterFactory: Send + Sync {
    /// An LLM handle for `instance_id` with the given usage reason.
    fn llm(
        &self,
        instance_id: &str,
        tool: &dyn ToolContext,
        usage_reason: UsageReason,
    ) -> Result<Arc<dyn LlmAdapter>, AdapterError>;

    /// An embedding handle for `instance_id`.
    fn embedding(
        &self,
        instance_id: &str,
        tool: &dyn ToolContext,
    ) -> Result<Arc<dyn EmbeddingAdapter>, AdapterError>;

    /// A vector-DB handle for `instance_id` bound to `embedding`.
    fn vector_db(
        &self,
        instance_id: &str,
        embedding: Arc<dyn EmbeddingAdapter>,
        tool: &dyn ToolContext,
    ) -> Result<Arc<dyn VectorDbAdapter>, AdapterError>;

    /// An x2text handle for `instance_id`.
    fn x2text(
        &self,
        instance_id: &str,
        tool: &dyn ToolContext,
    ) -> Result<Arc<dyn X2TextAdapter>, AdapterError>;
}
