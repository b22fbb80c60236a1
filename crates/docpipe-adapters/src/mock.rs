// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scriptable mock adapters.
//!
//! Responses are scripted by prompt substring; every call is recorded so
//! tests can assert on the exact prompts an executor produced. The factory
//! tracks vector-DB constructions and open handles so tests can verify the
//! chunk-size-zero bypass and the no-leaked-handles invariant.

use crate::{
    AdapterError, AdapterFactory, Completion, EmbeddingAdapter, ExtractRequest, Extraction,
    LlmAdapter, LlmMetrics, ToolContext, UsageReason, VectorDbAdapter, X2TextAdapter,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockLlmState {
    /// `(substring, response)` pairs; first match wins.
    scripted: Mutex<Vec<(String, String)>>,
    default_response: Mutex<String>,
    prompts: Mutex<Vec<String>>,
    fail_with: Mutex<Option<String>>,
    calls: AtomicU32,
}

/// Shared scripting surface for mock LLM handles.
#[derive(Clone, Default)]
pub struct MockLlm {
    state: Arc<MockLlmState>,
}

impl MockLlm {
    /// Respond with `response` whenever the prompt contains `needle`.
    pub fn respond_when(&self, needle: impl Into<String>, response: impl Into<String>) {
        self.state
            .scripted
            .lock()
            .unwrap()
            .push((needle.into(), response.into()));
    }

    /// Response used when nothing scripted matches.
    pub fn respond_default(&self, response: impl Into<String>) {
        *self.state.default_response.lock().unwrap() = response.into();
    }

    /// Make every completion fail with an adapter error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.state.fail_with.lock().unwrap() = Some(message.into());
    }

    /// Every prompt submitted so far, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.state.prompts.lock().unwrap().clone()
    }

    /// Number of completion calls across all handles.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.state.calls.load(Ordering::Relaxed)
    }
}

struct MockLlmHandle {
    instance_id: String,
    usage_reason: UsageReason,
    shared: Arc<MockLlmState>,
}

#[async_trait]
impl LlmAdapter for MockLlmHandle {
    fn id(&self) -> &str {
        &self.instance_id
    }

    fn usage_reason(&self) -> UsageReason {
        self.usage_reason
    }

    async fn complete(&self, prompt: &str) -> Result<Completion, AdapterError> {
        self.shared.calls.fetch_add(1, Ordering::Relaxed);
        self.shared.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(message) = self.shared.fail_with.lock().unwrap().clone() {
            return Err(AdapterError::Adapter {
                adapter: self.instance_id.clone(),
                message,
            });
        }

        let scripted = self.shared.scripted.lock().unwrap();
        let text = scripted
            .iter()
            .find(|(needle, _)| prompt.contains(needle))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.shared.default_response.lock().unwrap().clone());
        Ok(Completion {
            text,
            ..Completion::default()
        })
    }

    fn metrics(&self) -> LlmMetrics {
        LlmMetrics {
            tokens: u64::from(self.shared.calls.load(Ordering::Relaxed)) * 10,
            latency_ms: u64::from(self.shared.calls.load(Ordering::Relaxed)),
            calls: self.shared.calls.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Embedding
// ---------------------------------------------------------------------------

struct MockEmbeddingHandle {
    instance_id: String,
}

#[async_trait]
impl EmbeddingAdapter for MockEmbeddingHandle {
    fn id(&self) -> &str {
        &self.instance_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AdapterError> {
        // Deterministic toy embedding: length and byte sum.
        let sum: u32 = text.bytes().map(u32::from).sum();
        Ok(vec![text.len() as f32, sum as f32])
    }
}

// ---------------------------------------------------------------------------
// Vector DB
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockVectorDbState {
    indexed_docs: Mutex<BTreeMap<String, u32>>,
    search_results: Mutex<Vec<String>>,
    index_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

/// Shared scripting surface for mock vector-DB handles.
#[derive(Clone, Default)]
pub struct MockVectorDb {
    state: Arc<MockVectorDbState>,
}

impl MockVectorDb {
    /// Chunks returned by every search.
    pub fn search_returns(&self, chunks: Vec<String>) {
        *self.state.search_results.lock().unwrap() = chunks;
    }

    /// Mark `doc_id` as already indexed.
    pub fn mark_indexed(&self, doc_id: impl Into<String>) {
        self.state
            .indexed_docs
            .lock()
            .unwrap()
            .insert(doc_id.into(), 1);
    }

    /// Number of `index_chunks` calls across all handles.
    #[must_use]
    pub fn index_calls(&self) -> usize {
        self.state.index_calls.load(Ordering::Relaxed)
    }

    /// Number of `search` calls across all handles.
    #[must_use]
    pub fn search_calls(&self) -> usize {
        self.state.search_calls.load(Ordering::Relaxed)
    }
}

struct MockVectorDbHandle {
    instance_id: String,
    shared: Arc<MockVectorDbState>,
    open_handles: Arc<AtomicI64>,
    closed: AtomicU32,
}

#[async_trait]
impl VectorDbAdapter for MockVectorDbHandle {
    fn id(&self) -> &str {
        &self.instance_id
    }

    async fn is_indexed(&self, doc_id: &str) -> Result<bool, AdapterError> {
        Ok(self.shared.indexed_docs.lock().unwrap().contains_key(doc_id))
    }

    async fn index_chunks(
        &self,
        doc_id: &str,
        text: &str,
        chunk_size: u32,
        _chunk_overlap: u32,
    ) -> Result<u32, AdapterError> {
        self.shared.index_calls.fetch_add(1, Ordering::Relaxed);
        let chunks = (text.len() as u32 / chunk_size.max(1)).max(1);
        self.shared
            .indexed_docs
            .lock()
            .unwrap()
            .insert(doc_id.to_string(), chunks);
        Ok(chunks)
    }

    async fn search(
        &self,
        _doc_id: &str,
        _query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, AdapterError> {
        self.shared.search_calls.fetch_add(1, Ordering::Relaxed);
        let results = self.shared.search_results.lock().unwrap();
        Ok(results.iter().take(top_k).cloned().collect())
    }

    async fn close(&self) {
        // Idempotent: only the first close releases the handle.
        if self.closed.fetch_add(1, Ordering::Relaxed) == 0 {
            self.open_handles.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

// ---------------------------------------------------------------------------
// X2Text
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockX2TextState {
    text: Mutex<String>,
    whisper_hash: Mutex<Option<String>>,
    supports_highlight: Mutex<bool>,
    fail_with: Mutex<Option<String>>,
    requests: Mutex<Vec<ExtractRequest>>,
}

/// Shared scripting surface for mock x2text handles.
#[derive(Clone, Default)]
pub struct MockX2Text {
    state: Arc<MockX2TextState>,
}

impl MockX2Text {
    /// Text returned by every extraction.
    pub fn extracts(&self, text: impl Into<String>) {
        *self.state.text.lock().unwrap() = text.into();
    }

    /// Behave as a whisper-style adapter yielding `hash` on highlight runs.
    pub fn with_whisper_hash(&self, hash: impl Into<String>) {
        *self.state.supports_highlight.lock().unwrap() = true;
        *self.state.whisper_hash.lock().unwrap() = Some(hash.into());
    }

    /// Make every extraction fail with an adapter error.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.state.fail_with.lock().unwrap() = Some(message.into());
    }

    /// Every extraction request submitted so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ExtractRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

struct MockX2TextHandle {
    instance_id: String,
    shared: Arc<MockX2TextState>,
}

#[async_trait]
impl X2TextAdapter for MockX2TextHandle {
    fn name(&self) -> &str {
        &self.instance_id
    }

    fn supports_highlight(&self) -> bool {
        *self.shared.supports_highlight.lock().unwrap()
    }

    async fn extract(&self, request: ExtractRequest) -> Result<Extraction, AdapterError> {
        if let Some(message) = self.shared.fail_with.lock().unwrap().clone() {
            return Err(AdapterError::Adapter {
                adapter: self.instance_id.clone(),
                message,
            });
        }
        let enable_highlight = request.enable_highlight;
        self.shared.requests.lock().unwrap().push(request);
        Ok(Extraction {
            extracted_text: self.shared.text.lock().unwrap().clone(),
            whisper_hash: if enable_highlight {
                self.shared.whisper_hash.lock().unwrap().clone()
            } else {
                None
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Factory handing out mock handles backed by shared scripting state.
#[derive(Clone, Default)]
pub struct MockAdapterFactory {
    /// LLM scripting surface.
    pub llm: MockLlm,
    /// Vector-DB scripting surface.
    pub vector_db: MockVectorDb,
    /// X2Text scripting surface.
    pub x2text: MockX2Text,
    open_vector_handles: Arc<AtomicI64>,
    vector_db_constructions: Arc<AtomicUsize>,
}

impl MockAdapterFactory {
    /// A factory with default (unscripted) mocks.
    #[must_use]
    pub fn new() -> Self {
        let factory = Self::default();
        factory.llm.respond_default("mock answer");
        factory.x2text.extracts("mock extracted text");
        factory
            .vector_db
            .search_returns(vec!["mock context chunk".to_string()]);
        factory
    }

    /// Vector-DB handles currently open (constructed and not yet closed).
    #[must_use]
    pub fn open_vector_handles(&self) -> i64 {
        self.open_vector_handles.load(Ordering::Relaxed)
    }

    /// Total vector-DB handles ever constructed.
    #[must_use]
    pub fn vector_db_constructions(&self) -> usize {
        self.vector_db_constructions.load(Ordering::Relaxed)
    }
}

impl AdapterFactory for MockAdapterFactory {
    fn llm(
        &self,
        instance_id: &str,
        _tool: &dyn ToolContext,
        usage_reason: UsageReason,
    ) -> Result<Arc<dyn LlmAdapter>, AdapterError> {
        Ok(Arc::new(MockLlmHandle {
            instance_id: instance_id.to_string(),
            usage_reason,
            shared: Arc::clone(&self.llm.state),
        }))
    }

    fn embedding(
        &self,
        instance_id: &str,
        _tool: &dyn ToolContext,
    ) -> Result<Arc<dyn EmbeddingAdapter>, AdapterError> {
        Ok(Arc::new(MockEmbeddingHandle {
            instance_id: instance_id.to_string(),
        }))
    }

    fn vector_db(
        &self,
        instance_id: &str,
        _embedding: Arc<dyn EmbeddingAdapter>,
        _tool: &dyn ToolContext,
    ) -> Result<Arc<dyn VectorDbAdapter>, AdapterError> {
        self.vector_db_constructions.fetch_add(1, Ordering::Relaxed);
        self.open_vector_handles.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockVectorDbHandle {
            instance_id: instance_id.to_string(),
            shared: Arc::clone(&self.vector_db.state),
            open_handles: Arc::clone(&self.open_vector_handles),
            closed: AtomicU32::new(0),
        }))
    }

    fn x2text(
        &self,
        instance_id: &str,
        _tool: &dyn ToolContext,
    ) -> Result<Arc<dyn X2TextAdapter>, AdapterError> {
        Ok(Arc::new(MockX2TextHandle {
            instance_id: instance_id.to_string(),
            shared: Arc::clone(&self.x2text.state),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_telemetry::{LogLevel, LogState};

    struct NullTool;

    impl ToolContext for NullTool {
        fn get_env_or_die(&self, key: &str) -> Result<String, AdapterError> {
            Err(AdapterError::Env {
                key: key.to_string(),
            })
        }
        fn stream_log(&self, _message: &str, _level: LogLevel) {}
        fn stream_update(&self, _message: &str, _state: LogState) {}
        fn stream_error(&self, message: &str) -> AdapterError {
            AdapterError::Tool(message.to_string())
        }
    }

    #[tokio::test]
    async fn llm_scripted_responses_match_by_substring() {
        let factory = MockAdapterFactory::new();
        factory.llm.respond_when("revenue", "$1M");

        let llm = factory
            .llm("llm-1", &NullTool, UsageReason::Extraction)
            .unwrap();
        let answer = llm.complete("What is the revenue?").await.unwrap();
        assert_eq!(answer.text, "$1M");

        let fallback = llm.complete("Unrelated question").await.unwrap();
        assert_eq!(fallback.text, "mock answer");
        assert_eq!(factory.llm.call_count(), 2);
    }

    #[tokio::test]
    async fn vector_db_handles_track_open_and_close() {
        let factory = MockAdapterFactory::new();
        let embedding = factory.embedding("emb-1", &NullTool).unwrap();
        let db = factory.vector_db("vdb-1", embedding, &NullTool).unwrap();
        assert_eq!(factory.open_vector_handles(), 1);

        db.close().await;
        db.close().await;
        assert_eq!(factory.open_vector_handles(), 0);
        assert_eq!(factory.vector_db_constructions(), 1);
    }

    #[tokio::test]
    async fn x2text_reports_whisper_hash_only_with_highlight() {
        let factory = MockAdapterFactory::new();
        factory.x2text.extracts("Revenue is $1M");
        factory.x2text.with_whisper_hash("w-123");

        let x2text = factory.x2text("x2t-1", &NullTool).unwrap();
        let plain = x2text.extract(ExtractRequest::default()).await.unwrap();
        assert_eq!(plain.whisper_hash, None);

        let highlighted = x2text
            .extract(ExtractRequest {
                enable_highlight: true,
                ..ExtractRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(highlighted.whisper_hash.as_deref(), Some("w-123"));
    }
}
