// SPDX-License-Identifier: MIT OR Apache-2.0
//! Strategy-selected context retrieval over a vector index.

use crate::error::LegacyExecutorError;
use docpipe_adapters::{LlmAdapter, VectorDbAdapter};
use docpipe_storage::FileStore;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

/// Default top-k when a prompt spec does not carry `similarity_top_k`.
pub const DEFAULT_TOP_K: usize = 3;

/// Supported retrieval strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// Plain top-k similarity search.
    Simple,
    /// Decompose the prompt into sub-questions, retrieve for each, union.
    Subquestion,
}

impl RetrievalStrategy {
    /// The wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Simple => "simple",
            RetrievalStrategy::Subquestion => "subquestion",
        }
    }
}

impl FromStr for RetrievalStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(RetrievalStrategy::Simple),
            "subquestion" => Ok(RetrievalStrategy::Subquestion),
            _ => Err(()),
        }
    }
}

/// Retrieval over a vector index plus the chunk-0 full-context bypass.
pub struct RetrievalService;

impl RetrievalService {
    /// Retrieve context chunks for one prompt using the given strategy.
    ///
    /// Records elapsed time, chunk count, and strategy under
    /// `metrics[prompt_key].context_retrieval`.
    ///
    /// # Errors
    ///
    /// Adapter failures surface as [`LegacyExecutorError::Completion`] (sub-
    /// question decomposition) or [`LegacyExecutorError::Indexing`] (vector
    /// search).
    pub async fn run_retrieval(
        prompt: &str,
        doc_id: &str,
        llm: &dyn LlmAdapter,
        vector_db: &dyn VectorDbAdapter,
        strategy: RetrievalStrategy,
        top_k: usize,
        metrics: &mut Map<String, Value>,
        prompt_key: &str,
    ) -> Result<Vec<String>, LegacyExecutorError> {
        let started = Instant::now();
        let chunks = match strategy {
            RetrievalStrategy::Simple => {
                Self::search(vector_db, doc_id, prompt, top_k).await?
            }
            RetrievalStrategy::Subquestion => {
                let decomposition_prompt = format!(
                    "Break the following question down into simple, self-contained \
                     subquestions. Output one subquestion per line with no numbering \
                     or commentary.\n\nQuestion: {prompt}"
                );
                let decomposed = llm
                    .complete(&decomposition_prompt)
                    .await
                    .map_err(|e| LegacyExecutorError::Completion(e.to_string()))?;

                let mut union: Vec<String> = Vec::new();
                for subquestion in decomposed.text.lines() {
                    let subquestion = subquestion.trim();
                    if subquestion.is_empty() {
                        continue;
                    }
                    for chunk in Self::search(vector_db, doc_id, subquestion, top_k).await? {
                        if !union.contains(&chunk) {
                            union.push(chunk);
                        }
                    }
                }
                union
            }
        };

        record_retrieval_metrics(metrics, prompt_key, strategy.as_str(), &chunks, started);
        Ok(chunks)
    }

    /// The chunk-size-zero path: the whole extracted text as one chunk.
    ///
    /// # Errors
    ///
    /// Storage failures reading the extracted text.
    pub async fn retrieve_complete_context(
        store: &dyn FileStore,
        file_path: &Path,
        metrics: &mut Map<String, Value>,
        prompt_key: &str,
    ) -> Result<Vec<String>, LegacyExecutorError> {
        let started = Instant::now();
        let content = store.read_to_string(file_path).await?;
        let chunks = vec![content];
        record_retrieval_metrics(metrics, prompt_key, "full_context", &chunks, started);
        Ok(chunks)
    }

    async fn search(
        vector_db: &dyn VectorDbAdapter,
        doc_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, LegacyExecutorError> {
        vector_db
            .search(doc_id, query, top_k)
            .await
            .map_err(|e| LegacyExecutorError::Indexing(e.to_string()))
    }
}

fn record_retrieval_metrics(
    metrics: &mut Map<String, Value>,
    prompt_key: &str,
    strategy: &str,
    chunks: &[String],
    started: Instant,
) {
    metrics.insert(
        prompt_key.to_string(),
        json!({
            "time_taken(s)": started.elapsed().as_secs_f64(),
            "chunks": chunks.len(),
            "strategy": strategy,
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_adapters::mock::MockAdapterFactory;
    use docpipe_adapters::{AdapterError, AdapterFactory, ToolContext, UsageReason};
    use docpipe_storage::LocalFileStore;
    use docpipe_telemetry::{LogLevel, LogState};

    struct NullTool;

    impl ToolContext for NullTool {
        fn get_env_or_die(&self, key: &str) -> Result<String, AdapterError> {
            Err(AdapterError::Env { key: key.into() })
        }
        fn stream_log(&self, _m: &str, _l: LogLevel) {}
        fn stream_update(&self, _m: &str, _s: LogState) {}
        fn stream_error(&self, m: &str) -> AdapterError {
            AdapterError::Tool(m.into())
        }
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("simple".parse(), Ok(RetrievalStrategy::Simple));
        assert_eq!("subquestion".parse(), Ok(RetrievalStrategy::Subquestion));
        assert!("keyword".parse::<RetrievalStrategy>().is_err());
    }

    #[tokio::test]
    async fn simple_retrieval_records_metrics() {
        let factory = MockAdapterFactory::new();
        factory
            .vector_db
            .search_returns(vec!["chunk one".into(), "chunk two".into()]);
        let llm = factory.llm("llm-1", &NullTool, UsageReason::Extraction).unwrap();
        let embedding = factory.embedding("emb-1", &NullTool).unwrap();
        let vdb = factory.vector_db("vdb-1", embedding, &NullTool).unwrap();

        let mut metrics = Map::new();
        let chunks = RetrievalService::run_retrieval(
            "What is the revenue?",
            "doc-1",
            llm.as_ref(),
            vdb.as_ref(),
            RetrievalStrategy::Simple,
            2,
            &mut metrics,
            "revenue",
        )
        .await
        .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(metrics["revenue"]["chunks"], 2);
        assert_eq!(metrics["revenue"]["strategy"], "simple");
    }

    #[tokio::test]
    async fn subquestion_retrieval_unions_chunks() {
        let factory = MockAdapterFactory::new();
        factory.llm.respond_when("subquestions", "What is X?\nWhat is Y?");
        factory.vector_db.search_returns(vec!["shared chunk".into()]);
        let llm = factory.llm("llm-1", &NullTool, UsageReason::Extraction).unwrap();
        let embedding = factory.embedding("emb-1", &NullTool).unwrap();
        let vdb = factory.vector_db("vdb-1", embedding, &NullTool).unwrap();

        let mut metrics = Map::new();
        let chunks = RetrievalService::run_retrieval(
            "Compound question",
            "doc-1",
            llm.as_ref(),
            vdb.as_ref(),
            RetrievalStrategy::Subquestion,
            3,
            &mut metrics,
            "p1",
        )
        .await
        .unwrap();

        // Two subquestions, identical results: union keeps one copy.
        assert_eq!(chunks, vec!["shared chunk".to_string()]);
        assert_eq!(factory.vector_db.search_calls(), 2);
    }

    #[tokio::test]
    async fn complete_context_reads_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        tokio::fs::write(dir.path().join("EXTRACT"), "full text")
            .await
            .unwrap();

        let mut metrics = Map::new();
        let chunks = RetrievalService::retrieve_complete_context(
            &store,
            &dir.path().join("EXTRACT"),
            &mut metrics,
            "p1",
        )
        .await
        .unwrap();

        assert_eq!(chunks, vec!["full text".to_string()]);
        assert_eq!(metrics["p1"]["strategy"], "full_context");
    }
}
