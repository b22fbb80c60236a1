// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `index` operation: vector-DB indexing of extracted text.

use crate::error::LegacyExecutorError;
use crate::indexing::{IndexKeyInputs, generate_index_key};
use crate::params::{Params, missing_params_error};
use docpipe_core::{ExecutionContext, ExecutionResult, ExecutionSource};
use docpipe_executor::{ExecutorEnv, ExecutorToolShim};
use serde_json::Value;
use std::path::PathBuf;

pub(crate) async fn handle_index(
    context: &ExecutionContext,
    env: &ExecutorEnv,
) -> Result<ExecutionResult, LegacyExecutorError> {
    let params = Params(&context.executor_params);

    let missing = params.missing(&[
        "embedding_instance_id",
        "vector_db_instance_id",
        "x2text_instance_id",
        "file_path",
    ]);
    if !missing.is_empty() {
        return Ok(ExecutionResult::failure(missing_params_error(&missing)));
    }

    let embedding_instance_id = params.str("embedding_instance_id").unwrap_or_default();
    let vector_db_instance_id = params.str("vector_db_instance_id").unwrap_or_default();
    let x2text_instance_id = params.str("x2text_instance_id").unwrap_or_default();
    let file_path = PathBuf::from(params.str("file_path").unwrap_or_default());

    let extracted_text = params.string_or_empty("extracted_text");
    let file_hash = params.str("file_hash");
    let chunk_size = params.u32_or("chunk_size", 512);
    let chunk_overlap = params.u32_or("chunk_overlap", 128);
    let reindex = params.bool_or("reindex", false);

    let source: ExecutionSource = match context.execution_source.parse() {
        Ok(source) => source,
        Err(err) => return Ok(ExecutionResult::failure(err.to_string())),
    };
    let store = env.storage.open(source);
    let shim = ExecutorToolShim::new(params.string_or_empty("platform_api_key"));

    let doc_id = generate_index_key(
        IndexKeyInputs {
            vector_db: vector_db_instance_id,
            embedding: embedding_instance_id,
            x2text: x2text_instance_id,
            chunk_size,
            chunk_overlap,
        },
        &file_path,
        file_hash,
        &store,
    )
    .await?;

    // chunk_size 0 means the answer path runs in full-context mode; no
    // vector operations happen at all.
    if chunk_size == 0 {
        tracing::info!("Skipping indexing for chunk_size=0. Doc ID: {doc_id}");
        return Ok(ExecutionResult::ok_entry("doc_id", Value::String(doc_id)));
    }

    let embedding = env
        .adapters
        .embedding(embedding_instance_id, &shim)
        .map_err(|e| LegacyExecutorError::AdapterFetch(e.to_string()))?;
    let vector_db = env
        .adapters
        .vector_db(vector_db_instance_id, embedding, &shim)
        .map_err(|e| LegacyExecutorError::AdapterFetch(e.to_string()))?;

    // The handle must be released on every path, so the fallible part runs
    // in a block whose outcome is checked only after close.
    let outcome: Result<(), LegacyExecutorError> = async {
        let doc_id_found = vector_db
            .is_indexed(&doc_id)
            .await
            .map_err(|e| LegacyExecutorError::Indexing(e.to_string()))?;
        if doc_id_found && !reindex {
            tracing::info!("Document already indexed under {doc_id}");
            return Ok(());
        }
        let chunks = vector_db
            .index_chunks(&doc_id, &extracted_text, chunk_size, chunk_overlap)
            .await
            .map_err(|e| LegacyExecutorError::Indexing(e.to_string()))?;
        tracing::info!("Indexed {chunks} chunks under {doc_id}");
        Ok(())
    }
    .await;

    vector_db.close().await;
    outcome?;

    Ok(ExecutionResult::ok_entry("doc_id", Value::String(doc_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::{env_with, tool_context};
    use serde_json::json;

    fn index_params(chunk_size: u32) -> serde_json::Value {
        json!({
            "embedding_instance_id": "emb-1",
            "vector_db_instance_id": "vdb-1",
            "x2text_instance_id": "x2t-1",
            "file_path": "/in/a.pdf",
            "file_hash": "hash-1",
            "extracted_text": "Revenue is $1M",
            "chunk_size": chunk_size,
            "chunk_overlap": 128,
        })
    }

    #[tokio::test]
    async fn indexes_and_returns_doc_id() {
        let (env, factory, _dir) = env_with();
        let ctx = tool_context("index", index_params(512));

        let result = handle_index(&ctx, &env).await.unwrap();
        assert!(result.success);
        assert!(result.data["doc_id"].is_string());
        assert_eq!(factory.vector_db.index_calls(), 1);
        assert_eq!(factory.open_vector_handles(), 0);
    }

    #[tokio::test]
    async fn chunk_size_zero_bypasses_vector_operations() {
        let (env, factory, _dir) = env_with();
        let ctx = tool_context("index", index_params(0));

        let result = handle_index(&ctx, &env).await.unwrap();
        assert!(result.success);
        assert!(result.data["doc_id"].is_string());
        // The vector-DB constructor must not be called on this path.
        assert_eq!(factory.vector_db_constructions(), 0);
    }

    #[tokio::test]
    async fn already_indexed_without_reindex_is_a_noop() {
        let (env, factory, _dir) = env_with();

        let ctx = tool_context("index", index_params(512));
        let first = handle_index(&ctx, &env).await.unwrap();
        let doc_id = first.data["doc_id"].as_str().unwrap().to_string();
        factory.vector_db.mark_indexed(&doc_id);

        handle_index(&ctx, &env).await.unwrap();
        // One real indexing pass; the second call found the doc and skipped.
        assert_eq!(factory.vector_db.index_calls(), 1);
        assert_eq!(factory.open_vector_handles(), 0);
    }

    #[tokio::test]
    async fn missing_params_fail_with_names() {
        let (env, _factory, _dir) = env_with();
        let ctx = tool_context("index", json!({"file_path": "/in/a.pdf"}));

        let result = handle_index(&ctx, &env).await.unwrap();
        assert!(!result.success);
        let error = result.error.unwrap();
        assert!(error.contains("embedding_instance_id"));
        assert!(error.contains("vector_db_instance_id"));
        assert!(error.contains("x2text_instance_id"));
    }
}
