// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic doc-id generation.
//!
//! The doc id identifies one vector-index namespace entry. It is derived
//! from the chunking tuple (vector DB, embedding, x2text, chunk size, chunk
//! overlap) combined with the file's content hash, so the same file indexed
//! with the same parameters always lands in the same place.

use crate::error::LegacyExecutorError;
use docpipe_core::sha256_hex;
use docpipe_storage::FileStore;
use std::path::Path;

/// Identifiers that key an index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKeyInputs<'a> {
    /// Vector-DB adapter instance id.
    pub vector_db: &'a str,
    /// Embedding adapter instance id.
    pub embedding: &'a str,
    /// X2Text adapter instance id.
    pub x2text: &'a str,
    /// Chunk size used for indexing.
    pub chunk_size: u32,
    /// Chunk overlap used for indexing.
    pub chunk_overlap: u32,
}

/// Compute the doc id for a file under the given parameters.
///
/// Uses `file_hash` when the caller already knows it; otherwise hashes the
/// file content through the store (chunked).
///
/// # Errors
///
/// Storage failures while hashing the file.
pub async fn generate_index_key(
    inputs: IndexKeyInputs<'_>,
    file_path: &Path,
    file_hash: Option<&str>,
    store: &dyn FileStore,
) -> Result<String, LegacyExecutorError> {
    let content_hash = match file_hash {
        Some(hash) if !hash.is_empty() => hash.to_string(),
        _ => store.hash_file(file_path).await?,
    };
    let key = format!(
        "vector_db={}|embedding={}|x2text={}|chunk_size={}|chunk_overlap={}|file_hash={}",
        inputs.vector_db,
        inputs.embedding,
        inputs.x2text,
        inputs.chunk_size,
        inputs.chunk_overlap,
        content_hash,
    );
    Ok(sha256_hex(key.as_bytes()))
}
