// SPDX-License-Identifier: MIT OR Apache-2.0
//! API upload staging.
//!
//! Uploaded blobs are streamed into the API storage path while a chunked
//! SHA-256 runs over the same bytes. Files with a MIME type outside the
//! allowed set still produce a record — marked executed under a synthetic
//! hash — so downstream accounting sees them without ingesting them.

use crate::SourceError;
use docpipe_core::{ContentHasher, HASH_CHUNK_SIZE};
use docpipe_storage::FileStore;
use docpipe_telemetry::WorkflowLogger;
use docpipe_workflow::{ConnectionType, FileHash, FileHistoryStore};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use uuid::Uuid;

/// MIME types the platform will ingest.
const ALLOWED_MIME_TYPES: [&str; 11] = [
    "application/pdf",
    "text/plain",
    "text/csv",
    "text/markdown",
    "image/png",
    "image/jpeg",
    "image/tiff",
    "image/bmp",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/octet-stream",
];

fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime)
}

/// One uploaded file to stage.
#[derive(Debug, Clone)]
pub struct ApiUpload {
    /// Name of the uploaded file.
    pub file_name: String,
    /// Upload content.
    pub content: Vec<u8>,
    /// Caller-declared MIME type, when the request carried one.
    pub mime_type: Option<String>,
}

/// Stage uploads into `api_storage_dir`, deduplicating within the batch and
/// consulting file history when opted in.
///
/// # Errors
///
/// Storage and store failures; individual unsupported files never error.
pub async fn stage_api_uploads(
    workflow_id: &str,
    uploads: Vec<ApiUpload>,
    use_file_history: bool,
    store: &dyn FileStore,
    api_storage_dir: &Path,
    history: &dyn FileHistoryStore,
    logger: &WorkflowLogger,
) -> Result<BTreeMap<String, FileHash>, SourceError> {
    logger.publish_log("Staging files in API storage for validation and processing.");

    let mut file_hashes: BTreeMap<String, FileHash> = BTreeMap::new();
    let mut unique_hashes: HashSet<String> = HashSet::new();

    for upload in uploads {
        let destination = api_storage_dir.join(&upload.file_name);
        let destination_str = destination.to_string_lossy().into_owned();
        let size = upload.content.len() as u64;

        let mime_type = upload
            .mime_type
            .clone()
            .or_else(|| {
                mime_guess::from_path(&upload.file_name)
                    .first_raw()
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::info!(
            "Detected MIME type: {mime_type} for file {}",
            upload.file_name
        );

        if !is_allowed_mime(&mime_type) {
            logger.publish_log(format!(
                "Skipping file '{}' to stage due to unsupported MIME type '{mime_type}'",
                upload.file_name
            ));
            // Synthetic hash: accounted for downstream without reading the
            // content or staging the bytes.
            let mut file = FileHash::new(
                destination_str,
                upload.file_name.clone(),
                size,
                ConnectionType::Api,
            )
            .with_hash(format!("temp-hash-{}", Uuid::new_v4().simple()));
            file.mime_type = Some(mime_type);
            file.is_executed = true;
            file_hashes.insert(upload.file_name, file);
            continue;
        }

        // Stream into storage while hashing the same chunks.
        let mut hasher = ContentHasher::new();
        for chunk in upload.content.chunks(HASH_CHUNK_SIZE) {
            hasher.update(chunk);
            store.append(&destination, chunk).await?;
        }
        let content_hash = hasher.finish();

        if !unique_hashes.insert(content_hash.clone()) {
            logger.publish_log(format!(
                "Skipping file '{}' — duplicate detected within the current request. \
                 Already staged for processing.",
                upload.file_name
            ));
            continue;
        }

        let is_executed = if use_file_history {
            history
                .get(workflow_id, &content_hash, None)
                .await?
                .is_some_and(|h| h.is_completed)
        } else {
            false
        };

        let mut file = FileHash::new(
            destination_str,
            upload.file_name.clone(),
            size,
            ConnectionType::Api,
        )
        .with_hash(content_hash);
        file.mime_type = Some(mime_type);
        file.is_executed = is_executed;
        file_hashes.insert(upload.file_name, file);
    }

    Ok(file_hashes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_core::sha256_hex;
    use docpipe_storage::LocalFileStore;
    use docpipe_telemetry::{LogStage, MemoryPublisher};
    use docpipe_workflow::{FileHistory, MemoryWorkflowStore};
    use std::sync::Arc;

    fn logger() -> (WorkflowLogger, Arc<MemoryPublisher>) {
        let publisher = Arc::new(MemoryPublisher::new());
        (
            WorkflowLogger::new(publisher.clone(), "exec-1", LogStage::Build, "exec-1", None),
            publisher,
        )
    }

    fn upload(name: &str, content: &[u8], mime: Option<&str>) -> ApiUpload {
        ApiUpload {
            file_name: name.to_string(),
            content: content.to_vec(),
            mime_type: mime.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn stages_and_hashes_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let history = MemoryWorkflowStore::new();
        let (logger, _publisher) = logger();

        let files = stage_api_uploads(
            "wf-1",
            vec![upload("a.pdf", b"pdf bytes", Some("application/pdf"))],
            false,
            &store,
            dir.path(),
            &history,
            &logger,
        )
        .await
        .unwrap();

        let file = &files["a.pdf"];
        assert_eq!(file.file_hash.as_deref(), Some(sha256_hex(b"pdf bytes").as_str()));
        assert!(!file.is_executed);
        let staged = tokio::fs::read(dir.path().join("a.pdf")).await.unwrap();
        assert_eq!(staged, b"pdf bytes");
    }

    #[tokio::test]
    async fn duplicate_content_within_batch_is_staged_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let history = MemoryWorkflowStore::new();
        let (logger, publisher) = logger();

        let files = stage_api_uploads(
            "wf-1",
            vec![
                upload("a.pdf", b"same bytes", Some("application/pdf")),
                upload("b.pdf", b"same bytes", Some("application/pdf")),
            ],
            false,
            &store,
            dir.path(),
            &history,
            &logger,
        )
        .await
        .unwrap();

        assert_eq!(files.len(), 1);
        assert!(files.contains_key("a.pdf"));
        assert!(
            publisher
                .messages()
                .iter()
                .any(|m| m.contains("duplicate detected within the current request"))
        );
    }

    #[tokio::test]
    async fn unsupported_mime_yields_synthetic_executed_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let history = MemoryWorkflowStore::new();
        let (logger, publisher) = logger();

        let files = stage_api_uploads(
            "wf-1",
            vec![upload("binary.exe", b"MZ...", Some("application/x-msdownload"))],
            false,
            &store,
            dir.path(),
            &history,
            &logger,
        )
        .await
        .unwrap();

        let file = &files["binary.exe"];
        assert!(file.is_executed);
        assert!(file.file_hash.as_deref().unwrap().starts_with("temp-hash-"));
        // Content is never staged.
        assert!(!dir.path().join("binary.exe").exists());
        assert!(
            publisher
                .messages()
                .iter()
                .any(|m| m.contains("unsupported MIME type"))
        );
    }

    #[tokio::test]
    async fn file_history_marks_completed_content_executed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let history = MemoryWorkflowStore::new();
        let (logger, _publisher) = logger();

        use docpipe_workflow::FileHistoryStore as _;
        history
            .record(FileHistory::completed(
                "wf-1",
                sha256_hex(b"known bytes"),
                None,
                "{}",
            ))
            .await
            .unwrap();

        let files = stage_api_uploads(
            "wf-1",
            vec![upload("known.pdf", b"known bytes", Some("application/pdf"))],
            true,
            &store,
            dir.path(),
            &history,
            &logger,
        )
        .await
        .unwrap();

        assert!(files["known.pdf"].is_executed);
    }

    #[tokio::test]
    async fn mime_guessed_from_extension_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path());
        let history = MemoryWorkflowStore::new();
        let (logger, _publisher) = logger();

        let files = stage_api_uploads(
            "wf-1",
            vec![upload("notes.txt", b"text", None)],
            false,
            &store,
            dir.path(),
            &history,
            &logger,
        )
        .await
        .unwrap();

        assert_eq!(files["notes.txt"].mime_type.as_deref(), Some("text/plain"));
    }
}
