// SPDX-License-Identifier: MIT OR Apache-2.0
//! The listing connector and its duplicate-suppression guards.
//!
//! Three composable guards keep a file out of a listing: the intra-listing
//! path/name dedup, the persistent file-history cache (opt-in), and the
//! in-flight check against rows of active executions. A connector missing
//! the inputs for one guard (no content hash, no provider UUID) simply
//! passes that guard.

use crate::fs::{DirListing, FsEntry, SourceFs};
use crate::patterns::FilePatterns;
use crate::{SourceConfig, SourceError};
use docpipe_telemetry::{LogState, WorkflowLogger};
use docpipe_workflow::{
    ConnectionType, FileExecutionStore, FileHash, FileHistoryStore, WorkflowExecutionStore,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// The source connector for one workflow execution.
pub struct SourceConnector {
    workflow_id: String,
    organization_id: Option<String>,
    connection_type: ConnectionType,
    config: SourceConfig,
    fs: Arc<dyn SourceFs>,
    history: Arc<dyn FileHistoryStore>,
    executions: Arc<dyn WorkflowExecutionStore>,
    file_executions: Arc<dyn FileExecutionStore>,
    logger: WorkflowLogger,
}

impl SourceConnector {
    /// A filesystem-backed connector.
    #[allow(clippy::too_many_arguments)]
    pub fn filesystem(
        workflow_id: impl Into<String>,
        organization_id: Option<String>,
        config: SourceConfig,
        fs: Arc<dyn SourceFs>,
        history: Arc<dyn FileHistoryStore>,
        executions: Arc<dyn WorkflowExecutionStore>,
        file_executions: Arc<dyn FileExecutionStore>,
        logger: WorkflowLogger,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            organization_id,
            connection_type: ConnectionType::Filesystem,
            config,
            fs,
            history,
            executions,
            file_executions,
            logger,
        }
    }

    /// An API-backed connector; listing passes staged uploads through.
    #[allow(clippy::too_many_arguments)]
    pub fn api(
        workflow_id: impl Into<String>,
        organization_id: Option<String>,
        config: SourceConfig,
        fs: Arc<dyn SourceFs>,
        history: Arc<dyn FileHistoryStore>,
        executions: Arc<dyn WorkflowExecutionStore>,
        file_executions: Arc<dyn FileExecutionStore>,
        logger: WorkflowLogger,
    ) -> Self {
        Self {
            connection_type: ConnectionType::Api,
            ..Self::filesystem(
                workflow_id,
                organization_id,
                config,
                fs,
                history,
                executions,
                file_executions,
                logger,
            )
        }
    }

    /// The connector's workflow.
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// List files from the source and assign 1-based file numbers.
    ///
    /// For API connectors the staged `file_hashes` pass through; for
    /// filesystem connectors the configured folders are walked.
    ///
    /// # Errors
    ///
    /// Invalid folders, pattern compilation failures, and store errors.
    pub async fn list_files_from_source(
        &self,
        file_hashes: BTreeMap<String, FileHash>,
    ) -> Result<(BTreeMap<String, FileHash>, usize), SourceError> {
        let mut files: Vec<FileHash> = match self.connection_type {
            ConnectionType::Filesystem => self.list_files_from_file_connector().await?,
            ConnectionType::Api => file_hashes.into_values().collect(),
        };

        for (index, file) in files.iter_mut().enumerate() {
            file.file_number = Some(index as u32 + 1);
        }
        let count = files.len();
        let map = files
            .into_iter()
            .map(|file| (file.file_path.clone(), file))
            .collect();
        Ok((map, count))
    }

    async fn list_files_from_file_connector(&self) -> Result<Vec<FileHash>, SourceError> {
        let patterns = FilePatterns::new(&self.config.file_extensions)?;
        let folders = if self.config.folders_to_process.is_empty() {
            vec!["/".to_string()]
        } else {
            self.config.folders_to_process.clone()
        };

        self.logger.publish_log(format!(
            "Matching for patterns '{}' from '{}'",
            patterns.rendered().join(", "),
            folders.join(", ")
        ));

        let mut valid_directories = Vec::new();
        for folder in &folders {
            if !self.fs.is_dir(folder).await? {
                let message = format!("Error while validating path '{folder}'");
                self.logger.publish_log(message.clone());
                return Err(SourceError::InvalidInputDirectory {
                    dir: folder.clone(),
                    detail: "not a directory".to_string(),
                });
            }
            valid_directories.push(folder.clone());
        }

        let max_depth = if self.config.process_sub_directories {
            crate::MAX_RECURSIVE_DEPTH
        } else {
            1
        };

        let mut matched: Vec<FileHash> = Vec::new();
        let mut seen_paths: HashSet<String> = HashSet::new();
        let mut seen_names: HashSet<String> = HashSet::new();

        for directory in valid_directories {
            tracing::debug!("Listing files from: {directory}");
            let before = matched.len();
            for listing in self.fs.walk(&directory, max_depth).await? {
                self.process_directory(
                    &listing,
                    &patterns,
                    &mut matched,
                    &mut seen_paths,
                    &mut seen_names,
                )
                .await?;
                if matched.len() >= self.config.max_files {
                    break;
                }
            }
            self.logger.publish_log(format!(
                "Matched '{}' files from '{directory}'",
                matched.len() - before
            ));
        }

        self.publish_listing_summary(&folders, &matched);
        Ok(matched)
    }

    async fn process_directory(
        &self,
        listing: &DirListing,
        patterns: &FilePatterns,
        matched: &mut Vec<FileHash>,
        seen_paths: &mut HashSet<String>,
        seen_names: &mut HashSet<String>,
    ) -> Result<(), SourceError> {
        for entry in &listing.entries {
            if matched.len() >= self.config.max_files {
                let message = format!(
                    "Maximum limit of '{}' files to process reached",
                    self.config.max_files
                );
                self.logger.publish_log(message);
                break;
            }

            if is_directory(entry, &listing.subdirs) {
                continue;
            }

            let file = self.create_file_hash(entry);

            if !patterns.matches(&file.file_name) {
                if !patterns.is_supported(&file.file_name) {
                    self.logger.publish_log(format!(
                        "Skipping '{}' as it has an unsupported file format",
                        file.file_name
                    ));
                }
                continue;
            }

            // Guard 1: intra-listing dedup on path or name.
            if seen_paths.contains(&file.file_path) || seen_names.contains(&file.file_name) {
                self.logger.publish_log(format!(
                    "Skipping execution of duplicate file '{}'",
                    file.file_path
                ));
                continue;
            }

            // Guard 2: persistent file history (opt-in).
            if self.is_in_file_history(&file).await? {
                self.logger.publish_log(format!(
                    "Skipping file '{}' as it has already been processed. \
                     Clear the file markers to process it again.",
                    file.file_path
                ));
                continue;
            }

            // Guard 3: in-flight executions of this workflow.
            if self.is_file_being_processed(&file).await? {
                continue;
            }

            seen_paths.insert(file.file_path.clone());
            seen_names.insert(file.file_name.clone());
            matched.push(file);
        }
        Ok(())
    }

    fn create_file_hash(&self, entry: &FsEntry) -> FileHash {
        let mut file = FileHash::new(
            entry.path.clone(),
            entry.name.clone(),
            entry.size,
            self.connection_type,
        );
        if let Some(uuid) = &entry.provider_uuid {
            file = file.with_provider_uuid(uuid.clone());
        }
        file.fs_metadata = entry.metadata.clone();
        file
    }

    /// File-history guard: true when a completed history row exists for this
    /// file's cache key and path.
    async fn is_in_file_history(&self, file: &FileHash) -> Result<bool, SourceError> {
        if !self.config.use_file_history {
            return Ok(false);
        }
        let Some(cache_key) = file.cache_key() else {
            return Ok(false);
        };
        let history = self
            .history
            .get(&self.workflow_id, cache_key, Some(&file.file_path))
            .await?;
        Ok(history.is_some_and(|h| h.is_completed))
    }

    /// In-flight guard: true when any active execution of this workflow has
    /// a non-terminal row for this file.
    async fn is_file_being_processed(&self, file: &FileHash) -> Result<bool, SourceError> {
        if file.file_hash.is_none() && file.provider_file_uuid.is_none() {
            return Ok(false);
        }
        let active = self
            .executions
            .active_for_workflow(&self.workflow_id, self.organization_id.as_deref())
            .await?;
        tracing::info!(
            "Found {} active executions for workflow {}",
            active.len(),
            self.workflow_id
        );

        for execution in active {
            let mut blocking = None;
            if let Some(hash) = &file.file_hash {
                blocking = self
                    .file_executions
                    .find_in_flight_by_hash(&execution.execution_id, hash, &file.file_path)
                    .await?;
            }
            if blocking.is_none() {
                if let Some(uuid) = &file.provider_file_uuid {
                    blocking = self
                        .file_executions
                        .find_in_flight_by_provider_uuid(
                            &execution.execution_id,
                            uuid,
                            &file.file_path,
                        )
                        .await?;
                }
            }
            if let Some(row) = blocking {
                self.logger.publish_log(format!(
                    "Skipping file '{}' — duplicate detected in current run \
                     (execution {}, file execution {})",
                    file.file_name, execution.execution_id, row.id
                ));
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn publish_listing_summary(&self, folders: &[String], matched: &[FileHash]) {
        let folder_list: String = folders
            .iter()
            .map(|f| format!("- `{}`\n", f.trim()))
            .collect();
        self.logger.publish_update_log(
            LogState::InputUpdate,
            format!("## Folders to process:\n\n{folder_list}\n"),
            None,
        );

        let mut output_log = String::from("### Matched files\n```text\n\n");
        for file in matched.iter().take(20) {
            output_log.push_str(&format!("- {}\n", file.file_path));
        }
        output_log.push_str(&format!(
            "```\n\nTotal matched files: {}\n\nPlease note that only the first 20 \
             files are shown.\n",
            matched.len()
        ));
        self.logger
            .publish_update_log(LogState::OutputUpdate, output_log, None);
    }
}

fn is_directory(entry: &FsEntry, subdirs: &[String]) -> bool {
    // Detection cascade: metadata flag, listed-in-dirs, trailing slash,
    // zero size. Some connectors mislabel directories as files.
    if entry.is_dir_hint == Some(true) {
        return true;
    }
    if subdirs.contains(&entry.name) {
        return true;
    }
    if entry.path.ends_with('/') {
        return true;
    }
    entry.size == 0
}
