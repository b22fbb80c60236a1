// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-source
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// API upload staging.
pub mod api;
/// The listing connector and its dedup guards.
pub mod connector;
/// Source filesystem seam and the local implementation.
pub mod fs;
/// File-pattern matching.
pub mod patterns;

pub use api::{ApiUpload, stage_api_uploads};
pub use connector::SourceConnector;
pub use fs::{DirListing, FsEntry, LocalSourceFs, SourceFs};
pub use patterns::{FilePatterns, FileType};

use docpipe_storage::StorageError;
use docpipe_workflow::StoreError;

/// Maximum directory depth walked when sub-directory processing is on.
pub const MAX_RECURSIVE_DEPTH: usize = 20;

/// Default cap on files accepted in one listing.
pub const MAX_FILES: usize = 100;

/// Errors from the source connector.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A configured folder is missing or not a directory.
    #[error("invalid input directory '{dir}': {detail}")]
    InvalidInputDirectory {
        /// The offending folder.
        dir: String,
        /// What was wrong with it.
        detail: String,
    },

    /// A file-pattern expression failed to compile.
    #[error("invalid file pattern: {0}")]
    InvalidPattern(String),

    /// Source filesystem failure.
    #[error("source filesystem error: {0}")]
    Fs(String),

    /// Execution storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Workflow store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Listing configuration, as supplied by the workflow endpoint.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Folders to list; `/` when empty.
    pub folders_to_process: Vec<String>,
    /// Walk sub-directories up to [`MAX_RECURSIVE_DEPTH`].
    pub process_sub_directories: bool,
    /// Cap on accepted files.
    pub max_files: usize,
    /// File-type classes to accept; everything supported when empty.
    pub file_extensions: Vec<FileType>,
    /// Consult the file-history cache and skip completed files.
    pub use_file_history: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            folders_to_process: vec!["/".to_string()],
            process_sub_directories: false,
            max_files: MAX_FILES,
            file_extensions: Vec::new(),
            use_file_history: false,
        }
    }
}
