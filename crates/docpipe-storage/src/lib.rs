// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! docpipe-storage
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Execution metadata file handling.
pub mod metadata;
/// The file-store seam and the local implementation.
pub mod store;

pub use metadata::{ExecMetadata, merge_metadata, read_metadata};
pub use store::{FileStore, LocalFileStore};

use docpipe_core::ExecutionSource;
use std::path::{Path, PathBuf};

/// Well-known member files of an execution data directory.
pub mod files {
    /// Exact bytes of the source file.
    pub const SOURCE: &str = "SOURCE";
    /// Copy of the source handed to the next tool in a chain.
    pub const INFILE: &str = "INFILE";
    /// Execution metadata document.
    pub const METADATA_JSON: &str = "METADATA.json";
    /// Cached extracted text (UTF-8).
    pub const EXTRACT: &str = "EXTRACT";
    /// Cached summary (UTF-8).
    pub const SUMMARIZE: &str = "SUMMARIZE";
}

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("storage i/o error at '{path}': {source}")]
    Io {
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A required storage-root environment variable is missing or empty.
    #[error("environment variable '{var}' is required")]
    MissingEnv {
        /// Name of the missing variable.
        var: &'static str,
    },

    /// JSON (de)serialization of a stored document failed.
    #[error("storage JSON error at '{path}': {source}")]
    Json {
        /// Path of the document.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Paths inside one file execution's data directory.
///
/// # Examples
///
/// ```
/// use docpipe_storage::ExecutionPaths;
///
/// let paths = ExecutionPaths::new("/data/exec-1", "fe-9");
/// assert!(paths.extract().ends_with("fe-9/EXTRACT"));
/// assert!(paths.artifact("invoice.pdf").ends_with("fe-9/invoice.json"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPaths {
    dir: PathBuf,
}

impl ExecutionPaths {
    /// The directory for `file_execution_id` under `execution_dir`.
    #[must_use]
    pub fn new(execution_dir: impl Into<PathBuf>, file_execution_id: &str) -> Self {
        Self {
            dir: execution_dir.into().join(file_execution_id),
        }
    }

    /// Wrap an already-resolved data directory.
    #[must_use]
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The data directory itself.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `SOURCE` member path.
    #[must_use]
    pub fn source(&self) -> PathBuf {
        self.dir.join(files::SOURCE)
    }

    /// `INFILE` member path.
    #[must_use]
    pub fn infile(&self) -> PathBuf {
        self.dir.join(files::INFILE)
    }

    /// `METADATA.json` member path.
    #[must_use]
    pub fn metadata(&self) -> PathBuf {
        self.dir.join(files::METADATA_JSON)
    }

    /// `EXTRACT` member path.
    #[must_use]
    pub fn extract(&self) -> PathBuf {
        self.dir.join(files::EXTRACT)
    }

    /// `SUMMARIZE` member path.
    #[must_use]
    pub fn summarize(&self) -> PathBuf {
        self.dir.join(files::SUMMARIZE)
    }

    /// Output artifact path for `source_file_name` (`<stem>.json`).
    #[must_use]
    pub fn artifact(&self, source_file_name: &str) -> PathBuf {
        let stem = Path::new(source_file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_file_name.to_string());
        self.dir.join(format!("{stem}.json"))
    }
}

/// Storage roots per execution source, read from the environment.
///
/// IDE executions use the persistent root, tool executions the shared
/// temporary root, API executions the local API staging root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    /// Persistent root for IDE sessions.
    pub permanent: PathBuf,
    /// Shared temporary root for workflow tool runs.
    pub shared_temporary: PathBuf,
    /// Local staging root for API uploads.
    pub api: PathBuf,
}

impl StorageRoots {
    /// Read the three roots from `PERMANENT_STORAGE_ROOT`,
    /// `SHARED_TEMPORARY_STORAGE_ROOT`, and `API_STORAGE_ROOT`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::MissingEnv`] naming the first missing or
    /// empty variable.
    pub fn from_env() -> Result<Self, StorageError> {
        Ok(Self {
            permanent: require_env("PERMANENT_STORAGE_ROOT")?,
            shared_temporary: require_env("SHARED_TEMPORARY_STORAGE_ROOT")?,
            api: require_env("API_STORAGE_ROOT")?,
        })
    }

    /// The root serving the given execution source.
    #[must_use]
    pub fn for_source(&self, source: ExecutionSource) -> &Path {
        match source {
            ExecutionSource::Ide => &self.permanent,
            ExecutionSource::Tool => &self.shared_temporary,
            ExecutionSource::Api => &self.api,
        }
    }

    /// A [`LocalFileStore`] rooted for the given execution source.
    #[must_use]
    pub fn open(&self, source: ExecutionSource) -> LocalFileStore {
        LocalFileStore::new(self.for_source(source))
    }
}

fn require_env(var: &'static str) -> Result<PathBuf, StorageError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => Err(StorageError::MissingEnv { var }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_paths_layout() {
        let paths = ExecutionPaths::new("/data/exec-1", "fe-9");
        assert_eq!(paths.source(), PathBuf::from("/data/exec-1/fe-9/SOURCE"));
        assert_eq!(paths.infile(), PathBuf::from("/data/exec-1/fe-9/INFILE"));
        assert_eq!(
            paths.metadata(),
            PathBuf::from("/data/exec-1/fe-9/METADATA.json")
        );
        assert_eq!(
            paths.artifact("report.final.pdf"),
            PathBuf::from("/data/exec-1/fe-9/report.final.json")
        );
    }

    #[test]
    fn roots_select_by_source() {
        let roots = StorageRoots {
            permanent: "/perm".into(),
            shared_temporary: "/tmp/shared".into(),
            api: "/api".into(),
        };
        assert_eq!(roots.for_source(ExecutionSource::Ide), Path::new("/perm"));
        assert_eq!(
            roots.for_source(ExecutionSource::Tool),
            Path::new("/tmp/shared")
        );
        assert_eq!(roots.for_source(ExecutionSource::Api), Path::new("/api"));
    }
}
