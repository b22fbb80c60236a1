// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `FileStore` seam and its local-filesystem implementation.

use crate::StorageError;
use async_trait::async_trait;
use docpipe_core::{ContentHasher, HASH_CHUNK_SIZE};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

/// Storage backend seam.
///
/// Paths may be absolute or relative to the store's root. Content hashing is
/// always chunked — implementations must never buffer a whole file for it.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read the full content of a file.
    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError>;

    /// Read a UTF-8 file into a string.
    async fn read_to_string(&self, path: &Path) -> Result<String, StorageError>;

    /// Write `data`, replacing any existing file. Parent directories are
    /// created as needed.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<(), StorageError>;

    /// Append `data` to a file, creating it if absent.
    async fn append(&self, path: &Path, data: &[u8]) -> Result<(), StorageError>;

    /// Whether a file exists at `path`.
    async fn exists(&self, path: &Path) -> Result<bool, StorageError>;

    /// Serialize `data` as JSON into `path`.
    async fn json_dump(&self, path: &Path, data: &Value) -> Result<(), StorageError>;

    /// Hex SHA-256 of the file content, computed in chunks.
    async fn hash_file(&self, path: &Path) -> Result<String, StorageError>;
}

/// Local-filesystem store with an optional root for relative paths.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// A store resolving relative paths against `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn io_err(path: &Path, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_err(parent, e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn read(&self, path: &Path) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(path);
        tokio::fs::read(&path)
            .await
            .map_err(|e| Self::io_err(&path, e))
    }

    async fn read_to_string(&self, path: &Path) -> Result<String, StorageError> {
        let path = self.resolve(path);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Self::io_err(&path, e))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(path);
        Self::ensure_parent(&path).await?;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Self::io_err(&path, e))
    }

    async fn append(&self, path: &Path, data: &[u8]) -> Result<(), StorageError> {
        use tokio::io::AsyncWriteExt;

        let path = self.resolve(path);
        Self::ensure_parent(&path).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Self::io_err(&path, e))?;
        file.write_all(data)
            .await
            .map_err(|e| Self::io_err(&path, e))
    }

    async fn exists(&self, path: &Path) -> Result<bool, StorageError> {
        let path = self.resolve(path);
        Ok(tokio::fs::try_exists(&path)
            .await
            .map_err(|e| Self::io_err(&path, e))?)
    }

    async fn json_dump(&self, path: &Path, data: &Value) -> Result<(), StorageError> {
        let resolved = self.resolve(path);
        let rendered = serde_json::to_vec_pretty(data).map_err(|e| StorageError::Json {
            path: resolved.clone(),
            source: e,
        })?;
        self.write(&resolved, &rendered).await
    }

    async fn hash_file(&self, path: &Path) -> Result<String, StorageError> {
        let path = self.resolve(path);
        let mut file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| Self::io_err(&path, e))?;
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut buf)
                .await
                .map_err(|e| Self::io_err(&path, e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hasher.finish())
    }
}
