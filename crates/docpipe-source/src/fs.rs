// SPDX-License-Identifier: MIT OR Apache-2.0
//! The source filesystem seam.
//!
//! Connectors differ in how reliably they report directories and whether
//! they expose a stable per-file identifier; the seam carries both as
//! hints and lets the listing apply its detection cascade.

use crate::SourceError;
use async_trait::async_trait;
use docpipe_core::{ContentHasher, HASH_CHUNK_SIZE};
use serde_json::{Value, json};
use std::path::Path;
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

/// One entry from a directory listing.
#[derive(Debug, Clone)]
pub struct FsEntry {
    /// Full path at the source.
    pub path: String,
    /// Base name.
    pub name: String,
    /// Size in bytes as reported.
    pub size: u64,
    /// Metadata-based directory flag; `None` when the connector cannot tell.
    pub is_dir_hint: Option<bool>,
    /// Provider-stable file identifier, when the source exposes one.
    pub provider_uuid: Option<String>,
    /// Opaque connector metadata.
    pub metadata: Value,
}

/// One directory visited during a walk.
#[derive(Debug, Clone)]
pub struct DirListing {
    /// The directory path.
    pub dir: String,
    /// Names of sub-directories directly under it.
    pub subdirs: Vec<String>,
    /// Entries listed under it.
    pub entries: Vec<FsEntry>,
}

/// Seam over the source's filesystem.
#[async_trait]
pub trait SourceFs: Send + Sync {
    /// Whether `path` exists and is a directory.
    async fn is_dir(&self, path: &str) -> Result<bool, SourceError>;

    /// Walk `root` up to `max_depth`, returning one listing per visited
    /// directory in walk order.
    async fn walk(&self, root: &str, max_depth: usize) -> Result<Vec<DirListing>, SourceError>;

    /// Hex SHA-256 of the file content, computed in chunks.
    async fn hash_content(&self, path: &str) -> Result<String, SourceError>;
}

/// Local-filesystem source.
#[derive(Debug, Default, Clone)]
pub struct LocalSourceFs;

impl LocalSourceFs {
    /// A connector over the local filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceFs for LocalSourceFs {
    async fn is_dir(&self, path: &str) -> Result<bool, SourceError> {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(SourceError::Fs(format!("{path}: {err}"))),
        }
    }

    async fn walk(&self, root: &str, max_depth: usize) -> Result<Vec<DirListing>, SourceError> {
        let mut listings = Vec::new();
        let mut dirs = vec![root.to_string()];
        let mut depth = 0usize;

        while !dirs.is_empty() && depth < max_depth {
            let mut next_dirs = Vec::new();
            for dir in dirs {
                let mut listing = DirListing {
                    dir: dir.clone(),
                    subdirs: Vec::new(),
                    entries: Vec::new(),
                };
                for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
                    let entry = entry.map_err(|e| SourceError::Fs(e.to_string()))?;
                    let path = entry.path().to_string_lossy().into_owned();
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let metadata = entry
                        .metadata()
                        .map_err(|e| SourceError::Fs(e.to_string()))?;
                    if metadata.is_dir() {
                        listing.subdirs.push(name.clone());
                        next_dirs.push(path.clone());
                    }
                    listing.entries.push(FsEntry {
                        path,
                        name,
                        size: metadata.len(),
                        is_dir_hint: Some(metadata.is_dir()),
                        provider_uuid: None,
                        metadata: json!({"modified_known": metadata.modified().is_ok()}),
                    });
                }
                listings.push(listing);
            }
            dirs = next_dirs;
            depth += 1;
        }
        Ok(listings)
    }

    async fn hash_content(&self, path: &str) -> Result<String, SourceError> {
        let mut file = tokio::fs::File::open(Path::new(path))
            .await
            .map_err(|e| SourceError::Fs(format!("{path}: {e}")))?;
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];
        loop {
            let read = file
                .read(&mut buf)
                .await
                .map_err(|e| SourceError::Fs(format!("{path}: {e}")))?;
            if read == 0 {
                break;
            }
            hasher.update(&buf[..read]);
        }
        Ok(hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_core::sha256_hex;

    #[tokio::test]
    async fn walk_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.pdf"), b"b").unwrap();

        let fs = LocalSourceFs::new();
        let shallow = fs.walk(&dir.path().to_string_lossy(), 1).await.unwrap();
        let shallow_files: Vec<_> = shallow
            .iter()
            .flat_map(|l| l.entries.iter())
            .filter(|e| e.is_dir_hint != Some(true))
            .collect();
        assert_eq!(shallow_files.len(), 1);

        let deep = fs.walk(&dir.path().to_string_lossy(), 20).await.unwrap();
        let deep_files: Vec<_> = deep
            .iter()
            .flat_map(|l| l.entries.iter())
            .filter(|e| e.is_dir_hint != Some(true))
            .collect();
        assert_eq!(deep_files.len(), 2);
    }

    #[tokio::test]
    async fn hash_matches_one_pass() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        std::fs::write(&path, vec![9u8; 50_000]).unwrap();

        let fs = LocalSourceFs::new();
        let hashed = fs.hash_content(&path.to_string_lossy()).await.unwrap();
        assert_eq!(hashed, sha256_hex(&vec![9u8; 50_000]));
    }
}
