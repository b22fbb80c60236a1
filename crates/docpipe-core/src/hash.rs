// SPDX-License-Identifier: MIT OR Apache-2.0
//! Chunked SHA-256 content hashing.
//!
//! File identity across the platform is the hex SHA-256 of the content,
//! always computed in chunks so large documents are never buffered whole.

use sha2::{Digest, Sha256};

/// Chunk size used when streaming file content through the hasher.
pub const HASH_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Compute the hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Incremental SHA-256 hasher for chunked reads.
///
/// Feeding the same bytes in any chunking yields the same digest as a single
/// [`sha256_hex`] pass.
///
/// # Examples
///
/// ```
/// use docpipe_core::{ContentHasher, sha256_hex};
///
/// let mut hasher = ContentHasher::new();
/// hasher.update(b"hello ");
/// hasher.update(b"world");
/// assert_eq!(hasher.finish(), sha256_hex(b"hello world"));
/// ```
#[derive(Debug, Default)]
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Create a fresh hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Consume the hasher and return the hex digest.
    #[must_use]
    pub fn finish(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_hex_sha256() {
        let digest = sha256_hex(b"Revenue is $1M");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn chunked_hash_matches_one_pass() {
        let content = vec![7u8; HASH_CHUNK_SIZE + 1234];
        let mut hasher = ContentHasher::new();
        for chunk in content.chunks(4096) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finish(), sha256_hex(&content));
    }

    #[test]
    fn empty_input_hashes() {
        assert_eq!(ContentHasher::new().finish(), sha256_hex(b""));
    }
}
