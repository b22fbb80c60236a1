// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-pattern matching for the listing.

use crate::SourceError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// File-type classes a workflow endpoint can restrict its listing to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    /// PDF documents.
    PdfDocuments,
    /// Plain-text and office documents.
    TextDocuments,
    /// Raster images.
    Images,
}

impl FileType {
    /// Glob patterns covered by this class.
    #[must_use]
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            FileType::PdfDocuments => &["*.pdf"],
            FileType::TextDocuments => &["*.txt", "*.csv", "*.md", "*.doc", "*.docx", "*.odt"],
            FileType::Images => &["*.png", "*.jpg", "*.jpeg", "*.tif", "*.tiff", "*.bmp", "*.gif"],
        }
    }

    const ALL: [FileType; 3] = [
        FileType::PdfDocuments,
        FileType::TextDocuments,
        FileType::Images,
    ];
}

/// Compiled matcher pair: the requested patterns and the supported set.
///
/// A file is accepted when it matches the requested patterns **and** its
/// format is supported at all — `*` requests still exclude formats no
/// extractor can handle.
pub struct FilePatterns {
    requested: GlobSet,
    supported: GlobSet,
    rendered: Vec<String>,
}

impl FilePatterns {
    /// Build matchers for the requested file-type classes. Empty means
    /// "everything supported".
    ///
    /// # Errors
    ///
    /// [`SourceError::InvalidPattern`] when a glob fails to compile.
    pub fn new(required: &[FileType]) -> Result<Self, SourceError> {
        let rendered: Vec<String> = if required.is_empty() {
            vec!["*".to_string()]
        } else {
            required
                .iter()
                .flat_map(|t| t.patterns().iter().map(|p| (*p).to_string()))
                .collect()
        };

        let requested = build_globset(&rendered)?;
        let supported_patterns: Vec<String> = FileType::ALL
            .iter()
            .flat_map(|t| t.patterns().iter().map(|p| (*p).to_string()))
            .collect();
        let supported = build_globset(&supported_patterns)?;

        Ok(Self {
            requested,
            supported,
            rendered,
        })
    }

    /// Whether `file_name` passes both the requested and the supported
    /// matchers. Case-insensitive.
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        if file_name.is_empty() {
            return false;
        }
        self.requested.is_match(file_name) && self.is_supported(file_name)
    }

    /// Whether the file format is in the supported set at all.
    #[must_use]
    pub fn is_supported(&self, file_name: &str) -> bool {
        self.supported.is_match(file_name)
    }

    /// The requested patterns, for log lines.
    #[must_use]
    pub fn rendered(&self) -> &[String] {
        &self.rendered
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, SourceError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // Globs are matched against bare file names, case-insensitively.
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| SourceError::InvalidPattern(format!("{pattern}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| SourceError::InvalidPattern(e.to_string()))
}
