//! Document and chunk types with source tracking

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Metadata key naming the originating file
pub const SOURCE_KEY: &str = "source";
/// Metadata key holding the 0-based PDF page index
pub const PAGE_KEY: &str = "page";

/// Ordered string metadata attached to documents and chunks
pub type Metadata = BTreeMap<String, String>;

/// Loader selected by a file's extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// PDF document, one Document per page
    Pdf,
    /// Plain text file
    PlainText,
    /// Markdown file
    Markdown,
    /// Word document (.docx)
    Docx,
    /// No loader for this extension
    Unsupported(String),
}

impl FileKind {
    /// Detect file kind from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::PlainText,
            "md" | "markdown" => Self::Markdown,
            "docx" => Self::Docx,
            other => Self::Unsupported(other.to_string()),
        }
    }

    /// Detect file kind from a path's extension
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }
}

/// A unit of normalized text produced by the loader
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    /// Full normalized text
    pub content: String,
    /// Metadata; always carries `source`
    pub metadata: Metadata,
}

impl Document {
    /// Create a document tagged with its source
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Originating source identifier
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

/// A contiguous piece of a document's content
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Chunk text, never empty
    pub text: String,
    /// Metadata copied from the parent document
    pub metadata: Metadata,
}

impl Chunk {
    /// Create a chunk
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// Originating source identifier
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(FileKind::from_extension("PDF"), FileKind::Pdf);
        assert_eq!(FileKind::from_extension("txt"), FileKind::PlainText);
        assert_eq!(FileKind::from_extension("md"), FileKind::Markdown);
        assert_eq!(FileKind::from_extension("docx"), FileKind::Docx);
        assert_eq!(
            FileKind::from_extension("xyz"),
            FileKind::Unsupported("xyz".to_string())
        );
        assert_eq!(
            FileKind::from_extension("doc"),
            FileKind::Unsupported("doc".to_string())
        );
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(FileKind::from_path(Path::new("data/report.pdf")), FileKind::Pdf);
        assert_eq!(
            FileKind::from_path(Path::new("data/README")),
            FileKind::Unsupported(String::new())
        );
    }

    #[test]
    fn test_document_source() {
        let doc = Document::new("hello", "data/a.txt").with_metadata(PAGE_KEY, "2");
        assert_eq!(doc.source(), Some("data/a.txt"));
        assert_eq!(doc.metadata.get(PAGE_KEY).map(String::as_str), Some("2"));
    }
}
