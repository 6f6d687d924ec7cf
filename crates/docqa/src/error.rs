//! Error types for the document QA pipeline

use thiserror::Error;

/// Result type alias for docqa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// File extension has no loader
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// A vector's length differs from the index dimensionality
    #[error("Dimension mismatch at record {position}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        position: usize,
    },

    /// Persisted index bundle is malformed
    #[error("Corrupt index at '{location}': {message}")]
    CorruptIndex { location: String, message: String },

    /// Embedding generation failed
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Answer generation failed
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create a corrupt index error
    pub fn corrupt_index(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptIndex {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::EmbeddingFailed(message.into())
    }

    /// Create a generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }

    /// Whether the error only affects the question being answered.
    ///
    /// The interactive loop reports these and keeps going; anything else ends
    /// the session.
    pub fn is_question_scoped(&self) -> bool {
        matches!(self, Self::EmbeddingFailed(_) | Self::GenerationFailed(_))
    }

    /// Whether the error only affects a single corpus file during loading.
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFormat(_) | Self::FileParse { .. } | Self::Io(_)
        )
    }
}
