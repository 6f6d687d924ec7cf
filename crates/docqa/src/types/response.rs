//! Response types for answered questions

use serde::{Deserialize, Serialize};

use super::document::{Metadata, PAGE_KEY, SOURCE_KEY};
use crate::retrieval::SearchHit;

/// A retrieved chunk that supported an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceChunk {
    /// Record id inside the index
    pub id: u64,
    /// Chunk text
    pub text: String,
    /// Chunk metadata
    pub metadata: Metadata,
    /// Similarity score under the index metric (higher is closer)
    pub score: f32,
}

impl SourceChunk {
    /// Build from a search hit
    pub fn from_hit(hit: &SearchHit<'_>) -> Self {
        Self {
            id: hit.record.id,
            text: hit.record.text.clone(),
            metadata: hit.record.metadata.clone(),
            score: hit.score,
        }
    }

    /// Format the provenance for display, e.g. `data/report.pdf, page 3`
    pub fn format_inline(&self) -> String {
        let mut parts = vec![self
            .metadata
            .get(SOURCE_KEY)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string())];

        if let Some(page) = self.metadata.get(PAGE_KEY) {
            parts.push(format!("page {}", page));
        }

        parts.join(", ")
    }
}

/// Answer to a single question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The question as asked
    pub question: String,
    /// Generated answer text
    pub answer: String,
    /// Supporting chunks in ranked order
    pub sources: Vec<SourceChunk>,
}
