//! Retrieval-QA: embed the question, retrieve, compose, generate

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::retrieval::VectorIndex;
use crate::types::{Answer, SourceChunk};

/// Question answering over a loaded index
///
/// Holds everything a query needs; the index is immutable and shared.
#[derive(Clone)]
pub struct RetrievalQa {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
    top_k: usize,
}

impl RetrievalQa {
    /// Create a new orchestrator
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            top_k,
        }
    }

    /// The loaded index
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Number of chunks retrieved per question
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Top-k supporting chunks for a question
    pub async fn retrieve(&self, question: &str) -> Result<Vec<SourceChunk>> {
        let query = self
            .embedder
            .embed(question)
            .await
            .map_err(as_embedding_error)?;

        let hits = self.index.search(&query, self.top_k)?;
        Ok(hits.iter().map(SourceChunk::from_hit).collect())
    }

    /// Answer one question
    ///
    /// Embedding and generation failures come back as `EmbeddingFailed` and
    /// `GenerationFailed`; nothing is retried here.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let sources = self.retrieve(question).await?;
        tracing::debug!(retrieved = sources.len(), "Retrieved context");

        let prompt = PromptBuilder::build_qa_prompt(question, &sources);
        let answer = self
            .llm
            .generate(&prompt)
            .await
            .map_err(as_generation_error)?;

        tracing::info!(
            model = self.llm.model(),
            sources = sources.len(),
            "Answered question"
        );

        Ok(Answer {
            question: question.to_string(),
            answer: answer.trim().to_string(),
            sources,
        })
    }
}

fn as_embedding_error(e: Error) -> Error {
    match e {
        Error::EmbeddingFailed(_) => e,
        other => Error::embedding(other.to_string()),
    }
}

fn as_generation_error(e: Error) -> Error {
    match e {
        Error::GenerationFailed(_) => e,
        other => Error::generation(other.to_string()),
    }
}
