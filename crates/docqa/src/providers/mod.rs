//! Provider abstractions for embeddings and LLM completion
//!
//! Trait objects let the pipeline switch between the Ollama server and the
//! offline hashing embedder.

pub mod embedding;
pub mod hashing;
pub mod llm;
pub mod ollama;

pub use embedding::EmbeddingProvider;
pub use hashing::HashEmbedder;
pub use llm::LlmProvider;
pub use ollama::{OllamaEmbedder, OllamaLlm};

use std::sync::Arc;

use crate::config::{EmbeddingBackend, RagConfig};
use crate::error::Result;

/// Build the embedding provider selected by configuration
pub fn embedder_from_config(config: &RagConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.embeddings.provider {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(&config.llm, &config.embeddings)?),
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.embeddings.dimensions)?),
    };
    tracing::debug!(
        provider = embedder.name(),
        dimensions = embedder.dimensions(),
        "Embedding provider ready"
    );
    Ok(embedder)
}
