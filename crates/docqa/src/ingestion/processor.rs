//! Ingestion pipeline orchestration: load, split, embed, index, save

use std::path::Path;
use std::sync::Arc;

use crate::config::RagConfig;
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::retrieval::{DistanceMetric, IndexManifest, VectorIndex};
use crate::types::{Chunk, Document};

use super::chunker::TextChunker;
use super::loader::{DocumentLoader, SkippedFile};

/// What an ingestion run produced
#[derive(Debug, Clone)]
pub struct IngestSummary {
    /// Files that produced documents
    pub files_loaded: usize,
    /// Files skipped with reasons
    pub skipped: Vec<SkippedFile>,
    /// Documents loaded
    pub documents: usize,
    /// Chunks embedded and indexed
    pub chunks: usize,
    /// Manifest of the written bundle
    pub manifest: IndexManifest,
}

/// Main ingestion pipeline
pub struct IngestPipeline {
    /// Text chunker
    chunker: TextChunker,
    /// Embedding backend
    embedder: Arc<dyn EmbeddingProvider>,
    /// Metric for the new index
    metric: DistanceMetric,
    /// Chunks per embedding call
    batch_size: usize,
}

impl IngestPipeline {
    /// Create a new ingestion pipeline
    pub fn new(
        chunker: TextChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        metric: DistanceMetric,
        batch_size: usize,
    ) -> Self {
        Self {
            chunker,
            embedder,
            metric,
            batch_size: batch_size.max(1),
        }
    }

    /// Create from configuration
    pub fn from_config(config: &RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self::new(
            TextChunker::from_config(&config.chunking)?,
            embedder,
            config.vector_db.metric,
            config.embeddings.batch_size,
        ))
    }

    /// Split documents into chunks
    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks = self.chunker.split(documents);
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            chunk_size = self.chunker.chunk_size(),
            overlap = self.chunker.overlap(),
            "Split documents"
        );
        chunks
    }

    /// Embed chunk texts batch by batch, reporting `(done, total)` after each
    pub async fn embed_chunks<F>(&self, chunks: &[Chunk], mut progress: F) -> Result<Vec<Vec<f32>>>
    where
        F: FnMut(usize, usize),
    {
        let total = chunks.len();
        let mut vectors = Vec::with_capacity(total);

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(Error::embedding(format!(
                    "{} returned {} embeddings for {} texts",
                    self.embedder.name(),
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            progress(vectors.len(), total);
        }

        Ok(vectors)
    }

    /// Build an index from documents in memory
    pub async fn build_index<F>(&self, documents: &[Document], progress: F) -> Result<VectorIndex>
    where
        F: FnMut(usize, usize),
    {
        let chunks = self.split(documents);
        let vectors = self.embed_chunks(&chunks, progress).await?;
        tracing::info!(
            vectors = vectors.len(),
            provider = self.embedder.name(),
            "Embedded chunks"
        );

        let index = VectorIndex::build(
            self.metric,
            vectors
                .into_iter()
                .zip(chunks)
                .map(|(vector, chunk)| (vector, chunk.text, chunk.metadata)),
        )?;
        tracing::info!(
            records = index.len(),
            dimensions = ?index.dimensions(),
            metric = %index.metric(),
            "Built index"
        );
        Ok(index)
    }

    /// Full ingestion: rebuild the index at `output` from the corpus in `data_dir`
    pub async fn run<F>(
        &self,
        data_dir: &Path,
        recursive: bool,
        output: &Path,
        progress: F,
    ) -> Result<IngestSummary>
    where
        F: FnMut(usize, usize),
    {
        let report = DocumentLoader::load_directory(data_dir, recursive)?;
        tracing::info!(
            files = report.files_loaded,
            skipped = report.skipped.len(),
            documents = report.documents.len(),
            "Loaded corpus from {}",
            data_dir.display()
        );
        if report.documents.is_empty() {
            tracing::warn!("No documents found in {}; writing an empty index", data_dir.display());
        }

        let index = self.build_index(&report.documents, progress).await?;
        let manifest = index.save(output)?;

        Ok(IngestSummary {
            files_loaded: report.files_loaded,
            skipped: report.skipped,
            documents: report.documents.len(),
            chunks: index.len(),
            manifest,
        })
    }
}
