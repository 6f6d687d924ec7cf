//! docqa: question answering over a local document folder
//!
//! Ingestion loads PDF, text, markdown and Word files, splits them into
//! overlapping chunks, embeds them and writes a flat vector index bundle to
//! disk. Serving loads that bundle, retrieves the closest chunks for each
//! question and asks a local Ollama model to answer from them.

pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod qa;
pub mod retrieval;
pub mod types;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use ingestion::{DocumentLoader, IngestPipeline, TextChunker};
pub use qa::{QaSession, RetrievalQa};
pub use retrieval::{DistanceMetric, VectorIndex};
pub use types::{Answer, Chunk, Document, SourceChunk};
