//! Document ingestion pipeline with multi-format loading

mod chunker;
mod loader;
mod processor;

pub use chunker::TextChunker;
pub use loader::{DocumentLoader, LoadReport, SkippedFile};
pub use processor::{IngestPipeline, IngestSummary};
