//! Core types for the pipeline

pub mod document;
pub mod response;

pub use document::{Chunk, Document, FileKind, Metadata, PAGE_KEY, SOURCE_KEY};
pub use response::{Answer, SourceChunk};
