//! Text chunking with fixed-size overlapping windows

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{Chunk, Document};

/// Boundary classes tried in priority order when choosing a cut point
const SEPARATOR_TIERS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? ", "; "]];

/// Text chunker with configurable size and overlap
///
/// Sizes are measured in characters. Cuts prefer paragraph breaks, then line
/// breaks, then sentence ends, then any whitespace, and fall back to a hard
/// cut at `chunk_size`.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between consecutive chunks
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        ChunkingConfig {
            chunk_size,
            chunk_overlap: overlap,
        }
        .validate()?;
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Maximum chunk size in characters
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap in characters
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split documents into chunks, in document order
    pub fn split(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect()
    }

    /// Chunk a single document; metadata is copied onto every chunk
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.content)
            .into_iter()
            .map(|text| Chunk::new(text, doc.metadata.clone()))
            .collect()
    }

    /// Split raw text into chunk strings
    pub fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            if chars.len() - start <= self.chunk_size {
                chunks.push(chars[start..].iter().collect());
                break;
            }

            let end = self
                .find_cut(&chars, start)
                .unwrap_or(start + self.chunk_size);
            chunks.push(chars[start..end].iter().collect());
            start = end - self.overlap;
        }

        chunks
    }

    /// Last cut point in `(start + overlap, start + chunk_size]`
    fn find_cut(&self, chars: &[char], start: usize) -> Option<usize> {
        let lo = start + self.overlap;
        let hi = start + self.chunk_size;

        for tier in SEPARATOR_TIERS {
            let best = tier
                .iter()
                .filter_map(|sep| last_cut_after(chars, sep, lo, hi))
                .max();
            if best.is_some() {
                return best;
            }
        }

        // Any whitespace
        (lo + 1..=hi).rev().find(|&cut| chars[cut - 1].is_whitespace())
    }
}

/// Largest `cut` in `(lo, hi]` such that `sep` ends exactly at `cut`
fn last_cut_after(chars: &[char], sep: &str, lo: usize, hi: usize) -> Option<usize> {
    let sep: Vec<char> = sep.chars().collect();
    (lo + 1..=hi)
        .rev()
        .filter(|&cut| cut >= sep.len())
        .find(|&cut| chars[cut - sep.len()..cut] == sep[..])
}
