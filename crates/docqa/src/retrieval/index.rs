//! Exact in-memory vector index

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::{Metadata, SOURCE_KEY};

/// Similarity metric, fixed when the index is built
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity
    #[default]
    Cosine,
    /// Negative Euclidean (L2) distance
    Euclidean,
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

/// A stored embedding with its chunk
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Insertion-order id, starting at 0
    pub id: u64,
    /// Embedding vector
    pub vector: Vec<f32>,
    /// Chunk text
    pub text: String,
    /// Chunk metadata
    pub metadata: Metadata,
}

/// Search result borrowing from the index
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    /// Matched record
    pub record: &'a VectorRecord,
    /// Score under the index metric (higher is closer, NaN becomes -inf)
    pub score: f32,
}

/// Flat index with exact search
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    metric: DistanceMetric,
    dimensions: Option<usize>,
    records: Vec<VectorRecord>,
    /// L2 norms, cached for cosine scoring
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Build a fresh index from `(vector, text, metadata)` entries
    ///
    /// Ids are assigned in order starting at 0. The first vector fixes the
    /// dimensionality.
    pub fn build<I>(metric: DistanceMetric, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (Vec<f32>, String, Metadata)>,
    {
        let records = entries
            .into_iter()
            .enumerate()
            .map(|(position, (vector, text, metadata))| VectorRecord {
                id: position as u64,
                vector,
                text,
                metadata,
            })
            .collect();
        Self::from_records(metric, records)
    }

    /// Assemble an index from records that already carry ids
    ///
    /// Ids must equal their position.
    pub(crate) fn from_records(metric: DistanceMetric, records: Vec<VectorRecord>) -> Result<Self> {
        let dimensions = records.first().map(|r| r.vector.len());

        if let Some(expected) = dimensions {
            for (position, record) in records.iter().enumerate() {
                if record.vector.len() != expected {
                    return Err(Error::DimensionMismatch {
                        expected,
                        actual: record.vector.len(),
                        position,
                    });
                }
            }
        }

        let norms = records.iter().map(|r| l2_norm(&r.vector)).collect();

        Ok(Self {
            metric,
            dimensions,
            records,
            norms,
        })
    }

    /// Metric chosen at build time
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Vector dimensionality, `None` when empty
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in id order
    pub fn records(&self) -> &[VectorRecord] {
        &self.records
    }

    /// Record by id
    pub fn get(&self, id: u64) -> Option<&VectorRecord> {
        usize::try_from(id).ok().and_then(|i| self.records.get(i))
    }

    /// Number of records per `source` metadata value
    pub fn source_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            let source = record
                .metadata
                .get(SOURCE_KEY)
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            *counts.entry(source).or_insert(0) += 1;
        }
        counts
    }

    /// Top `k` records by score, descending; ties go to the lower id
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>> {
        let Some(expected) = self.dimensions else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: query.len(),
                position: 0,
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut hits: Vec<SearchHit<'_>> = self
            .records
            .iter()
            .zip(&self.norms)
            .map(|(record, &norm)| SearchHit {
                record,
                score: ranking_score(self.score(query, query_norm, &record.vector, norm)),
            })
            .collect();

        hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.record.id.cmp(&b.record.id),
            other => other,
        });
        hits.truncate(k);

        Ok(hits)
    }

    fn score(&self, query: &[f32], query_norm: f32, vector: &[f32], norm: f32) -> f32 {
        match self.metric {
            DistanceMetric::Cosine => {
                if query_norm == 0.0 || norm == 0.0 {
                    0.0
                } else {
                    dot(query, vector) / (query_norm * norm)
                }
            }
            DistanceMetric::Euclidean => -query
                .iter()
                .zip(vector)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// NaN ranks below every real score and -0.0 ties with 0.0
fn ranking_score(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else if score == 0.0 {
        0.0
    } else {
        score
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vector: Vec<f32>, text: &str, source: &str) -> (Vec<f32>, String, Metadata) {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), source.to_string());
        (vector, text.to_string(), metadata)
    }

    fn sample(metric: DistanceMetric) -> VectorIndex {
        VectorIndex::build(
            metric,
            vec![
                entry(vec![1.0, 0.0, 0.0], "x axis", "a.txt"),
                entry(vec![0.0, 1.0, 0.0], "y axis", "a.txt"),
                entry(vec![0.0, 0.0, 1.0], "z axis", "b.txt"),
                entry(vec![0.7, 0.7, 0.0], "xy diagonal", "b.txt"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_build_assigns_sequential_ids() {
        let index = sample(DistanceMetric::Cosine);
        assert_eq!(index.len(), 4);
        assert_eq!(index.dimensions(), Some(3));
        let ids: Vec<u64> = index.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(index.get(2).unwrap().text, "z axis");
        assert!(index.get(4).is_none());
    }

    #[test]
    fn test_build_rejects_mixed_dimensions() {
        let result = VectorIndex::build(
            DistanceMetric::Cosine,
            vec![
                entry(vec![1.0, 0.0], "a", "a.txt"),
                entry(vec![1.0, 0.0], "b", "a.txt"),
                entry(vec![1.0, 0.0, 0.0], "c", "a.txt"),
            ],
        );
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch { expected: 2, actual: 3, position: 2 })
        ));
    }

    #[test]
    fn test_empty_index() {
        let index = VectorIndex::build(DistanceMetric::Cosine, Vec::new()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimensions(), None);
        assert!(index.search(&[1.0, 2.0], 4).unwrap().is_empty());
    }

    #[test]
    fn test_exact_match_ranks_first() {
        for metric in [DistanceMetric::Cosine, DistanceMetric::Euclidean] {
            let index = sample(metric);
            for record in index.records() {
                let hits = index.search(&record.vector, 1).unwrap();
                assert_eq!(hits[0].record.id, record.id, "metric {}", metric);
            }
        }
    }

    #[test]
    fn test_search_cardinality() {
        let index = sample(DistanceMetric::Cosine);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.search(&[1.0, 0.0, 0.0], 10).unwrap().len(), 4);
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_scores_descending() {
        let index = sample(DistanceMetric::Cosine);
        let hits = index.search(&[0.9, 0.4, 0.1], 4).unwrap();
        assert_eq!(hits[0].record.text, "xy diagonal");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_ties_broken_by_lower_id() {
        let index = VectorIndex::build(
            DistanceMetric::Cosine,
            vec![
                entry(vec![0.0, 1.0], "other", "a.txt"),
                entry(vec![1.0, 0.0], "first copy", "a.txt"),
                entry(vec![1.0, 0.0], "second copy", "a.txt"),
            ],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].record.id, 1);
        assert_eq!(hits[1].record.id, 2);
    }

    #[test]
    fn test_signed_zero_scores_tie_by_id() {
        let index = VectorIndex::build(
            DistanceMetric::Cosine,
            vec![
                entry(vec![-0.0, 5.0], "orthogonal", "a.txt"),
                entry(vec![0.0, 0.0], "zero vector", "a.txt"),
            ],
        )
        .unwrap();
        let hits = index.search(&[1.0, -0.0], 2).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.record.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert!(hits.iter().all(|h| h.score.to_bits() == 0.0f32.to_bits()));
    }

    #[test]
    fn test_nan_scores_rank_last() {
        let index = VectorIndex::build(
            DistanceMetric::Euclidean,
            vec![
                entry(vec![f32::NAN, 0.0], "broken", "a.txt"),
                entry(vec![5.0, 0.0], "far", "a.txt"),
                entry(vec![1.0, 0.0], "near", "a.txt"),
            ],
        )
        .unwrap();
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.record.id).collect();
        assert_eq!(ids, vec![2, 1, 0]);
        assert_eq!(hits[2].score, f32::NEG_INFINITY);
    }

    #[test]
    fn test_ranking_score_normalizes() {
        assert_eq!(ranking_score(-0.0).to_bits(), 0.0f32.to_bits());
        assert_eq!(ranking_score(f32::NAN), f32::NEG_INFINITY);
        assert_eq!(ranking_score(-1.5), -1.5);
    }

    #[test]
    fn test_euclidean_score_is_negative_distance() {
        let index = sample(DistanceMetric::Euclidean);
        let hits = index.search(&[1.0, 0.0, 0.0], 4).unwrap();
        assert_eq!(hits[0].score, 0.0);
        let y = hits.iter().find(|h| h.record.id == 1).unwrap();
        assert!((y.score + 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = sample(DistanceMetric::Cosine);
        let result = index.search(&[1.0, 0.0], 2);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn test_zero_query_scores_zero() {
        let index = sample(DistanceMetric::Cosine);
        let hits = index.search(&[0.0, 0.0, 0.0], 4).unwrap();
        assert!(hits.iter().all(|h| h.score == 0.0));
        let ids: Vec<u64> = hits.iter().map(|h| h.record.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_source_counts() {
        let counts = sample(DistanceMetric::Cosine).source_counts();
        assert_eq!(counts.get("a.txt"), Some(&2));
        assert_eq!(counts.get("b.txt"), Some(&2));
    }
}
