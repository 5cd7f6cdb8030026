//! In-memory vector index.
//!
//! Brute-force dot-product search over every stored chunk. Vectors are
//! unit-normalized at encode time, so the dot product equals cosine
//! similarity. The index is rebuilt from the cache on every process start
//! and never persisted.

use crate::embedding::dot;
use crate::error::{CoreError, Result};
use crate::models::VectorisedChunk;

/// A chunk paired with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a VectorisedChunk,
    pub score: f32,
}

/// Read-only top-k index over [`VectorisedChunk`]s.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dims: usize,
    chunks: Vec<VectorisedChunk>,
}

impl VectorIndex {
    /// Build an index; every chunk vector must have exactly `dims` entries.
    pub fn build(dims: usize, chunks: Vec<VectorisedChunk>) -> Result<Self> {
        if let Some(bad) = chunks.iter().find(|c| c.vector.len() != dims) {
            return Err(CoreError::DimensionMismatch {
                expected: dims,
                actual: bad.vector.len(),
            });
        }
        Ok(Self { dims, chunks })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[VectorisedChunk] {
        &self.chunks
    }

    /// Return up to `top_k` chunks in strictly non-increasing score order.
    ///
    /// Equal scores keep insertion order. `top_k` larger than the index
    /// returns every chunk.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk<'_>>> {
        if top_k == 0 {
            return Err(CoreError::InvalidTopK(top_k));
        }
        if query.len() != self.dims {
            return Err(CoreError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<ScoredChunk<'_>> = self
            .chunks
            .iter()
            .map(|chunk| ScoredChunk {
                score: dot(query, &chunk.vector),
                chunk,
            })
            .collect();
        // sort_by is stable
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, vector: Vec<f32>) -> VectorisedChunk {
        VectorisedChunk {
            document_id: "doc.md".to_string(),
            chunk_id: id.to_string(),
            section_index: 0,
            heading: String::new(),
            text: id.to_string(),
            hash: String::new(),
            vector,
        }
    }

    fn ids(hits: &[ScoredChunk<'_>]) -> Vec<String> {
        hits.iter().map(|h| h.chunk.chunk_id.clone()).collect()
    }

    #[test]
    fn test_orders_by_descending_score() {
        let index = VectorIndex::build(
            2,
            vec![
                chunk("a", vec![0.0, 1.0]),
                chunk("b", vec![1.0, 0.0]),
                chunk("c", vec![0.6, 0.8]),
            ],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(ids(&hits), vec!["b", "c"]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_top_k_larger_than_index_returns_all() {
        let index = VectorIndex::build(
            2,
            vec![chunk("a", vec![0.0, 1.0]), chunk("b", vec![1.0, 0.0])],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let index = VectorIndex::build(
            2,
            vec![
                chunk("first", vec![1.0, 0.0]),
                chunk("second", vec![1.0, 0.0]),
                chunk("third", vec![1.0, 0.0]),
            ],
        )
        .unwrap();
        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(ids(&hits), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_zero_top_k_is_rejected() {
        let index = VectorIndex::build(2, vec![chunk("a", vec![1.0, 0.0])]).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 0),
            Err(CoreError::InvalidTopK(0))
        ));
    }

    #[test]
    fn test_dimension_mismatch_on_build_and_query() {
        let err = VectorIndex::build(3, vec![chunk("a", vec![1.0, 0.0])]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let index = VectorIndex::build(2, vec![chunk("a", vec![1.0, 0.0])]).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = VectorIndex::build(4, Vec::new()).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
    }
}
