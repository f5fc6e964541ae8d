
use std::cmp::Ordering;

use tracing::debug;

use crate::{PagechatError, Result};

/// One indexed chunk with its embedding. Owned by exactly one
/// [`VectorIndex`]; never shared between index instances.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    /// 0-based id, contiguous within the owning index.
    pub id: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub record: IndexRecord,
    pub score: f32,
}

/// In-memory vector index over one batch of embedded chunks.
///
/// Built atomically from a single batch and immutable afterwards; a
/// content change replaces the whole index rather than mutating it, so
/// concurrent readers always see a consistent snapshot.
#[derive(Debug)]
pub struct VectorIndex {
    records: Vec<IndexRecord>,
    dimension: usize,
}

impl VectorIndex {
    /// Build an index from `(text, embedding)` pairs, assigning contiguous
    /// ids from 0 in input order.
    ///
    /// # Errors
    /// `DimensionMismatch` when any embedding's length differs from the
    /// first entry's.
    #[inline]
    pub fn build(entries: Vec<(String, Vec<f32>)>) -> Result<Self> {
        let dimension = entries.first().map_or(0, |(_, embedding)| embedding.len());

        let mut records = Vec::with_capacity(entries.len());
        for (id, (text, embedding)) in entries.into_iter().enumerate() {
            if embedding.len() != dimension {
                return Err(PagechatError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                });
            }
            records.push(IndexRecord {
                id,
                text,
                embedding,
            });
        }

        debug!(
            "Built vector index with {} records (dimension {})",
            records.len(),
            dimension
        );

        Ok(Self { records, dimension })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Embedding length shared by all records in this index.
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Linear-scan cosine similarity search.
    ///
    /// Results are ordered by descending score; equal scores order by
    /// lower id, so rankings are deterministic. `top_k` is clamped to the
    /// record count; `top_k == 0` returns an empty Vec.
    ///
    /// # Errors
    /// `EmptyIndex` when the index has no records (documented choice:
    /// searching an empty index is an error, not an empty result).
    /// `DimensionMismatch` when the query length differs from the index
    /// dimension.
    #[inline]
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        if self.records.is_empty() {
            return Err(PagechatError::EmptyIndex);
        }
        if query.len() != self.dimension {
            return Err(PagechatError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let top_k = top_k.min(self.records.len());

        let mut scored: Vec<(f32, usize)> = self
            .records
            .iter()
            .map(|record| (cosine_similarity(query, &record.embedding), record.id))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });
        scored.truncate(top_k);

        let results: Vec<SearchResult> = scored
            .into_iter()
            .map(|(score, id)| SearchResult {
                record: self.records[id].clone(),
                score,
            })
            .collect();

        debug!("Search returned {} of {} records", results.len(), self.len());
        Ok(results)
    }
}

/// Normalized dot-product similarity. Zero-magnitude vectors score 0.0 so
/// NaN never reaches the result ordering.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
