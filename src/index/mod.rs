// Flat vector index
// Exact cosine similarity over L2-normalized embeddings


use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, instrument};

use crate::cancellation::CancellationToken;
use crate::{Result, TicketError};

/// Number of vectors scored between cancellation checks
const SCAN_BLOCK: usize = 1024;

/// Brute-force inner-product index over unit vectors.
///
/// Vectors are stored contiguously (`dimension` floats per entry) and
/// `ids[i]` is the record id of the i-th stored vector. The index is built
/// once and never mutated, so `&VectorIndex` may be shared across tasks.
///
/// Every query is O(N·D). That is fine for an in-memory ticket snapshot; an
/// approximate index can replace this type without changing `search`.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<f32>,
    ids: Vec<i64>,
}

/// A scored hit from a similarity search
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredId {
    pub record_id: i64,
    pub score: f32,
}

impl VectorIndex {
    /// Create an empty index for vectors of the given dimension
    #[inline]
    pub const fn empty(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Build the index from `(record_id, vector)` pairs.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if a vector's length differs from
    /// `dimension` and `EmptyVector` if a vector has zero norm. No partial
    /// index is produced on error.
    #[instrument(skip_all, fields(dimension = dimension))]
    pub fn build<'a, I>(dimension: usize, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (i64, &'a [f32])>,
    {
        let entries = entries.into_iter();
        let (lower, _) = entries.size_hint();
        let mut vectors = Vec::with_capacity(lower * dimension);
        let mut ids = Vec::with_capacity(lower);

        for (record_id, vector) in entries {
            if vector.len() != dimension {
                return Err(TicketError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }

            let start = vectors.len();
            vectors.extend_from_slice(vector);
            normalize(&mut vectors[start..])?;
            ids.push(record_id);
        }

        debug!("Built flat index with {} vectors", ids.len());
        Ok(Self {
            dimension,
            vectors,
            ids,
        })
    }

    #[inline]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Return the top `min(k, len)` records by cosine similarity to `query`.
    ///
    /// Results are ordered by descending score, ties by ascending record id.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredId>> {
        self.search_cancellable(query, k, &CancellationToken::new())
    }

    /// Same as [`search`](Self::search), but stops with `Cancelled` once
    /// `token` is cancelled.
    #[instrument(skip_all, fields(k = k, index_size = self.ids.len()))]
    pub fn search_cancellable(
        &self,
        query: &[f32],
        k: usize,
        token: &CancellationToken,
    ) -> Result<Vec<ScoredId>> {
        if k == 0 {
            return Err(TicketError::InvalidTopK(k));
        }
        if query.len() != self.dimension {
            return Err(TicketError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query)?;

        let mut hits = Vec::with_capacity(self.ids.len());
        for (block_index, block) in self
            .vectors
            .chunks(self.dimension.max(1) * SCAN_BLOCK)
            .enumerate()
        {
            if token.is_cancelled() {
                debug!("Index scan cancelled after {} blocks", block_index);
                return Err(TicketError::Cancelled);
            }

            let offset = block_index * SCAN_BLOCK;
            for (position, vector) in block.chunks_exact(self.dimension.max(1)).enumerate() {
                hits.push(ScoredId {
                    record_id: self.ids[offset + position],
                    score: dot(&query, vector),
                });
            }
        }

        let limit = k.min(hits.len());
        if limit < hits.len() {
            hits.select_nth_unstable_by(limit, rank);
            hits.truncate(limit);
        }
        hits.sort_unstable_by(rank);

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }
}

/// Scale `vector` in place to unit L2 norm.
///
/// The norm is accumulated in `f64` so components near the `f32` range
/// limits neither overflow nor underflow.
///
/// # Errors
///
/// Returns `EmptyVector` when every component is zero or a component is
/// NaN or infinite.
#[inline]
pub fn normalize(vector: &mut [f32]) -> Result<()> {
    let norm = vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(TicketError::EmptyVector);
    }

    for value in vector.iter_mut() {
        *value = (f64::from(*value) / norm) as f32;
    }
    Ok(())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Descending score, then ascending record id
fn rank(a: &ScoredId, b: &ScoredId) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.record_id.cmp(&b.record_id))
}
