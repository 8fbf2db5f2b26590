//! Flat in-memory vector index with exact squared-L2 search.
//!
//! Vectors are stored contiguously in insertion order. The position of a
//! vector is its only key, and callers map positions back to paragraphs.

use std::cmp::Ordering;

/// A single nearest-neighbor match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Insertion position of the stored vector
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
}

/// Append-only flat vector index.
///
/// Supports:
/// - Batched appends with dimension checks
/// - Brute-force k-nearest-neighbor search
#[derive(Debug, Clone, PartialEq)]
pub struct VectorIndex {
    /// Row-major storage, `len() * dimension` values
    data: Vec<f32>,
    dimension: usize,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimension` values.
    pub fn create(dimension: usize) -> Result<Self, IndexError> {
        Self::with_capacity(dimension, 0)
    }

    /// Create an empty index with room for `capacity` vectors.
    pub fn with_capacity(dimension: usize, capacity: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::InvalidDimension);
        }

        Ok(Self {
            data: Vec::with_capacity(dimension.saturating_mul(capacity)),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over stored vectors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }

    /// Raw row-major values, used by storage.
    pub(crate) fn as_flat(&self) -> &[f32] {
        &self.data
    }

    /// Append a batch of vectors.
    ///
    /// The whole batch is checked first: on a dimension mismatch nothing
    /// is appended.
    pub fn add<V: AsRef<[f32]>>(&mut self, vectors: &[V]) -> Result<(), IndexError> {
        for vector in vectors {
            self.check_dimension(vector.as_ref())?;
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector.as_ref());
        }

        Ok(())
    }

    /// Search the `k` nearest stored vectors for every query.
    ///
    /// # Returns
    /// One list per query, each holding `min(k, len())` neighbors sorted by
    /// ascending distance. Equal distances keep insertion order.
    pub fn search<V: AsRef<[f32]>>(
        &self,
        queries: &[V],
        k: usize,
    ) -> Result<Vec<Vec<Neighbor>>, IndexError> {
        queries
            .iter()
            .map(|query| self.search_one(query.as_ref(), k))
            .collect()
    }

    /// Search the `k` nearest stored vectors for a single query.
    pub fn search_one(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimension(query)?;

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut results: Vec<Neighbor> = self
            .iter()
            .enumerate()
            .map(|(position, stored)| Neighbor {
                position,
                distance: squared_l2(query, stored),
            })
            .collect();

        // sort_by is stable, the position compare just makes the order explicit
        results.sort_by(compare_neighbors);
        results.truncate(k);

        Ok(results)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

/// Ascending distance, NaN last, then ascending position.
fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    match (a.distance.is_nan(), b.distance.is_nan()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        (true, true) => a.position.cmp(&b.position),
        (false, false) => a
            .distance
            .total_cmp(&b.distance)
            .then(a.position.cmp(&b.position)),
    }
}

/// Squared Euclidean distance between two equal-length vectors.
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Index dimension must be greater than zero")]
    InvalidDimension,
}
