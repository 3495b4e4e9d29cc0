/// Dense indexes over passage embeddings
use hnsw_rs::prelude::*;
use thiserror::Error;

/// Row index emitted by indexes that have fewer entries than requested
pub const SENTINEL_ROW: i64 = -1;

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

/// Raw nearest-neighbour output, parallel arrays in rank order.
///
/// `indices` may contain [`SENTINEL_ROW`] or rows beyond the corpus when the
/// index is padded or stale; callers validate before use.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DenseHits {
    pub scores: Vec<f32>,
    pub indices: Vec<i64>,
}

impl DenseHits {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// (row, score) pairs in rank order
    pub fn pairs(&self) -> impl Iterator<Item = (i64, f32)> + '_ {
        self.indices.iter().copied().zip(self.scores.iter().copied())
    }
}

/// Nearest-neighbour search over unit-length vectors, higher score is closer
pub trait DenseIndex: Send + Sync {
    fn search(&self, query: &[f32], n: usize) -> Result<DenseHits, VectorIndexError>;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn check_dimension(expected: usize, vector: &[f32]) -> Result<(), VectorIndexError> {
    if vector.len() != expected {
        return Err(VectorIndexError::InvalidDimension {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Exact inner-product index.
///
/// Scores every stored vector. When `n` exceeds the number of vectors the
/// result is padded with [`SENTINEL_ROW`] entries scored `f32::NEG_INFINITY`.
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Build from vectors whose position is their corpus row
    pub fn from_vectors(dimension: usize, vectors: Vec<Vec<f32>>) -> Result<Self, VectorIndexError> {
        for v in &vectors {
            check_dimension(dimension, v)?;
        }
        Ok(Self { dimension, vectors })
    }

    pub fn add(&mut self, vector: Vec<f32>) -> Result<(), VectorIndexError> {
        check_dimension(self.dimension, &vector)?;
        self.vectors.push(vector);
        Ok(())
    }
}

impl DenseIndex for FlatIndex {
    fn search(&self, query: &[f32], n: usize) -> Result<DenseHits, VectorIndexError> {
        check_dimension(self.dimension, query)?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(row, v)| (row, v.iter().zip(query).map(|(a, b)| a * b).sum()))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(n);

        let mut hits = DenseHits {
            scores: scored.iter().map(|(_, s)| *s).collect(),
            indices: scored.iter().map(|(row, _)| *row as i64).collect(),
        };
        while hits.len() < n {
            hits.indices.push(SENTINEL_ROW);
            hits.scores.push(f32::NEG_INFINITY);
        }

        Ok(hits)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}

/// Approximate index backed by HNSW with cosine distance
pub struct HnswIndex {
    index: Hnsw<'static, f32, DistCosine>,
    dimension: usize,
    ef_search: usize,
    count: usize,
}

impl HnswIndex {
    /// Create an empty graph sized for `capacity` vectors
    ///
    /// * `m` - connections per layer
    /// * `ef_construction` - build-time candidate list size
    /// * `ef_search` - query-time candidate list size
    pub fn new(
        dimension: usize,
        capacity: usize,
        m: usize,
        ef_construction: usize,
        ef_search: usize,
    ) -> Self {
        let index = Hnsw::<f32, DistCosine>::new(
            m,
            capacity.max(1),
            16, // max layers
            ef_construction,
            DistCosine,
        );

        Self {
            index,
            dimension,
            ef_search,
            count: 0,
        }
    }

    /// Insert a vector under its corpus row
    pub fn insert(&mut self, row: usize, vector: &[f32]) -> Result<(), VectorIndexError> {
        check_dimension(self.dimension, vector)?;

        let data = vector.to_vec();
        self.index.insert((&data, row));
        self.count += 1;

        Ok(())
    }

    pub fn from_vectors(
        dimension: usize,
        vectors: &[Vec<f32>],
        m: usize,
        ef_construction: usize,
        ef_search: usize,
    ) -> Result<Self, VectorIndexError> {
        let mut index = Self::new(dimension, vectors.len(), m, ef_construction, ef_search);
        for (row, v) in vectors.iter().enumerate() {
            index.insert(row, v)?;
        }
        Ok(index)
    }
}

impl DenseIndex for HnswIndex {
    fn search(&self, query: &[f32], n: usize) -> Result<DenseHits, VectorIndexError> {
        check_dimension(self.dimension, query)?;

        if self.count == 0 || n == 0 {
            return Ok(DenseHits::default());
        }

        let neighbours = self.index.search(query, n, self.ef_search.max(n));

        Ok(DenseHits {
            // DistCosine is 1 - cos, convert back to similarity
            scores: neighbours.iter().map(|nb| 1.0 - nb.distance).collect(),
            indices: neighbours.iter().map(|nb| nb.d_id as i64).collect(),
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.count
    }
}
