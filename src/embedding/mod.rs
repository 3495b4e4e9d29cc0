mod batch;
mod bm25;
mod keyword_index;
/// Embedding and indexing
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction, FastEmbedProvider for local models
/// - DenseIndex trait: FlatIndex (exact inner product) and HnswIndex (approximate)
/// - LexicalIndex trait: Bm25Index (Okapi, in memory) and TantivyIndex
/// - Batch processing for building passage vectors
mod provider;
mod vector_index;

pub use batch::{BatchProcessor, BatchResult};
pub use bm25::{tokenize, Bm25Index, Bm25Params};
pub use keyword_index::{KeywordIndexError, LexicalIndex, TantivyIndex};
pub use provider::{l2_normalize, EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{
    DenseHits, DenseIndex, FlatIndex, HnswIndex, VectorIndexError, SENTINEL_ROW,
};
