//! Hybrid retrieval & reranking
//!
//! Dense and lexical search blended into one ranking, aggregated over
//! sub-queries, restricted to a season window and optionally reordered by a
//! cross-encoder.

mod candidate;
mod deduplication;
mod fusion;
mod hybrid;
mod pipeline;
mod reranker;
mod temporal;

pub use candidate::{
    QueryRequest, QuerySet, RankStage, ResultTable, ScoredCandidate, SearchParams,
    DEFAULT_ALPHA, DEFAULT_CAND_MULT, DEFAULT_TOPK,
};
pub use deduplication::deduplicate_by_text;
pub use fusion::{fuse, top_lexical_rows, FusedScore, FusionConfig, FusionError, DEFAULT_LEXICAL_EPSILON};
pub use hybrid::{HybridSearcher, SearchError, SearchSettings};
pub use pipeline::{EvidenceOptions, EvidencePipeline, EvidenceReport};
pub use reranker::{
    FastEmbedRelevance, ModelState, RelevanceModel, RerankError, RerankOutcome, RerankStatus,
    Reranker, SkipReason, DEFAULT_RERANKER_MODEL,
};
pub use temporal::{
    default_phrases, filter_before, marker_phrases, TemporalFilter, FINAL_SEASON_MARKERS,
};
