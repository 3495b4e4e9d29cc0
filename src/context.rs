//! Shared retrieval resources
//!
//! Everything a search needs is loaded once and handed out behind `Arc`s, so
//! searchers and pipelines are cheap to build per request.

use crate::corpus::CorpusStore;
use crate::embedding::{DenseIndex, EmbeddingProvider, LexicalIndex};
use crate::retrieval::{EvidencePipeline, HybridSearcher, Reranker, SearchSettings};
use std::sync::Arc;

#[derive(Clone)]
pub struct RetrievalContext {
    pub corpus: Arc<CorpusStore>,
    pub dense: Arc<dyn DenseIndex>,
    pub lexical: Arc<dyn LexicalIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Arc<Reranker>,
}

impl RetrievalContext {
    pub fn new(
        corpus: Arc<CorpusStore>,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<Reranker>,
    ) -> Self {
        Self {
            corpus,
            dense,
            lexical,
            embedder,
            reranker,
        }
    }

    pub fn searcher(&self, settings: SearchSettings) -> HybridSearcher {
        HybridSearcher::new(
            self.corpus.clone(),
            self.dense.clone(),
            self.lexical.clone(),
            self.embedder.clone(),
            settings,
        )
    }

    pub fn pipeline(
        &self,
        settings: SearchSettings,
        marker_phrases: Vec<String>,
        boundary_season: u32,
    ) -> EvidencePipeline {
        EvidencePipeline::new(
            self.searcher(settings),
            self.reranker.clone(),
            marker_phrases,
            boundary_season,
        )
    }
}
