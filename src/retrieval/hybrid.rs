//! Hybrid search combining semantic and keyword search

use crate::corpus::CorpusStore;
use crate::embedding::{
    l2_normalize, tokenize, DenseHits, DenseIndex, EmbeddingError, EmbeddingProvider,
    KeywordIndexError, LexicalIndex, VectorIndexError,
};
use crate::retrieval::fusion::{fuse, FusionConfig, DEFAULT_LEXICAL_EPSILON};
use crate::retrieval::{
    deduplicate_by_text, QueryRequest, QuerySet, RankStage, ResultTable, ScoredCandidate,
    SearchParams,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Embedding provider did not answer within {0:?}")]
    EmbeddingTimeout(Duration),

    #[error("Vector search failed: {0}")]
    VectorSearch(#[from] VectorIndexError),

    #[error("Keyword search failed: {0}")]
    KeywordSearch(#[from] KeywordIndexError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Search task failed: {0}")]
    TaskFailed(String),
}

impl SearchError {
    /// Whether the failure is specific to the query text rather than to the
    /// retrieval backends. Such sub-queries are skipped during aggregation.
    pub fn is_query_fault(&self) -> bool {
        matches!(
            self,
            SearchError::InvalidQuery(_) | SearchError::Embedding(EmbeddingError::InvalidInput(_))
        )
    }
}

/// Engine-level settings that are not per-query
#[derive(Debug, Clone)]
pub struct SearchSettings {
    /// Defaults for `search_many`
    pub params: SearchParams,
    pub lexical_epsilon: f32,
    /// Upper bound on one embedding call
    pub embed_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            params: SearchParams::default(),
            lexical_epsilon: DEFAULT_LEXICAL_EPSILON,
            embed_timeout: Duration::from_secs(30),
        }
    }
}

/// Hybrid searcher combining dense and lexical retrieval.
///
/// Borrows shared, read-only indexes; cloning is cheap.
#[derive(Clone)]
pub struct HybridSearcher {
    corpus: Arc<CorpusStore>,
    dense: Arc<dyn DenseIndex>,
    lexical: Arc<dyn LexicalIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    settings: SearchSettings,
}

impl HybridSearcher {
    pub fn new(
        corpus: Arc<CorpusStore>,
        dense: Arc<dyn DenseIndex>,
        lexical: Arc<dyn LexicalIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            corpus,
            dense,
            lexical,
            embedder,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// Run one fusion pass and return at most `topk` passages ranked by
    /// blended score.
    ///
    /// Empty query text or an empty corpus yields an empty table without
    /// touching the embedding provider.
    pub async fn search(&self, request: &QueryRequest) -> Result<ResultTable, SearchError> {
        let params = request.params();
        params.validate()?;

        let text = request.text.trim();
        if text.is_empty() {
            debug!("Empty query text, returning no candidates");
            return Ok(ResultTable::empty());
        }

        if self.corpus.is_empty() {
            debug!("Corpus is empty, returning no candidates");
            return Ok(ResultTable::empty());
        }

        let fusion_config = FusionConfig::new(params.alpha, self.settings.lexical_epsilon)
            .map_err(|e| SearchError::InvalidQuery(e.to_string()))?;

        let pool = params.pool_size();

        // Step 1: dense and lexical branches, both must finish before scoring
        let (dense_hits, lexical_scores) = tokio::join!(
            self.semantic_search(text, pool),
            self.lexical_search(text)
        );

        let dense_hits = dense_hits?;
        let lexical_scores = lexical_scores?;

        // Step 2: fuse the union of both candidate sets
        let fused = fuse(
            &dense_hits,
            &lexical_scores,
            pool,
            self.corpus.len(),
            &fusion_config,
        );

        debug!(
            query = text,
            dense = dense_hits.len(),
            candidates = fused.len(),
            "Fused candidate set"
        );

        // Step 3: materialize the top rows
        let rows: Vec<ScoredCandidate> = fused
            .iter()
            .take(params.topk)
            .filter_map(|f| {
                self.corpus
                    .get(f.row)
                    .map(|p| ScoredCandidate::from_fusion(p.clone(), f))
            })
            .collect();

        Ok(ResultTable::new(rows, RankStage::Blended))
    }

    /// Aggregate several sub-queries with the engine's default alpha and
    /// candidate multiplier.
    pub async fn search_many(
        &self,
        queries: impl Into<QuerySet>,
        topk: usize,
    ) -> Result<ResultTable, SearchError> {
        let params = SearchParams {
            topk,
            ..self.settings.params
        };
        self.search_many_with(queries, &params).await
    }

    /// Run the fusion engine once per trimmed, non-empty query, concatenate
    /// the tables in query order and keep the first occurrence of each
    /// passage text.
    ///
    /// Sub-queries rejected for their text are skipped; backend failures
    /// abort the whole aggregation.
    pub async fn search_many_with(
        &self,
        queries: impl Into<QuerySet>,
        params: &SearchParams,
    ) -> Result<ResultTable, SearchError> {
        params.validate()?;
        let queries = queries.into();

        let span = tracing::info_span!(
            "search_many",
            request_id = %Uuid::new_v4(),
            queries = queries.len()
        );

        async move {
            let mut rows: Vec<ScoredCandidate> = Vec::new();

            for query in queries.iter() {
                let query = query.trim();
                if query.is_empty() {
                    continue;
                }

                let request = QueryRequest::with_params(query, params);
                match self.search(&request).await {
                    Ok(table) => rows.extend(table.into_rows()),
                    Err(e) if e.is_query_fault() => {
                        warn!("Skipping sub-query {:?}: {}", query, e);
                    }
                    Err(e) => return Err(e),
                }
            }

            let before = rows.len();
            let rows = deduplicate_by_text(rows);
            debug!(
                merged = before,
                unique = rows.len(),
                "Aggregated sub-query results"
            );

            Ok(ResultTable::new(rows, RankStage::Blended))
        }
        .instrument(span)
        .await
    }

    /// Embed the query off the async runtime, bounded by the embed timeout,
    /// then search the dense index.
    async fn semantic_search(&self, query: &str, limit: usize) -> Result<DenseHits, SearchError> {
        let embedder = self.embedder.clone();
        let owned = query.to_string();
        let task = tokio::task::spawn_blocking(move || embedder.embed(&owned));

        let timeout = self.settings.embed_timeout;
        let mut embedding = match tokio::time::timeout(timeout, task).await {
            Err(_) => return Err(SearchError::EmbeddingTimeout(timeout)),
            Ok(Err(join_error)) => return Err(SearchError::TaskFailed(join_error.to_string())),
            Ok(Ok(result)) => result?,
        };

        if embedding.len() != self.dense.dimension() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dense.dimension(),
                actual: embedding.len(),
            }
            .into());
        }

        l2_normalize(&mut embedding);

        Ok(self.dense.search(&embedding, limit)?)
    }

    /// Score every passage against the whitespace-tokenized query
    async fn lexical_search(&self, query: &str) -> Result<Vec<f32>, SearchError> {
        let tokens = tokenize(query);
        Ok(self.lexical.scores_for(&tokens)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Passage;
    use crate::embedding::{Bm25Index, FlatIndex};

    /// Embeds text onto 2 axes: "north" words vs everything else
    struct AxisProvider;

    impl EmbeddingProvider for AxisProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let north = text.to_lowercase().contains("north") as u8 as f32;
            Ok(vec![north, 1.0 - north])
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            texts.iter().map(|t| self.embed(t)).collect()
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "axis"
        }
    }

    fn searcher() -> HybridSearcher {
        let texts = [
            "Jon Snow is King in the North",
            "Cersei walks in atonement",
            "The North remembers",
        ];
        let corpus = CorpusStore::new(texts.iter().map(|t| Passage::new(0, *t)).collect());
        let vectors = texts
            .iter()
            .map(|t| AxisProvider.embed(t).unwrap())
            .collect();

        HybridSearcher::new(
            Arc::new(corpus),
            Arc::new(FlatIndex::from_vectors(2, vectors).unwrap()),
            Arc::new(Bm25Index::new(&texts)),
            Arc::new(AxisProvider),
            SearchSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_search_ranks_and_bounds() {
        let searcher = searcher();
        let table = searcher
            .search(&QueryRequest::new("king in the north").topk(2))
            .await
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.stage(), RankStage::Blended);
        assert_eq!(table.get(0).unwrap().passage.id, 0);
    }

    #[tokio::test]
    async fn test_whitespace_query_is_empty_result() {
        let table = searcher().search(&QueryRequest::new("   ")).await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_params_rejected() {
        let result = searcher()
            .search(&QueryRequest::new("north").alpha(2.0))
            .await;
        assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
    }

    #[tokio::test]
    async fn test_search_many_skips_blank_queries() {
        let table = searcher()
            .search_many(vec!["".to_string(), "  ".to_string()], 5)
            .await
            .unwrap();
        assert!(table.is_empty());
    }
}
