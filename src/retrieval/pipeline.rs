//! End-to-end evidence retrieval: aggregate, filter, rerank

use crate::evidence::{classify_question, select_evidence, QuestionKind};
use crate::retrieval::{
    HybridSearcher, RerankStatus, Reranker, ResultTable, SearchError, SearchParams, SkipReason,
    TemporalFilter,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, Instrument};
use uuid::Uuid;

/// Per-call knobs for [`EvidencePipeline::retrieve`]
#[derive(Debug, Clone, PartialEq)]
pub struct EvidenceOptions {
    /// Passages per sub-query
    pub topk: usize,
    /// Restrict evidence to this season and earlier
    pub before_season: Option<u32>,
    pub rerank: bool,
}

impl Default for EvidenceOptions {
    fn default() -> Self {
        Self {
            topk: SearchParams::default().topk,
            before_season: None,
            rerank: true,
        }
    }
}

/// What one retrieval produced, stage by stage
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceReport {
    pub request_id: Uuid,
    pub question: String,
    pub kind: QuestionKind,
    pub queries: Vec<String>,
    /// Rows after aggregation and deduplication
    pub retrieved_count: usize,
    /// Rows after the temporal filter; equal to `retrieved_count` when no
    /// filter ran
    pub filtered_count: usize,
    /// Season boundary that was enforced, if any
    pub boundary_season: Option<u32>,
    pub rerank: RerankStatus,
    pub table: ResultTable,
}

impl EvidenceReport {
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The top `k` rows plus any lower-ranked row naming one of the
    /// canonical entities.
    pub fn evidence_window(&self, k: usize, canonical_entities: &[String]) -> ResultTable {
        select_evidence(&self.table, k, canonical_entities)
    }

    pub fn summary(&self) -> String {
        if self.is_empty() {
            return format!(
                "No evidence found for {} question ({} queries, {} retrieved)",
                self.kind,
                self.queries.len(),
                self.retrieved_count
            );
        }

        let boundary = match self.boundary_season {
            Some(season) => format!(", seasons <= {}", season),
            None => String::new(),
        };
        let rerank = match &self.rerank {
            RerankStatus::Applied { top_score } => format!("reranked, top {:.3}", top_score),
            RerankStatus::Skipped(reason) => format!("not reranked: {}", reason),
        };

        format!(
            "{} passages for {} question from {} queries ({} retrieved, {} after filter{}; {})",
            self.table.len(),
            self.kind,
            self.queries.len(),
            self.retrieved_count,
            self.filtered_count,
            boundary,
            rerank
        )
    }
}

/// Runs the aggregator, the temporal filter and the reranker in sequence
#[derive(Clone)]
pub struct EvidencePipeline {
    searcher: HybridSearcher,
    reranker: Arc<Reranker>,
    marker_phrases: Vec<String>,
    default_boundary: u32,
}

impl EvidencePipeline {
    pub fn new(
        searcher: HybridSearcher,
        reranker: Arc<Reranker>,
        marker_phrases: Vec<String>,
        default_boundary: u32,
    ) -> Self {
        Self {
            searcher,
            reranker,
            marker_phrases,
            default_boundary,
        }
    }

    pub fn searcher(&self) -> &HybridSearcher {
        &self.searcher
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }

    /// Retrieve evidence for `question`.
    ///
    /// Sub-queries are searched when any are non-empty, otherwise the question
    /// itself. Alternate-ending questions are always filtered at
    /// `before_season` or the configured boundary.
    pub async fn retrieve(
        &self,
        question: &str,
        sub_queries: &[String],
        options: &EvidenceOptions,
    ) -> Result<EvidenceReport, SearchError> {
        let request_id = Uuid::new_v4();
        let kind = classify_question(question);

        let mut queries: Vec<String> = sub_queries
            .iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            queries.push(question.trim().to_string());
        }

        let span = tracing::info_span!("retrieve", %request_id, kind = %kind);

        async move {
            let params = SearchParams {
                topk: options.topk,
                ..self.searcher.settings().params
            };

            let retrieved = self
                .searcher
                .search_many_with(queries.clone(), &params)
                .await?;
            let retrieved_count = retrieved.len();

            let boundary_season = match options.before_season {
                Some(season) => Some(season),
                None if kind.requires_temporal_filter() => Some(self.default_boundary),
                None => None,
            };

            let filtered = match boundary_season {
                Some(season) => {
                    TemporalFilter::or_seasons_only(season, &self.marker_phrases).apply(retrieved)
                }
                None => retrieved,
            };
            let filtered_count = filtered.len();

            let (table, rerank) = if options.rerank {
                let outcome = self.reranker.rerank(filtered, question).await;
                (outcome.table, outcome.status)
            } else {
                (filtered, RerankStatus::Skipped(SkipReason::Disabled))
            };

            info!(
                queries = queries.len(),
                retrieved = retrieved_count,
                filtered = filtered_count,
                returned = table.len(),
                "Evidence retrieved"
            );

            Ok(EvidenceReport {
                request_id,
                question: question.to_string(),
                kind,
                queries,
                retrieved_count,
                filtered_count,
                boundary_season,
                rerank,
                table,
            })
        }
        .instrument(span)
        .await
    }
}
