//! Cross-encoder reranking using FastEmbed

use crate::retrieval::{RankStage, ResultTable};
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_RERANKER_MODEL: &str = "BAAI/bge-reranker-base";

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Scores (question, passage) pairs; higher is more relevant
pub trait RelevanceModel: Send + Sync {
    /// One score per pair, in input order
    fn score_pairs(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>, RerankError>;

    fn model_name(&self) -> &str;
}

fn resolve_model(model_name: &str) -> Result<RerankerModel, RerankError> {
    match model_name {
        "BAAI/bge-reranker-base" => Ok(RerankerModel::BGERerankerBase),
        "BAAI/bge-reranker-v2-m3" | "rozgo/bge-reranker-v2-m3" => {
            Ok(RerankerModel::BGERerankerV2M3)
        }
        "jinaai/jina-reranker-v1-turbo-en" => Ok(RerankerModel::JINARerankerV1TurboEn),
        other => Err(RerankError::InitializationError(format!(
            "Unsupported reranker model: {}",
            other
        ))),
    }
}

/// Cross-encoder relevance model backed by FastEmbed
pub struct FastEmbedRelevance {
    model: TextRerank,
    model_name: String,
}

impl FastEmbedRelevance {
    /// Create a new relevance model
    ///
    /// # Arguments
    /// * `model_name` - Model name (e.g., "BAAI/bge-reranker-base")
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        info!("Initializing reranker model: {}", model_name);

        let init_options =
            RerankInitOptions::new(resolve_model(model_name)?).with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model,
            model_name: model_name.to_string(),
        })
    }
}

impl RelevanceModel for FastEmbedRelevance {
    fn score_pairs(&self, pairs: &[(&str, &str)]) -> Result<Vec<f32>, RerankError> {
        let mut scores = vec![0.0f32; pairs.len()];

        // FastEmbed scores one query against many documents; group runs of
        // pairs that share a question.
        let mut start = 0;
        while start < pairs.len() {
            let question = pairs[start].0;
            if question.is_empty() {
                return Err(RerankError::InvalidInput(
                    "Query cannot be empty".to_string(),
                ));
            }

            let end = pairs[start..]
                .iter()
                .position(|(q, _)| *q != question)
                .map_or(pairs.len(), |offset| start + offset);

            let documents: Vec<&str> = pairs[start..end].iter().map(|(_, d)| *d).collect();
            let results = self
                .model
                .rerank(question, documents, false, None)
                .map_err(|e| RerankError::RerankingError(e.to_string()))?;

            for result in results {
                let slot = scores.get_mut(start + result.index).ok_or_else(|| {
                    RerankError::RerankingError(format!(
                        "Result index {} out of range",
                        result.index
                    ))
                })?;
                *slot = result.score;
            }

            start = end;
        }

        Ok(scores)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Lifecycle of the relevance model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Unloaded,
    Loading,
    Loaded,
    LoadFailed,
}

/// Why a rerank pass returned its input untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    EmptyInput,
    ModelUnavailable,
    TimedOut,
    ScoringFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "reranker disabled"),
            SkipReason::EmptyInput => write!(f, "nothing to rerank"),
            SkipReason::ModelUnavailable => write!(f, "relevance model unavailable"),
            SkipReason::TimedOut => write!(f, "relevance model timed out"),
            SkipReason::ScoringFailed(msg) => write!(f, "scoring failed: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RerankStatus {
    Applied { top_score: f32 },
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub table: ResultTable,
    pub status: RerankStatus,
}

impl RerankOutcome {
    fn skipped(table: ResultTable, reason: SkipReason) -> Self {
        Self {
            table,
            status: RerankStatus::Skipped(reason),
        }
    }

    pub fn was_skipped(&self) -> bool {
        matches!(self.status, RerankStatus::Skipped(_))
    }
}

type ModelLoader = Arc<dyn Fn() -> Result<Arc<dyn RelevanceModel>, RerankError> + Send + Sync>;

enum ModelSlot {
    Unloaded,
    Loading,
    Loaded(Arc<dyn RelevanceModel>),
    LoadFailed(String),
}

/// Reorders result tables by cross-encoder relevance.
///
/// The model is loaded on first use. Concurrent callers wait on the same
/// load, and a failed load is never retried. Every failure degrades to
/// returning the input table with a skip reason.
pub struct Reranker {
    loader: Option<ModelLoader>,
    slot: Mutex<ModelSlot>,
    load_lock: tokio::sync::Mutex<()>,
    timeout: Duration,
}

impl Reranker {
    pub fn new<F>(loader: F, timeout: Duration) -> Self
    where
        F: Fn() -> Result<Arc<dyn RelevanceModel>, RerankError> + Send + Sync + 'static,
    {
        Self {
            loader: Some(Arc::new(loader)),
            slot: Mutex::new(ModelSlot::Unloaded),
            load_lock: tokio::sync::Mutex::new(()),
            timeout,
        }
    }

    /// Lazily load a FastEmbed cross-encoder
    pub fn fastembed(model_name: &str, timeout: Duration) -> Self {
        let model_name = model_name.to_string();
        Self::new(
            move || {
                FastEmbedRelevance::new(&model_name)
                    .map(|m| Arc::new(m) as Arc<dyn RelevanceModel>)
            },
            timeout,
        )
    }

    /// Wrap an already loaded model
    pub fn with_model(model: Arc<dyn RelevanceModel>, timeout: Duration) -> Self {
        Self {
            loader: None,
            slot: Mutex::new(ModelSlot::Loaded(model)),
            load_lock: tokio::sync::Mutex::new(()),
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self {
            loader: None,
            slot: Mutex::new(ModelSlot::Unloaded),
            load_lock: tokio::sync::Mutex::new(()),
            timeout: Duration::ZERO,
        }
    }

    pub fn state(&self) -> ModelState {
        match &*self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
            ModelSlot::Unloaded => ModelState::Unloaded,
            ModelSlot::Loading => ModelState::Loading,
            ModelSlot::Loaded(_) => ModelState::Loaded,
            ModelSlot::LoadFailed(_) => ModelState::LoadFailed,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.loader.is_some() || self.state() == ModelState::Loaded
    }

    fn set_slot(&self, slot: ModelSlot) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = slot;
    }

    /// `Some(result)` once the lifecycle has settled
    fn settled(&self) -> Option<Option<Arc<dyn RelevanceModel>>> {
        match &*self.slot.lock().unwrap_or_else(PoisonError::into_inner) {
            ModelSlot::Loaded(model) => Some(Some(model.clone())),
            ModelSlot::LoadFailed(_) => Some(None),
            ModelSlot::Unloaded | ModelSlot::Loading => None,
        }
    }

    /// Load the model once; `None` when disabled or when loading failed
    pub async fn ensure_loaded(&self) -> Option<Arc<dyn RelevanceModel>> {
        if let Some(settled) = self.settled() {
            return settled;
        }

        let loader = self.loader.clone()?;

        let _guard = self.load_lock.lock().await;
        if let Some(settled) = self.settled() {
            return settled;
        }

        self.set_slot(ModelSlot::Loading);

        match tokio::task::spawn_blocking(move || loader()).await {
            Ok(Ok(model)) => {
                info!("Loaded relevance model: {}", model.model_name());
                self.set_slot(ModelSlot::Loaded(model.clone()));
                Some(model)
            }
            Ok(Err(e)) => {
                warn!("Relevance model unavailable, reranking disabled: {}", e);
                self.set_slot(ModelSlot::LoadFailed(e.to_string()));
                None
            }
            Err(e) => {
                warn!("Relevance model load task failed: {}", e);
                self.set_slot(ModelSlot::LoadFailed(e.to_string()));
                None
            }
        }
    }

    /// Rerank `table` against `question`.
    ///
    /// On success every row carries a `rerank_score` and the table is stably
    /// sorted by it. Otherwise the table comes back unchanged with the
    /// reason it was skipped.
    pub async fn rerank(&self, table: ResultTable, question: &str) -> RerankOutcome {
        if table.is_empty() || question.trim().is_empty() {
            return RerankOutcome::skipped(table, SkipReason::EmptyInput);
        }

        if !self.is_enabled() {
            return RerankOutcome::skipped(table, SkipReason::Disabled);
        }

        let Some(model) = self.ensure_loaded().await else {
            debug!("Reranker unavailable, skipping rerank");
            return RerankOutcome::skipped(table, SkipReason::ModelUnavailable);
        };

        let question = question.to_string();
        let texts: Vec<String> = table.iter().map(|c| c.text().to_string()).collect();
        let task = tokio::task::spawn_blocking(move || {
            let pairs: Vec<(&str, &str)> = texts
                .iter()
                .map(|t| (question.as_str(), t.as_str()))
                .collect();
            model.score_pairs(&pairs)
        });

        let scores = match tokio::time::timeout(self.timeout, task).await {
            Err(_) => {
                warn!("Reranking exceeded {:?}, keeping blended order", self.timeout);
                return RerankOutcome::skipped(table, SkipReason::TimedOut);
            }
            Ok(Err(e)) => {
                warn!("Rerank task failed: {}", e);
                return RerankOutcome::skipped(table, SkipReason::ScoringFailed(e.to_string()));
            }
            Ok(Ok(Err(e))) => {
                warn!("Reranking failed, keeping blended order: {}", e);
                return RerankOutcome::skipped(table, SkipReason::ScoringFailed(e.to_string()));
            }
            Ok(Ok(Ok(scores))) => scores,
        };

        if scores.len() != table.len() {
            let msg = format!("expected {} scores, got {}", table.len(), scores.len());
            warn!("Reranking failed, keeping blended order: {}", msg);
            return RerankOutcome::skipped(table, SkipReason::ScoringFailed(msg));
        }

        let mut rows = table.into_rows();
        for (row, score) in rows.iter_mut().zip(scores) {
            row.rerank_score = Some(score);
        }

        let key = |score: Option<f32>| score.unwrap_or(f32::NEG_INFINITY);
        rows.sort_by(|a, b| key(b.rerank_score).total_cmp(&key(a.rerank_score)));

        let top_score = key(rows[0].rerank_score);
        debug!(
            rows = rows.len(),
            top_score,
            top = %rows[0].preview(60),
            "Reranked candidates"
        );

        RerankOutcome {
            table: ResultTable::new(rows, RankStage::Reranked),
            status: RerankStatus::Applied { top_score },
        }
    }
}
