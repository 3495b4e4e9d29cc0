//! Scored candidates, result tables and query requests

use crate::corpus::Passage;
use crate::retrieval::fusion::FusedScore;
use crate::retrieval::SearchError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TOPK: usize = 10;
pub const DEFAULT_ALPHA: f32 = 0.35;
pub const DEFAULT_CAND_MULT: usize = 20;

/// Which score defines the order of a [`ResultTable`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankStage {
    #[default]
    Blended,
    Reranked,
}

/// A passage plus the scores gathered while ranking it.
///
/// Scores are only comparable within one ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub passage: Passage,

    /// Dense similarity, present when the dense index returned this passage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,

    /// Raw lexical score, present when it was positive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blended_score: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl ScoredCandidate {
    pub fn from_fusion(passage: Passage, fused: &FusedScore) -> Self {
        Self {
            passage,
            vector_score: fused.vector,
            lexical_score: fused.lexical,
            blended_score: Some(fused.blended),
            rerank_score: None,
        }
    }

    /// Score that orders this candidate at the given stage
    pub fn score_for(&self, stage: RankStage) -> Option<f32> {
        match stage {
            RankStage::Blended => self.blended_score,
            RankStage::Reranked => self.rerank_score,
        }
    }

    pub fn text(&self) -> &str {
        &self.passage.text
    }

    /// Get a short preview of the text (first N characters)
    pub fn preview(&self, max_chars: usize) -> String {
        match self.passage.text.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.passage.text[..cut]),
            None => self.passage.text.clone(),
        }
    }
}

/// Ordered candidates, descending by the score of the last applied stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<ScoredCandidate>,
    stage: RankStage,
}

impl ResultTable {
    pub fn new(rows: Vec<ScoredCandidate>, stage: RankStage) -> Self {
        Self { rows, stage }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn stage(&self) -> RankStage {
        self.stage
    }

    pub fn rows(&self) -> &[ScoredCandidate] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredCandidate> {
        self.rows.iter()
    }

    pub fn get(&self, index: usize) -> Option<&ScoredCandidate> {
        self.rows.get(index)
    }

    pub fn into_rows(self) -> Vec<ScoredCandidate> {
        self.rows
    }

    pub fn texts(&self) -> Vec<&str> {
        self.rows.iter().map(|c| c.text()).collect()
    }

    /// Scores of the current stage, in table order
    pub fn stage_scores(&self) -> Vec<Option<f32>> {
        self.rows.iter().map(|c| c.score_for(self.stage)).collect()
    }
}

impl<'a> IntoIterator for &'a ResultTable {
    type Item = &'a ScoredCandidate;
    type IntoIter = std::slice::Iter<'a, ScoredCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Ranking knobs shared by every query of one retrieval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of passages to return
    pub topk: usize,
    /// Weight on the vector score; `1 - alpha` goes to the lexical score
    pub alpha: f32,
    /// How many candidates per sub-index, as a multiple of `topk`
    pub cand_mult: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            topk: DEFAULT_TOPK,
            alpha: DEFAULT_ALPHA,
            cand_mult: DEFAULT_CAND_MULT,
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.topk == 0 {
            return Err(SearchError::InvalidQuery("topk must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(SearchError::InvalidQuery(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        if self.cand_mult == 0 {
            return Err(SearchError::InvalidQuery(
                "cand_mult must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Candidates requested from each sub-index
    pub fn pool_size(&self) -> usize {
        self.topk.saturating_mul(self.cand_mult)
    }
}

/// One fusion-engine call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub topk: usize,
    pub alpha: f32,
    pub cand_mult: usize,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_params(text, &SearchParams::default())
    }

    pub fn with_params(text: impl Into<String>, params: &SearchParams) -> Self {
        Self {
            text: text.into(),
            topk: params.topk,
            alpha: params.alpha,
            cand_mult: params.cand_mult,
        }
    }

    pub fn topk(mut self, topk: usize) -> Self {
        self.topk = topk;
        self
    }

    pub fn alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn cand_mult(mut self, cand_mult: usize) -> Self {
        self.cand_mult = cand_mult;
        self
    }

    pub fn params(&self) -> SearchParams {
        SearchParams {
            topk: self.topk,
            alpha: self.alpha,
            cand_mult: self.cand_mult,
        }
    }
}

/// Queries for one aggregated retrieval; a single string is a singleton set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySet(Vec<String>);

impl QuerySet {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

impl From<&str> for QuerySet {
    fn from(query: &str) -> Self {
        Self(vec![query.to_string()])
    }
}

impl From<String> for QuerySet {
    fn from(query: String) -> Self {
        Self(vec![query])
    }
}

impl From<Vec<String>> for QuerySet {
    fn from(queries: Vec<String>) -> Self {
        Self(queries)
    }
}

impl From<&[&str]> for QuerySet {
    fn from(queries: &[&str]) -> Self {
        Self(queries.iter().map(|q| q.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for QuerySet {
    fn from(queries: [&str; N]) -> Self {
        Self(queries.iter().map(|q| q.to_string()).collect())
    }
}

impl From<&[String]> for QuerySet {
    fn from(queries: &[String]) -> Self {
        Self(queries.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_validation() {
        assert!(SearchParams::default().validate().is_ok());

        let bad_topk = SearchParams { topk: 0, ..Default::default() };
        assert!(bad_topk.validate().is_err());

        let bad_alpha = SearchParams { alpha: 1.5, ..Default::default() };
        assert!(bad_alpha.validate().is_err());

        let nan_alpha = SearchParams { alpha: f32::NAN, ..Default::default() };
        assert!(nan_alpha.validate().is_err());

        let bad_mult = SearchParams { cand_mult: 0, ..Default::default() };
        assert!(bad_mult.validate().is_err());
    }

    #[test]
    fn test_request_defaults() {
        let request = QueryRequest::new("Who killed the Night King?");
        assert_eq!(request.topk, 10);
        assert_eq!(request.alpha, 0.35);
        assert_eq!(request.cand_mult, 20);
        assert_eq!(request.params().pool_size(), 200);
    }

    #[test]
    fn test_query_set_singleton() {
        let set = QuerySet::from("Red Wedding");
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next(), Some("Red Wedding"));

        let set = QuerySet::from(["a", "b"]);
        assert_eq!(set.into_inner(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let candidate = ScoredCandidate {
            passage: Passage::new(0, "Daenerys Stormborn of House Targaryen"),
            vector_score: None,
            lexical_score: None,
            blended_score: Some(0.5),
            rerank_score: None,
        };
        assert_eq!(candidate.preview(8), "Daenerys...");
        assert_eq!(candidate.preview(100), candidate.passage.text);

        let accented = ScoredCandidate {
            passage: Passage::new(1, "Hodör"),
            ..candidate
        };
        assert_eq!(accented.preview(4), "Hodö...");
    }
}
