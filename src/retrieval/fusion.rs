//! Score-blending fusion of dense and lexical rankings

use crate::embedding::DenseHits;
use ahash::AHashSet;
use thiserror::Error;

/// Guards the lexical normalization against an all-zero score vector
pub const DEFAULT_LEXICAL_EPSILON: f32 = 1e-6;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid alpha: must be within [0, 1], got {0}")]
    InvalidAlpha(f32),

    #[error("Invalid epsilon: must be positive, got {0}")]
    InvalidEpsilon(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// Weight on the vector score
    pub alpha: f32,

    /// Added to the lexical maximum before normalizing
    pub epsilon: f32,
}

impl FusionConfig {
    pub fn new(alpha: f32, epsilon: f32) -> Result<Self, FusionError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(FusionError::InvalidAlpha(alpha));
        }
        if !(epsilon > 0.0 && epsilon.is_finite()) {
            return Err(FusionError::InvalidEpsilon(epsilon));
        }
        Ok(Self { alpha, epsilon })
    }
}

/// Blended relevance for one corpus row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub row: usize,
    /// Dense similarity; `None` for lexical-only candidates
    pub vector: Option<f32>,
    /// Raw lexical score; `None` when the passage had no lexical signal
    pub lexical: Option<f32>,
    pub blended: f32,
}

/// Rows of the `n` highest lexical scores, ties broken by row.
///
/// Only the first `valid_rows` entries are considered; a score vector longer
/// than the corpus belongs to a stale index.
pub fn top_lexical_rows(scores: &[f32], n: usize, valid_rows: usize) -> Vec<usize> {
    let mut rows: Vec<usize> = scores
        .iter()
        .take(valid_rows)
        .enumerate()
        .map(|(row, _)| row)
        .collect();

    rows.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    rows.truncate(n);
    rows
}

/// Fuse dense hits and lexical scores into one ranking.
///
/// The candidate set is the union of valid dense rows and the top `n` lexical
/// rows. Each candidate gets
/// `alpha * vector + (1 - alpha) * lexical / (max_lexical + epsilon)`, with
/// missing components counted as 0. Dense rows outside `[0, corpus_len)` are
/// dropped. Candidates are visited dense-first in rank order, then
/// lexical-only rows in rank order; the final stable sort keeps that order
/// among equal scores.
pub fn fuse(
    dense: &DenseHits,
    lexical_scores: &[f32],
    n: usize,
    corpus_len: usize,
    config: &FusionConfig,
) -> Vec<FusedScore> {
    let valid_lexical = corpus_len.min(lexical_scores.len());
    let lexical_at = |row: usize| -> f32 {
        if row < valid_lexical {
            lexical_scores[row]
        } else {
            0.0
        }
    };

    let max_lexical = lexical_scores[..valid_lexical]
        .iter()
        .copied()
        .fold(0.0f32, f32::max);

    let mut seen: AHashSet<usize> = AHashSet::new();
    let mut candidates: Vec<(usize, Option<f32>)> = Vec::new();

    for (idx, score) in dense.pairs() {
        if idx < 0 || idx as usize >= corpus_len {
            continue;
        }
        let row = idx as usize;
        if seen.insert(row) {
            candidates.push((row, Some(score)));
        }
    }

    for row in top_lexical_rows(lexical_scores, n, valid_lexical) {
        if seen.insert(row) {
            candidates.push((row, None));
        }
    }

    let mut fused: Vec<FusedScore> = candidates
        .into_iter()
        .map(|(row, vector)| {
            let raw = lexical_at(row);
            let normalized = if raw > 0.0 {
                raw / (max_lexical + config.epsilon)
            } else {
                0.0
            };
            let blended =
                config.alpha * vector.unwrap_or(0.0) + (1.0 - config.alpha) * normalized;

            FusedScore {
                row,
                vector,
                lexical: (raw > 0.0).then_some(raw),
                blended,
            }
        })
        .collect();

    fused.sort_by(|a, b| b.blended.total_cmp(&a.blended));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::SENTINEL_ROW;

    fn hits(pairs: &[(i64, f32)]) -> DenseHits {
        DenseHits {
            indices: pairs.iter().map(|(i, _)| *i).collect(),
            scores: pairs.iter().map(|(_, s)| *s).collect(),
        }
    }

    fn config(alpha: f32) -> FusionConfig {
        FusionConfig::new(alpha, DEFAULT_LEXICAL_EPSILON).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(FusionConfig::new(0.35, 1e-6).is_ok());
        assert!(FusionConfig::new(-0.1, 1e-6).is_err());
        assert!(FusionConfig::new(1.1, 1e-6).is_err());
        assert!(FusionConfig::new(0.5, 0.0).is_err());
    }

    #[test]
    fn test_top_lexical_rows_breaks_ties_by_row() {
        let scores = [0.0, 2.0, 5.0, 2.0, 0.0];
        assert_eq!(top_lexical_rows(&scores, 10, 5), vec![2, 1, 3, 0, 4]);
        assert_eq!(top_lexical_rows(&scores, 2, 5), vec![2, 1]);
        assert_eq!(top_lexical_rows(&scores, 4, 5), vec![2, 1, 3, 0]);
        assert_eq!(top_lexical_rows(&scores, 10, 2), vec![1, 0]);
    }

    #[test]
    fn test_zero_lexical_rows_fill_sparse_dense_side() {
        let dense = hits(&[(SENTINEL_ROW, 0.0), (SENTINEL_ROW, 0.0)]);
        let lexical = [3.2, 0.0, 0.0, 0.0, 0.0];

        let fused = fuse(&dense, &lexical, 3, 5, &config(0.35));
        let rows: Vec<usize> = fused.iter().map(|f| f.row).collect();
        assert_eq!(rows, vec![0, 1, 2]);
        assert_eq!(fused[0].lexical, Some(3.2));
        assert!(fused[1..].iter().all(|f| f.lexical.is_none() && f.blended == 0.0));
    }

    #[test]
    fn test_blend_formula() {
        let dense = hits(&[(0, 0.8)]);
        let lexical = [2.0, 4.0];

        let fused = fuse(&dense, &lexical, 10, 2, &config(0.35));
        assert_eq!(fused.len(), 2);

        let row0 = fused.iter().find(|f| f.row == 0).unwrap();
        let expected0 = 0.35 * 0.8 + 0.65 * (2.0 / (4.0 + 1e-6));
        assert!((row0.blended - expected0).abs() < 1e-6);
        assert_eq!(row0.vector, Some(0.8));
        assert_eq!(row0.lexical, Some(2.0));

        let row1 = fused.iter().find(|f| f.row == 1).unwrap();
        let expected1 = 0.65 * (4.0 / (4.0 + 1e-6));
        assert!((row1.blended - expected1).abs() < 1e-6);
        assert_eq!(row1.vector, None);
    }

    #[test]
    fn test_union_keeps_lexical_only_rows() {
        let dense = hits(&[(0, 0.9), (1, 0.8)]);
        let lexical = [0.0, 0.0, 0.0, 7.5];

        let fused = fuse(&dense, &lexical, 10, 4, &config(0.35));
        let rows: Vec<usize> = fused.iter().map(|f| f.row).collect();
        assert!(rows.contains(&3));
        assert_eq!(fused.len(), 4);
        assert_eq!(rows[0], 3);
    }

    #[test]
    fn test_invalid_dense_rows_dropped() {
        let dense = hits(&[(SENTINEL_ROW, 0.99), (7, 0.98), (1, 0.5), (SENTINEL_ROW, 0.1)]);
        let lexical = [0.0, 0.0];

        let fused = fuse(&dense, &lexical, 10, 2, &config(0.5));
        let rows: Vec<usize> = fused.iter().map(|f| f.row).collect();
        assert_eq!(rows, vec![1, 0]);
        assert_eq!(fused[0].vector, Some(0.5));
        assert_eq!(fused[1].vector, None);
    }

    #[test]
    fn test_all_zero_lexical_scores() {
        let dense = hits(&[(0, 0.4), (1, 0.6)]);
        let lexical = [0.0, 0.0];

        let fused = fuse(&dense, &lexical, 10, 2, &config(0.35));
        assert_eq!(fused[0].row, 1);
        assert!((fused[0].blended - 0.35 * 0.6).abs() < 1e-6);
        assert!(fused.iter().all(|f| f.lexical.is_none()));
    }

    #[test]
    fn test_alpha_extremes() {
        // Row 0: strong vector, weak lexical. Row 1: weak vector, strong lexical.
        let dense = hits(&[(0, 0.9), (1, 0.1)]);
        let lexical = [1.0, 9.0];

        let vector_only = fuse(&dense, &lexical, 10, 2, &config(1.0));
        assert_eq!(vector_only[0].row, 0);

        let lexical_only = fuse(&dense, &lexical, 10, 2, &config(0.0));
        assert_eq!(lexical_only[0].row, 1);
    }

    #[test]
    fn test_ties_keep_candidate_order() {
        let dense = hits(&[(2, 0.5), (0, 0.5), (1, 0.5)]);
        let lexical = [0.0, 0.0, 0.0];

        let fused = fuse(&dense, &lexical, 10, 3, &config(1.0));
        let rows: Vec<usize> = fused.iter().map(|f| f.row).collect();
        assert_eq!(rows, vec![2, 0, 1]);
    }

    #[test]
    fn test_empty_inputs() {
        let fused = fuse(&DenseHits::default(), &[], 10, 0, &config(0.35));
        assert!(fused.is_empty());
    }
}
