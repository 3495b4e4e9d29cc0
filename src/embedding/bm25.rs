//! In-memory Okapi BM25 lexical index

use super::keyword_index::{KeywordIndexError, LexicalIndex};
use ahash::AHashMap;

/// Tokenize text for lexical matching: lowercase, split on whitespace.
///
/// No stemming and no stopword removal; punctuation stays attached to words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(|t| t.to_lowercase()).collect()
}

/// BM25 tuning parameters
#[derive(Debug, Clone, Copy)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
    /// Floor for negative idf values, as a fraction of the average idf
    pub epsilon: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
        }
    }
}

/// Okapi BM25 over pre-tokenized passages.
///
/// Terms appearing in more than half the corpus would get a negative idf;
/// those are replaced by `epsilon * average_idf` so that common terms still
/// contribute a small positive amount.
pub struct Bm25Index {
    params: Bm25Params,
    doc_term_freqs: Vec<AHashMap<String, u32>>,
    doc_lens: Vec<u32>,
    avg_doc_len: f32,
    idf: AHashMap<String, f32>,
}

impl Bm25Index {
    pub fn new<S: AsRef<str>>(texts: &[S]) -> Self {
        Self::with_params(texts, Bm25Params::default())
    }

    pub fn with_params<S: AsRef<str>>(texts: &[S], params: Bm25Params) -> Self {
        let mut doc_term_freqs = Vec::with_capacity(texts.len());
        let mut doc_lens = Vec::with_capacity(texts.len());
        let mut doc_freq: AHashMap<String, u32> = AHashMap::new();

        for text in texts {
            let tokens = tokenize(text.as_ref());
            doc_lens.push(tokens.len() as u32);

            let mut freqs: AHashMap<String, u32> = AHashMap::new();
            for token in tokens {
                *freqs.entry(token).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_term_freqs.push(freqs);
        }

        let corpus_size = texts.len() as f32;
        let total_len: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avg_doc_len = if texts.is_empty() {
            0.0
        } else {
            total_len as f32 / corpus_size
        };

        let mut idf: AHashMap<String, f32> = AHashMap::with_capacity(doc_freq.len());
        let mut idf_sum = 0.0f32;
        let mut negative: Vec<String> = Vec::new();
        for (term, n) in doc_freq {
            let n = n as f32;
            let value = (corpus_size - n + 0.5).ln() - (n + 0.5).ln();
            idf_sum += value;
            if value < 0.0 {
                negative.push(term.clone());
            }
            idf.insert(term, value);
        }

        if !idf.is_empty() {
            let floor = params.epsilon * (idf_sum / idf.len() as f32);
            for term in negative {
                idf.insert(term, floor);
            }
        }

        tracing::debug!(
            "Built BM25 index: {} passages, {} terms, avg length {:.1}",
            doc_lens.len(),
            idf.len(),
            avg_doc_len
        );

        Self {
            params,
            doc_term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }
}

impl LexicalIndex for Bm25Index {
    fn scores_for(&self, tokens: &[String]) -> Result<Vec<f32>, KeywordIndexError> {
        let mut scores = vec![0.0f32; self.doc_lens.len()];
        if self.avg_doc_len <= 0.0 {
            return Ok(scores);
        }

        let Bm25Params { k1, b, .. } = self.params;

        for token in tokens {
            let Some(&idf) = self.idf.get(token) else {
                continue;
            };

            for (row, freqs) in self.doc_term_freqs.iter().enumerate() {
                let tf = freqs.get(token).copied().unwrap_or(0) as f32;
                if tf == 0.0 {
                    continue;
                }
                let len_norm = 1.0 - b + b * self.doc_lens[row] as f32 / self.avg_doc_len;
                scores[row] += idf * (tf * (k1 + 1.0)) / (tf + k1 * len_norm);
            }
        }

        Ok(scores)
    }

    fn len(&self) -> usize {
        self.doc_lens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "Robb Stark is killed at the Red Wedding",
            "Arya travels to Braavos",
            "Jon Snow is named King in the North",
            "The Twins host a wedding feast",
            "Daenerys sails toward Westeros",
        ]
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(
            tokenize("  The Red\tWedding\n"),
            vec!["the".to_string(), "red".to_string(), "wedding".to_string()]
        );
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_scores_one_per_passage() {
        let index = Bm25Index::new(&corpus());
        let scores = index.scores_for(&tokenize("red wedding")).unwrap();

        assert_eq!(scores.len(), 5);
        assert!(scores[0] > scores[3]);
        assert!(scores[3] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_unknown_terms_score_zero() {
        let index = Bm25Index::new(&corpus());
        let scores = index.scores_for(&tokenize("dragonglass")).unwrap();
        assert!(scores.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_common_term_gets_positive_floor() {
        // "the" appears in 3 of 5 passages, so its raw idf is negative
        let index = Bm25Index::new(&corpus());
        let scores = index.scores_for(&tokenize("the")).unwrap();
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
    }

    #[test]
    fn test_empty_corpus() {
        let index = Bm25Index::new::<&str>(&[]);
        assert!(index.scores_for(&tokenize("anything")).unwrap().is_empty());
        assert!(index.is_empty());
    }
}
