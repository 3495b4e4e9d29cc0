/// Lexical (term-frequency) indexes
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::*;
use tantivy::tokenizer::{LowerCaser, TextAnalyzer, WhitespaceTokenizer};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, TantivyError};
use thiserror::Error;

/// Tokenizer name registered on the tantivy index; mirrors [`super::tokenize`]
const WHITESPACE_LOWER: &str = "whitespace_lower";

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// BM25-style ranking over tokenized passage text
pub trait LexicalIndex: Send + Sync {
    /// One score per corpus passage, same order as the corpus store.
    /// Passages sharing no token with the query score 0.
    fn scores_for(&self, tokens: &[String]) -> Result<Vec<f32>, KeywordIndexError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tantivy-backed lexical index held in RAM.
///
/// Text is analyzed with a whitespace tokenizer plus lowercasing so that the
/// indexed terms line up exactly with query tokens.
pub struct TantivyIndex {
    reader: IndexReader,
    row_field: Field,
    text_field: Field,
    doc_count: usize,
}

impl TantivyIndex {
    /// Index passage texts; each text is stored under its position as row id
    pub fn build<S: AsRef<str>>(texts: &[S]) -> Result<Self, KeywordIndexError> {
        let mut schema_builder = Schema::builder();

        let row_field = schema_builder.add_u64_field("row", INDEXED | STORED);
        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer(WHITESPACE_LOWER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_field = schema_builder.add_text_field(
            "text",
            TextOptions::default().set_indexing_options(text_indexing),
        );

        let schema = schema_builder.build();
        let index = Index::create_in_ram(schema);

        let analyzer = TextAnalyzer::builder(WhitespaceTokenizer::default())
            .filter(LowerCaser)
            .build();
        index.tokenizers().register(WHITESPACE_LOWER, analyzer);

        let mut writer: IndexWriter = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        for (row, text) in texts.iter().enumerate() {
            writer
                .add_document(doc!(
                    row_field => row as u64,
                    text_field => text.as_ref(),
                ))
                .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        tracing::debug!("Built tantivy lexical index over {} passages", texts.len());

        Ok(Self {
            reader,
            row_field,
            text_field,
            doc_count: texts.len(),
        })
    }
}

impl LexicalIndex for TantivyIndex {
    fn scores_for(&self, tokens: &[String]) -> Result<Vec<f32>, KeywordIndexError> {
        let mut scores = vec![0.0f32; self.doc_count];
        if tokens.is_empty() || self.doc_count == 0 {
            return Ok(scores);
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
            .iter()
            .map(|token| {
                let term = Term::from_field_text(self.text_field, token);
                let query: Box<dyn Query> =
                    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(self.doc_count))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        for (score, doc_address) in top_docs {
            let retrieved: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let row = retrieved
                .get_first(self.row_field)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid row field".to_string())
                })? as usize;

            if let Some(slot) = scores.get_mut(row) {
                *slot = score;
            }
        }

        Ok(scores)
    }

    fn len(&self) -> usize {
        self.doc_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::tokenize;

    #[test]
    fn test_build_and_score() {
        let index = TantivyIndex::build(&[
            "The quick brown fox jumps over the lazy dog",
            "A fast red fox leaps above a sleepy canine",
            "Python programming language tutorial",
        ])
        .unwrap();

        assert_eq!(index.len(), 3);

        let scores = index.scores_for(&tokenize("Fox")).unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores[0] > 0.0);
        assert!(scores[1] > 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_punctuation_stays_attached() {
        let index = TantivyIndex::build(&["Who killed Joffrey?", "Joffrey dies at his wedding"]).unwrap();

        let scores = index.scores_for(&tokenize("joffrey")).unwrap();
        assert_eq!(scores[0], 0.0);
        assert!(scores[1] > 0.0);
    }

    #[test]
    fn test_empty_tokens() {
        let index = TantivyIndex::build(&["Document one"]).unwrap();
        assert_eq!(index.scores_for(&[]).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_empty_index() {
        let index = TantivyIndex::build::<&str>(&[]).unwrap();
        assert!(index.is_empty());
        assert!(index.scores_for(&tokenize("winter")).unwrap().is_empty());
    }
}
