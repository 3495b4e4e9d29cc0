//! Artifact bundle loading
//!
//! A bundle directory holds the passage corpus (`corpus.jsonl`) and one
//! embedding per passage (`vectors.jsonl`, a JSON float array per line, in
//! corpus order). Loading validates the pair and builds the configured dense
//! and lexical backends.

use crate::config::Config;
use crate::context::RetrievalContext;
use crate::corpus::CorpusStore;
use crate::embedding::{
    l2_normalize, Bm25Index, DenseIndex, EmbeddingProvider, FastEmbedProvider, FlatIndex,
    HnswIndex, LexicalIndex, TantivyIndex,
};
use crate::error::{MaesterError, Result};
use crate::retrieval::Reranker;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Read one JSON float array per non-blank line
pub fn read_vectors(path: &Path) -> Result<Vec<Vec<f32>>> {
    let file = File::open(path).map_err(|e| MaesterError::Io {
        source: e,
        context: format!("Failed to open vectors file: {:?}", path),
    })?;

    let mut vectors = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| MaesterError::Io {
            source: e,
            context: format!("Failed to read {:?}", path),
        })?;
        if line.trim().is_empty() {
            continue;
        }

        let vector: Vec<f32> = serde_json::from_str(&line).map_err(|e| MaesterError::Json {
            source: e,
            context: format!("Invalid vector at {:?} line {}", path, line_no + 1),
        })?;
        vectors.push(vector);
    }

    Ok(vectors)
}

pub fn write_vectors(path: &Path, vectors: &[Vec<f32>]) -> Result<()> {
    let io_err = |e| MaesterError::Io {
        source: e,
        context: format!("Failed to write vectors file: {:?}", path),
    };

    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    for vector in vectors {
        let line = serde_json::to_string(vector).map_err(|e| MaesterError::Json {
            source: e,
            context: "Failed to serialize vector".to_string(),
        })?;
        writeln!(writer, "{}", line).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)?;

    Ok(())
}

/// A validated corpus plus its unit-length passage vectors
#[derive(Debug)]
pub struct ArtifactBundle {
    pub corpus: CorpusStore,
    pub vectors: Vec<Vec<f32>>,
    dimension: usize,
}

impl ArtifactBundle {
    /// Load and cross-check the two bundle files
    pub fn load(corpus_path: &Path, vectors_path: &Path) -> Result<Self> {
        let corpus = CorpusStore::from_jsonl(corpus_path)?;
        let vectors = read_vectors(vectors_path)?;
        let bundle = Self::from_parts(corpus, vectors, vectors_path)?;

        info!(
            "Loaded bundle: {} passages, {}D vectors",
            bundle.corpus.len(),
            bundle.dimension
        );
        Ok(bundle)
    }

    /// `source` names the vectors in error messages
    pub fn from_parts(corpus: CorpusStore, mut vectors: Vec<Vec<f32>>, source: &Path) -> Result<Self> {
        if vectors.len() != corpus.len() {
            return Err(MaesterError::artifact(
                source,
                format!(
                    "{} vectors for {} passages",
                    vectors.len(),
                    corpus.len()
                ),
            ));
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        if !vectors.is_empty() && dimension == 0 {
            return Err(MaesterError::artifact(source, "vectors are empty"));
        }
        if let Some(row) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(MaesterError::artifact(
                source,
                format!(
                    "vector {} has dimension {}, expected {}",
                    row,
                    vectors[row].len(),
                    dimension
                ),
            ));
        }

        for vector in vectors.iter_mut() {
            l2_normalize(vector);
        }

        Ok(Self {
            corpus,
            vectors,
            dimension,
        })
    }

    /// Vector dimension; 0 for an empty bundle
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Bundle file locations resolved from the config
pub fn bundle_paths(config: &Config, bundle_dir: &Path) -> (PathBuf, PathBuf) {
    (
        bundle_dir.join(&config.artifacts.corpus_file),
        bundle_dir.join(&config.artifacts.vectors_file),
    )
}

pub fn build_dense(
    config: &Config,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Arc<dyn DenseIndex>> {
    let retrieval = &config.retrieval;
    let backend = config.artifacts.dense_backend.as_str();

    let index: Arc<dyn DenseIndex> = match backend {
        "flat" => Arc::new(
            FlatIndex::from_vectors(dimension, vectors)
                .map_err(|e| MaesterError::Config(format!("Dense index: {}", e)))?,
        ),
        "hnsw" => Arc::new(
            HnswIndex::from_vectors(
                dimension,
                &vectors,
                retrieval.hnsw_m,
                retrieval.hnsw_ef_construction,
                retrieval.hnsw_ef_search,
            )
            .map_err(|e| MaesterError::Config(format!("Dense index: {}", e)))?,
        ),
        other => {
            return Err(MaesterError::InvalidConfigValue {
                path: "artifacts.dense_backend".to_string(),
                message: format!("Unknown dense backend: {}", other),
            })
        }
    };

    Ok(index)
}

pub fn build_lexical(config: &Config, corpus: &CorpusStore) -> Result<Arc<dyn LexicalIndex>> {
    let texts = corpus.texts();

    let index: Arc<dyn LexicalIndex> = match config.artifacts.lexical_backend.as_str() {
        "bm25" => Arc::new(Bm25Index::new(&texts)),
        "tantivy" => Arc::new(
            TantivyIndex::build(&texts)
                .map_err(|e| MaesterError::Config(format!("Lexical index: {}", e)))?,
        ),
        other => {
            return Err(MaesterError::InvalidConfigValue {
                path: "artifacts.lexical_backend".to_string(),
                message: format!("Unknown lexical backend: {}", other),
            })
        }
    };

    Ok(index)
}

pub fn build_reranker(config: &Config) -> Result<Reranker> {
    if !config.reranker.enabled {
        return Ok(Reranker::disabled());
    }
    Ok(Reranker::fastembed(
        &config.reranker.model,
        config.rerank_timeout()?,
    ))
}

/// Assemble a context from an already loaded bundle and embedder
pub fn assemble_context(
    config: &Config,
    bundle: ArtifactBundle,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<RetrievalContext> {
    let dimension = if bundle.corpus.is_empty() {
        embedder.dimension()
    } else {
        bundle.dimension()
    };

    if dimension != embedder.dimension() {
        return Err(MaesterError::Config(format!(
            "Embedding model {} produces {}D vectors but the bundle holds {}D vectors",
            embedder.model_name(),
            embedder.dimension(),
            dimension
        )));
    }

    let lexical = build_lexical(config, &bundle.corpus)?;
    let dense = build_dense(config, dimension, bundle.vectors)?;
    let reranker = build_reranker(config)?;

    Ok(RetrievalContext::new(
        Arc::new(bundle.corpus),
        dense,
        lexical,
        embedder,
        Arc::new(reranker),
    ))
}

/// Load the bundle at `bundle_dir` with the configured embedding model
pub fn load_context(config: &Config, bundle_dir: &Path) -> Result<RetrievalContext> {
    let (corpus_path, vectors_path) = bundle_paths(config, bundle_dir);
    let bundle = ArtifactBundle::load(&corpus_path, &vectors_path)?;
    let embedder = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);

    assemble_context(config, bundle, embedder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Passage;
    use std::io::Write as _;
    use tempfile::{NamedTempFile, TempDir};

    fn corpus(n: usize) -> CorpusStore {
        CorpusStore::new(
            (0..n)
                .map(|i| Passage::new(i, format!("passage {}", i)))
                .collect(),
        )
    }

    #[test]
    fn test_vectors_roundtrip_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vectors.jsonl");

        write_vectors(&path, &[vec![1.0, 0.0], vec![0.5, 0.5]]).unwrap();
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push('\n');
        std::fs::write(&path, content).unwrap();

        let vectors = read_vectors(&path).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_malformed_vector_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[1.0, 2.0]").unwrap();
        writeln!(file, "not json").unwrap();

        assert!(matches!(
            read_vectors(file.path()),
            Err(MaesterError::Json { .. })
        ));
    }

    #[test]
    fn test_bundle_count_mismatch() {
        let result = ArtifactBundle::from_parts(corpus(2), vec![vec![1.0]], Path::new("v"));
        assert!(matches!(result, Err(MaesterError::Artifact { .. })));
    }

    #[test]
    fn test_bundle_dimension_mismatch() {
        let result = ArtifactBundle::from_parts(
            corpus(2),
            vec![vec![1.0, 0.0], vec![1.0]],
            Path::new("v"),
        );
        assert!(matches!(result, Err(MaesterError::Artifact { .. })));
    }

    #[test]
    fn test_bundle_normalizes_vectors() {
        let bundle =
            ArtifactBundle::from_parts(corpus(1), vec![vec![3.0, 4.0]], Path::new("v")).unwrap();
        assert_eq!(bundle.dimension(), 2);
        assert!((bundle.vectors[0][0] - 0.6).abs() < 1e-6);
        assert!((bundle.vectors[0][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut config = Config::default();
        config.artifacts.lexical_backend = "grep".to_string();
        assert!(build_lexical(&config, &corpus(1)).is_err());
    }
}
