use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::error::{MaesterError, Result, ValidationError};

const DENSE_BACKENDS: [&str; 2] = ["flat", "hnsw"];
const LEXICAL_BACKENDS: [&str; 2] = ["bm25", "tantivy"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_artifacts(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_temporal(config, &mut errors);
        Self::validate_reranker(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MaesterError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_artifacts(config: &Config, errors: &mut Vec<ValidationError>) {
        let artifacts = &config.artifacts;

        if artifacts.bundle_dir.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "artifacts.bundle_dir",
                "Bundle directory cannot be empty",
            ));
        }

        if artifacts.corpus_file.trim().is_empty() {
            errors.push(ValidationError::new(
                "artifacts.corpus_file",
                "Corpus file name cannot be empty",
            ));
        }

        if artifacts.vectors_file.trim().is_empty() {
            errors.push(ValidationError::new(
                "artifacts.vectors_file",
                "Vectors file name cannot be empty",
            ));
        }

        if !DENSE_BACKENDS.contains(&artifacts.dense_backend.as_str()) {
            errors.push(ValidationError::new(
                "artifacts.dense_backend",
                format!(
                    "Dense backend must be one of {:?}, got '{}'",
                    DENSE_BACKENDS, artifacts.dense_backend
                ),
            ));
        }

        if !LEXICAL_BACKENDS.contains(&artifacts.lexical_backend.as_str()) {
            errors.push(ValidationError::new(
                "artifacts.lexical_backend",
                format!(
                    "Lexical backend must be one of {:?}, got '{}'",
                    LEXICAL_BACKENDS, artifacts.lexical_backend
                ),
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent",
                "Concurrency must be greater than 0",
            ));
        }

        Self::validate_timeout("embedding.timeout", &config.embedding.timeout, errors);
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let retrieval = &config.retrieval;

        if retrieval.topk == 0 {
            errors.push(ValidationError::new(
                "retrieval.topk",
                "topk must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&retrieval.alpha) {
            errors.push(ValidationError::new(
                "retrieval.alpha",
                format!("Alpha must be between 0.0 and 1.0, got {}", retrieval.alpha),
            ));
        }

        if retrieval.cand_mult == 0 {
            errors.push(ValidationError::new(
                "retrieval.cand_mult",
                "Candidate multiplier must be greater than 0",
            ));
        }

        if !(retrieval.lexical_epsilon > 0.0 && retrieval.lexical_epsilon.is_finite()) {
            errors.push(ValidationError::new(
                "retrieval.lexical_epsilon",
                format!(
                    "Lexical epsilon must be positive, got {}",
                    retrieval.lexical_epsilon
                ),
            ));
        }

        // HNSW parameters
        if retrieval.hnsw_m == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_m",
                "HNSW M must be greater than 0",
            ));
        }

        if retrieval.hnsw_ef_construction == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if retrieval.hnsw_ef_search == 0 {
            errors.push(ValidationError::new(
                "retrieval.hnsw_ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }
    }

    fn validate_temporal(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.temporal.markers.iter().any(|m| m.trim().is_empty()) {
            errors.push(ValidationError::new(
                "temporal.markers",
                "Marker phrases cannot be empty",
            ));
        }
    }

    fn validate_reranker(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.reranker.enabled && config.reranker.model.is_empty() {
            errors.push(ValidationError::new(
                "reranker.model",
                "Model name cannot be empty when the reranker is enabled",
            ));
        }

        Self::validate_timeout("reranker.timeout", &config.reranker.timeout, errors);
    }

    fn validate_timeout(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        match parse_duration(value) {
            Some(d) if d.is_zero() => errors.push(ValidationError::new(
                path,
                "Timeout must be greater than 0",
            )),
            Some(_) => {}
            None => errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            )),
        }
    }
}
