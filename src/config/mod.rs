//! Configuration management for Maester
//!
//! Loads the TOML configuration, applies profiles and `MAESTER_SECTION__KEY`
//! environment overrides, and validates the result before anything is built
//! from it.

use crate::error::{MaesterError, Result};
use crate::retrieval::{SearchParams, SearchSettings, DEFAULT_RERANKER_MODEL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub artifacts: ArtifactsConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub temporal: TemporalConfig,
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Location and backends of the prebuilt passage bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub bundle_dir: PathBuf,
    pub corpus_file: String,
    pub vectors_file: String,
    /// "flat" or "hnsw"
    pub dense_backend: String,
    /// "bm25" or "tantivy"
    pub lexical_backend: String,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub timeout: String,
}

/// Fusion and index parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub topk: usize,
    pub alpha: f32,
    pub cand_mult: usize,
    pub lexical_epsilon: f32,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Last season allowed when a question needs a season boundary
    pub boundary_season: u32,
    /// Fixed phrases marking content past the boundary
    pub markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub model: String,
    pub timeout: String,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topk: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranker_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_backend: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MaesterError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| MaesterError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults (env overrides
    /// still apply)
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::debug!("No config at {:?}, using defaults", path);
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MaesterError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| MaesterError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load_or_default(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| MaesterError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(alpha) = overrides.alpha {
            self.retrieval.alpha = alpha;
        }
        if let Some(topk) = overrides.topk {
            self.retrieval.topk = topk;
        }
        if let Some(enabled) = overrides.reranker_enabled {
            self.reranker.enabled = enabled;
        }
        if let Some(backend) = overrides.dense_backend {
            self.artifacts.dense_backend = backend;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: MAESTER_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(std::env::vars());
    }

    /// Apply `MAESTER_`-prefixed overrides from any key/value source
    pub fn apply_overrides_from<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("MAESTER_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "ARTIFACTS__BUNDLE_DIR" => self.artifacts.bundle_dir = PathBuf::from(value),
            "ARTIFACTS__DENSE_BACKEND" => self.artifacts.dense_backend = value.to_string(),
            "ARTIFACTS__LEXICAL_BACKEND" => self.artifacts.lexical_backend = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__TIMEOUT" => self.embedding.timeout = value.to_string(),
            "EMBEDDING__BATCH_SIZE" => self.embedding.batch_size = parse_value(path, value)?,
            "RETRIEVAL__TOPK" => self.retrieval.topk = parse_value(path, value)?,
            "RETRIEVAL__ALPHA" => self.retrieval.alpha = parse_value(path, value)?,
            "RETRIEVAL__CAND_MULT" => self.retrieval.cand_mult = parse_value(path, value)?,
            "TEMPORAL__BOUNDARY_SEASON" => {
                self.temporal.boundary_season = parse_value(path, value)?
            }
            "RERANKER__ENABLED" => self.reranker.enabled = parse_value(path, value)?,
            "RERANKER__MODEL" => self.reranker.model = value.to_string(),
            "RERANKER__TIMEOUT" => self.reranker.timeout = value.to_string(),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Engine settings derived from the retrieval and embedding sections
    pub fn search_settings(&self) -> Result<SearchSettings> {
        Ok(SearchSettings {
            params: SearchParams {
                topk: self.retrieval.topk,
                alpha: self.retrieval.alpha,
                cand_mult: self.retrieval.cand_mult,
            },
            lexical_epsilon: self.retrieval.lexical_epsilon,
            embed_timeout: parse_duration(&self.embedding.timeout).ok_or_else(|| {
                MaesterError::InvalidConfigValue {
                    path: "embedding.timeout".to_string(),
                    message: format!("Invalid duration: {}", self.embedding.timeout),
                }
            })?,
        })
    }

    pub fn rerank_timeout(&self) -> Result<Duration> {
        parse_duration(&self.reranker.timeout).ok_or_else(|| MaesterError::InvalidConfigValue {
            path: "reranker.timeout".to_string(),
            message: format!("Invalid duration: {}", self.reranker.timeout),
        })
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MaesterError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("maester").join("config.toml"))
    }

    /// Get the default bundle directory
    pub fn default_bundle_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| MaesterError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".maester").join("bundle"))
    }
}

fn parse_value<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| MaesterError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Parse durations such as "500ms", "5s", "2m" or "1h"; bare digits are
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let amount: u64 = digits.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(amount)),
        "" | "s" => Some(Duration::from_secs(amount)),
        "m" => amount.checked_mul(60).map(Duration::from_secs),
        "h" => amount.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

impl Default for Config {
    fn default() -> Self {
        let defaults = SearchParams::default();

        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            artifacts: ArtifactsConfig {
                bundle_dir: PathBuf::from("~/.maester/bundle"),
                corpus_file: "corpus.jsonl".to_string(),
                vectors_file: "vectors.jsonl".to_string(),
                dense_backend: "flat".to_string(),
                lexical_backend: "bm25".to_string(),
            },
            embedding: EmbeddingConfig {
                model: "bge-small-en-v1.5".to_string(),
                batch_size: 32,
                max_concurrent: 4,
                timeout: "30s".to_string(),
            },
            retrieval: RetrievalConfig {
                topk: defaults.topk,
                alpha: defaults.alpha,
                cand_mult: defaults.cand_mult,
                lexical_epsilon: 1e-6,
                hnsw_m: 16,
                hnsw_ef_construction: 200,
                hnsw_ef_search: 64,
            },
            temporal: TemporalConfig {
                boundary_season: 7,
                markers: crate::retrieval::default_phrases(),
            },
            reranker: RerankerConfig {
                enabled: true,
                model: DEFAULT_RERANKER_MODEL.to_string(),
                timeout: "30s".to_string(),
            },
            profiles: HashMap::new(),
        }
    }
}
