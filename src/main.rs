use maester::artifacts::{self, bundle_paths};
use maester::cli::{Cli, Commands, ConfigAction};
use maester::config::{Config, ConfigValidator};
use maester::corpus::CorpusStore;
use maester::embedding::{BatchProcessor, FastEmbedProvider};
use maester::error::{MaesterError, Result};
use maester::evidence::{classify_question, evidence_lines, extract_entities};
use maester::retrieval::EvidenceOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    match cli.command {
        Commands::Query {
            question,
            sub_queries,
            topk,
            alpha,
            cand_mult,
            before,
            no_rerank,
            window,
            entities,
            json,
            bundle,
        } => {
            let mut config = load_config(cli.config, cli.profile)?;
            if let Some(alpha) = alpha {
                config.retrieval.alpha = alpha;
            }
            if let Some(cand_mult) = cand_mult {
                config.retrieval.cand_mult = cand_mult;
            }
            if let Some(topk) = topk {
                config.retrieval.topk = topk;
            }
            ConfigValidator::validate(&config)?;

            let options = EvidenceOptions {
                topk: config.retrieval.topk,
                before_season: before,
                rerank: !no_rerank,
            };
            let display = EvidenceDisplay {
                window,
                entities,
                json,
            };
            cmd_query(&config, bundle, &question, &sub_queries, &options, &display)?;
        }
        Commands::BuildVectors { bundle } => {
            let config = load_config(cli.config, cli.profile)?;
            cmd_build_vectors(&config, bundle)?;
        }
        Commands::Route { question } => {
            cmd_route(&question);
        }
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "maester=debug" } else { "maester=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| MaesterError::Io {
            source: e,
            context: "Failed to create tokio runtime".to_string(),
        })
}

/// How `query` prints its report
struct EvidenceDisplay {
    window: Option<usize>,
    entities: Vec<String>,
    json: bool,
}

fn cmd_query(
    config: &Config,
    bundle: Option<PathBuf>,
    question: &str,
    sub_queries: &[String],
    options: &EvidenceOptions,
    display: &EvidenceDisplay,
) -> Result<()> {
    let bundle_dir = resolve_bundle_dir(config, bundle)?;
    let context = artifacts::load_context(config, &bundle_dir)?;
    let pipeline = context.pipeline(
        config.search_settings()?,
        config.temporal.markers.clone(),
        config.temporal.boundary_season,
    );

    let report = runtime()?.block_on(pipeline.retrieve(question, sub_queries, options))?;

    if display.json {
        let output = serde_json::to_string_pretty(&report).map_err(|e| MaesterError::Json {
            source: e,
            context: "Failed to serialize evidence report".to_string(),
        })?;
        println!("{}", output);
        return Ok(());
    }

    println!("{}", report.summary());
    if report.is_empty() {
        return Ok(());
    }

    let entities = if display.entities.is_empty() {
        extract_entities(question)
    } else {
        display.entities.clone()
    };
    let window = report.evidence_window(display.window.unwrap_or(report.table.len()), &entities);

    println!();
    let lines = evidence_lines(&window, window.len());
    for (line, score) in lines.iter().zip(window.stage_scores()) {
        match score {
            Some(score) => println!("  {:>7.3}  {}", score, line),
            None => println!("  {:>7}  {}", "-", line),
        }
    }

    Ok(())
}

fn cmd_build_vectors(config: &Config, bundle: Option<PathBuf>) -> Result<()> {
    let bundle_dir = resolve_bundle_dir(config, bundle)?;
    let (corpus_path, vectors_path) = bundle_paths(config, &bundle_dir);

    let corpus = CorpusStore::from_jsonl(&corpus_path)?;
    let provider = Arc::new(FastEmbedProvider::new(&config.embedding.model)?);
    let processor = BatchProcessor::new(
        provider,
        config.embedding.batch_size,
        config.embedding.max_concurrent,
    );

    let result = runtime()?.block_on(processor.process(corpus.texts()))?;
    artifacts::write_vectors(&vectors_path, &result.vectors)?;

    println!(
        "✓ Embedded {} passages in {}ms",
        result.processed, result.duration_ms
    );
    println!("  Vectors written to: {}", vectors_path.display());

    Ok(())
}

fn cmd_route(question: &str) {
    let kind = classify_question(question);
    println!("Route: {}", kind);
    if kind.requires_temporal_filter() {
        println!("  Evidence restricted to seasons before the final season");
    }

    let entities = extract_entities(question);
    if !entities.is_empty() {
        println!("  Entities: {}", entities.join(", "));
    }
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| MaesterError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{}", json);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            let mut config = Config::default();
            config.artifacts.bundle_dir = Config::default_bundle_dir()?;
            config.save(&path)?;

            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'maester config init' to create one."
        );
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load_or_default(&path),
    }
}

fn resolve_bundle_dir(config: &Config, bundle: Option<PathBuf>) -> Result<PathBuf> {
    let dir = bundle.unwrap_or_else(|| config.artifacts.bundle_dir.clone());
    expand_path(&dir)
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    let path_str = path
        .to_str()
        .ok_or_else(|| MaesterError::Config("Invalid path encoding".to_string()))?;

    if let Some(stripped) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| MaesterError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(stripped))
    } else {
        Ok(path.to_path_buf())
    }
}
