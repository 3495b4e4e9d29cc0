//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "maester",
    version,
    author = "neur0map",
    about = "Hybrid evidence retrieval over a television transcript corpus",
    long_about = "Maester blends dense and lexical search over a prebuilt passage bundle, \
                  aggregates sub-queries, restricts evidence to a season window and reranks \
                  it with a cross-encoder."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/maester/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile to apply on top of the config (e.g., "lexical", "fast")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Retrieve evidence for a question
    Query {
        /// Question text
        question: String,

        /// Retrieval sub-query; repeat for several (defaults to the question)
        #[arg(short, long = "sub-query", value_name = "QUERY")]
        sub_queries: Vec<String>,

        /// Passages per sub-query
        #[arg(short = 'k', long)]
        topk: Option<usize>,

        /// Weight on the vector score (0.0 = lexical only, 1.0 = vector only)
        #[arg(short, long)]
        alpha: Option<f32>,

        /// Candidates per index as a multiple of topk
        #[arg(long)]
        cand_mult: Option<usize>,

        /// Only keep evidence from this season and earlier
        #[arg(short, long, value_name = "SEASON")]
        before: Option<u32>,

        /// Skip cross-encoder reranking
        #[arg(long)]
        no_rerank: bool,

        /// Evidence lines to print before entity matches (defaults to all)
        #[arg(short, long, value_name = "N")]
        window: Option<usize>,

        /// Entity whose passages are always printed; repeat for several
        /// (defaults to the names in the question)
        #[arg(short, long = "entity", value_name = "NAME")]
        entities: Vec<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,

        /// Bundle directory (overrides artifacts.bundle_dir)
        #[arg(long, value_name = "DIR")]
        bundle: Option<PathBuf>,
    },

    /// Embed every corpus passage and write the vectors file
    BuildVectors {
        /// Bundle directory (overrides artifacts.bundle_dir)
        #[arg(long, value_name = "DIR")]
        bundle: Option<PathBuf>,
    },

    /// Show how a question would be routed
    Route {
        /// Question text
        question: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
