//! Maester - Hybrid Evidence Retrieval
//!
//! Answers questions about a television narrative by retrieving evidence from a
//! transcript and summary corpus: dense and lexical search blended into one
//! ranking, aggregated over sub-queries, restricted to a season window and
//! reranked by a cross-encoder that degrades to pass-through when unavailable.

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod context;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod retrieval;

pub use context::RetrievalContext;
pub use error::{MaesterError, Result};
