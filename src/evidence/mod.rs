//! Evidence formatting and question routing
//!
//! Turns ranked result tables into compact, episode-tagged evidence lines and
//! classifies questions so callers can pick a retrieval strategy.

use crate::retrieval::{deduplicate_by_text, ResultTable};
use serde::{Deserialize, Serialize};
use std::fmt;

const ALTERNATE_ENDING_KEYWORDS: &[&str] = &[
    "alternate ending",
    "rewrite",
    "new ending",
    "fix season 8",
    "rewrite season 8",
    "reimagine season 8",
    "alternate finale",
];

const NARRATIVE_KEYWORDS: &[&str] = &["why", "cause", "reason", "because"];

const TEMPORAL_KEYWORDS: &[&str] = &["when", "timeline", "season", "episode", "chronology"];

const FACTUAL_KEYWORDS: &[&str] = &[
    "who", "what", "where", "mother", "father", "killed", "identity",
];

/// Kind of question, checked in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Creative rewrite of the ending; evidence must predate the final season
    AlternateEnding,
    /// Why / cause questions
    Narrative,
    /// When / which season questions
    Temporal,
    /// Who / what / where questions
    Factual,
    General,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::AlternateEnding => "alternate_ending",
            QuestionKind::Narrative => "narrative",
            QuestionKind::Temporal => "temporal",
            QuestionKind::Factual => "factual",
            QuestionKind::General => "general",
        }
    }

    /// Whether evidence for this kind must be restricted to earlier seasons
    pub fn requires_temporal_filter(&self) -> bool {
        matches!(self, QuestionKind::AlternateEnding)
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_question(question: &str) -> QuestionKind {
    let q = question.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| q.contains(w));

    if mentions(ALTERNATE_ENDING_KEYWORDS) {
        QuestionKind::AlternateEnding
    } else if mentions(NARRATIVE_KEYWORDS) {
        QuestionKind::Narrative
    } else if mentions(TEMPORAL_KEYWORDS) {
        QuestionKind::Temporal
    } else if mentions(FACTUAL_KEYWORDS) {
        QuestionKind::Factual
    } else {
        QuestionKind::General
    }
}

/// Runs of capitalized words, e.g. "Who killed Joffrey Baratheon?" gives
/// `["Who", "Joffrey Baratheon"]`.
pub fn extract_entities(question: &str) -> Vec<String> {
    let cleaned = question.replace('?', "");
    let mut entities = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for token in cleaned.split_whitespace() {
        if token.chars().next().is_some_and(char::is_uppercase) {
            current.push(token);
        } else if !current.is_empty() {
            entities.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        entities.push(current.join(" "));
    }

    entities.retain(|e| e.chars().count() > 1);
    entities
}

/// Top `k` rows plus every later row that mentions one of the canonical
/// entities (case-insensitive), without repeating a passage text.
pub fn select_evidence(table: &ResultTable, k: usize, canonical_entities: &[String]) -> ResultTable {
    let needles: Vec<String> = canonical_entities
        .iter()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut rows: Vec<_> = table.iter().take(k).cloned().collect();

    if !needles.is_empty() {
        rows.extend(
            table
                .iter()
                .filter(|c| {
                    let text = c.text().to_lowercase();
                    needles.iter().any(|n| text.contains(n.as_str()))
                })
                .cloned(),
        );
    }

    ResultTable::new(deduplicate_by_text(rows), table.stage())
}

/// One line per row: `[S{season}E{episode}] {speaker}: {text}`
pub fn evidence_lines(table: &ResultTable, max_lines: usize) -> Vec<String> {
    table
        .iter()
        .take(max_lines)
        .map(|c| {
            let text = c
                .text()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            match c.passage.speaker.as_deref().map(str::trim) {
                Some(speaker) if !speaker.is_empty() => {
                    format!("[{}] {}: {}", c.passage.episode_tag(), speaker, text)
                }
                _ => format!("[{}] {}", c.passage.episode_tag(), text),
            }
        })
        .collect()
}
