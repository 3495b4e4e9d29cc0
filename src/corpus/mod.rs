//! Corpus store
//!
//! The immutable, ordered collection of passages (transcript and summary chunks)
//! that every index refers to by row position.

use crate::error::{MaesterError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// One retrievable unit of source text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Row position in the corpus store; written as `row` so a source `id`
    /// survives in `extra`
    #[serde(rename(serialize = "row"), skip_deserializing)]
    pub id: usize,

    /// Season number, `None` when missing or unparseable
    #[serde(default, deserialize_with = "lenient_number")]
    pub season: Option<u32>,

    /// Episode number, `None` when missing or unparseable
    #[serde(default, deserialize_with = "lenient_number")]
    pub episode: Option<u32>,

    /// Speaking character, if the passage is dialogue
    #[serde(default)]
    pub speaker: Option<String>,

    /// Passage text (never empty inside a corpus store)
    pub text: String,

    /// Any other metadata carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Passage {
    pub fn new(id: usize, text: impl Into<String>) -> Self {
        Self {
            id,
            season: None,
            episode: None,
            speaker: None,
            text: text.into(),
            extra: Map::new(),
        }
    }

    pub fn with_season(mut self, season: u32) -> Self {
        self.season = Some(season);
        self
    }

    pub fn with_episode(mut self, episode: u32) -> Self {
        self.episode = Some(episode);
        self
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// `S{season}E{episode}` tag, or `S?E?` when either part is unknown
    pub fn episode_tag(&self) -> String {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => format!("S{}E{}", s, e),
            _ => "S?E?".to_string(),
        }
    }
}

/// Coerce a loosely typed JSON value into a non-negative integer.
///
/// Integers, integral floats and numeric strings are accepted; anything else
/// (null, "unknown", NaN-like strings, fractions) yields `None`.
pub fn coerce_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .or_else(|| n.as_f64().and_then(integral_f64)),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(integral_f64),
        _ => None,
    }
}

fn integral_f64(f: f64) -> Option<u32> {
    if f.is_finite() && f.fract() == 0.0 && f >= 0.0 && f <= u32::MAX as f64 {
        Some(f as u32)
    } else {
        None
    }
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_u32))
}

/// Read-only, ordered passage collection
#[derive(Debug, Clone, Default)]
pub struct CorpusStore {
    passages: Vec<Passage>,
}

impl CorpusStore {
    /// Build a store from passages, renumbering ids to row positions
    pub fn new(passages: Vec<Passage>) -> Self {
        let passages = passages
            .into_iter()
            .enumerate()
            .map(|(row, mut p)| {
                p.id = row;
                p.extra.remove("row");
                p
            })
            .collect();
        Self { passages }
    }

    /// Load a JSON-lines corpus file, one passage object per line.
    ///
    /// Blank lines are skipped. A line that is not a passage object or whose
    /// text is empty makes the whole bundle malformed.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| MaesterError::Io {
            source: e,
            context: format!("Failed to open corpus file: {:?}", path),
        })?;

        let mut passages = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| MaesterError::Io {
                source: e,
                context: format!("Failed to read corpus file: {:?}", path),
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let passage: Passage = serde_json::from_str(&line).map_err(|e| MaesterError::Json {
                source: e,
                context: format!("Invalid passage on line {} of {:?}", line_no + 1, path),
            })?;

            if passage.text.trim().is_empty() {
                return Err(MaesterError::artifact(
                    path,
                    format!("Passage on line {} has empty text", line_no + 1),
                ));
            }

            passages.push(passage);
        }

        tracing::info!("Loaded {} passages from {:?}", passages.len(), path);

        Ok(Self::new(passages))
    }

    pub fn get(&self, row: usize) -> Option<&Passage> {
        self.passages.get(row)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Passage> {
        self.passages.iter()
    }

    /// Passage texts in row order
    pub fn texts(&self) -> Vec<String> {
        self.passages.iter().map(|p| p.text.clone()).collect()
    }
}
