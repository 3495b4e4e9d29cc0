//! Season-boundary filtering of result tables

use crate::corpus::Passage;
use crate::retrieval::ResultTable;
use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

/// Phrases that only appear in material about the final season
pub const FINAL_SEASON_MARKERS: &[&str] = &[
    "eighth and final season",
    "the iron throne",
    "series finale",
    "final season of the fantasy drama television series",
];

/// Explicit season references: "Season 8", "season8", "S8E03", "s08e"
const SEASON_REFERENCE: &str = r"\bseason\s*(\d+)|\bs(\d+)e";

/// Fixed phrases normalized for matching; blanks dropped.
pub fn marker_phrases(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn default_phrases() -> Vec<String> {
    FINAL_SEASON_MARKERS.iter().map(|p| p.to_string()).collect()
}

#[derive(Debug, Clone)]
struct Markers {
    seasons: Regex,
    phrases: Option<Regex>,
}

impl Markers {
    fn build(phrases: &[String]) -> Result<Self, regex::Error> {
        let seasons = RegexBuilder::new(SEASON_REFERENCE)
            .case_insensitive(true)
            .build()?;

        let phrases = marker_phrases(phrases);
        let phrases = if phrases.is_empty() {
            None
        } else {
            let pattern = phrases
                .iter()
                .map(|p| regex::escape(p))
                .collect::<Vec<_>>()
                .join("|");
            Some(RegexBuilder::new(&pattern).case_insensitive(true).build()?)
        };

        Ok(Self { seasons, phrases })
    }

    /// First season number above `boundary` referenced in `text`
    fn season_after(&self, text: &str, boundary: u32) -> Option<u32> {
        self.seasons.captures_iter(text).find_map(|caps| {
            let digits = caps.get(1).or_else(|| caps.get(2))?.as_str();
            // Too many digits for u32 is still a season past any boundary
            let season = digits.parse::<u32>().unwrap_or(u32::MAX);
            (season > boundary).then_some(season)
        })
    }

    fn matches(&self, text: &str, boundary: u32) -> bool {
        self.season_after(text, boundary).is_some()
            || self.phrases.as_ref().is_some_and(|p| p.is_match(text))
    }
}

/// Drops passages from seasons after a boundary.
///
/// Passages with a known season are kept iff `season <= boundary`. Passages
/// without one are kept unless their text references a later season or
/// mentions a marker phrase.
#[derive(Debug, Clone)]
pub struct TemporalFilter {
    boundary_season: u32,
    markers: Option<Markers>,
}

impl TemporalFilter {
    pub fn new(boundary_season: u32, phrases: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            boundary_season,
            markers: Some(Markers::build(phrases)?),
        })
    }

    /// Known seasons only; unknown-season passages always pass
    pub fn seasons_only(boundary_season: u32) -> Self {
        Self {
            boundary_season,
            markers: None,
        }
    }

    /// Build with the given phrases, degrading to a seasons-only filter if the
    /// marker pattern cannot be compiled.
    pub fn or_seasons_only(boundary_season: u32, phrases: &[String]) -> Self {
        Self::new(boundary_season, phrases).unwrap_or_else(|e| {
            warn!("Marker pattern rejected, filtering on seasons only: {}", e);
            Self::seasons_only(boundary_season)
        })
    }

    pub fn boundary_season(&self) -> u32 {
        self.boundary_season
    }

    pub fn is_forbidden(&self, passage: &Passage) -> bool {
        match passage.season {
            Some(season) => season > self.boundary_season,
            None => self
                .markers
                .as_ref()
                .is_some_and(|m| m.matches(&passage.text, self.boundary_season)),
        }
    }

    /// Kept known-season rows in input order, followed by kept unknown-season
    /// rows in input order. The ranking stage is preserved.
    pub fn apply(&self, table: ResultTable) -> ResultTable {
        if table.is_empty() {
            return table;
        }

        let stage = table.stage();
        let before = table.len();

        let (known, unknown): (Vec<_>, Vec<_>) = table
            .into_rows()
            .into_iter()
            .filter(|c| !self.is_forbidden(&c.passage))
            .partition(|c| c.passage.season.is_some());

        let mut rows = known;
        rows.extend(unknown);

        debug!(
            boundary = self.boundary_season,
            before,
            after = rows.len(),
            "Applied temporal filter"
        );

        ResultTable::new(rows, stage)
    }
}

/// Keep only passages up to and including `boundary_season`, using the
/// default final-season markers.
pub fn filter_before(table: ResultTable, boundary_season: u32) -> ResultTable {
    TemporalFilter::or_seasons_only(boundary_season, &default_phrases()).apply(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{RankStage, ScoredCandidate};

    fn row(id: usize, season: Option<u32>, text: &str) -> ScoredCandidate {
        let mut passage = Passage::new(id, text);
        passage.season = season;
        ScoredCandidate {
            passage,
            vector_score: None,
            lexical_score: None,
            blended_score: Some(1.0 - id as f32 * 0.1),
            rerank_score: None,
        }
    }

    fn ids(table: &ResultTable) -> Vec<usize> {
        table.iter().map(|c| c.passage.id).collect()
    }

    #[test]
    fn test_marker_phrases_normalized() {
        let phrases = marker_phrases(&["  The Iron Throne ".to_string(), " ".to_string()]);
        assert_eq!(phrases, vec!["the iron throne"]);
    }

    #[test]
    fn test_known_seasons_split_on_boundary() {
        let table = ResultTable::new(
            vec![
                row(0, Some(8), "Dany burns King's Landing"),
                row(1, Some(7), "Jon meets Dany"),
                row(2, Some(1), "Ned loses his head"),
            ],
            RankStage::Blended,
        );

        let filtered = filter_before(table, 7);
        assert_eq!(ids(&filtered), vec![1, 2]);
    }

    #[test]
    fn test_unknown_season_marker_match_is_case_insensitive() {
        let table = ResultTable::new(
            vec![
                row(0, None, "Reviews of SEASON 8 were harsh"),
                row(1, None, "Episode S8E06 aired in May"),
                row(2, None, "Bran is chosen in The Iron Throne"),
                row(3, None, "Arya trains in Braavos"),
            ],
            RankStage::Blended,
        );

        let filtered = filter_before(table, 7);
        assert_eq!(ids(&filtered), vec![3]);
    }

    #[test]
    fn test_known_rows_precede_unknown_rows() {
        let table = ResultTable::new(
            vec![
                row(0, None, "A Lannister always pays his debts"),
                row(1, Some(3), "The Rains of Castamere"),
            ],
            RankStage::Reranked,
        );

        let filtered = filter_before(table, 7);
        assert_eq!(ids(&filtered), vec![1, 0]);
        assert_eq!(filtered.stage(), RankStage::Reranked);
    }

    #[test]
    fn test_lower_boundary_moves_markers() {
        let filter = TemporalFilter::new(4, &[]).unwrap();
        assert!(filter.is_forbidden(&Passage::new(0, "Season 5 opens in Meereen")));
        assert!(filter.is_forbidden(&Passage::new(0, "Season 8 opens at Winterfell")));
        assert!(!filter.is_forbidden(&Passage::new(0, "Season 4 ends at the Eyrie")));
        assert!(!filter.is_forbidden(&Passage::new(0, "The series finale")));
        assert!(filter.is_forbidden(&Passage::new(0, "x").with_season(6)));
    }

    #[test]
    fn test_every_later_season_is_forbidden() {
        let table = ResultTable::new(
            vec![
                row(0, None, "Season 8 recap: the Long Night"),
                row(1, None, "S8E03 battle of Winterfell"),
                row(2, None, "season7 premiere at Dragonstone"),
                row(3, None, "Recap of S06E09 and season 2"),
                row(4, Some(8), "Dany burns King's Landing"),
                row(5, Some(6), "Hardhome"),
            ],
            RankStage::Blended,
        );

        let filtered = filter_before(table, 6);
        assert_eq!(ids(&filtered), vec![5, 3]);
    }

    #[test]
    fn test_season_words_need_a_number() {
        let filter = TemporalFilter::new(6, &[]).unwrap();
        assert!(!filter.is_forbidden(&Passage::new(0, "Seasons change in the north")));
        assert!(!filter.is_forbidden(&Passage::new(0, "Jon's 10th sword lesson")));
        assert!(filter.is_forbidden(&Passage::new(0, "SEASON 12 never aired")));
    }

    #[test]
    fn test_seasons_only_keeps_unknown() {
        let filter = TemporalFilter::seasons_only(7);
        assert!(!filter.is_forbidden(&Passage::new(0, "series finale")));
        assert!(filter.is_forbidden(&Passage::new(0, "x").with_season(8)));
    }

    #[test]
    fn test_empty_table_is_noop() {
        let filtered = filter_before(ResultTable::empty(), 7);
        assert!(filtered.is_empty());
    }
}
