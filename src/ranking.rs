use crate::error::{AnalyticsError, Result};
use crate::schema::{Scope, SeasonComparison, Transaction};
use crate::utils::season_label;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Display name plus cleaned document.
pub type RankKey = (String, String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRank {
    pub points: f64,
    pub rank: u32,
}

/// Competition ranking of the entities with points > 0, best first.
pub fn rank_season(totals: &BTreeMap<RankKey, f64>) -> BTreeMap<RankKey, SeasonRank> {
    let mut scored: Vec<(&RankKey, f64)> = totals
        .iter()
        .filter(|(_, p)| **p > 0.0)
        .map(|(k, p)| (k, *p))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    let mut ranks = BTreeMap::new();
    let mut current_rank = 0u32;
    let mut last_points: Option<f64> = None;
    for (position, (key, points)) in scored.into_iter().enumerate() {
        if last_points != Some(points) {
            current_rank = position as u32 + 1;
            last_points = Some(points);
        }
        ranks.insert(
            key.clone(),
            SeasonRank {
                points,
                rank: current_rank,
            },
        );
    }
    ranks
}

fn max_rank(ranks: &BTreeMap<RankKey, SeasonRank>) -> u32 {
    ranks.values().map(|r| r.rank).max().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankMovementRow {
    pub specifier: String,
    pub document_clean: String,
    /// First raw document seen for the cleaned document.
    pub document: String,
    pub previous_points: f64,
    pub current_points: f64,
    pub previous_rank: u32,
    pub current_rank: u32,
    /// Previous rank minus current rank; positive means the entity climbed.
    pub movement: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingReport {
    pub current_season: u32,
    pub previous_season: u32,
    pub current_label: String,
    pub previous_label: String,
    pub max_rank_current: u32,
    pub max_rank_previous: u32,
    pub rows: Vec<RankMovementRow>,
}

impl RankingReport {
    fn empty(comparison: SeasonComparison) -> Self {
        Self {
            current_season: comparison.current,
            previous_season: comparison.previous,
            current_label: season_label(comparison.current),
            previous_label: season_label(comparison.previous),
            max_rank_current: 0,
            max_rank_previous: 0,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, specifier: &str) -> Option<&RankMovementRow> {
        self.rows.iter().find(|r| r.specifier == specifier)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Ranks the scope in both seasons and reconciles the positions. An entity
/// that scored in only one season gets, for the other, one position below
/// that season's worst real rank.
///
/// An empty scope, or a comparison without a valid prior season, returns an
/// empty report with zero max ranks.
pub fn adjusted_ranking(
    transactions: &[Transaction],
    scope: &Scope,
    comparison: SeasonComparison,
) -> Result<RankingReport> {
    if comparison.current == comparison.previous && comparison.has_prior() {
        return Err(AnalyticsError::InvalidComparison {
            current: comparison.current,
            previous: comparison.previous,
        });
    }
    if scope.is_empty() || !comparison.has_prior() {
        return Ok(RankingReport::empty(comparison));
    }

    let mut current_totals: BTreeMap<RankKey, f64> = BTreeMap::new();
    let mut previous_totals: BTreeMap<RankKey, f64> = BTreeMap::new();
    for t in transactions
        .iter()
        .filter(|t| scope.contains(&t.store, &t.segment))
    {
        let totals = if t.season == comparison.current {
            &mut current_totals
        } else if t.season == comparison.previous {
            &mut previous_totals
        } else {
            continue;
        };
        *totals
            .entry((t.specifier.clone(), t.document_clean.clone()))
            .or_insert(0.0) += t.points;
    }

    let current = rank_season(&current_totals);
    let previous = rank_season(&previous_totals);
    let max_rank_current = max_rank(&current);
    let max_rank_previous = max_rank(&previous);

    let mut raw_documents: HashMap<&str, &str> = HashMap::new();
    for t in transactions {
        raw_documents
            .entry(t.document_clean.as_str())
            .or_insert(t.document.as_str());
    }

    let keys: BTreeSet<&RankKey> = current.keys().chain(previous.keys()).collect();
    let mut rows: Vec<RankMovementRow> = keys
        .into_iter()
        .map(|key| {
            let cur = current.get(key);
            let prev = previous.get(key);
            let current_rank = cur.map_or(max_rank_current + 1, |r| r.rank);
            let previous_rank = prev.map_or(max_rank_previous + 1, |r| r.rank);
            RankMovementRow {
                specifier: key.0.clone(),
                document_clean: key.1.clone(),
                document: raw_documents
                    .get(key.1.as_str())
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                previous_points: prev.map_or(0.0, |r| r.points),
                current_points: cur.map_or(0.0, |r| r.points),
                previous_rank,
                current_rank,
                movement: previous_rank as i64 - current_rank as i64,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.current_rank
            .cmp(&b.current_rank)
            .then(a.previous_rank.cmp(&b.previous_rank))
            .then(a.specifier.cmp(&b.specifier))
    });

    debug!(
        "Adjusted ranking {} vs {}: {} entities, max ranks {} / {}",
        comparison.current,
        comparison.previous,
        rows.len(),
        max_rank_current,
        max_rank_previous
    );

    Ok(RankingReport {
        current_season: comparison.current,
        previous_season: comparison.previous,
        current_label: season_label(comparison.current),
        previous_label: season_label(comparison.previous),
        max_rank_current,
        max_rank_previous,
        rows,
    })
}
