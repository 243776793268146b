use crate::error::{AnalyticsError, Result};
use crate::evolution::{evolution_pct, Trend};
use crate::schema::{SeasonComparison, TieringStrategy, Transaction};
use crate::utils::season_short_label;
use log::debug;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StoreTier {
    First,
    Second,
    Third,
}

impl StoreTier {
    pub const ALL: [StoreTier; 3] = [StoreTier::First, StoreTier::Second, StoreTier::Third];

    fn from_index(index: u32) -> Self {
        match index {
            1 => StoreTier::First,
            2 => StoreTier::Second,
            _ => StoreTier::Third,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StoreTier::First => "1° Terço",
            StoreTier::Second => "2° Terço",
            StoreTier::Third => "3° Terço",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreStatus {
    Grew,
    Declined,
    Stable,
    ZeroInBoth,
    GrewFromZero,
    ZeroedOut,
}

impl StoreStatus {
    pub fn classify(current: f64, previous: f64) -> Self {
        match (previous > 0.0, current > 0.0) {
            (false, false) => StoreStatus::ZeroInBoth,
            (false, true) => StoreStatus::GrewFromZero,
            (true, false) => StoreStatus::ZeroedOut,
            (true, true) => match current.partial_cmp(&previous) {
                Some(Ordering::Greater) => StoreStatus::Grew,
                Some(Ordering::Less) => StoreStatus::Declined,
                _ => StoreStatus::Stable,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorePoints {
    pub store: String,
    pub previous_points: f64,
    pub current_points: f64,
}

/// Points per store for both seasons of the comparison. Every listed store is
/// returned, with zeros when it did not score, in the order given. Rows without
/// a valid season never count.
pub fn store_points<'a, I>(
    transactions: I,
    comparison: SeasonComparison,
    stores: &[String],
) -> Vec<StorePoints>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut totals: HashMap<&str, (f64, f64)> = HashMap::new();
    for t in transactions.into_iter().filter(|t| t.season > 0) {
        let entry = totals.entry(t.store.as_str()).or_insert((0.0, 0.0));
        if t.season == comparison.previous {
            entry.0 += t.points;
        } else if t.season == comparison.current {
            entry.1 += t.points;
        }
    }

    let mut seen = HashSet::new();
    stores
        .iter()
        .filter(|s| seen.insert(s.as_str()))
        .map(|store| {
            let (previous_points, current_points) =
                totals.get(store.as_str()).copied().unwrap_or((0.0, 0.0));
            StorePoints {
                store: store.clone(),
                previous_points,
                current_points,
            }
        })
        .collect()
}

fn to_decimal(store: &StorePoints) -> Result<Decimal> {
    let value = store.previous_points;
    let invalid = || AnalyticsError::InvalidPoints {
        context: format!("store '{}'", store.store),
        value,
    };
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Decimal::from_f64(value).ok_or_else(invalid)
}

/// Orders stores by previous-season points, then current-season points, both
/// descending. Ties keep their input order.
pub fn sort_for_tiering(stores: &mut [StorePoints]) {
    stores.sort_by(|a, b| {
        b.previous_points
            .partial_cmp(&a.previous_points)
            .unwrap_or(Ordering::Equal)
            .then(
                b.current_points
                    .partial_cmp(&a.current_points)
                    .unwrap_or(Ordering::Equal),
            )
    });
}

/// Tier of each store in `sorted` (already ordered by [`sort_for_tiering`]).
///
/// With cumulative points, a store joins the tier being filled and the tier
/// closes once the running previous-season total reaches its share of the
/// volume. Boundaries compare `3 * cumulative >= k * total` in decimal
/// arithmetic. When nobody scored in the previous season every store lands in
/// the third tier.
pub fn assign_tiers(sorted: &[StorePoints], strategy: TieringStrategy) -> Result<Vec<StoreTier>> {
    match strategy {
        TieringStrategy::EqualHeadcount => Ok(equal_headcount_tiers(sorted.len())),
        TieringStrategy::CumulativePoints => cumulative_tiers(sorted),
    }
}

fn cumulative_tiers(sorted: &[StorePoints]) -> Result<Vec<StoreTier>> {
    let points = sorted.iter().map(to_decimal).collect::<Result<Vec<_>>>()?;
    let total: Decimal = points.iter().sum();

    if total.is_zero() {
        return Ok(vec![StoreTier::Third; sorted.len()]);
    }

    let three = Decimal::from(3u32);
    let mut tier = 1u32;
    let mut cumulative = Decimal::ZERO;
    let mut tiers = Vec::with_capacity(points.len());
    for p in points {
        tiers.push(StoreTier::from_index(tier));
        cumulative += p;
        while tier < 3 && cumulative * three >= total * Decimal::from(tier) {
            tier += 1;
        }
    }
    Ok(tiers)
}

fn equal_headcount_tiers(count: usize) -> Vec<StoreTier> {
    let size = count / 3;
    let remainder = count % 3;
    let first_cut = size + usize::from(remainder > 0);
    let second_cut = first_cut + size + usize::from(remainder > 1);

    (0..count)
        .map(|i| {
            if i < first_cut {
                StoreTier::First
            } else if i < second_cut {
                StoreTier::Second
            } else {
                StoreTier::Third
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEvolutionRow {
    pub store: String,
    pub previous_points: f64,
    pub current_points: f64,
    pub evolution: f64,
    pub status: StoreStatus,
    pub tier: StoreTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSummaryRow {
    pub tier: StoreTier,
    pub stores: usize,
    /// Stores of the tier with points > 0 in the previous season.
    pub previous_scoring_stores: usize,
    /// Stores of the tier with points > 0 in the current season.
    pub current_scoring_stores: usize,
    pub previous_points: f64,
    pub current_points: f64,
    pub evolution: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PyramidBucket {
    Grew,
    Declined,
    StartedScoring,
    StoppedScoring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyramidRow {
    pub bucket: PyramidBucket,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreAnalysis {
    pub comparison: SeasonComparison,
    pub strategy: TieringStrategy,
    /// Stores in tiering order.
    pub stores: Vec<StoreEvolutionRow>,
    pub tiers: Vec<TierSummaryRow>,
    /// Only buckets with at least one store.
    pub pyramid: Vec<PyramidRow>,
}

impl StoreAnalysis {
    fn empty(comparison: SeasonComparison, strategy: TieringStrategy) -> Self {
        Self {
            comparison,
            strategy,
            stores: Vec::new(),
            tiers: Vec::new(),
            pyramid: Vec::new(),
        }
    }

    /// False when the comparison had no prior season or no stores to split.
    pub fn is_available(&self) -> bool {
        !self.stores.is_empty()
    }

    pub fn tier(&self, tier: StoreTier) -> Option<&TierSummaryRow> {
        self.tiers.iter().find(|t| t.tier == tier)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Evolution, tiers and status pyramid for the selected stores. An empty store
/// list, or a comparison without a prior season, produces an empty analysis.
pub fn analyze_stores<'a, I>(
    transactions: I,
    comparison: SeasonComparison,
    stores: &[String],
    strategy: TieringStrategy,
) -> Result<StoreAnalysis>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    if stores.is_empty() {
        return Ok(StoreAnalysis::empty(comparison, strategy));
    }
    if !comparison.has_prior() {
        debug!(
            "Store analysis for season {} skipped: no prior season",
            comparison.current
        );
        return Ok(StoreAnalysis::empty(comparison, strategy));
    }

    let mut points = store_points(transactions, comparison, stores);
    sort_for_tiering(&mut points);
    let tiers = assign_tiers(&points, strategy)?;

    let rows: Vec<StoreEvolutionRow> = points
        .into_iter()
        .zip(tiers)
        .map(|(p, tier)| StoreEvolutionRow {
            evolution: evolution_pct(p.current_points, p.previous_points),
            status: StoreStatus::classify(p.current_points, p.previous_points),
            store: p.store,
            previous_points: p.previous_points,
            current_points: p.current_points,
            tier,
        })
        .collect();

    let summaries = StoreTier::ALL
        .iter()
        .map(|tier| {
            let members = rows.iter().filter(|r| r.tier == *tier);
            let mut summary = TierSummaryRow {
                tier: *tier,
                stores: 0,
                previous_scoring_stores: 0,
                current_scoring_stores: 0,
                previous_points: 0.0,
                current_points: 0.0,
                evolution: 0.0,
            };
            for r in members {
                summary.stores += 1;
                summary.previous_scoring_stores += usize::from(r.previous_points > 0.0);
                summary.current_scoring_stores += usize::from(r.current_points > 0.0);
                summary.previous_points += r.previous_points;
                summary.current_points += r.current_points;
            }
            summary.evolution = evolution_pct(summary.current_points, summary.previous_points);
            summary
        })
        .collect();

    let pyramid = status_pyramid(&rows, comparison);

    debug!(
        "Store analysis {} vs {}: {} stores ({:?})",
        comparison.current,
        comparison.previous,
        rows.len(),
        strategy
    );

    Ok(StoreAnalysis {
        comparison,
        strategy,
        stores: rows,
        tiers: summaries,
        pyramid,
    })
}

fn status_pyramid(rows: &[StoreEvolutionRow], comparison: SeasonComparison) -> Vec<PyramidRow> {
    let previous = season_short_label(comparison.previous);
    let current = season_short_label(comparison.current);

    let buckets = [
        (
            PyramidBucket::Grew,
            "Cresceram (Evolução Positiva)".to_string(),
            count_where(rows, |r| Trend::from_evolution(r.evolution) == Trend::Grew),
        ),
        (
            PyramidBucket::Declined,
            "Decresceram (Evolução Negativa)".to_string(),
            count_where(rows, |r| Trend::from_evolution(r.evolution) == Trend::Declined),
        ),
        (
            PyramidBucket::StartedScoring,
            format!("Zeraram na {} e Pontuaram na {}", previous, current),
            count_where(rows, |r| r.status == StoreStatus::GrewFromZero),
        ),
        (
            PyramidBucket::StoppedScoring,
            format!("Zeraram na {}", current),
            count_where(rows, |r| r.status == StoreStatus::ZeroedOut),
        ),
    ];

    buckets
        .into_iter()
        .filter(|(_, _, n)| *n > 0)
        .map(|(bucket, label, count)| PyramidRow {
            bucket,
            label,
            count,
        })
        .collect()
}

fn count_where(rows: &[StoreEvolutionRow], pred: impl Fn(&StoreEvolutionRow) -> bool) -> usize {
    rows.iter().filter(|r| pred(*r)).count()
}
