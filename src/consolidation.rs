use crate::category::ALL_CATEGORIES;
use crate::error::Result;
use crate::evolution::evolution_pct;
use crate::schema::{Category, ReportFilters, SeasonComparison, Transaction};
use crate::utils::separate_documents;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRow {
    pub consolidated_key: String,
    pub points: f64,
    pub orders: usize,
    /// Distinct display names in order of first appearance.
    pub linked_names: Vec<String>,
    pub linked_cpfs: Vec<String>,
    pub linked_cnpjs: Vec<String>,
    pub category: Category,
    pub previous_points: f64,
    pub evolution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummaryRow {
    pub category: Category,
    pub entities: usize,
    pub points: f64,
    /// Points of the entities that held this category in the previous season.
    pub previous_points: f64,
    pub evolution: f64,
}

/// Closing row of the category summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotalRow {
    /// Entities with a category; `SemCategoria` is left out.
    pub entities: usize,
    /// Points of the entities with a category.
    pub points: f64,
    /// Points of every entity in the view, categorized or not.
    pub all_points: f64,
    /// Previous-season points of every entity under the same filters.
    pub previous_points: f64,
    /// `all_points` against `previous_points`.
    pub evolution: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTable {
    /// Comparison used for the evolution columns; `None` when the table is empty.
    pub comparison: Option<SeasonComparison>,
    /// Sorted by points, highest first.
    pub rows: Vec<ConsolidatedRow>,
    pub category_summary: Vec<CategorySummaryRow>,
    pub category_total: CategoryTotalRow,
}

impl PerformanceTable {
    pub fn row(&self, consolidated_key: &str) -> Option<&ConsolidatedRow> {
        self.rows.iter().find(|r| r.consolidated_key == consolidated_key)
    }

    pub fn summary(&self, category: Category) -> Option<&CategorySummaryRow> {
        self.category_summary.iter().find(|r| r.category == category)
    }

    /// Case-insensitive match on key, category, names and documents. A blank
    /// term returns every row.
    pub fn search(&self, term: &str) -> Vec<&ConsolidatedRow> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.rows.iter().collect();
        }
        let hit = |value: &str| value.to_lowercase().contains(&needle);

        self.rows
            .iter()
            .filter(|r| {
                hit(&r.consolidated_key)
                    || hit(r.category.label())
                    || r.linked_names.iter().any(|n| hit(n))
                    || r.linked_cpfs.iter().any(|d| hit(d))
                    || r.linked_cnpjs.iter().any(|d| hit(d))
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn in_scope_and_months(t: &Transaction, filters: &ReportFilters) -> bool {
    filters.scope.contains(&t.store, &t.segment)
        && (filters.months.is_empty() || filters.months.contains(&t.month))
}

#[derive(Default)]
struct EntityAcc<'a> {
    points: f64,
    orders: BTreeSet<&'a str>,
    names: Vec<&'a str>,
    documents: Vec<&'a str>,
}

/// Builds the consolidated table for the filtered scope.
///
/// `season` narrows the view to a single season; `None` keeps every season
/// of the filters. The most recent season in the view is compared with the
/// season before it, under the same store, segment and month filters.
pub fn consolidated_performance(
    transactions: &[Transaction],
    filters: &ReportFilters,
    season: Option<u32>,
) -> PerformanceTable {
    if filters.scope.is_empty() {
        return PerformanceTable::default();
    }

    let in_view = |t: &Transaction| {
        let season_ok = match season {
            Some(s) => t.season == s,
            None if filters.seasons.is_empty() => t.season > 0,
            None => filters.seasons.contains(&t.season),
        };
        season_ok && in_scope_and_months(t, filters)
    };

    let mut entities: BTreeMap<&str, EntityAcc> = BTreeMap::new();
    let mut latest_season = 0u32;
    for t in transactions.iter().filter(|t| in_view(*t)) {
        latest_season = latest_season.max(t.season);
        let acc = entities.entry(t.consolidated_key.as_str()).or_default();
        acc.points += t.points;
        if let Some(order) = t.order_key() {
            acc.orders.insert(order);
        }
        if !acc.names.contains(&t.specifier.as_str()) {
            acc.names.push(t.specifier.as_str());
        }
        if !acc.documents.contains(&t.document.as_str()) {
            acc.documents.push(t.document.as_str());
        }
    }

    if entities.is_empty() {
        return PerformanceTable::default();
    }

    let comparison = SeasonComparison::against_prior(latest_season);
    let mut previous_totals: HashMap<&str, f64> = HashMap::new();
    if comparison.has_prior() {
        for t in transactions
            .iter()
            .filter(|t| t.season == comparison.previous && in_scope_and_months(t, filters))
        {
            *previous_totals.entry(t.consolidated_key.as_str()).or_insert(0.0) += t.points;
        }
    }

    let mut rows: Vec<ConsolidatedRow> = entities
        .into_iter()
        .map(|(key, acc)| {
            let (linked_cpfs, linked_cnpjs) = separate_documents(acc.documents.iter().copied());
            let previous_points = previous_totals.get(key).copied().unwrap_or(0.0);
            ConsolidatedRow {
                consolidated_key: key.to_string(),
                points: acc.points,
                orders: acc.orders.len(),
                linked_names: acc.names.iter().map(|n| n.to_string()).collect(),
                linked_cpfs,
                linked_cnpjs,
                category: Category::classify(acc.points),
                previous_points,
                evolution: evolution_pct(acc.points, previous_points),
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.points
            .partial_cmp(&a.points)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.consolidated_key.cmp(&b.consolidated_key))
    });

    let category_summary = summarize_categories(&rows, &previous_totals);
    let category_total = total_category_row(&rows, &category_summary, &previous_totals);

    debug!(
        "Consolidated performance for season {}: {} entities",
        comparison.current,
        rows.len()
    );

    PerformanceTable {
        comparison: Some(comparison),
        rows,
        category_summary,
        category_total,
    }
}

fn summarize_categories(
    rows: &[ConsolidatedRow],
    previous_totals: &HashMap<&str, f64>,
) -> Vec<CategorySummaryRow> {
    let mut previous_by_category: HashMap<Category, f64> = HashMap::new();
    for points in previous_totals.values() {
        *previous_by_category
            .entry(Category::classify(*points))
            .or_insert(0.0) += points;
    }

    ALL_CATEGORIES
        .iter()
        .map(|category| {
            let (entities, points) = rows
                .iter()
                .filter(|r| r.category == *category)
                .fold((0usize, 0.0), |(n, p), r| (n + 1, p + r.points));
            let previous_points = previous_by_category.get(category).copied().unwrap_or(0.0);
            CategorySummaryRow {
                category: *category,
                entities,
                points,
                previous_points,
                evolution: evolution_pct(points, previous_points),
            }
        })
        .collect()
}

fn total_category_row(
    rows: &[ConsolidatedRow],
    summary: &[CategorySummaryRow],
    previous_totals: &HashMap<&str, f64>,
) -> CategoryTotalRow {
    let (entities, points) = summary
        .iter()
        .filter(|r| r.category != Category::SemCategoria)
        .fold((0usize, 0.0), |(n, p), r| (n + r.entities, p + r.points));
    let all_points: f64 = rows.iter().map(|r| r.points).sum();
    let previous_points: f64 = previous_totals.values().sum();

    CategoryTotalRow {
        entities,
        points,
        all_points,
        previous_points,
        evolution: evolution_pct(all_points, previous_points),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRegistrantRow {
    pub name: String,
    pub document_clean: String,
    /// Earliest sale date of the document across the whole dataset.
    pub first_purchase: Option<NaiveDate>,
    pub season: u32,
    pub points: f64,
}

/// Cohort activations in `view`, one row per (name, document).
pub fn new_registrant_detail<'a, I>(view: I, all: &[Transaction]) -> Vec<NewRegistrantRow>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut first_purchase: HashMap<&str, NaiveDate> = HashMap::new();
    for t in all {
        first_purchase
            .entry(t.document_clean.as_str())
            .and_modify(|d| *d = (*d).min(t.sale_date))
            .or_insert(t.sale_date);
    }

    let mut grouped: BTreeMap<(&'a str, &'a str), (u32, f64)> = BTreeMap::new();
    for t in view.into_iter().filter(|t| t.is_cohort_activation) {
        let entry = grouped
            .entry((t.specifier.as_str(), t.document_clean.as_str()))
            .or_insert((t.season, 0.0));
        entry.0 = entry.0.min(t.season);
        entry.1 += t.points;
    }

    grouped
        .into_iter()
        .map(|((name, document), (season, points))| NewRegistrantRow {
            name: name.to_string(),
            document_clean: document.to_string(),
            first_purchase: first_purchase.get(document).copied(),
            season,
            points,
        })
        .collect()
}
