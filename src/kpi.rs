use crate::schema::Transaction;
use crate::utils::{season_label, season_short_label};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadlineKpis {
    pub points: f64,
    pub orders: usize,
    /// Distinct documents with points > 0.
    pub scored_documents: usize,
    /// Distinct documents whose first-ever purchase falls in the view.
    pub new_customers: usize,
    /// Points per order, 0 when there are no orders.
    pub average_points_per_order: f64,
}

pub fn headline_kpis<'a, I>(transactions: I) -> HeadlineKpis
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut points = 0.0;
    let mut orders = HashSet::new();
    let mut scored = HashSet::new();
    let mut new_customers = HashSet::new();

    for t in transactions {
        points += t.points;
        if let Some(order) = t.order_key() {
            orders.insert(order);
        }
        if t.scored() {
            scored.insert(t.document_clean.as_str());
        }
        if t.is_first_purchase {
            new_customers.insert(t.document_clean.as_str());
        }
    }

    let average_points_per_order = if orders.is_empty() {
        0.0
    } else {
        points / orders.len() as f64
    };

    HeadlineKpis {
        points,
        orders: orders.len(),
        scored_documents: scored.len(),
        new_customers: new_customers.len(),
        average_points_per_order,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonPerformanceRow {
    pub season: u32,
    pub label: String,
    pub short_label: String,
    pub orders: usize,
    pub points: f64,
    pub scored_documents: usize,
    /// Distinct documents with a cohort activation in the season.
    pub new_registrants: usize,
}

/// One row per selected season that has data, in numeric order.
pub fn season_performance<'a, I>(transactions: I, seasons: &[u32]) -> Vec<SeasonPerformanceRow>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    #[derive(Default)]
    struct Acc<'t> {
        points: f64,
        orders: HashSet<&'t str>,
        scored: HashSet<&'t str>,
        new_registrants: HashSet<&'t str>,
    }

    let mut per_season: BTreeMap<u32, Acc<'a>> = BTreeMap::new();
    for t in transactions {
        if t.season == 0 || !seasons.contains(&t.season) {
            continue;
        }
        let acc = per_season.entry(t.season).or_default();
        acc.points += t.points;
        if let Some(order) = t.order_key() {
            acc.orders.insert(order);
        }
        if t.scored() {
            acc.scored.insert(t.document_clean.as_str());
        }
        if t.is_cohort_activation {
            acc.new_registrants.insert(t.document_clean.as_str());
        }
    }

    per_season
        .into_iter()
        .map(|(season, acc)| SeasonPerformanceRow {
            season,
            label: season_label(season),
            short_label: season_short_label(season),
            orders: acc.orders.len(),
            points: acc.points,
            scored_documents: acc.scored.len(),
            new_registrants: acc.new_registrants.len(),
        })
        .collect()
}
