use crate::error::{AnalyticsError, Result};
use crate::schema::{Scope, Transaction};
use crate::utils::season_label;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionRow {
    pub season: u32,
    pub season_label: String,
    pub active: usize,
    pub inactive: usize,
    pub total: usize,
    pub active_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub rows: Vec<RetentionRow>,
    /// Every entity that scored in the scope in any season.
    pub historical_entities: BTreeSet<String>,
}

impl RetentionReport {
    pub fn row(&self, season: u32) -> Option<&RetentionRow> {
        self.rows.iter().find(|r| r.season == season)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Running state of the cohort walk. Seasons must be fed in strictly
/// ascending order.
#[derive(Debug, Default)]
pub struct RetentionTracker {
    ever_seen: BTreeSet<String>,
    last_season: Option<u32>,
}

impl RetentionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, season: u32, active: &BTreeSet<String>) -> Result<RetentionRow> {
        if let Some(last) = self.last_season {
            if season <= last {
                return Err(AnalyticsError::SeasonsOutOfOrder { season, last });
            }
        }

        let inactive = self.ever_seen.difference(active).count();
        let total = active.len() + inactive;
        let active_pct = if total > 0 {
            active.len() as f64 / total as f64
        } else {
            0.0
        };

        self.ever_seen.extend(active.iter().cloned());
        self.last_season = Some(season);

        Ok(RetentionRow {
            season,
            season_label: season_label(season),
            active: active.len(),
            inactive,
            total,
            active_pct,
        })
    }

    pub fn ever_seen(&self) -> &BTreeSet<String> {
        &self.ever_seen
    }

    pub fn into_ever_seen(self) -> BTreeSet<String> {
        self.ever_seen
    }
}

/// Entities with points > 0, per valid season, for the scope.
fn active_sets(transactions: &[Transaction], scope: &Scope) -> BTreeMap<u32, BTreeSet<String>> {
    let mut points: BTreeMap<u32, HashMap<&str, f64>> = BTreeMap::new();
    for t in transactions
        .iter()
        .filter(|t| t.season > 0 && scope.contains(&t.store, &t.segment))
    {
        *points
            .entry(t.season)
            .or_default()
            .entry(t.consolidated_key.as_str())
            .or_insert(0.0) += t.points;
    }

    points
        .into_iter()
        .map(|(season, totals)| {
            let active = totals
                .into_iter()
                .filter(|(_, p)| *p > 0.0)
                .map(|(k, _)| k.to_string())
                .collect();
            (season, active)
        })
        .collect()
}

/// Season-by-season retention for a scope. An empty scope yields an empty
/// report.
pub fn compute_retention(transactions: &[Transaction], scope: &Scope) -> Result<RetentionReport> {
    if scope.is_empty() {
        return Ok(RetentionReport::default());
    }

    let mut tracker = RetentionTracker::new();
    let mut rows = Vec::new();
    for (season, active) in active_sets(transactions, scope) {
        rows.push(tracker.observe(season, &active)?);
    }

    debug!(
        "Retention computed over {} seasons, {} historical entities",
        rows.len(),
        tracker.ever_seen().len()
    );

    Ok(RetentionReport {
        rows,
        historical_entities: tracker.into_ever_seen(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActivityStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionDetailRow {
    pub consolidated_key: String,
    pub documents: Vec<String>,
    pub status: ActivityStatus,
    /// Unique orders in the season; always 0 for inactive entities.
    pub orders_in_season: usize,
    pub last_purchase: Option<NaiveDate>,
}

/// Lists who is active and who is inactive in `season` for the scope, with
/// the same membership rules as [`compute_retention`].
pub fn retention_detail(
    transactions: &[Transaction],
    scope: &Scope,
    season: u32,
    status: Option<ActivityStatus>,
) -> Vec<RetentionDetailRow> {
    if scope.is_empty() || season == 0 {
        return Vec::new();
    }

    let sets = active_sets(transactions, scope);
    let active = sets.get(&season).cloned().unwrap_or_default();
    let seen_before: BTreeSet<String> = sets
        .range(..season)
        .flat_map(|(_, keys)| keys.iter().cloned())
        .collect();

    let mut orders: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut last_purchase: HashMap<&str, NaiveDate> = HashMap::new();
    let mut documents: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    for t in transactions
        .iter()
        .filter(|t| t.season > 0 && t.season <= season && scope.contains(&t.store, &t.segment))
    {
        let key = t.consolidated_key.as_str();
        if t.season == season {
            if let Some(order) = t.order_key() {
                orders.entry(key).or_default().insert(order);
            }
        }
        last_purchase
            .entry(key)
            .and_modify(|d| *d = (*d).max(t.sale_date))
            .or_insert(t.sale_date);
        if !t.document.is_empty() {
            documents.entry(key).or_default().insert(t.document.as_str());
        }
    }

    let build = |key: &String, status: ActivityStatus| RetentionDetailRow {
        consolidated_key: key.clone(),
        documents: documents
            .get(key.as_str())
            .map(|d| d.iter().map(|s| s.to_string()).collect())
            .unwrap_or_default(),
        status,
        orders_in_season: match status {
            ActivityStatus::Active => orders.get(key.as_str()).map_or(0, |o| o.len()),
            ActivityStatus::Inactive => 0,
        },
        last_purchase: last_purchase.get(key.as_str()).copied(),
    };

    let mut rows: Vec<RetentionDetailRow> = active
        .iter()
        .map(|k| build(k, ActivityStatus::Active))
        .chain(
            seen_before
                .difference(&active)
                .map(|k| build(k, ActivityStatus::Inactive)),
        )
        .filter(|r| status.map_or(true, |s| r.status == s))
        .collect();

    rows.sort_by(|a, b| {
        a.status
            .cmp(&b.status)
            .then(b.orders_in_season.cmp(&a.orders_in_season))
            .then(a.consolidated_key.cmp(&b.consolidated_key))
    });
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn tx(key: &str, season: u32, points: f64) -> Transaction {
        Transaction {
            sale_date: NaiveDate::from_ymd_opt(2015 + season as i32, 8, 1).unwrap(),
            points,
            order_id: format!("{}-{}", key, season),
            document: format!("doc-{}", key),
            document_clean: String::new(),
            specifier: key.to_string(),
            store: "Loja A".to_string(),
            segment: "Arquitetura".to_string(),
            season,
            month: 8,
            consolidated_key: key.to_string(),
            is_first_purchase: false,
            is_cohort_activation: false,
        }
    }

    fn scope() -> Scope {
        Scope::new(vec!["Loja A".into()], vec!["Arquitetura".into()])
    }

    #[test]
    fn test_entity_goes_dormant_and_returns() {
        let data = vec![
            tx("X", 1, 100.0),
            tx("Y", 1, 50.0),
            tx("Y", 2, 50.0),
            tx("X", 3, 10.0),
        ];
        let report = compute_retention(&data, &scope()).unwrap();

        let s1 = report.row(1).unwrap();
        assert_eq!((s1.active, s1.inactive, s1.total), (2, 0, 2));
        assert_eq!(s1.active_pct, 1.0);

        let s2 = report.row(2).unwrap();
        assert_eq!((s2.active, s2.inactive), (1, 1));
        assert!(s2.inactive >= 1);

        let s3 = report.row(3).unwrap();
        assert_eq!((s3.active, s3.inactive), (1, 1));
        assert_eq!(report.historical_entities.len(), 2);
    }

    #[test]
    fn test_zero_point_sales_do_not_activate() {
        let data = vec![tx("X", 1, 100.0), tx("X", 2, 0.0)];
        let report = compute_retention(&data, &scope()).unwrap();
        let s2 = report.row(2).unwrap();
        assert_eq!((s2.active, s2.inactive, s2.total), (0, 1, 1));
        assert_eq!(s2.active_pct, 0.0);
    }

    #[test]
    fn test_empty_scope_yields_empty_report() {
        let data = vec![tx("X", 1, 100.0)];
        let report = compute_retention(&data, &Scope::default()).unwrap();
        assert!(report.rows.is_empty());
        assert!(report.historical_entities.is_empty());
    }

    #[test]
    fn test_out_of_order_seasons_rejected() {
        let mut tracker = RetentionTracker::new();
        let set: BTreeSet<String> = ["X".to_string()].into_iter().collect();
        tracker.observe(2, &set).unwrap();
        assert!(matches!(
            tracker.observe(1, &set),
            Err(AnalyticsError::SeasonsOutOfOrder { season: 1, last: 2 })
        ));
        assert!(tracker.observe(2, &set).is_err());
    }

    #[test]
    fn test_detail_matches_summary_counts() {
        let data = vec![
            tx("X", 1, 100.0),
            tx("Y", 1, 50.0),
            tx("Y", 2, 50.0),
            tx("Z", 2, 5.0),
        ];
        let report = compute_retention(&data, &scope()).unwrap();
        let detail = retention_detail(&data, &scope(), 2, None);
        let row = report.row(2).unwrap();

        let active = detail.iter().filter(|r| r.status == ActivityStatus::Active).count();
        let inactive = detail.iter().filter(|r| r.status == ActivityStatus::Inactive).count();
        assert_eq!((active, inactive), (row.active, row.inactive));

        let x = detail.iter().find(|r| r.consolidated_key == "X").unwrap();
        assert_eq!(x.status, ActivityStatus::Inactive);
        assert_eq!(x.orders_in_season, 0);
        assert_eq!(x.last_purchase, NaiveDate::from_ymd_opt(2016, 8, 1));

        let only_inactive = retention_detail(&data, &scope(), 2, Some(ActivityStatus::Inactive));
        assert_eq!(only_inactive.len(), 1);
    }
}
