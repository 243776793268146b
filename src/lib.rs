//! # Gabriel Pro Analytics
//!
//! Analytics core for a loyalty-points program: sales transactions earn points
//! for professionals (specifiers) through partner stores, grouped into
//! numbered seasons.
//!
//! ## Core Concepts
//!
//! - **Consolidated entity**: one professional after merging every CPF/CNPJ and
//!   display name mapped to the same canonical name
//! - **Season**: a numbered promotional period; the fiscal calendar starts in July
//! - **Category**: Diamante, Esmeralda, Ruby, Topázio or Pro by accumulated points
//! - **Retention**: who is still scoring in a season out of everyone who ever scored
//! - **Adjusted ranking**: season-over-season rank movement with gap filling
//! - **Store thirds**: stores split into tiers by cumulative point volume
//!
//! ## Example
//!
//! ```rust,ignore
//! use gabriel_pro_analytics::*;
//!
//! let config = AnalyticsConfig::default();
//! let dataset = SalesDataset::prepare(&sales, &registrants, Some(&mapping), &config)?;
//! let dashboard = Dashboard::new(&dataset, config)?;
//!
//! let filters = ReportFilters {
//!     seasons: vec![9, 10],
//!     months: vec![],
//!     scope: Scope::new(dataset.stores(), dataset.segments()),
//! };
//! let pivot = dashboard.points_pivot(&filters);
//! let ranking = dashboard.ranking(&filters.scope, SeasonComparison::new(10, 9))?;
//! ```

pub mod category;
pub mod consolidation;
pub mod error;
pub mod evolution;
pub mod identity;
pub mod ingestion;
pub mod kpi;
pub mod pivot;
pub mod ranking;
pub mod retention;
pub mod schema;
pub mod tiering;
pub mod utils;

pub use category::{
    classify_entities, compare_categories, count_by_category, totals_by_entity,
    CategorizedEntity, CategoryComparisonRow, EntityTotal, ALL_CATEGORIES, CATEGORY_THRESHOLDS,
};
pub use consolidation::{
    consolidated_performance, new_registrant_detail, CategorySummaryRow, CategoryTotalRow,
    ConsolidatedRow, NewRegistrantRow, PerformanceTable,
};
pub use error::{AnalyticsError, Result};
pub use evolution::{evolution_pct, format_evolution, Trend, STABLE_TOLERANCE};
pub use identity::{IdentityResolver, ResolutionMode};
pub use ingestion::SalesDataset;
pub use kpi::{headline_kpis, season_performance, HeadlineKpis, SeasonPerformanceRow};
pub use pivot::{build_pivot, EvolutionCell, PivotMeasure, PivotRow, PivotTable};
pub use ranking::{adjusted_ranking, rank_season, RankMovementRow, RankingReport, SeasonRank};
pub use retention::{
    compute_retention, retention_detail, ActivityStatus, RetentionDetailRow, RetentionReport,
    RetentionRow, RetentionTracker,
};
pub use schema::*;
pub use tiering::{
    analyze_stores, assign_tiers, sort_for_tiering, store_points, PyramidBucket, PyramidRow,
    StoreAnalysis, StoreEvolutionRow, StorePoints, StoreStatus, StoreTier, TierSummaryRow,
};
pub use utils::*;

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Headline indicators at the three zoom levels shown side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiPanel {
    /// Seasons, months, segments and stores applied.
    pub filtered: HeadlineKpis,
    /// Seasons, months and segments applied.
    pub segment: HeadlineKpis,
    /// Seasons and months only.
    pub program: HeadlineKpis,
}

/// Read-only view layer over a prepared dataset. Every method recomputes its
/// result from the dataset and the request it receives.
pub struct Dashboard<'d> {
    dataset: &'d SalesDataset,
    config: AnalyticsConfig,
}

impl<'d> Dashboard<'d> {
    pub fn new(dataset: &'d SalesDataset, config: AnalyticsConfig) -> Result<Self> {
        validate_fiscal_year_end_month(config.fiscal_year_end_month)?;

        info!(
            "Dashboard ready: {} transactions over seasons {:?}",
            dataset.transactions().len(),
            dataset.seasons()
        );

        Ok(Self { dataset, config })
    }

    pub fn dataset(&self) -> &SalesDataset {
        self.dataset
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Selected seasons, or every valid season when the selection is empty.
    pub fn selected_seasons(&self, filters: &ReportFilters) -> Vec<u32> {
        if filters.seasons.is_empty() {
            self.dataset.seasons()
        } else {
            let mut seasons: Vec<u32> = filters.seasons.iter().copied().filter(|s| *s > 0).collect();
            seasons.sort_unstable();
            seasons.dedup();
            seasons
        }
    }

    /// The two most recent selected seasons, if two are selected.
    pub fn default_comparison(&self, filters: &ReportFilters) -> Option<SeasonComparison> {
        SeasonComparison::from_selection(&self.selected_seasons(filters))
    }

    pub fn kpis(&self, filters: &ReportFilters) -> KpiPanel {
        KpiPanel {
            filtered: headline_kpis(self.dataset.filtered_view(filters)),
            segment: headline_kpis(self.dataset.segment_view(filters)),
            program: headline_kpis(self.dataset.period_view(filters)),
        }
    }

    pub fn season_performance(&self, filters: &ReportFilters) -> Vec<SeasonPerformanceRow> {
        season_performance(
            self.dataset.filtered_view(filters),
            &self.selected_seasons(filters),
        )
    }

    pub fn points_pivot(&self, filters: &ReportFilters) -> PivotTable {
        self.pivot(filters, PivotMeasure::Points)
    }

    pub fn orders_pivot(&self, filters: &ReportFilters) -> PivotTable {
        self.pivot(filters, PivotMeasure::UniqueOrders)
    }

    pub fn new_registrants_pivot(&self, filters: &ReportFilters) -> PivotTable {
        self.pivot(filters, PivotMeasure::NewRegistrants)
    }

    fn pivot(&self, filters: &ReportFilters, measure: PivotMeasure) -> PivotTable {
        build_pivot(
            self.dataset.filtered_view(filters),
            measure,
            &self.selected_seasons(filters),
            &filters.months,
            self.config.fiscal_year_end_month,
        )
    }

    /// Category counts of the selected segments against the whole program.
    pub fn category_comparison(&self, filters: &ReportFilters) -> Vec<CategoryComparisonRow> {
        if filters.scope.segments.is_empty() {
            return Vec::new();
        }
        compare_categories(
            self.dataset.segment_view(filters),
            self.dataset.period_view(filters),
        )
    }

    pub fn performance(&self, filters: &ReportFilters, season: Option<u32>) -> PerformanceTable {
        consolidated_performance(self.dataset.transactions(), filters, season)
    }

    pub fn new_registrants(&self, filters: &ReportFilters) -> Vec<NewRegistrantRow> {
        new_registrant_detail(
            self.dataset.filtered_view(filters),
            self.dataset.transactions(),
        )
    }

    pub fn retention(&self, scope: &Scope) -> Result<RetentionReport> {
        compute_retention(self.dataset.transactions(), scope)
    }

    pub fn retention_detail(
        &self,
        scope: &Scope,
        season: u32,
        status: Option<ActivityStatus>,
    ) -> Vec<RetentionDetailRow> {
        retention_detail(self.dataset.transactions(), scope, season, status)
    }

    pub fn ranking(&self, scope: &Scope, comparison: SeasonComparison) -> Result<RankingReport> {
        adjusted_ranking(self.dataset.transactions(), scope, comparison)
    }

    /// Store evolution and thirds for the selected stores. Only the segment
    /// and month filters narrow the sales; seasons come from `comparison`.
    /// Without a prior season the analysis comes back empty (see
    /// [`StoreAnalysis::is_available`]).
    pub fn store_analysis(
        &self,
        filters: &ReportFilters,
        comparison: SeasonComparison,
    ) -> Result<StoreAnalysis> {
        if comparison.current == comparison.previous {
            return Err(AnalyticsError::InvalidComparison {
                current: comparison.current,
                previous: comparison.previous,
            });
        }

        let stores: Vec<String> = if filters.scope.segments.is_empty() {
            Vec::new()
        } else {
            filters.scope.stores.clone()
        };

        let sales = self.dataset.transactions().iter().filter(|t| {
            filters.scope.segments.contains(&t.segment)
                && (filters.months.is_empty() || filters.months.contains(&t.month))
        });

        debug!(
            "Store analysis requested for {} stores ({} vs {})",
            stores.len(),
            comparison.current,
            comparison.previous
        );

        analyze_stores(sales, comparison, &stores, self.config.tiering)
    }
}
