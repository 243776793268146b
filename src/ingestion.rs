use crate::error::Result;
use crate::identity::IdentityResolver;
use crate::schema::{
    AnalyticsConfig, MappingRow, RawRegistrantRow, RawSaleRow, Registrant, ReportFilters,
    Transaction,
};
use crate::utils::{
    clean_points, digits_only, parse_sale_date, parse_season, validate_fiscal_year_end_month,
};
use chrono::{Datelike, NaiveDate};
use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap};

/// Prepared, read-only snapshot of one report file.
#[derive(Debug, Clone)]
pub struct SalesDataset {
    transactions: Vec<Transaction>,
    registrants: Vec<Registrant>,
    dropped_rows: usize,
    identity_warning: Option<String>,
}

impl SalesDataset {
    /// Cleans the raw sheets and derives every per-row attribute the views
    /// need: cleaned document, consolidated key, calendar month, first
    /// purchase and cohort activation flags.
    ///
    /// Rows whose sale date cannot be parsed are dropped.
    pub fn prepare(
        sales: &[RawSaleRow],
        registrants: &[RawRegistrantRow],
        mapping: Option<&[MappingRow]>,
        config: &AnalyticsConfig,
    ) -> Result<Self> {
        validate_fiscal_year_end_month(config.fiscal_year_end_month)?;

        let resolver = IdentityResolver::from_mapping(mapping);
        let registrants: Vec<Registrant> = registrants.iter().map(convert_registrant).collect();

        let mut dropped_rows = 0usize;
        let mut transactions = Vec::with_capacity(sales.len());
        for row in sales {
            match parse_sale_date(&row.sale_date) {
                Ok(sale_date) => transactions.push(convert_sale(row, sale_date, &resolver)),
                Err(e) => {
                    dropped_rows += 1;
                    debug!("Dropping sale row: {}", e);
                }
            }
        }

        if dropped_rows > 0 {
            warn!(
                "{} sale rows dropped because their sale date could not be parsed",
                dropped_rows
            );
        }

        flag_first_purchases(&mut transactions);
        flag_cohort_activations(&mut transactions, &registrants);

        info!(
            "Prepared {} transactions and {} registrants ({} mapped documents)",
            transactions.len(),
            registrants.len(),
            resolver.mapped_documents()
        );

        Ok(Self {
            transactions,
            registrants,
            dropped_rows,
            identity_warning: resolver.warning().map(str::to_string),
        })
    }

    /// Wraps transactions that were already prepared elsewhere.
    pub fn from_transactions(transactions: Vec<Transaction>, registrants: Vec<Registrant>) -> Self {
        Self {
            transactions,
            registrants,
            dropped_rows: 0,
            identity_warning: None,
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn registrants(&self) -> &[Registrant] {
        &self.registrants
    }

    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Warning raised when the identity mapping could not be used.
    pub fn identity_warning(&self) -> Option<&str> {
        self.identity_warning.as_deref()
    }

    /// Valid seasons present in the data, ascending. Season 0 is excluded.
    pub fn seasons(&self) -> Vec<u32> {
        self.transactions
            .iter()
            .map(|t| t.season)
            .filter(|s| *s > 0)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn segments(&self) -> Vec<String> {
        unique_sorted(self.transactions.iter().map(|t| t.segment.as_str()))
    }

    pub fn stores(&self) -> Vec<String> {
        unique_sorted(self.transactions.iter().map(|t| t.store.as_str()))
    }

    /// Stores that sold in any of the given segments.
    pub fn stores_in_segments(&self, segments: &[String]) -> Vec<String> {
        unique_sorted(
            self.transactions
                .iter()
                .filter(|t| segments.contains(&t.segment))
                .map(|t| t.store.as_str()),
        )
    }

    /// Filters by season and month only (the program-wide view).
    pub fn period_view(&self, filters: &ReportFilters) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|t| in_period(t, filters))
            .collect()
    }

    /// Filters by season, month and segment.
    pub fn segment_view(&self, filters: &ReportFilters) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|t| in_period(t, filters) && filters.scope.segments.contains(&t.segment))
            .collect()
    }

    /// Filters by season, month, segment and store.
    pub fn filtered_view(&self, filters: &ReportFilters) -> Vec<&Transaction> {
        self.transactions
            .iter()
            .filter(|t| in_period(t, filters) && filters.scope.contains(&t.store, &t.segment))
            .collect()
    }
}

fn in_period(t: &Transaction, filters: &ReportFilters) -> bool {
    let season_ok = if filters.seasons.is_empty() {
        t.season > 0
    } else {
        filters.seasons.contains(&t.season)
    };
    let month_ok = filters.months.is_empty() || filters.months.contains(&t.month);
    season_ok && month_ok
}

fn unique_sorted<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn convert_sale(row: &RawSaleRow, sale_date: NaiveDate, resolver: &IdentityResolver) -> Transaction {
    let document_clean = digits_only(&row.document);
    let specifier = row.specifier.trim().to_string();
    let consolidated_key = resolver.resolve(&document_clean, &specifier);

    Transaction {
        sale_date,
        points: clean_points(&row.points),
        order_id: row.order_id.trim().to_string(),
        document: row.document.trim().to_string(),
        document_clean,
        specifier,
        store: row.store.trim().to_string(),
        segment: row.segment.trim().to_string(),
        season: parse_season(&row.season),
        month: sale_date.month(),
        consolidated_key,
        is_first_purchase: false,
        is_cohort_activation: false,
    }
}

fn convert_registrant(row: &RawRegistrantRow) -> Registrant {
    Registrant {
        document: row.document.trim().to_string(),
        document_clean: digits_only(&row.document),
        season: row
            .season
            .as_deref()
            .map(parse_season)
            .filter(|s| *s > 0),
        registration_date: row
            .registration_date
            .as_deref()
            .and_then(|d| parse_sale_date(d).ok()),
        name: non_blank(row.name.as_deref()),
        email: non_blank(row.email.as_deref()),
        phone: non_blank(row.phone.as_deref()),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Marks every transaction made on the earliest sale date of its document.
fn flag_first_purchases(transactions: &mut [Transaction]) {
    let mut first_dates: HashMap<String, NaiveDate> = HashMap::new();
    for t in transactions.iter() {
        first_dates
            .entry(t.document_clean.clone())
            .and_modify(|d| *d = (*d).min(t.sale_date))
            .or_insert(t.sale_date);
    }

    for t in transactions.iter_mut() {
        t.is_first_purchase = first_dates.get(&t.document_clean) == Some(&t.sale_date);
    }
}

/// A sale activates a registrant when it scores in the registration season.
fn flag_cohort_activations(transactions: &mut [Transaction], registrants: &[Registrant]) {
    let mut registration_season: HashMap<&str, u32> = HashMap::new();
    for r in registrants {
        if let Some(season) = r.season {
            if !r.document_clean.is_empty() {
                registration_season
                    .entry(r.document_clean.as_str())
                    .or_insert(season);
            }
        }
    }

    for t in transactions.iter_mut() {
        t.is_cohort_activation = t.points > 0.0
            && registration_season.get(t.document_clean.as_str()) == Some(&t.season);
    }
}
