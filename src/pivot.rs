use crate::evolution::{evolution_pct, format_evolution, Trend};
use crate::schema::Transaction;
use crate::utils::{fiscal_months, last_two_seasons, month_label, season_label, season_short_label};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

pub const TOTAL_LABEL: &str = "Total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PivotMeasure {
    /// Sum of points.
    Points,
    /// Distinct order ids.
    UniqueOrders,
    /// Distinct cleaned documents among cohort activations.
    NewRegistrants,
}

impl PivotMeasure {
    fn qualitative(&self) -> bool {
        matches!(self, PivotMeasure::NewRegistrants)
    }

    fn title(&self) -> &'static str {
        match self {
            PivotMeasure::Points => "Evolução Pontos",
            PivotMeasure::UniqueOrders => "Evolução Pedidos",
            PivotMeasure::NewRegistrants => "Evolução Clientes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EvolutionCell {
    /// Relative change, see [`evolution_pct`].
    Quantitative { value: f64, display: String },
    /// Direction only: +1, -1 or 0.
    Qualitative { trend: Trend, value: i8 },
}

impl EvolutionCell {
    fn compute(measure: PivotMeasure, current: f64, previous: f64) -> Self {
        if measure.qualitative() {
            let trend = Trend::from_counts(current, previous);
            EvolutionCell::Qualitative {
                trend,
                value: trend.signum(),
            }
        } else {
            let value = evolution_pct(current, previous);
            EvolutionCell::Quantitative {
                value,
                display: format_evolution(value),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotRow {
    pub label: String,
    /// Calendar month, `None` on the Total row.
    pub month: Option<u32>,
    /// One value per column of [`PivotTable::seasons`].
    pub values: Vec<f64>,
    pub evolution: Option<EvolutionCell>,
}

impl PivotRow {
    pub fn is_total(&self) -> bool {
        self.month.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotTable {
    pub measure: PivotMeasure,
    /// Column seasons, ascending.
    pub seasons: Vec<u32>,
    pub season_labels: Vec<String>,
    /// Header of the evolution column, e.g. "Evolução Pontos (T10 vs T9)".
    pub evolution_label: Option<String>,
    /// Month rows in fiscal order followed by the Total row.
    pub rows: Vec<PivotRow>,
}

impl PivotTable {
    pub fn total(&self) -> Option<&PivotRow> {
        self.rows.iter().find(|r| r.is_total())
    }

    pub fn month(&self, calendar_month: u32) -> Option<&PivotRow> {
        self.rows.iter().find(|r| r.month == Some(calendar_month))
    }

    pub fn value(&self, calendar_month: u32, season: u32) -> Option<f64> {
        let column = self.seasons.iter().position(|s| *s == season)?;
        self.month(calendar_month).map(|r| r.values[column])
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Default)]
struct Cell<'a> {
    points: f64,
    distinct: HashSet<&'a str>,
}

/// Builds the matrix for `measure` over the given seasons and months.
///
/// Season 0 never becomes a column. An empty `months` list means every
/// month. Months without data are kept as zero rows.
pub fn build_pivot<'a, I>(
    transactions: I,
    measure: PivotMeasure,
    seasons: &[u32],
    months: &[u32],
    fiscal_year_end_month: u32,
) -> PivotTable
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let columns: Vec<u32> = seasons
        .iter()
        .copied()
        .filter(|s| *s > 0)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let row_months: Vec<u32> = fiscal_months(fiscal_year_end_month)
        .into_iter()
        .filter(|m| months.is_empty() || months.contains(m))
        .collect();

    let mut cells: HashMap<(u32, u32), Cell<'a>> = HashMap::new();
    for t in transactions {
        if !columns.contains(&t.season) || !row_months.contains(&t.month) {
            continue;
        }
        let cell = cells.entry((t.month, t.season)).or_default();
        match measure {
            PivotMeasure::Points => cell.points += t.points,
            PivotMeasure::UniqueOrders => {
                if let Some(order) = t.order_key() {
                    cell.distinct.insert(order);
                }
            }
            PivotMeasure::NewRegistrants => {
                if t.is_cohort_activation {
                    cell.distinct.insert(t.document_clean.as_str());
                }
            }
        }
    }

    let cell_value = |month: u32, season: u32| -> f64 {
        cells.get(&(month, season)).map_or(0.0, |c| match measure {
            PivotMeasure::Points => c.points,
            _ => c.distinct.len() as f64,
        })
    };

    let mut rows: Vec<PivotRow> = row_months
        .iter()
        .map(|m| PivotRow {
            label: month_label(*m).to_string(),
            month: Some(*m),
            values: columns.iter().map(|s| cell_value(*m, *s)).collect(),
            evolution: None,
        })
        .collect();

    let totals: Vec<f64> = (0..columns.len())
        .map(|i| rows.iter().map(|r| r.values[i]).sum())
        .collect();
    rows.push(PivotRow {
        label: TOTAL_LABEL.to_string(),
        month: None,
        values: totals,
        evolution: None,
    });

    let mut evolution_label = None;
    if let Some((current, previous)) = last_two_seasons(&columns) {
        let cur = columns.iter().position(|s| *s == current);
        let prev = columns.iter().position(|s| *s == previous);
        if let (Some(cur), Some(prev)) = (cur, prev) {
            for row in rows.iter_mut() {
                row.evolution = Some(EvolutionCell::compute(
                    measure,
                    row.values[cur],
                    row.values[prev],
                ));
            }
            evolution_label = Some(format!(
                "{} ({} vs {})",
                measure.title(),
                season_short_label(current),
                season_short_label(previous)
            ));
        }
    }

    debug!(
        "Pivot {:?}: {} months x {} seasons",
        measure,
        row_months.len(),
        columns.len()
    );

    PivotTable {
        measure,
        season_labels: columns.iter().map(|s| season_label(*s)).collect(),
        seasons: columns,
        evolution_label,
        rows,
    }
}
