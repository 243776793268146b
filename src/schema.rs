use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
pub enum Category {
    #[schemars(description = "5,000,000 points or more in the period")]
    Diamante,

    #[schemars(description = "From 2,000,000 up to 4,999,999 points")]
    Esmeralda,

    #[schemars(description = "From 500,000 up to 1,999,999 points")]
    Ruby,

    #[serde(rename = "Topázio")]
    #[schemars(description = "From 150,000 up to 499,999 points")]
    Topazio,

    #[schemars(description = "At least one point, below 150,000")]
    Pro,

    #[serde(rename = "Sem Categoria")]
    #[schemars(description = "No points in the period")]
    SemCategoria,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum TieringStrategy {
    #[default]
    #[schemars(
        description = "Stores are walked in descending previous-season points and each tier closes once it holds a third of the cumulative point volume."
    )]
    CumulativePoints,

    #[schemars(
        description = "Stores are split into three groups of (almost) equal size, the first groups taking the remainder."
    )]
    EqualHeadcount,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct AnalyticsConfig {
    #[schemars(
        description = "The calendar month that closes the fiscal year (1 = January, 12 = December). The program runs July to June, so the default is 6."
    )]
    pub fiscal_year_end_month: u32,

    #[serde(default)]
    #[schemars(description = "How stores are split into thirds in the store analysis")]
    pub tiering: TieringStrategy,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            fiscal_year_end_month: 6,
            tiering: TieringStrategy::CumulativePoints,
        }
    }
}

/// Store and segment selection. An empty list selects nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Scope {
    #[schemars(description = "Stores (Loja) included in the scope")]
    pub stores: Vec<String>,

    #[schemars(description = "Segments (Segmento) included in the scope")]
    pub segments: Vec<String>,
}

impl Scope {
    pub fn new(stores: Vec<String>, segments: Vec<String>) -> Self {
        Self { stores, segments }
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty() || self.segments.is_empty()
    }

    pub fn contains(&self, store: &str, segment: &str) -> bool {
        self.stores.iter().any(|s| s == store) && self.segments.iter().any(|s| s == segment)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReportFilters {
    #[serde(default)]
    #[schemars(
        description = "Season numbers to include. Empty means every valid season (season 0 is never reported)."
    )]
    pub seasons: Vec<u32>,

    #[serde(default)]
    #[schemars(description = "Calendar months (1-12) to include. Empty means every month.")]
    pub months: Vec<u32>,

    #[schemars(description = "Store/segment selection applied to every scoped view")]
    pub scope: Scope,
}

impl ReportFilters {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportFilters)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct SeasonComparison {
    #[schemars(description = "Season number treated as T (current)")]
    pub current: u32,

    #[schemars(description = "Season number treated as T-1 (previous); 0 means no prior season")]
    pub previous: u32,
}

impl SeasonComparison {
    pub fn new(current: u32, previous: u32) -> Self {
        Self { current, previous }
    }

    /// `current` against the season immediately before it.
    pub fn against_prior(current: u32) -> Self {
        Self {
            current,
            previous: current.saturating_sub(1),
        }
    }

    /// The two most recent seasons of a selection, if there are two.
    pub fn from_selection(seasons: &[u32]) -> Option<Self> {
        crate::utils::last_two_seasons(seasons).map(|(current, previous)| Self { current, previous })
    }

    pub fn has_prior(&self) -> bool {
        self.previous > 0
    }
}

/// One sale row as exported from the report spreadsheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawSaleRow {
    #[serde(rename = "Data da Venda")]
    pub sale_date: String,

    #[serde(rename = "Pontos", default)]
    pub points: String,

    #[serde(rename = "NF/Pedido", default)]
    pub order_id: String,

    #[serde(rename = "CPF/CNPJ", default)]
    pub document: String,

    #[serde(rename = "Especificador/Empresa", default)]
    pub specifier: String,

    #[serde(rename = "Loja", default)]
    pub store: String,

    #[serde(rename = "Segmento", default)]
    pub segment: String,

    #[serde(rename = "Numero Temporada", default)]
    pub season: String,
}

/// One row of the "Novos Cadastrados" sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawRegistrantRow {
    #[serde(rename = "CPF")]
    pub document: String,

    #[serde(rename = "Temporada", default)]
    pub season: Option<String>,

    #[serde(rename = "Data Cadastro", default)]
    pub registration_date: Option<String>,

    #[serde(rename = "Nome", default)]
    pub name: Option<String>,

    #[serde(rename = "Email", default)]
    pub email: Option<String>,

    #[serde(rename = "Telefone", default)]
    pub phone: Option<String>,
}

/// One row of the identity mapping sheet. A sheet without the canonical-name
/// column deserializes with `canonical_name: None` on every row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MappingRow {
    #[serde(rename = "CPF/CNPJ")]
    pub document: String,

    #[serde(rename = "Nome Fantasia", default)]
    pub canonical_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub sale_date: NaiveDate,
    pub points: f64,
    pub order_id: String,
    /// Document as typed in the report (may carry punctuation).
    pub document: String,
    /// Digits-only document.
    pub document_clean: String,
    pub specifier: String,
    pub store: String,
    pub segment: String,
    pub season: u32,
    /// Calendar month of the sale date (1-12).
    pub month: u32,
    pub consolidated_key: String,
    pub is_first_purchase: bool,
    pub is_cohort_activation: bool,
}

impl Transaction {
    pub fn season_label(&self) -> String {
        crate::utils::season_label(self.season)
    }

    pub fn month_label(&self) -> &'static str {
        crate::utils::month_label(self.month)
    }

    pub fn scored(&self) -> bool {
        self.points > 0.0
    }

    /// Order id for distinct-order counts; `None` when the cell was blank.
    pub fn order_key(&self) -> Option<&str> {
        let id = self.order_id.trim();
        (!id.is_empty()).then_some(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Registrant {
    pub document: String,
    pub document_clean: String,
    pub season: Option<u32>,
    pub registration_date: Option<NaiveDate>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = ReportFilters::schema_as_json().unwrap();
        assert!(schema_json.contains("seasons"));
        assert!(schema_json.contains("months"));
        assert!(schema_json.contains("stores"));
        assert!(schema_json.contains("segments"));
    }

    #[test]
    fn test_category_serialization_uses_display_names() {
        let json = serde_json::to_string(&Category::Topazio).unwrap();
        assert_eq!(json, "\"Topázio\"");
        let back: Category = serde_json::from_str("\"Sem Categoria\"").unwrap();
        assert_eq!(back, Category::SemCategoria);
    }

    #[test]
    fn test_config_defaults_to_july_fiscal_year() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.fiscal_year_end_month, 6);
        assert_eq!(config.tiering, TieringStrategy::CumulativePoints);

        let parsed: AnalyticsConfig =
            serde_json::from_str(r#"{"fiscal_year_end_month": 12}"#).unwrap();
        assert_eq!(parsed.tiering, TieringStrategy::CumulativePoints);
    }

    #[test]
    fn test_scope_membership() {
        let scope = Scope::new(vec!["Loja A".into()], vec!["Arquitetura".into()]);
        assert!(scope.contains("Loja A", "Arquitetura"));
        assert!(!scope.contains("Loja B", "Arquitetura"));
        assert!(!scope.is_empty());
        assert!(Scope::new(vec!["Loja A".into()], vec![]).is_empty());
    }

    #[test]
    fn test_comparison_helpers() {
        assert_eq!(SeasonComparison::against_prior(1), SeasonComparison::new(1, 0));
        assert!(!SeasonComparison::against_prior(1).has_prior());
        assert_eq!(
            SeasonComparison::from_selection(&[9, 7, 8]),
            Some(SeasonComparison::new(9, 8))
        );
        assert_eq!(SeasonComparison::from_selection(&[9]), None);
    }

    #[test]
    fn test_raw_sale_row_from_json() {
        let row: RawSaleRow = serde_json::from_str(
            r#"{"Data da Venda": "2024-07-15", "Pontos": "1.500", "Loja": "Loja A"}"#,
        )
        .unwrap();
        assert_eq!(row.store, "Loja A");
        assert!(row.document.is_empty());
    }
}
