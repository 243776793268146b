use chrono::NaiveDate;
use gabriel_pro_analytics::*;
use serde::de::DeserializeOwned;

fn fixture<T: DeserializeOwned>(name: &str) -> anyhow::Result<Vec<T>> {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

fn load_dataset(with_mapping: bool) -> anyhow::Result<SalesDataset> {
    let sales: Vec<RawSaleRow> = fixture("vendas.csv")?;
    let registrants: Vec<RawRegistrantRow> = fixture("novos_cadastrados.csv")?;
    let mapping: Vec<MappingRow> = fixture("mapeamento.csv")?;
    let mapping = if with_mapping { Some(mapping.as_slice()) } else { None };
    Ok(SalesDataset::prepare(
        &sales,
        &registrants,
        mapping,
        &AnalyticsConfig::default(),
    )?)
}

fn everything(dataset: &SalesDataset, seasons: Vec<u32>) -> ReportFilters {
    ReportFilters {
        seasons,
        months: vec![],
        scope: Scope::new(dataset.stores(), dataset.segments()),
    }
}

#[test]
fn test_prepare_fixture() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;

    assert_eq!(dataset.transactions().len(), 13);
    assert_eq!(dataset.dropped_rows(), 1);
    assert!(dataset.identity_warning().is_none());
    assert_eq!(dataset.seasons(), vec![8, 9, 10]);
    assert_eq!(
        dataset.segments(),
        vec!["Arquitetura".to_string(), "Engenharia".to_string()]
    );

    let keys: std::collections::BTreeSet<&str> = dataset
        .transactions()
        .iter()
        .map(|t| t.consolidated_key.as_str())
        .collect();
    let expected: std::collections::BTreeSet<&str> =
        ["Ana Studio", "Bruno Costa", "Carla", "Diego", "Elisa", "Fábio"]
            .into_iter()
            .collect();
    assert_eq!(keys, expected);

    let split = dataset
        .transactions()
        .iter()
        .find(|t| t.order_id == "NF902")
        .unwrap();
    assert_eq!(split.points, 50000.5);

    let brazilian_date = dataset
        .transactions()
        .iter()
        .find(|t| t.order_id == "NF1001")
        .unwrap();
    assert_eq!(brazilian_date.sale_date, NaiveDate::from_ymd_opt(2023, 7, 15).unwrap());
    Ok(())
}

#[test]
fn test_missing_mapping_degrades_to_documents() -> anyhow::Result<()> {
    let dataset = load_dataset(false)?;
    assert!(dataset.identity_warning().is_some());

    let ana_keys: std::collections::BTreeSet<&str> = dataset
        .transactions()
        .iter()
        .filter(|t| t.specifier.starts_with("Ana"))
        .map(|t| t.consolidated_key.as_str())
        .collect();
    assert_eq!(ana_keys.len(), 2);
    assert!(ana_keys.contains("11111111111"));
    Ok(())
}

#[test]
fn test_retention_over_fixture() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = everything(&dataset, vec![]);

    let report = dashboard.retention(&filters.scope)?;
    let seasons: Vec<u32> = report.rows.iter().map(|r| r.season).collect();
    assert_eq!(seasons, vec![8, 9, 10]);

    let t9 = report.row(9).unwrap();
    assert_eq!((t9.active, t9.inactive, t9.total), (3, 1, 4));
    assert!((t9.active_pct - 0.75).abs() < 1e-12);

    let t10 = report.row(10).unwrap();
    assert_eq!((t10.active, t10.inactive, t10.total), (4, 1, 5));
    assert_eq!(report.historical_entities.len(), 5);

    let inactive = dashboard.retention_detail(&filters.scope, 10, Some(ActivityStatus::Inactive));
    assert_eq!(inactive.len(), 1);
    assert_eq!(inactive[0].consolidated_key, "Bruno Costa");
    assert_eq!(inactive[0].orders_in_season, 0);
    assert_eq!(
        inactive[0].last_purchase,
        NaiveDate::from_ymd_opt(2023, 8, 21)
    );

    println!("{}", report.to_json()?);
    Ok(())
}

#[test]
fn test_adjusted_ranking_over_fixture() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = everything(&dataset, vec![]);

    let report = dashboard.ranking(&filters.scope, SeasonComparison::new(10, 9))?;
    assert_eq!((report.max_rank_current, report.max_rank_previous), (4, 4));
    assert_eq!(report.rows.len(), 6);

    let movements: Vec<(&str, u32, u32, i64)> = report
        .rows
        .iter()
        .map(|r| (r.specifier.as_str(), r.previous_rank, r.current_rank, r.movement))
        .collect();
    assert_eq!(
        movements,
        vec![
            ("Ana", 3, 1, 2),
            ("Carla", 5, 2, 3),
            ("Elisa", 4, 3, 1),
            ("Diego", 5, 4, 1),
            ("Ana Studio Arquitetura LTDA", 1, 5, -4),
            ("Bruno", 2, 5, -3),
        ]
    );
    assert_eq!(report.row("Carla").unwrap().document, "333.333.333-33");
    Ok(())
}

#[test]
fn test_store_thirds_over_fixture() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = everything(&dataset, vec![]);

    let analysis = dashboard.store_analysis(&filters, SeasonComparison::new(10, 9))?;
    let order: Vec<(&str, StoreTier, StoreStatus)> = analysis
        .stores
        .iter()
        .map(|s| (s.store.as_str(), s.tier, s.status))
        .collect();
    // Loja Centro alone holds more than two thirds of the previous volume.
    assert_eq!(
        order,
        vec![
            ("Loja Centro", StoreTier::First, StoreStatus::Grew),
            ("Loja Norte", StoreTier::Third, StoreStatus::Declined),
            ("Loja Sul", StoreTier::Third, StoreStatus::GrewFromZero),
        ]
    );

    let first = analysis.tier(StoreTier::First).unwrap();
    assert_eq!((first.stores, first.previous_points, first.current_points), (1, 250000.5, 300000.0));
    assert_eq!(analysis.tier(StoreTier::Second).unwrap().stores, 0);
    assert_eq!((first.previous_scoring_stores, first.current_scoring_stores), (1, 1));
    let third = analysis.tier(StoreTier::Third).unwrap();
    assert_eq!((third.stores, third.previous_points, third.current_points), (2, 100000.0, 70000.0));
    // Loja Sul only started scoring in T10.
    assert_eq!((third.previous_scoring_stores, third.current_scoring_stores), (1, 2));

    let pyramid: Vec<(PyramidBucket, usize)> =
        analysis.pyramid.iter().map(|p| (p.bucket, p.count)).collect();
    assert_eq!(
        pyramid,
        vec![
            (PyramidBucket::Grew, 2),
            (PyramidBucket::Declined, 1),
            (PyramidBucket::StartedScoring, 1),
        ]
    );

    let headcount = Dashboard::new(
        &dataset,
        AnalyticsConfig {
            tiering: TieringStrategy::EqualHeadcount,
            ..Default::default()
        },
    )?;
    let analysis = headcount.store_analysis(&filters, SeasonComparison::new(10, 9))?;
    assert!(analysis.tiers.iter().all(|t| t.stores == 1));
    Ok(())
}

#[test]
fn test_pivots_over_fixture() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = everything(&dataset, vec![9, 10]);

    let points = dashboard.points_pivot(&filters);
    assert_eq!(points.rows.first().unwrap().label, "Jul (07)");
    assert_eq!(points.value(7, 9), Some(250000.5));
    assert_eq!(points.value(7, 10), Some(305000.0));
    assert_eq!(points.total().unwrap().values, vec![350000.5, 370000.0]);
    assert_eq!(
        points.evolution_label.as_deref(),
        Some("Evolução Pontos (T10 vs T9)")
    );

    let orders = dashboard.orders_pivot(&filters);
    assert_eq!(orders.total().unwrap().values, vec![4.0, 5.0]);

    let registrants = dashboard.new_registrants_pivot(&filters);
    assert_eq!(registrants.total().unwrap().values, vec![0.0, 1.0]);
    assert_eq!(
        registrants.total().unwrap().evolution,
        Some(EvolutionCell::Qualitative {
            trend: Trend::Grew,
            value: 1
        })
    );

    let performance = dashboard.season_performance(&filters);
    assert_eq!(performance.len(), 2);
    assert_eq!(performance[1].orders, 5);
    assert_eq!(performance[1].scored_documents, 4);
    assert_eq!(performance[1].new_registrants, 1);
    Ok(())
}

#[test]
fn test_blank_order_ids_agree_across_views() -> anyhow::Result<()> {
    let sale = |points: &str, order: &str, doc: &str| RawSaleRow {
        sale_date: "2022-08-01".to_string(),
        points: points.to_string(),
        order_id: order.to_string(),
        document: doc.to_string(),
        specifier: "Ana".to_string(),
        store: "Loja Centro".to_string(),
        segment: "Arquitetura".to_string(),
        season: "9".to_string(),
    };
    let sales = vec![
        sale("1000", "", "111.111.111-11"),
        sale("2000", "NF2", "222.222.222-22"),
    ];
    let dataset = SalesDataset::prepare(&sales, &[], None, &AnalyticsConfig::default())?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = everything(&dataset, vec![9]);

    let headline = dashboard.kpis(&filters).filtered.orders;
    let pivot = dashboard.orders_pivot(&filters).total().unwrap().values.clone();
    let performance = dashboard.season_performance(&filters)[0].orders;
    assert_eq!(headline, 1);
    assert_eq!(pivot, vec![headline as f64]);
    assert_eq!(performance, headline);
    Ok(())
}

#[test]
fn test_kpis_and_category_views() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;

    let mut filters = everything(&dataset, vec![10]);
    filters.scope.segments = vec!["Arquitetura".to_string()];

    let kpis = dashboard.kpis(&filters);
    assert_eq!(kpis.filtered.points, 350000.0);
    assert_eq!(kpis.filtered.new_customers, 1);
    assert_eq!(kpis.program.points, 370000.0);
    assert_eq!(kpis.program.orders, 5);

    let categories = dashboard.category_comparison(&filters);
    let pro = categories
        .iter()
        .find(|c| c.category == Category::Pro)
        .unwrap();
    assert_eq!((pro.segment_count, pro.program_count), (2, 3));
    assert!((pro.participation - 2.0 / 3.0).abs() < 1e-12);
    assert!(categories.iter().all(|c| c.category != Category::SemCategoria));
    Ok(())
}

#[test]
fn test_consolidated_performance_over_fixture() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = everything(&dataset, vec![9, 10]);

    let table = dashboard.performance(&filters, Some(10));
    assert_eq!(table.comparison, Some(SeasonComparison::new(10, 9)));
    assert_eq!(table.rows[0].consolidated_key, "Ana Studio");
    assert_eq!(table.rows[0].category, Category::Topazio);
    assert!((table.rows[0].evolution - (300000.0 / 250000.5 - 1.0)).abs() < 1e-12);

    let bruno = table.row("Bruno Costa").unwrap();
    assert_eq!(bruno.category, Category::SemCategoria);
    assert_eq!(bruno.evolution, -1.0);

    let total = &table.category_total;
    assert_eq!((total.entities, total.points), (4, 370000.0));
    assert_eq!(total.previous_points, 350000.5);

    let all_seasons = dashboard.performance(&filters, None);
    let ana = all_seasons.row("Ana Studio").unwrap();
    assert_eq!(
        ana.linked_names,
        vec!["Ana Studio Arquitetura LTDA".to_string(), "Ana".to_string()]
    );
    assert_eq!(ana.linked_cnpjs, vec!["11.222.333/0001-44".to_string()]);
    assert_eq!(all_seasons.search("ltda").len(), 1);

    let newcomers = dashboard.new_registrants(&filters);
    assert_eq!(newcomers.len(), 1);
    assert_eq!(newcomers[0].name, "Diego");
    assert_eq!(newcomers[0].first_purchase, NaiveDate::from_ymd_opt(2023, 7, 15));
    assert_eq!(format_document(&newcomers[0].document_clean), "444.444.444-44");

    assert!(table.to_json()?.contains("Ana Studio"));
    Ok(())
}

#[test]
fn test_empty_scope_views_are_empty() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = ReportFilters::default();

    assert!(dashboard.retention(&filters.scope)?.rows.is_empty());
    assert!(dashboard
        .ranking(&filters.scope, SeasonComparison::new(10, 9))?
        .is_empty());
    assert!(dashboard
        .store_analysis(&filters, SeasonComparison::new(10, 9))?
        .stores
        .is_empty());
    assert!(dashboard.performance(&filters, None).rows.is_empty());
    assert!(dashboard.category_comparison(&filters).is_empty());
    assert_eq!(dashboard.kpis(&filters).filtered, HeadlineKpis::default());
    Ok(())
}

#[test]
fn test_views_are_idempotent() -> anyhow::Result<()> {
    let dataset = load_dataset(true)?;
    let dashboard = Dashboard::new(&dataset, AnalyticsConfig::default())?;
    let filters = everything(&dataset, vec![]);
    let comparison = SeasonComparison::new(10, 9);

    assert_eq!(dashboard.retention(&filters.scope)?, dashboard.retention(&filters.scope)?);
    assert_eq!(
        dashboard.ranking(&filters.scope, comparison)?,
        dashboard.ranking(&filters.scope, comparison)?
    );
    assert_eq!(
        dashboard.store_analysis(&filters, comparison)?,
        dashboard.store_analysis(&filters, comparison)?
    );
    assert_eq!(dashboard.points_pivot(&filters), dashboard.points_pivot(&filters));
    assert_eq!(
        dashboard.performance(&filters, None),
        dashboard.performance(&filters, None)
    );
    Ok(())
}

#[test]
fn test_filter_schema_export() {
    let schema = ReportFilters::schema_as_json().unwrap();
    assert!(schema.contains("ReportFilters"));
    assert!(schema.contains("scope"));
}
