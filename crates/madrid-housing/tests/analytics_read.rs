//! Read-side analytics over a seeded store.

use std::sync::Arc;

use madrid_housing::analytics::{AnalyticsAggregator, YieldBand};
use madrid_housing::config::AnalyticsConfig;
use madrid_housing::domain::{
    Period, PropertyType, Provenance, RentalPriceObservation, SalePriceObservation,
};
use madrid_housing::pipeline::{PipelineConfig, PipelineOrchestrator};
use madrid_housing::store::{HousingStore, SqliteStore};

async fn seeded_store() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().await.expect("store opens"));
    let orchestrator =
        PipelineOrchestrator::new(store.clone(), Vec::new(), PipelineConfig::default());
    orchestrator.seed().await.expect("seed runs");
    store
}

fn aggregator(store: Arc<SqliteStore>) -> AnalyticsAggregator<SqliteStore> {
    AnalyticsAggregator::new(store, AnalyticsConfig::default())
}

#[tokio::test]
async fn market_summary_is_complete_over_seeded_data() {
    let analytics = aggregator(seeded_store().await);
    let summary = analytics
        .market_summary()
        .await
        .expect("summary reads")
        .expect("seeded store yields a summary");

    assert_eq!(summary.period, "2025 Q4");
    assert!(summary.avg_sale_price_m2 > 3000.0);
    // 2024 Q4 exists, so YoY is available and positive in the seeded series.
    let yoy = summary.yoy_price_change_pct.expect("prior year present");
    assert!(yoy > 0.0);
    assert!(summary.gross_rental_yield_pct.is_some());
    assert!(summary.years_to_buy > 0.0);
    assert!(summary.affordability_index > 0.0);
    // The seed stops mortgages at 2025-09, still within the summary year.
    assert!(summary.annual_mortgages.expect("mortgages present") > 0);
}

#[tokio::test]
async fn empty_store_yields_no_summary_rather_than_an_error() {
    let store = Arc::new(SqliteStore::open_in_memory().await.expect("store opens"));
    let analytics = aggregator(store);
    assert!(analytics.market_summary().await.expect("reads").is_none());
    assert!(analytics.affordability().await.expect("reads").is_none());
    assert!(analytics.rental_yields(None).await.expect("reads").is_empty());
}

#[tokio::test]
async fn price_change_marks_missing_priors_as_unavailable() {
    let store = Arc::new(SqliteStore::open_in_memory().await.expect("store opens"));
    for district in madrid_housing::districts::all() {
        store.upsert_district(&district).await.expect("district upserts");
    }
    // One observation in 2024 Q1 and one in 2024 Q2: QoQ resolves for Q2,
    // YoY cannot.
    for (quarter, price) in [(1u8, 4000.0), (2, 4100.0)] {
        store
            .upsert_sale_price(&SalePriceObservation {
                district_code: "01".to_string(),
                period: Period::new(2024, quarter),
                property_type: PropertyType::All,
                price_per_m2: price,
                transactions: None,
                provenance: Provenance::Live,
            })
            .await
            .expect("observation upserts");
    }

    let analytics = aggregator(store);
    let change = analytics
        .price_change("01", PropertyType::All)
        .await
        .expect("reads")
        .expect("district has data");
    assert_eq!(change.period, Period::new(2024, 2));
    assert_eq!(change.qoq_pct, Some(2.5));
    assert_eq!(change.yoy_pct, None);

    // A district with no rows at all reports nothing.
    assert!(analytics
        .price_change("21", PropertyType::All)
        .await
        .expect("reads")
        .is_none());
}

#[tokio::test]
async fn rental_yields_classify_bands_per_district() {
    let store = Arc::new(SqliteStore::open_in_memory().await.expect("store opens"));
    for district in madrid_housing::districts::all() {
        store.upsert_district(&district).await.expect("district upserts");
    }
    let period = Period::new(2025, 2);
    let rows = [
        // (code, sale €/m², rent €/m²·month) → 4.0 %, 3.2 %, 2.4 %
        ("04", 4500.0, 15.0),
        ("01", 4500.0, 12.0),
        ("17", 3000.0, 6.0),
    ];
    for (code, sale, rent) in rows {
        store
            .upsert_sale_price(&SalePriceObservation {
                district_code: code.to_string(),
                period,
                property_type: PropertyType::All,
                price_per_m2: sale,
                transactions: None,
                provenance: Provenance::Live,
            })
            .await
            .expect("sale upserts");
        store
            .upsert_rental_price(&RentalPriceObservation {
                district_code: code.to_string(),
                period,
                price_per_m2_month: rent,
                listings: Some(90),
                provenance: Provenance::Live,
            })
            .await
            .expect("rental upserts");
    }

    let analytics = aggregator(store);
    let yields = analytics.rental_yields(None).await.expect("yields read");
    assert_eq!(yields.len(), 3);

    let by_code = |code: &str| yields.iter().find(|y| y.district_code == code).expect("entry");
    assert_eq!(by_code("04").gross_yield_pct, 4.0);
    assert_eq!(by_code("04").band, YieldBand::High);
    assert_eq!(by_code("01").gross_yield_pct, 3.2);
    assert_eq!(by_code("01").band, YieldBand::Medium);
    assert_eq!(by_code("17").gross_yield_pct, 2.4);
    assert_eq!(by_code("17").band, YieldBand::Low);

    // Highest rent first.
    assert_eq!(yields[0].district_code, "04");
}

#[tokio::test]
async fn affordability_report_uses_configured_baselines() {
    let analytics = aggregator(seeded_store().await);
    let report = analytics
        .affordability()
        .await
        .expect("reads")
        .expect("seeded store yields a report");

    assert_eq!(report.typical_home_m2, 80.0);
    assert!(report.monthly_mortgage_payment_eur > 0.0);
    assert!(report.mortgage_to_income_pct > 0.0);
    assert!(report.years_of_income_to_buy > 0.0);
    assert!(report.rent_to_income_pct.is_some());
}
