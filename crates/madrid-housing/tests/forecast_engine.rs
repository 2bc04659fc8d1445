//! Forecast engine behavior against an in-memory store: fallback policy,
//! ensemble arithmetic, and write-once-per-key persistence.

use std::sync::Arc;

use chrono::Utc;
use madrid_housing::domain::{
    ForecastRecord, Period, PropertyType, Provenance, SalePriceObservation,
};
use madrid_housing::forecast::{ForecastConfig, ForecastEngine, ForecastError, ModelKind};
use madrid_housing::store::{HousingStore, SqliteStore};

async fn store_with_districts() -> Arc<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().await.expect("store opens"));
    for district in madrid_housing::districts::all() {
        store.upsert_district(&district).await.expect("district upserts");
    }
    store
}

async fn insert_series(store: &SqliteStore, district: &str, prices: &[f64]) {
    let mut period = Period::new(2019, 1);
    for &price in prices {
        store
            .upsert_sale_price(&SalePriceObservation {
                district_code: district.to_string(),
                period,
                property_type: PropertyType::All,
                price_per_m2: price,
                transactions: Some(150),
                provenance: Provenance::Synthetic,
            })
            .await
            .expect("observation upserts");
        period = period.next();
    }
}

/// Rising series with a repeating quarterly wobble.
fn seasonal_prices(n: usize) -> Vec<f64> {
    let wobble = [40.0, -15.0, -30.0, 5.0];
    (0..n)
        .map(|t| 3400.0 + 52.0 * t as f64 + wobble[t % 4])
        .collect()
}

fn engine(store: Arc<SqliteStore>) -> ForecastEngine<SqliteStore> {
    ForecastEngine::new(store, ForecastConfig::default())
}

#[tokio::test]
async fn short_series_never_reaches_the_seasonal_model() {
    let store = store_with_districts().await;
    insert_series(&store, "01", &seasonal_prices(8)).await;
    let engine = engine(store.clone());

    let result = engine
        .forecast_district("01", 4, ModelKind::Ensemble)
        .await
        .expect("forecast runs");
    assert_eq!(result.model, ModelKind::Ensemble);
    assert_eq!(result.produced_by, ModelKind::Linear);

    // The persisted ensemble must equal the persisted linear output exactly.
    let linear = store.forecasts("01", "linear").await.expect("linear rows");
    let ensemble = store.forecasts("01", "ensemble").await.expect("ensemble rows");
    assert_eq!(linear.len(), 4);
    assert_eq!(ensemble.len(), 4);
    for (l, e) in linear.iter().zip(&ensemble) {
        assert_eq!(l.period, e.period);
        assert_eq!(l.predicted_price_m2, e.predicted_price_m2);
        assert_eq!(l.lower_bound, e.lower_bound);
        assert_eq!(l.upper_bound, e.upper_bound);
    }
}

#[tokio::test]
async fn ensemble_is_the_weighted_blend_of_both_models() {
    let store = store_with_districts().await;
    insert_series(&store, "04", &seasonal_prices(20)).await;
    let engine = engine(store.clone());

    let result = engine
        .forecast_district("04", 6, ModelKind::Ensemble)
        .await
        .expect("forecast runs");
    assert_eq!(result.produced_by, ModelKind::Ensemble);
    assert_eq!(result.points.len(), 6);

    let linear = store.forecasts("04", "linear").await.expect("linear rows");
    let seasonal = store.forecasts("04", "seasonal").await.expect("seasonal rows");
    let ensemble = store.forecasts("04", "ensemble").await.expect("ensemble rows");
    assert_eq!(seasonal.len(), 6);

    // Stored values are rounded to cents, so allow a cent of slack per side.
    for ((l, s), e) in linear.iter().zip(&seasonal).zip(&ensemble) {
        let blend = |sv: f64, lv: f64| 0.65 * sv + 0.35 * lv;
        assert!((e.predicted_price_m2 - blend(s.predicted_price_m2, l.predicted_price_m2)).abs() < 0.02);
        assert!((e.lower_bound - blend(s.lower_bound, l.lower_bound)).abs() < 0.02);
        assert!((e.upper_bound - blend(s.upper_bound, l.upper_bound)).abs() < 0.02);
        assert!(e.lower_bound <= e.predicted_price_m2);
        assert!(e.predicted_price_m2 <= e.upper_bound);
        assert_eq!(e.confidence_level, 0.95);
    }
}

#[tokio::test]
async fn rerunning_a_forecast_overwrites_instead_of_duplicating() {
    let store = store_with_districts().await;
    insert_series(&store, "07", &seasonal_prices(16)).await;
    let engine = engine(store.clone());

    engine
        .forecast_district("07", 4, ModelKind::Ensemble)
        .await
        .expect("first run");
    engine
        .forecast_district("07", 4, ModelKind::Ensemble)
        .await
        .expect("second run");

    for model in ["linear", "seasonal", "ensemble"] {
        let rows = store.forecasts("07", model).await.expect("rows read");
        assert_eq!(rows.len(), 4, "model {model} duplicated rows");
    }
}

#[tokio::test]
async fn forecast_natural_key_admits_a_single_row() {
    let store = store_with_districts().await;
    let key_period = Period::new(2026, 1);
    let base = ForecastRecord {
        district_code: "04".to_string(),
        model_name: "ensemble".to_string(),
        period: key_period,
        predicted_price_m2: 5000.0,
        lower_bound: 4800.0,
        upper_bound: 5200.0,
        confidence_level: 0.95,
        generated_at: Utc::now(),
    };
    store.upsert_forecast(&base).await.expect("first write");
    store
        .upsert_forecast(&ForecastRecord { predicted_price_m2: 5111.0, ..base.clone() })
        .await
        .expect("second write");

    let rows = store.forecasts("04", "ensemble").await.expect("rows read");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].predicted_price_m2, 5111.0);
}

#[tokio::test]
async fn reads_are_served_from_the_store_until_an_explicit_rerun() {
    let store = store_with_districts().await;
    insert_series(&store, "02", &seasonal_prices(16)).await;
    let engine = engine(store.clone());

    let first = engine
        .stored_or_generate("02", ModelKind::Ensemble)
        .await
        .expect("first read generates");
    assert_eq!(first.len(), ForecastConfig::default().horizon);

    // New history that would shift any recomputation; the read path must
    // keep serving the stored rows.
    insert_series(&store, "02", &vec![9000.0; 20]).await;
    let second = engine
        .stored_or_generate("02", ModelKind::Ensemble)
        .await
        .expect("second read is stored");
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.period, b.period);
        assert_eq!(a.predicted_price_m2, b.predicted_price_m2);
    }

    // An explicit rerun recomputes and overwrites.
    let rerun = engine
        .forecast_district("02", ForecastConfig::default().horizon, ModelKind::Ensemble)
        .await
        .expect("rerun");
    assert!(rerun
        .points
        .iter()
        .zip(&second)
        .any(|(a, b)| a.predicted_price_m2 != b.predicted_price_m2));
}

#[tokio::test]
async fn batch_run_isolates_district_failures() {
    let store = store_with_districts().await;
    insert_series(&store, "01", &seasonal_prices(16)).await;
    insert_series(&store, "02", &seasonal_prices(14)).await;
    let engine = engine(store.clone());

    let report = engine.run_all(4).await.expect("batch runs");
    assert_eq!(report.succeeded, vec!["01".to_string(), "02".to_string()]);
    // The other 19 districts have no history and fail without aborting.
    assert_eq!(report.failed.len(), 19);
    assert!(report.failed.iter().all(|f| f.error.contains("not enough history")));
}

#[tokio::test]
async fn unknown_district_is_rejected() {
    let store = store_with_districts().await;
    let engine = engine(store);
    let err = engine
        .forecast_district("99", 4, ModelKind::Linear)
        .await
        .expect_err("district 99 does not exist");
    assert!(matches!(err, ForecastError::UnknownDistrict(code) if code == "99"));
}
