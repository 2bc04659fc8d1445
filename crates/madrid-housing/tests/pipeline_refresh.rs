//! End-to-end pipeline behavior against an in-memory store: partial-failure
//! isolation, natural-key idempotence, and the synthetic fallback.

use std::sync::Arc;
use std::time::Duration;

use madrid_housing::domain::{
    FetchStatus, Period, PropertyType, Provenance, SalePriceObservation,
};
use madrid_housing::pipeline::{
    PipelineConfig, PipelineError, PipelineOrchestrator, RefreshScope,
};
use madrid_housing::sources::{FetchWindow, SourceAdapter, SourceError, SourceRecord};
use madrid_housing::store::{HousingStore, SqliteStore};

enum Script {
    Records(Vec<SourceRecord>),
    Fail(&'static str),
    Empty,
}

struct ScriptedAdapter {
    name: &'static str,
    script: Script,
}

impl SourceAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn operation(&self) -> &'static str {
        "scripted"
    }

    fn fetch(&self, _window: &FetchWindow) -> Result<Vec<SourceRecord>, SourceError> {
        match &self.script {
            Script::Records(records) => Ok(records.clone()),
            Script::Fail(message) => Err(SourceError::Unavailable(message.to_string())),
            Script::Empty => Err(SourceError::Empty),
        }
    }
}

fn adapter(name: &'static str, script: Script) -> Arc<dyn SourceAdapter> {
    Arc::new(ScriptedAdapter { name, script })
}

fn sale_record(district: &str, period: Period, price: f64) -> SourceRecord {
    SourceRecord::SalePrice(SalePriceObservation {
        district_code: district.to_string(),
        period,
        property_type: PropertyType::All,
        price_per_m2: price,
        transactions: Some(120),
        provenance: Provenance::Live,
    })
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        rate_limit: Duration::ZERO,
        window: FetchWindow::default(),
    }
}

async fn store() -> SqliteStore {
    SqliteStore::open_in_memory().await.expect("in-memory store opens")
}

#[tokio::test]
async fn one_failing_source_never_blocks_the_others() {
    let store = Arc::new(store().await);
    let live_period = Period::new(2024, 3);
    let orchestrator = PipelineOrchestrator::new(
        store.clone(),
        vec![
            adapter("alpha", Script::Fail("connection reset")),
            adapter("beta", Script::Records(vec![sale_record("04", live_period, 9999.0)])),
            adapter("gamma", Script::Empty),
        ],
        test_config(),
    );

    let report = orchestrator
        .refresh(RefreshScope::All)
        .await
        .expect("refresh absorbs source failures");

    assert_eq!(report.sources.len(), 3);
    let status_of = |name: &str| {
        report
            .sources
            .iter()
            .find(|s| s.source == name)
            .map(|s| s.status)
            .expect("source reported")
    };
    assert_eq!(status_of("alpha"), FetchStatus::Failed);
    assert_eq!(status_of("beta"), FetchStatus::Success);
    assert_eq!(status_of("gamma"), FetchStatus::Skipped);

    // Beta's record made it to the store despite alpha failing first.
    let series = store
        .sale_price_series("04", PropertyType::All)
        .await
        .expect("series reads");
    let live_row = series
        .iter()
        .find(|obs| obs.period == live_period)
        .expect("live row stored");
    assert_eq!(live_row.price_per_m2, 9999.0);
    assert_eq!(live_row.provenance, Provenance::Live);

    // Every attempt left exactly one audit row, and the statuses match.
    let log = store.recent_fetch_log(10).await.expect("log reads");
    assert_eq!(log.len(), 3);
    let log_status = |name: &str| {
        log.iter()
            .find(|e| e.source == name)
            .map(|e| e.status)
            .expect("log entry present")
    };
    assert_eq!(log_status("alpha"), FetchStatus::Failed);
    assert_eq!(log_status("beta"), FetchStatus::Success);
    assert_eq!(log_status("gamma"), FetchStatus::Skipped);
    let failed = log.iter().find(|e| e.source == "alpha").expect("alpha entry");
    assert!(failed
        .error_message
        .as_deref()
        .expect("failure carries a message")
        .contains("connection reset"));
}

#[tokio::test]
async fn backfill_fills_gaps_but_never_touches_live_rows() {
    let store = Arc::new(store().await);
    let live_period = Period::new(2024, 3);
    let orchestrator = PipelineOrchestrator::new(
        store.clone(),
        vec![adapter(
            "beta",
            Script::Records(vec![sale_record("04", live_period, 9999.0)]),
        )],
        test_config(),
    );

    let report = orchestrator.refresh(RefreshScope::All).await.expect("refresh runs");
    let backfill = report.backfill.expect("empty store triggers backfill");
    assert!(backfill.total() > 0);

    let series = store
        .sale_price_series("04", PropertyType::All)
        .await
        .expect("series reads");
    // The synthetic generator covers 28 quarters; the live row claimed one of
    // those keys first and must survive untouched.
    assert_eq!(series.len(), 28);
    let live_row = series.iter().find(|obs| obs.period == live_period).expect("row");
    assert_eq!(live_row.price_per_m2, 9999.0);
    assert_eq!(live_row.provenance, Provenance::Live);
    assert!(series
        .iter()
        .filter(|obs| obs.period != live_period)
        .all(|obs| obs.provenance == Provenance::Synthetic));

    // A second refresh finds every district populated and skips the backfill.
    let second = orchestrator.refresh(RefreshScope::All).await.expect("refresh runs");
    assert!(second.backfill.is_none());
}

#[tokio::test]
async fn scoped_refresh_touches_a_single_source() {
    let store = Arc::new(store().await);
    let orchestrator = PipelineOrchestrator::new(
        store.clone(),
        vec![
            adapter("alpha", Script::Fail("unreachable")),
            adapter("beta", Script::Empty),
        ],
        test_config(),
    );

    let report = orchestrator
        .refresh(RefreshScope::Source("beta".to_string()))
        .await
        .expect("scoped refresh runs");
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].source, "beta");

    let err = orchestrator
        .refresh(RefreshScope::Source("delta".to_string()))
        .await
        .expect_err("unknown source is rejected");
    assert!(matches!(err, PipelineError::UnknownSource(name) if name == "delta"));
}

#[tokio::test]
async fn reingesting_a_natural_key_keeps_one_row_with_the_latest_value() {
    let store = store().await;
    for district in madrid_housing::districts::all() {
        store.upsert_district(&district).await.expect("district upserts");
    }

    let key_period = Period::new(2024, 3);
    let first = SalePriceObservation {
        district_code: "04".to_string(),
        period: key_period,
        property_type: PropertyType::All,
        price_per_m2: 5100.0,
        transactions: Some(200),
        provenance: Provenance::Synthetic,
    };
    let second = SalePriceObservation {
        price_per_m2: 5240.0,
        provenance: Provenance::Live,
        ..first.clone()
    };

    store.upsert_sale_price(&first).await.expect("first upsert");
    store.upsert_sale_price(&second).await.expect("second upsert");

    let series = store
        .sale_price_series("04", PropertyType::All)
        .await
        .expect("series reads");
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].price_per_m2, 5240.0);
    assert_eq!(series[0].provenance, Provenance::Live);
}
