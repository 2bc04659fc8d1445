use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use madrid_housing::analytics::AnalyticsAggregator;
use madrid_housing::config::AppConfig;
use madrid_housing::error::AppError;
use madrid_housing::forecast::{ForecastConfig, ForecastEngine};
use madrid_housing::pipeline::{PipelineConfig, PipelineOrchestrator};
use madrid_housing::sources::{CatastroAdapter, IdealistaAdapter, IneAdapter, SourceAdapter};
use madrid_housing::store::SqliteStore;
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// The three core services plus the shared store, wired against SQLite and
/// the production adapters.
pub(crate) struct Services {
    pub(crate) store: Arc<SqliteStore>,
    pub(crate) pipeline: PipelineOrchestrator<SqliteStore>,
    pub(crate) forecasts: ForecastEngine<SqliteStore>,
    pub(crate) analytics: AnalyticsAggregator<SqliteStore>,
}

pub(crate) async fn build_services(config: &AppConfig) -> Result<Arc<Services>, AppError> {
    let store = Arc::new(SqliteStore::open(&config.database.path).await?);
    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(IneAdapter::new(&config.sources)),
        Arc::new(IdealistaAdapter::new(&config.sources)),
        Arc::new(CatastroAdapter::new(&config.sources)),
    ];
    Ok(assemble(
        store,
        adapters,
        PipelineConfig::from_sources(&config.sources),
        config,
    ))
}

fn assemble(
    store: Arc<SqliteStore>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    pipeline_config: PipelineConfig,
    config: &AppConfig,
) -> Arc<Services> {
    Arc::new(Services {
        pipeline: PipelineOrchestrator::new(store.clone(), adapters, pipeline_config),
        forecasts: ForecastEngine::new(store.clone(), ForecastConfig::default()),
        analytics: AnalyticsAggregator::new(store.clone(), config.analytics.clone()),
        store,
    })
}

#[cfg(test)]
pub(crate) async fn test_services() -> Arc<Services> {
    let store = Arc::new(
        SqliteStore::open_in_memory()
            .await
            .expect("in-memory store opens"),
    );
    let config = AppConfig::load().expect("default config loads");
    assemble(store, Vec::new(), PipelineConfig::default(), &config)
}
