use crate::cli::ServeArgs;
use crate::infra::{build_services, AppState};
use crate::routes::with_service_routes;
use crate::scheduler;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use madrid_housing::config::AppConfig;
use madrid_housing::error::AppError;
use madrid_housing::pipeline::RefreshScope;
use madrid_housing::store::HousingStore;
use madrid_housing::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = build_services(&config).await?;

    let app = with_service_routes(services.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    // First start on an empty store: run one refresh in the background so the
    // read surface has data (live if the sources answer, synthetic if not).
    let bootstrap = services.clone();
    tokio::spawn(async move {
        match bootstrap.store.latest_sale_period().await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!("store is empty, running bootstrap refresh");
                if let Err(err) = bootstrap.pipeline.refresh(RefreshScope::All).await {
                    warn!(%err, "bootstrap refresh failed");
                }
            }
            Err(err) => warn!(%err, "bootstrap check failed"),
        }
    });

    scheduler::spawn(&config.scheduler, services);

    info!(?config.environment, %addr, "housing market service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
