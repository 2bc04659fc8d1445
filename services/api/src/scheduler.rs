//! In-process periodic jobs: a recurring refresh and a recurring full
//! forecast pass. Plain tokio interval tasks invoking the same service
//! operations as the HTTP triggers; no job state lives here.

use std::sync::Arc;

use madrid_housing::config::SchedulerConfig;
use madrid_housing::pipeline::RefreshScope;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::infra::Services;

pub(crate) fn spawn(config: &SchedulerConfig, services: Arc<Services>) {
    if !config.enabled {
        info!("scheduler disabled");
        return;
    }

    let refresh_services = services.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The immediate first tick is consumed; startup is handled by the
        // bootstrap refresh.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match refresh_services.pipeline.refresh(RefreshScope::All).await {
                Ok(report) => info!(sources = report.sources.len(), "scheduled refresh complete"),
                Err(err) => warn!(%err, "scheduled refresh failed"),
            }
        }
    });

    let forecast_services = services;
    let forecast_interval = config.forecast_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(forecast_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match forecast_services.forecasts.run_all(8).await {
                Ok(report) => info!(
                    succeeded = report.succeeded.len(),
                    failed = report.failed.len(),
                    "scheduled forecast pass complete"
                ),
                Err(err) => warn!(%err, "scheduled forecast pass failed"),
            }
        }
    });

    info!(
        refresh_secs = refresh_interval.as_secs(),
        forecast_secs = forecast_interval.as_secs(),
        "scheduler started"
    );
}
