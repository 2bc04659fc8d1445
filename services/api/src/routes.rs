use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;

use madrid_housing::domain::{Period, PropertyType};
use madrid_housing::error::AppError;
use madrid_housing::forecast::ModelKind;
use madrid_housing::pipeline::RefreshScope;
use madrid_housing::store::HousingStore;

use crate::infra::{AppState, Services};

/// Trigger and read endpoints, 1:1 with the orchestrator/engine operations.
pub(crate) fn api_router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/api/v1/pipeline/refresh", post(refresh_endpoint))
        .route("/api/v1/pipeline/seed", post(seed_endpoint))
        .route("/api/v1/pipeline/log", get(fetch_log_endpoint))
        .route("/api/v1/forecasts/run", post(forecast_all_endpoint))
        .route("/api/v1/forecasts/:district/run", post(forecast_district_endpoint))
        .route("/api/v1/forecasts/:district", get(forecast_read_endpoint))
        .route("/api/v1/analytics/summary", get(summary_endpoint))
        .route("/api/v1/analytics/yields", get(yields_endpoint))
        .route("/api/v1/analytics/affordability", get(affordability_endpoint))
        .route("/api/v1/analytics/districts", get(district_snapshot_endpoint))
        .route("/api/v1/analytics/mortgages", get(mortgage_trends_endpoint))
        .route("/api/v1/analytics/price-index", get(price_index_endpoint))
        .route("/api/v1/analytics/trends/:district", get(price_change_endpoint))
        .with_state(services)
}

pub(crate) fn with_service_routes(services: Arc<Services>) -> Router {
    api_router(services)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

// ── Pipeline triggers ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshQuery {
    source: Option<String>,
}

pub(crate) async fn refresh_endpoint(
    State(services): State<Arc<Services>>,
    Query(query): Query<RefreshQuery>,
) -> Result<Response, AppError> {
    let scope = match query.source {
        Some(source) => RefreshScope::Source(source),
        None => RefreshScope::All,
    };
    let report = services.pipeline.refresh(scope).await?;
    Ok(Json(report).into_response())
}

pub(crate) async fn seed_endpoint(
    State(services): State<Arc<Services>>,
) -> Result<Response, AppError> {
    let report = services.pipeline.seed().await?;
    Ok(Json(report).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct LogQuery {
    limit: Option<usize>,
}

pub(crate) async fn fetch_log_endpoint(
    State(services): State<Arc<Services>>,
    Query(query): Query<LogQuery>,
) -> Result<Response, AppError> {
    let entries = services
        .store
        .recent_fetch_log(query.limit.unwrap_or(50))
        .await
        .map_err(AppError::from)?;
    Ok(Json(entries).into_response())
}

// ── Forecast triggers and reads ──────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ForecastRunRequest {
    periods: Option<usize>,
    model: Option<String>,
}

pub(crate) async fn forecast_all_endpoint(
    State(services): State<Arc<Services>>,
    body: Option<Json<ForecastRunRequest>>,
) -> Result<Response, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let report = services
        .forecasts
        .run_all(request.periods.unwrap_or(8))
        .await?;
    Ok(Json(report).into_response())
}

pub(crate) async fn forecast_district_endpoint(
    State(services): State<Arc<Services>>,
    Path(district): Path<String>,
    body: Option<Json<ForecastRunRequest>>,
) -> Result<Response, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let model = match parse_model(request.model.as_deref()) {
        Ok(model) => model,
        Err(response) => return Ok(response),
    };
    let forecast = services
        .forecasts
        .forecast_district(&district, request.periods.unwrap_or(8), model)
        .await?;
    Ok(Json(forecast).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForecastReadQuery {
    model: Option<String>,
}

pub(crate) async fn forecast_read_endpoint(
    State(services): State<Arc<Services>>,
    Path(district): Path<String>,
    Query(query): Query<ForecastReadQuery>,
) -> Result<Response, AppError> {
    let model = match parse_model(query.model.as_deref()) {
        Ok(model) => model,
        Err(response) => return Ok(response),
    };
    let points = services
        .forecasts
        .stored_or_generate(&district, model)
        .await?;
    Ok(Json(points).into_response())
}

// ── Analytics reads ──────────────────────────────────────────────────────────

pub(crate) async fn summary_endpoint(
    State(services): State<Arc<Services>>,
) -> Result<Response, AppError> {
    let summary = services.analytics.market_summary().await.map_err(AppError::from)?;
    Ok(Json(summary).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct PeriodQuery {
    year: Option<i32>,
    quarter: Option<u8>,
}

fn parse_period(query: &PeriodQuery) -> Result<Option<Period>, Response> {
    match (query.year, query.quarter) {
        (Some(year), Some(quarter)) if (1..=4).contains(&quarter) => {
            Ok(Some(Period::new(year, quarter)))
        }
        (None, None) => Ok(None),
        _ => Err(bad_request("year and quarter (1-4) must be supplied together")),
    }
}

pub(crate) async fn yields_endpoint(
    State(services): State<Arc<Services>>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, AppError> {
    let period = match parse_period(&query) {
        Ok(period) => period,
        Err(response) => return Ok(response),
    };
    let yields = services
        .analytics
        .rental_yields(period)
        .await
        .map_err(AppError::from)?;
    Ok(Json(yields).into_response())
}

pub(crate) async fn affordability_endpoint(
    State(services): State<Arc<Services>>,
) -> Result<Response, AppError> {
    let report = services.analytics.affordability().await.map_err(AppError::from)?;
    Ok(Json(report).into_response())
}

pub(crate) async fn district_snapshot_endpoint(
    State(services): State<Arc<Services>>,
    Query(query): Query<PeriodQuery>,
) -> Result<Response, AppError> {
    let period = match parse_period(&query) {
        Ok(period) => period,
        Err(response) => return Ok(response),
    };
    let snapshot = services
        .analytics
        .district_snapshot(period)
        .await
        .map_err(AppError::from)?;
    Ok(Json(snapshot).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct FromYearQuery {
    from_year: Option<i32>,
}

pub(crate) async fn mortgage_trends_endpoint(
    State(services): State<Arc<Services>>,
    Query(query): Query<FromYearQuery>,
) -> Result<Response, AppError> {
    let series = services
        .analytics
        .mortgage_trends(query.from_year.unwrap_or(2019))
        .await
        .map_err(AppError::from)?;
    Ok(Json(series).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct PriceIndexQuery {
    property_type: Option<String>,
    from_year: Option<i32>,
}

pub(crate) async fn price_index_endpoint(
    State(services): State<Arc<Services>>,
    Query(query): Query<PriceIndexQuery>,
) -> Result<Response, AppError> {
    let property_type = match parse_property_type(query.property_type.as_deref()) {
        Ok(property_type) => property_type,
        Err(response) => return Ok(response),
    };
    let series = services
        .analytics
        .price_index_trends(property_type, query.from_year.unwrap_or(2019))
        .await
        .map_err(AppError::from)?;
    Ok(Json(series).into_response())
}

#[derive(Debug, Deserialize)]
pub(crate) struct TrendQuery {
    property_type: Option<String>,
}

pub(crate) async fn price_change_endpoint(
    State(services): State<Arc<Services>>,
    Path(district): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Response, AppError> {
    let property_type = match parse_property_type(query.property_type.as_deref()) {
        Ok(property_type) => property_type,
        Err(response) => return Ok(response),
    };
    let change = services
        .analytics
        .price_change(&district, property_type)
        .await
        .map_err(AppError::from)?;
    match change {
        Some(change) => Ok(Json(change).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no observations for district {district}") })),
        )
            .into_response()),
    }
}

// ── Parameter parsing ────────────────────────────────────────────────────────

fn parse_model(raw: Option<&str>) -> Result<ModelKind, Response> {
    match raw {
        None => Ok(ModelKind::Ensemble),
        Some(raw) => ModelKind::parse(raw)
            .ok_or_else(|| bad_request("model must be one of: linear, seasonal, ensemble")),
    }
}

fn parse_property_type(raw: Option<&str>) -> Result<PropertyType, Response> {
    match raw {
        None => Ok(PropertyType::All),
        Some(raw) => PropertyType::parse(raw)
            .ok_or_else(|| bad_request("property_type must be one of: all, new, second_hand")),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::test_services;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        serde_json::from_slice(&bytes).expect("body is JSON")
    }

    #[tokio::test]
    async fn seed_then_summary_round_trip() {
        let services = test_services().await;
        let router = api_router(services);

        let seed = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/pipeline/seed")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("seed endpoint responds");
        assert_eq!(seed.status(), StatusCode::OK);
        let seed_body = body_json(seed).await;
        assert_eq!(seed_body["sale_rows"], 28 * 21 * 3);

        let summary = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/analytics/summary")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("summary endpoint responds");
        assert_eq!(summary.status(), StatusCode::OK);
        let summary_body = body_json(summary).await;
        assert_eq!(summary_body["period"], "2025 Q4");
    }

    #[tokio::test]
    async fn refresh_with_unknown_source_is_not_found() {
        let services = test_services().await;
        let router = api_router(services);

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/pipeline/refresh?source=nope")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("endpoint responds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_model_parameter_is_a_bad_request() {
        let services = test_services().await;
        let router = api_router(services);

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/v1/forecasts/01?model=prophet")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("endpoint responds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forecast_for_unknown_district_is_not_found() {
        let services = test_services().await;
        let router = api_router(services.clone());
        services.pipeline.seed().await.expect("seed runs");

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/forecasts/99/run")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("endpoint responds");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(payload) = healthcheck().await;
        assert_eq!(payload["status"], "ok");
    }
}
