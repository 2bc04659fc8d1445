//! Forecast engine: two models blended into an ensemble with confidence
//! bounds, persisted through the store's natural-key upsert.

pub mod linear;
pub mod seasonal;

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{ForecastRecord, Period, PropertyType};
use crate::store::{HousingStore, StoreError};

/// Point forecast plus interval produced by a single model, before periods
/// and confidence metadata are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    Seasonal,
    Ensemble,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Seasonal => "seasonal",
            Self::Ensemble => "ensemble",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "linear" => Some(Self::Linear),
            "seasonal" => Some(Self::Seasonal),
            "ensemble" => Some(Self::Ensemble),
            _ => None,
        }
    }
}

/// One forecast period as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastPoint {
    pub period: Period,
    pub predicted_price_m2: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub confidence_level: f64,
}

/// Forecast for one district. `produced_by` names the model that actually
/// generated the numbers: it differs from `model` when the seasonal fit fell
/// back to the linear one.
#[derive(Debug, Clone, Serialize)]
pub struct DistrictForecast {
    pub district_code: String,
    pub model: ModelKind,
    pub produced_by: ModelKind,
    pub points: Vec<ForecastPoint>,
}

#[derive(Debug, Clone)]
pub struct ForecastConfig {
    pub horizon: usize,
    pub confidence: f64,
    pub seasonal_weight: f64,
    pub min_seasonal_observations: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 8,
            confidence: 0.95,
            seasonal_weight: 0.65,
            min_seasonal_observations: seasonal::MIN_OBSERVATIONS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("district not found: {0}")]
    UnknownDistrict(String),

    #[error("not enough history for district {district}: {observations} observations, need at least 4")]
    InsufficientHistory { district: String, observations: usize },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-district outcome of a batch forecast run.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastBatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<DistrictFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistrictFailure {
    pub district: String,
    pub error: String,
}

pub struct ForecastEngine<S> {
    store: Arc<S>,
    config: ForecastConfig,
}

impl<S: HousingStore> ForecastEngine<S> {
    pub fn new(store: Arc<S>, config: ForecastConfig) -> Self {
        Self { store, config }
    }

    /// Fit, blend, persist, and return the forecast for one district.
    ///
    /// All three model outputs are upserted under their own model names so a
    /// later read for any of them is served from the store; the returned
    /// value is the requested model's.
    pub async fn forecast_district(
        &self,
        district_code: &str,
        horizon: usize,
        model: ModelKind,
    ) -> Result<DistrictForecast, ForecastError> {
        if self.store.get_district(district_code).await?.is_none() {
            return Err(ForecastError::UnknownDistrict(district_code.to_string()));
        }

        let series = self
            .store
            .sale_price_series(district_code, PropertyType::All)
            .await?;
        if series.len() < 4 {
            return Err(ForecastError::InsufficientHistory {
                district: district_code.to_string(),
                observations: series.len(),
            });
        }

        let values: Vec<f64> = series.iter().map(|obs| obs.price_per_m2).collect();
        let last_period = series.last().map(|obs| obs.period).unwrap_or(Period::new(0, 1));
        let z = normal_quantile(0.5 + self.config.confidence / 2.0);

        let linear_points = linear::forecast(&values, horizon, z);

        let (seasonal_points, seasonal_fell_back) =
            if values.len() >= self.config.min_seasonal_observations {
                match seasonal::fit(&values) {
                    Ok(fitted) => (fitted.forecast(horizon, z), false),
                    Err(err) => {
                        warn!(
                            district = district_code,
                            %err,
                            "seasonal model fell back to linear"
                        );
                        (linear_points.clone(), true)
                    }
                }
            } else {
                debug!(
                    district = district_code,
                    observations = values.len(),
                    "series below seasonal floor, using linear"
                );
                (linear_points.clone(), true)
            };

        // With a fallback both inputs are the same linear run; re-normalising
        // the weights to 1.0 keeps that explicit rather than pretending two
        // models voted.
        let ensemble_points = if seasonal_fell_back {
            linear_points.clone()
        } else {
            blend(&seasonal_points, &linear_points, self.config.seasonal_weight)
        };

        let generated_at = Utc::now();
        for (kind, points) in [
            (ModelKind::Linear, &linear_points),
            (ModelKind::Seasonal, &seasonal_points),
            (ModelKind::Ensemble, &ensemble_points),
        ] {
            let mut period = last_period;
            for point in points {
                period = period.next();
                self.store
                    .upsert_forecast(&ForecastRecord {
                        district_code: district_code.to_string(),
                        model_name: kind.as_str().to_string(),
                        period,
                        predicted_price_m2: round2(point.predicted),
                        lower_bound: round2(point.lower),
                        upper_bound: round2(point.upper),
                        confidence_level: self.config.confidence,
                        generated_at,
                    })
                    .await?;
            }
        }

        let produced_by = match model {
            ModelKind::Linear => ModelKind::Linear,
            ModelKind::Seasonal | ModelKind::Ensemble if seasonal_fell_back => ModelKind::Linear,
            other => other,
        };
        let chosen = match model {
            ModelKind::Linear => &linear_points,
            ModelKind::Seasonal => &seasonal_points,
            ModelKind::Ensemble => &ensemble_points,
        };

        let mut period = last_period;
        let points = chosen
            .iter()
            .map(|point| {
                period = period.next();
                ForecastPoint {
                    period,
                    predicted_price_m2: round2(point.predicted),
                    lower_bound: round2(point.lower),
                    upper_bound: round2(point.upper),
                    confidence_level: self.config.confidence,
                }
            })
            .collect();

        Ok(DistrictForecast {
            district_code: district_code.to_string(),
            model,
            produced_by,
            points,
        })
    }

    /// Stored forecasts for a district and model, no recomputation.
    pub async fn stored(
        &self,
        district_code: &str,
        model: ModelKind,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        let records = self.store.forecasts(district_code, model.as_str()).await?;
        Ok(records.into_iter().map(record_to_point).collect())
    }

    /// Explicit check-then-generate: serve the stored rows when present,
    /// otherwise compute and persist once. Forecasts stay
    /// write-once-per-key until an explicit rerun overwrites them.
    pub async fn stored_or_generate(
        &self,
        district_code: &str,
        model: ModelKind,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        let stored = self.stored(district_code, model).await?;
        if !stored.is_empty() {
            return Ok(stored);
        }
        let generated = self
            .forecast_district(district_code, self.config.horizon, model)
            .await?;
        Ok(generated.points)
    }

    /// Forecast every district sequentially. District-level failures are
    /// collected in the report; only store failures abort the batch.
    pub async fn run_all(&self, horizon: usize) -> Result<ForecastBatchReport, ForecastError> {
        let mut report = ForecastBatchReport { succeeded: Vec::new(), failed: Vec::new() };
        for district in self.store.list_districts().await? {
            match self
                .forecast_district(&district.code, horizon, ModelKind::Ensemble)
                .await
            {
                Ok(_) => report.succeeded.push(district.code),
                Err(ForecastError::Store(err)) => return Err(err.into()),
                Err(err) => {
                    warn!(district = %district.code, %err, "district forecast failed");
                    report.failed.push(DistrictFailure {
                        district: district.code,
                        error: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}

/// Weighted combination applied independently to point, lower, and upper.
fn blend(seasonal: &[RawPoint], linear: &[RawPoint], seasonal_weight: f64) -> Vec<RawPoint> {
    let linear_weight = 1.0 - seasonal_weight;
    seasonal
        .iter()
        .zip(linear)
        .map(|(s, l)| RawPoint {
            predicted: seasonal_weight * s.predicted + linear_weight * l.predicted,
            lower: seasonal_weight * s.lower + linear_weight * l.lower,
            upper: seasonal_weight * s.upper + linear_weight * l.upper,
        })
        .collect()
}

fn record_to_point(record: ForecastRecord) -> ForecastPoint {
    ForecastPoint {
        period: record.period,
        predicted_price_m2: record.predicted_price_m2,
        lower_bound: record.lower_bound,
        upper_bound: record.upper_bound,
        confidence_level: record.confidence_level,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Inverse standard normal CDF (Acklam's rational approximation,
/// |ε| < 1.15e-9 over (0, 1)).
pub(crate) fn normal_quantile(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0, "quantile probability must be in (0, 1)");

    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_690e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(predicted: f64, lower: f64, upper: f64) -> RawPoint {
        RawPoint { predicted, lower, upper }
    }

    #[test]
    fn ensemble_weighting_is_exact() {
        let seasonal = vec![raw(4000.0, 3800.0, 4200.0)];
        let linear = vec![raw(3800.0, 3650.0, 3950.0)];
        let blended = blend(&seasonal, &linear, 0.65);
        assert!((blended[0].predicted - 3930.0).abs() < 1e-9);
        assert!((blended[0].lower - (0.65 * 3800.0 + 0.35 * 3650.0)).abs() < 1e-9);
        assert!((blended[0].upper - (0.65 * 4200.0 + 0.35 * 3950.0)).abs() < 1e-9);
    }

    #[test]
    fn normal_quantile_matches_reference_values() {
        let close = |a: f64, b: f64| (a - b).abs() < 1e-3;
        assert!(close(normal_quantile(0.975), 1.959964));
        assert!(close(normal_quantile(0.95), 1.644854));
        assert!(close(normal_quantile(0.995), 2.575829));
        assert!(close(normal_quantile(0.5), 0.0));
        assert!(close(normal_quantile(0.025), -1.959964));
    }

    #[test]
    fn model_kind_round_trips() {
        for kind in [ModelKind::Linear, ModelKind::Seasonal, ModelKind::Ensemble] {
            assert_eq!(ModelKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ModelKind::parse("prophet"), None);
    }
}
