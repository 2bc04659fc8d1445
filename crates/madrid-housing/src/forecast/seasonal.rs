//! Seasonal ARIMA model for quarterly price series.
//!
//! Order (1,1,1) with seasonal order (1,1,0) at period 4: after one regular
//! and one seasonal difference, the stationary series follows
//!
//! ```text
//! w_t = φ·w_{t-1} + Φ·w_{t-4} − φΦ·w_{t-5} + e_t + θ·e_{t-1}
//! ```
//!
//! Parameters are estimated by conditional sum of squares with
//! zero-initialised pre-sample values: a coarse grid over (φ, Φ, θ) followed
//! by coordinate-descent refinement. The optimiser is deterministic, so a
//! refit on the same series reproduces the same parameters.

use thiserror::Error;

use super::RawPoint;

pub const MIN_OBSERVATIONS: usize = 12;
const SEASON: usize = 4;
/// Parameters kept strictly inside the unit interval.
const PARAM_BOUND: f64 = 0.99;

#[derive(Debug, Error)]
pub enum ModelFitError {
    #[error("series too short for the seasonal model: {len} observations, need {min}")]
    TooShort { len: usize, min: usize },

    #[error("seasonal fit did not converge")]
    NonConvergence,
}

pub struct SeasonalModel {
    phi: f64,
    sphi: f64,
    theta: f64,
    sigma2: f64,
    history: Vec<f64>,
    diffed: Vec<f64>,
    residuals: Vec<f64>,
}

/// Fit the model to `values` (chronological order).
pub fn fit(values: &[f64]) -> Result<SeasonalModel, ModelFitError> {
    if values.len() < MIN_OBSERVATIONS {
        return Err(ModelFitError::TooShort {
            len: values.len(),
            min: MIN_OBSERVATIONS,
        });
    }

    let diffed = difference(values);

    let mut best = (f64::INFINITY, [0.0f64; 3]);
    let grid: Vec<f64> = (-9..=9).map(|i| i as f64 * 0.1).collect();
    for &phi in &grid {
        for &sphi in &grid {
            for &theta in &grid {
                let sse = css(&diffed, phi, sphi, theta).0;
                if sse < best.0 {
                    best = (sse, [phi, sphi, theta]);
                }
            }
        }
    }

    let mut params = best.1;
    let mut best_sse = best.0;
    for &step in &[0.05f64, 0.01, 0.002] {
        loop {
            let mut improved = false;
            for i in 0..3 {
                for direction in [step, -step] {
                    let mut candidate = params;
                    candidate[i] =
                        (candidate[i] + direction).clamp(-PARAM_BOUND, PARAM_BOUND);
                    let sse = css(&diffed, candidate[0], candidate[1], candidate[2]).0;
                    if sse < best_sse {
                        best_sse = sse;
                        params = candidate;
                        improved = true;
                    }
                }
            }
            if !improved {
                break;
            }
        }
    }

    if !best_sse.is_finite() {
        return Err(ModelFitError::NonConvergence);
    }

    let [phi, sphi, theta] = params;
    let residuals = css(&diffed, phi, sphi, theta).1;
    let dof = diffed.len().saturating_sub(3).max(1);
    let sigma2 = best_sse / dof as f64;
    if !sigma2.is_finite() {
        return Err(ModelFitError::NonConvergence);
    }

    Ok(SeasonalModel {
        phi,
        sphi,
        theta,
        sigma2,
        history: values.to_vec(),
        diffed,
        residuals,
    })
}

/// Apply one seasonal then one regular difference.
fn difference(values: &[f64]) -> Vec<f64> {
    let seasonal: Vec<f64> = (SEASON..values.len())
        .map(|t| values[t] - values[t - SEASON])
        .collect();
    (1..seasonal.len())
        .map(|t| seasonal[t] - seasonal[t - 1])
        .collect()
}

/// Conditional sum of squares with zero-initialised pre-sample values.
/// Returns (SSE, residuals).
fn css(w: &[f64], phi: f64, sphi: f64, theta: f64) -> (f64, Vec<f64>) {
    let at = |series: &[f64], t: isize| -> f64 {
        if t < 0 {
            0.0
        } else {
            series[t as usize]
        }
    };

    let mut residuals = vec![0.0f64; w.len()];
    let mut sse = 0.0;
    for t in 0..w.len() {
        let ti = t as isize;
        let predicted = phi * at(w, ti - 1) + sphi * at(w, ti - 4)
            - phi * sphi * at(w, ti - 5)
            + theta * at(&residuals, ti - 1);
        residuals[t] = w[t] - predicted;
        sse += residuals[t] * residuals[t];
    }
    (sse, residuals)
}

impl SeasonalModel {
    /// Forecast `horizon` steps with confidence bounds at quantile `z`.
    ///
    /// The point forecast recurses on the differenced series with future
    /// shocks set to zero, then inverts both differences. Interval widths
    /// grow with the ψ-weights of the full lag polynomial:
    /// var(h) = σ²·Σ_{j<h} ψ_j².
    pub fn forecast(&self, horizon: usize, z: f64) -> Vec<RawPoint> {
        let mut y = self.history.clone();
        // Seasonally differenced series aligned so z_ext[i] = y[i+4] - y[i].
        let mut z_ext: Vec<f64> = (SEASON..y.len())
            .map(|t| y[t] - y[t - SEASON])
            .collect();
        let mut w_ext = self.diffed.clone();
        let mut shocks = self.residuals.clone();

        let psi = self.psi_weights(horizon);
        let mut points = Vec::with_capacity(horizon);
        let mut cumulative_var = 0.0;

        for step in 0..horizon {
            let t = w_ext.len() as isize;
            let at = |series: &[f64], i: isize| -> f64 {
                if i < 0 {
                    0.0
                } else {
                    series[i as usize]
                }
            };
            let w_next = self.phi * at(&w_ext, t - 1) + self.sphi * at(&w_ext, t - 4)
                - self.phi * self.sphi * at(&w_ext, t - 5)
                + self.theta * at(&shocks, t - 1);
            w_ext.push(w_next);
            shocks.push(0.0);

            let z_next = z_ext.last().copied().unwrap_or(0.0) + w_next;
            z_ext.push(z_next);
            let y_next = z_next + y[y.len() - SEASON];
            y.push(y_next);

            cumulative_var += psi[step] * psi[step];
            let half_width = z * (self.sigma2 * cumulative_var).sqrt();
            let predicted = y_next.max(0.0);
            points.push(RawPoint {
                predicted,
                lower: (predicted - half_width).max(0.0),
                upper: predicted + half_width,
            });
        }
        points
    }

    /// ψ-weights of AR(B)·y = MA(B)·e where
    /// AR(B) = (1−φB)(1−ΦB⁴)(1−B)(1−B⁴) and MA(B) = 1 + θB.
    fn psi_weights(&self, count: usize) -> Vec<f64> {
        let ar = poly_mul(
            &poly_mul(&[1.0, -self.phi], &seasonal_poly(-self.sphi)),
            &poly_mul(&[1.0, -1.0], &seasonal_poly(-1.0)),
        );

        let mut psi = vec![0.0f64; count.max(1)];
        for j in 0..psi.len() {
            let ma_j = match j {
                0 => 1.0,
                1 => self.theta,
                _ => 0.0,
            };
            let mut acc = ma_j;
            for i in 1..ar.len().min(j + 1) {
                acc -= ar[i] * psi[j - i];
            }
            psi[j] = acc;
        }
        psi
    }
}

/// `1 + c·B⁴` as a coefficient vector.
fn seasonal_poly(c: f64) -> [f64; 5] {
    [1.0, 0.0, 0.0, 0.0, c]
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0f64; a.len() + b.len() - 1];
    for (i, &ai) in a.iter().enumerate() {
        for (j, &bj) in b.iter().enumerate() {
            out[i + j] += ai * bj;
        }
    }
    out
}
