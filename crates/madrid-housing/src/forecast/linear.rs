//! Quadratic trend model.
//!
//! Degree-2 polynomial least squares over (period index, price). The
//! confidence interval is symmetric: point ± z·σ with σ the residual
//! standard deviation of the fit.

use super::RawPoint;

pub struct QuadraticFit {
    /// Coefficients `[a0, a1, a2]` of `a0 + a1·x + a2·x²`.
    pub coefficients: [f64; 3],
    pub residual_std: f64,
}

impl QuadraticFit {
    pub fn predict(&self, x: f64) -> f64 {
        let [a0, a1, a2] = self.coefficients;
        a0 + a1 * x + a2 * x * x
    }
}

/// Fit `a0 + a1·x + a2·x²` at x = 0, 1, … via the 3×3 normal equations.
/// Requires at least 3 points; the period indices are distinct, so the
/// system is nonsingular.
pub fn fit(values: &[f64]) -> QuadraticFit {
    debug_assert!(values.len() >= 3, "quadratic fit needs at least 3 points");

    let mut sx = [0.0f64; 5];
    let mut b = [0.0f64; 3];
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        let mut xk = 1.0;
        for s in sx.iter_mut() {
            *s += xk;
            xk *= x;
        }
        b[0] += y;
        b[1] += x * y;
        b[2] += x * x * y;
    }

    let matrix = [
        [sx[0], sx[1], sx[2]],
        [sx[1], sx[2], sx[3]],
        [sx[2], sx[3], sx[4]],
    ];
    let coefficients = solve3(matrix, b);

    let fit = QuadraticFit { coefficients, residual_std: 0.0 };
    let n = values.len() as f64;
    let sse: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &y)| {
            let r = y - fit.predict(i as f64);
            r * r
        })
        .sum();

    QuadraticFit {
        coefficients,
        residual_std: (sse / n).sqrt(),
    }
}

/// Forecast `horizon` steps past the end of `values` with symmetric bounds.
pub fn forecast(values: &[f64], horizon: usize, z: f64) -> Vec<RawPoint> {
    let model = fit(values);
    let half_width = z * model.residual_std;
    let n = values.len();
    (0..horizon)
        .map(|step| {
            let predicted = model.predict((n + step) as f64).max(0.0);
            RawPoint {
                predicted,
                lower: (predicted - half_width).max(0.0),
                upper: predicted + half_width,
            }
        })
        .collect()
}

/// Gaussian elimination with partial pivoting on a 3×3 system.
fn solve3(mut m: [[f64; 3]; 3], mut b: [f64; 3]) -> [f64; 3] {
    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&a, &c| m[a][col].abs().total_cmp(&m[c][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let mut acc = b[row];
        for k in (row + 1)..3 {
            acc -= m[row][k] * x[k];
        }
        x[row] = acc / m[row][row];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
        assert!(
            (actual - expected).abs() < epsilon,
            "actual={actual}, expected={expected}"
        );
    }

    #[test]
    fn recovers_exact_quadratic() {
        // y = 2 + 3x + 0.5x²
        let values: Vec<f64> = (0..10).map(|x| 2.0 + 3.0 * x as f64 + 0.5 * (x * x) as f64).collect();
        let model = fit(&values);
        assert_approx(model.coefficients[0], 2.0, 1e-6);
        assert_approx(model.coefficients[1], 3.0, 1e-6);
        assert_approx(model.coefficients[2], 0.5, 1e-6);
        assert_approx(model.residual_std, 0.0, 1e-6);
    }

    #[test]
    fn exact_fit_yields_degenerate_interval() {
        let values: Vec<f64> = (0..8).map(|x| 100.0 + 10.0 * x as f64).collect();
        let points = forecast(&values, 3, 1.96);
        assert_eq!(points.len(), 3);
        for (step, point) in points.iter().enumerate() {
            assert_approx(point.predicted, 100.0 + 10.0 * (8 + step) as f64, 1e-6);
            assert_approx(point.lower, point.predicted, 1e-6);
            assert_approx(point.upper, point.predicted, 1e-6);
        }
    }

    #[test]
    fn noisy_fit_widens_with_z() {
        let values = vec![100.0, 112.0, 98.0, 121.0, 108.0, 130.0, 118.0, 141.0];
        let narrow = forecast(&values, 1, 1.0);
        let wide = forecast(&values, 1, 2.0);
        assert_approx(narrow[0].predicted, wide[0].predicted, 1e-9);
        let narrow_width = narrow[0].upper - narrow[0].lower;
        let wide_width = wide[0].upper - wide[0].lower;
        assert!(wide_width > narrow_width * 1.9);
    }

    #[test]
    fn predictions_never_go_negative() {
        // Steeply falling series.
        let values: Vec<f64> = (0..10).map(|x| 500.0 - 120.0 * x as f64).collect();
        let points = forecast(&values, 6, 1.96);
        assert!(points.iter().all(|p| p.predicted >= 0.0 && p.lower >= 0.0));
    }
}
