//! Not-a-knot cubic spline with end-segment extrapolation.
//!
//! Represented by the knot values `y_i` and second derivatives `M_i`. On
//! segment `[x_i, x_{i+1}]` with `t = x - x_i`:
//!
//! ```text
//! S(x) = y_i + b_i t + M_i t^2 / 2 + (M_{i+1} - M_i) t^3 / (6 h_i)
//! b_i  = (y_{i+1} - y_i) / h_i - h_i (2 M_i + M_{i+1}) / 6
//! ```
//!
//! Outside the knots the first or last segment polynomial is continued.
//! Two knots give a line, three knots the interpolating parabola.

use crate::error::{AnalyticsError, AnalyticsResult};

/// Interpolating cubic spline.
#[derive(Debug, Clone, PartialEq)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivative at each knot.
    m: Vec<f64>,
}

impl CubicSpline {
    /// Fit through `(xs, ys)`.
    ///
    /// `xs` must be strictly increasing and every value finite.
    pub fn not_a_knot(xs: &[f64], ys: &[f64]) -> AnalyticsResult<Self> {
        if xs.len() != ys.len() {
            return Err(AnalyticsError::InvalidInput(format!(
                "{} knots but {} values",
                xs.len(),
                ys.len()
            )));
        }
        if xs.len() < 2 {
            return Err(AnalyticsError::InsufficientData(format!("{} knots", xs.len())));
        }
        if xs.iter().chain(ys).any(|v| !v.is_finite()) {
            return Err(AnalyticsError::InvalidInput("non-finite knot".to_string()));
        }
        if xs.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalyticsError::InvalidInput(
                "knots must be strictly increasing".to_string(),
            ));
        }

        let m = match xs.len() {
            2 => vec![0.0; 2],
            3 => {
                let (h0, h1) = (xs[1] - xs[0], xs[2] - xs[1]);
                let d0 = (ys[1] - ys[0]) / h0;
                let d1 = (ys[2] - ys[1]) / h1;
                vec![2.0 * (d1 - d0) / (h0 + h1); 3]
            }
            _ => second_derivatives(xs, ys)?,
        };

        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            m,
        })
    }

    /// Value at `x`.
    pub fn evaluate(&self, x: f64) -> f64 {
        let (i, t, h) = self.locate(x);
        let (mi, mj) = (self.m[i], self.m[i + 1]);
        let b = self.slope(i, h);
        self.ys[i] + b * t + mi * t * t / 2.0 + (mj - mi) * t * t * t / (6.0 * h)
    }

    /// First derivative at `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        let (i, t, h) = self.locate(x);
        let (mi, mj) = (self.m[i], self.m[i + 1]);
        self.slope(i, h) + mi * t + (mj - mi) * t * t / (2.0 * h)
    }

    /// Knot range.
    pub fn domain(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn knots(&self) -> usize {
        self.xs.len()
    }

    fn slope(&self, i: usize, h: f64) -> f64 {
        (self.ys[i + 1] - self.ys[i]) / h - h * (2.0 * self.m[i] + self.m[i + 1]) / 6.0
    }

    /// Segment index, offset into it and its width.
    fn locate(&self, x: f64) -> (usize, f64, f64) {
        let last_segment = self.xs.len() - 2;
        let i = self
            .xs
            .partition_point(|&knot| knot <= x)
            .saturating_sub(1)
            .min(last_segment);
        (i, x - self.xs[i], self.xs[i + 1] - self.xs[i])
    }
}

/// Solve for `M` with four or more knots.
///
/// Interior rows are the usual continuity conditions; the first and last
/// rows force a continuous third derivative at `x_1` and `x_{n-2}`.
fn second_derivatives(xs: &[f64], ys: &[f64]) -> AnalyticsResult<Vec<f64>> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let d: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    let mut a = vec![vec![0.0; n]; n];
    let mut rhs = vec![0.0; n];

    a[0][0] = -h[1];
    a[0][1] = h[0] + h[1];
    a[0][2] = -h[0];

    for i in 1..n - 1 {
        a[i][i - 1] = h[i - 1];
        a[i][i] = 2.0 * (h[i - 1] + h[i]);
        a[i][i + 1] = h[i];
        rhs[i] = 6.0 * (d[i] - d[i - 1]);
    }

    a[n - 1][n - 3] = -h[n - 2];
    a[n - 1][n - 2] = h[n - 3] + h[n - 2];
    a[n - 1][n - 1] = -h[n - 3];

    solve(a, rhs)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> AnalyticsResult<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-300 {
            return Err(AnalyticsError::Singular(format!("zero pivot in column {col}")));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn test_interpolates_knots() {
        let xs = [-0.3, -0.1, 0.05, 0.2, 0.4];
        let ys = [0.62, 0.55, 0.51, 0.53, 0.58];
        let spline = CubicSpline::not_a_knot(&xs, &ys).unwrap();
        for (x, y) in xs.iter().zip(ys) {
            assert!(close(spline.evaluate(*x), y, 1e-12));
        }
    }

    #[test]
    fn test_reproduces_cubic_exactly() {
        // Not-a-knot is exact for any cubic.
        let f = |x: f64| 0.5 - 0.3 * x + 1.2 * x * x + 0.7 * x * x * x;
        let df = |x: f64| -0.3 + 2.4 * x + 2.1 * x * x;
        let xs = [-0.4, -0.25, -0.05, 0.1, 0.3, 0.45];
        let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
        let spline = CubicSpline::not_a_knot(&xs, &ys).unwrap();

        for x in [-0.6, -0.2, 0.0, 0.22, 0.6] {
            assert!(close(spline.evaluate(x), f(x), 1e-9), "value at {x}");
            assert!(close(spline.derivative(x), df(x), 1e-9), "slope at {x}");
        }
    }

    #[test]
    fn test_three_knots_parabola() {
        let f = |x: f64| 1.0 + 2.0 * x - 3.0 * x * x;
        let xs = [-1.0, 0.5, 2.0];
        let ys: Vec<f64> = xs.iter().map(|&x| f(x)).collect();
        let spline = CubicSpline::not_a_knot(&xs, &ys).unwrap();
        assert!(close(spline.derivative(0.0), 2.0, 1e-12));
        assert!(close(spline.evaluate(3.0), f(3.0), 1e-9));
    }

    #[test]
    fn test_two_knots_line() {
        let spline = CubicSpline::not_a_knot(&[0.0, 1.0], &[1.0, 3.0]).unwrap();
        assert!(close(spline.evaluate(-1.0), -1.0, 1e-12));
        assert!(close(spline.derivative(0.7), 2.0, 1e-12));
        assert_eq!(spline.domain(), (0.0, 1.0));
    }

    #[test]
    fn test_rejects_bad_knots() {
        assert!(matches!(
            CubicSpline::not_a_knot(&[0.0], &[1.0]),
            Err(AnalyticsError::InsufficientData(_))
        ));
        assert!(matches!(
            CubicSpline::not_a_knot(&[0.0, 0.0, 1.0], &[1.0, 2.0, 3.0]),
            Err(AnalyticsError::InvalidInput(_))
        ));
        assert!(CubicSpline::not_a_knot(&[0.0, 1.0], &[1.0, f64::NAN]).is_err());
        assert!(CubicSpline::not_a_knot(&[0.0, 1.0], &[1.0]).is_err());
    }

    #[test]
    fn test_deterministic() {
        let xs = [-0.2, -0.1, 0.0, 0.1, 0.2];
        let ys = [0.6, 0.56, 0.54, 0.55, 0.59];
        let a = CubicSpline::not_a_knot(&xs, &ys).unwrap();
        let b = CubicSpline::not_a_knot(&xs, &ys).unwrap();
        assert_eq!(a.derivative(0.0).to_bits(), b.derivative(0.0).to_bits());
    }
}
