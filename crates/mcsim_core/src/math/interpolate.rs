//! Tabulated interpolators over sorted `(x, y)` points.
//!
//! All interpolators validate their table at construction and are infallible
//! afterwards. Queries outside the table clamp to the boundary values.

use crate::math::numeric::{sorted_find, TINY};
use crate::types::error::{SimError, SimResult};

/// Side on which a piecewise-constant interpolator is continuous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSide {
    /// Value jumps at the right node: the interval takes its left value.
    LeftContinuous,
    /// Value jumps at the left node: the interval takes its right value.
    RightContinuous,
}

/// Interpolation method of an [`crate::math::line::InterpolatedLine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Piecewise linear between adjacent nodes.
    Linear,
    /// Piecewise constant.
    Step(StepSide),
    /// Natural cubic spline.
    CubicSpline,
}

fn check_table(table: &[(f64, f64)]) -> SimResult<()> {
    if table.is_empty() {
        return Err(SimError::invalid_state(
            "interpolation table",
            "no points supplied",
        ));
    }
    for pair in table.windows(2) {
        if pair[1].0 <= pair[0].0 {
            return Err(SimError::InvalidArgument(format!(
                "interpolation abscissae must be strictly increasing ({} then {})",
                pair[0].0, pair[1].0
            )));
        }
    }
    Ok(())
}

/// Piecewise-linear interpolation over a validated table.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    table: Vec<(f64, f64)>,
    xs: Vec<f64>,
}

impl LinearInterpolator {
    /// Builds the interpolator; the table must be non-empty and strictly
    /// increasing in `x`.
    pub fn new(table: Vec<(f64, f64)>) -> SimResult<Self> {
        check_table(&table)?;
        let xs = table.iter().map(|p| p.0).collect();
        Ok(Self { table, xs })
    }

    /// Interpolated value at `x`, clamped to the table boundaries.
    pub fn value(&self, x: f64) -> f64 {
        let first = self.table[0];
        let last = self.table[self.table.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        let i0 = sorted_find(&self.xs, x).unwrap_or(0);
        let (x0, y0) = self.table[i0];
        let (x1, y1) = self.table[i0 + 1];
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

/// Piecewise-constant interpolation over a validated table.
#[derive(Debug, Clone)]
pub struct StepInterpolator {
    table: Vec<(f64, f64)>,
    xs: Vec<f64>,
    side: StepSide,
}

impl StepInterpolator {
    /// Builds the interpolator; the table must be non-empty and strictly
    /// increasing in `x`.
    pub fn new(table: Vec<(f64, f64)>, side: StepSide) -> SimResult<Self> {
        check_table(&table)?;
        let xs = table.iter().map(|p| p.0).collect();
        Ok(Self { table, xs, side })
    }

    /// Interpolated value at `x`, clamped to the table boundaries.
    pub fn value(&self, x: f64) -> f64 {
        let first = self.table[0];
        let last = self.table[self.table.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        let i0 = sorted_find(&self.xs, x).unwrap_or(0);
        let (x0, y0) = self.table[i0];
        let (x1, y1) = self.table[i0 + 1];
        match self.side {
            StepSide::LeftContinuous => {
                if x < x1 - TINY {
                    y0
                } else {
                    y1
                }
            }
            StepSide::RightContinuous => {
                if x > x0 + TINY {
                    y1
                } else {
                    y0
                }
            }
        }
    }
}

/// Natural cubic-spline interpolation over a validated table.
///
/// Second derivatives are precomputed at construction with the classic
/// tridiagonal sweep; boundary second derivatives are zero.
#[derive(Debug, Clone)]
pub struct CubicSplineInterpolator {
    table: Vec<(f64, f64)>,
    xs: Vec<f64>,
    deriv2: Vec<f64>,
}

impl CubicSplineInterpolator {
    /// Builds the spline; the table needs at least two strictly increasing
    /// points.
    pub fn new(table: Vec<(f64, f64)>) -> SimResult<Self> {
        check_table(&table)?;
        if table.len() < 2 {
            return Err(SimError::InvalidArgument(
                "cubic spline needs at least two points".to_string(),
            ));
        }

        let n = table.len();
        let mut deriv2 = vec![0.0; n];
        let mut u = vec![0.0; n];

        for i in 1..n - 1 {
            let (x_prev, y_prev) = table[i - 1];
            let (x_i, y_i) = table[i];
            let (x_next, y_next) = table[i + 1];

            let sig = (x_i - x_prev) / (x_next - x_prev);
            let p = sig * deriv2[i - 1] + 2.0;
            deriv2[i] = (sig - 1.0) / p;

            let slope_hi = (y_next - y_i) / (x_next - x_i);
            let slope_lo = (y_i - y_prev) / (x_i - x_prev);
            u[i] = (6.0 * (slope_hi - slope_lo) / (x_next - x_prev) - sig * u[i - 1]) / p;
        }

        for i in (0..n - 1).rev() {
            deriv2[i] = deriv2[i] * deriv2[i + 1] + u[i];
        }

        let xs = table.iter().map(|p| p.0).collect();
        Ok(Self { table, xs, deriv2 })
    }

    /// Interpolated value at `x`, clamped to the table boundaries.
    pub fn value(&self, x: f64) -> f64 {
        let first = self.table[0];
        let last = self.table[self.table.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }

        let i0 = sorted_find(&self.xs, x).unwrap_or(0);
        let (x0, y0) = self.table[i0];
        let (x1, y1) = self.table[i0 + 1];
        let h = x1 - x0;
        let a = (x1 - x) / h;
        let b = (x - x0) / h;
        a * y0
            + b * y1
            + ((a * a * a - a) * self.deriv2[i0] + (b * b * b - b) * self.deriv2[i0 + 1])
                * (h * h)
                / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> Vec<(f64, f64)> {
        vec![(0.0, 1.0), (10.0, 2.0), (20.0, 0.0)]
    }

    #[test]
    fn empty_table_is_invalid_state() {
        let err = LinearInterpolator::new(vec![]).unwrap_err();
        assert!(matches!(err, SimError::InvalidState { .. }));
    }

    #[test]
    fn unsorted_table_is_rejected() {
        let err = LinearInterpolator::new(vec![(1.0, 0.0), (1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, SimError::InvalidArgument(_)));
    }

    #[test]
    fn linear_interior_and_clamping() {
        let interp = LinearInterpolator::new(table()).unwrap();
        assert_relative_eq!(interp.value(5.0), 1.5, epsilon = 1e-12);
        assert_relative_eq!(interp.value(15.0), 1.0, epsilon = 1e-12);
        assert_eq!(interp.value(-5.0), 1.0);
        assert_eq!(interp.value(25.0), 0.0);
    }

    #[test]
    fn linear_hits_nodes() {
        let interp = LinearInterpolator::new(table()).unwrap();
        assert_relative_eq!(interp.value(10.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn step_left_continuous() {
        let interp = StepInterpolator::new(table(), StepSide::LeftContinuous).unwrap();
        assert_eq!(interp.value(5.0), 1.0);
        assert_eq!(interp.value(10.0), 2.0);
        assert_eq!(interp.value(12.0), 2.0);
    }

    #[test]
    fn step_right_continuous() {
        let interp = StepInterpolator::new(table(), StepSide::RightContinuous).unwrap();
        assert_eq!(interp.value(5.0), 2.0);
        assert_eq!(interp.value(0.0), 1.0);
        assert_eq!(interp.value(12.0), 0.0);
    }

    #[test]
    fn spline_reproduces_nodes() {
        let interp = CubicSplineInterpolator::new(table()).unwrap();
        for (x, y) in table() {
            assert_relative_eq!(interp.value(x), y, epsilon = 1e-10);
        }
    }

    #[test]
    fn spline_is_exact_on_lines() {
        let pts: Vec<(f64, f64)> = (0..6).map(|i| (i as f64, 3.0 * i as f64 + 1.0)).collect();
        let interp = CubicSplineInterpolator::new(pts).unwrap();
        assert_relative_eq!(interp.value(2.5), 8.5, epsilon = 1e-9);
        assert_relative_eq!(interp.value(4.25), 13.75, epsilon = 1e-9);
    }
}
