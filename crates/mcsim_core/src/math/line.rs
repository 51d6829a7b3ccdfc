//! One-dimensional lines: the black-box `x -> y` functions consumed by the
//! curve models and cached agents.

use crate::math::integrate::GaussLegendre10;
use crate::math::interpolate::{
    CubicSplineInterpolator, LinearInterpolator, Method, StepInterpolator,
};
use crate::types::error::SimResult;

/// A real-valued function of one variable with integration capability.
///
/// Implementors are immutable once built; the engine shares them behind
/// `Rc`.
pub trait Line {
    /// Value at `x`.
    fn value(&self, x: f64) -> f64;

    /// Integral from `x0` to `x1`.
    fn integral(&self, x0: f64, x1: f64) -> f64;

    /// Integral from `x0` to `x1` of this line weighted by `weights`.
    fn integral_with(&self, x0: f64, x1: f64, weights: &dyn Line) -> f64 {
        GaussLegendre10.integrate(x0, x1, |x| self.value(x) * weights.value(x))
    }
}

/// A constant line.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatLine {
    y: f64,
}

impl FlatLine {
    /// A line equal to `y` everywhere.
    pub fn new(y: f64) -> Self {
        Self { y }
    }
}

impl Line for FlatLine {
    fn value(&self, _x: f64) -> f64 {
        self.y
    }

    fn integral(&self, x0: f64, x1: f64) -> f64 {
        self.y * (x1 - x0)
    }

    fn integral_with(&self, x0: f64, x1: f64, weights: &dyn Line) -> f64 {
        self.y * weights.integral(x0, x1)
    }
}

enum Interp {
    Linear(LinearInterpolator),
    Step(StepInterpolator),
    Spline(CubicSplineInterpolator),
}

/// A line interpolated from a table of `(x, y)` points.
///
/// The table is validated once at construction; evaluation clamps to the
/// boundary values and integration uses 10-point Gauss-Legendre quadrature.
pub struct InterpolatedLine {
    interp: Interp,
}

impl InterpolatedLine {
    /// Builds a line from a strictly-increasing, non-empty table.
    pub fn new(table: Vec<(f64, f64)>, method: Method) -> SimResult<Self> {
        let interp = match method {
            Method::Linear => Interp::Linear(LinearInterpolator::new(table)?),
            Method::Step(side) => Interp::Step(StepInterpolator::new(table, side)?),
            Method::CubicSpline => Interp::Spline(CubicSplineInterpolator::new(table)?),
        };
        Ok(Self { interp })
    }

    /// Builds a linearly interpolated line.
    pub fn linear(table: Vec<(f64, f64)>) -> SimResult<Self> {
        Self::new(table, Method::Linear)
    }

    /// Builds a line from a function sampled on integer points of `[x0, x1]`
    /// with the given stride.
    pub fn sampled<F: Fn(f64) -> f64>(x0: f64, x1: f64, stride: f64, f: F) -> SimResult<Self> {
        let mut table = Vec::new();
        let mut x = x0;
        while x < x1 {
            table.push((x, f(x)));
            x += stride;
        }
        table.push((x1, f(x1)));
        Self::linear(table)
    }
}

impl Line for InterpolatedLine {
    fn value(&self, x: f64) -> f64 {
        match &self.interp {
            Interp::Linear(i) => i.value(x),
            Interp::Step(i) => i.value(x),
            Interp::Spline(i) => i.value(x),
        }
    }

    fn integral(&self, x0: f64, x1: f64) -> f64 {
        GaussLegendre10.integrate(x0, x1, |x| self.value(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_line() {
        let line = FlatLine::new(2.0);
        assert_eq!(line.value(-10.0), 2.0);
        assert_eq!(line.integral(0.0, 3.0), 6.0);
    }

    #[test]
    fn flat_weighted_integral() {
        let line = FlatLine::new(2.0);
        let weights = FlatLine::new(0.5);
        assert_relative_eq!(line.integral_with(0.0, 4.0, &weights), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn interpolated_line_values() {
        let line = InterpolatedLine::linear(vec![(0.0, 0.0), (10.0, 10.0)]).unwrap();
        assert_relative_eq!(line.value(4.0), 4.0, epsilon = 1e-12);
        assert_relative_eq!(line.integral(0.0, 10.0), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn sampled_line_matches_function() {
        let line = InterpolatedLine::sampled(0.0, 100.0, 1.0, |x| (-0.01 * x).exp()).unwrap();
        for x in [0.0, 13.0, 57.5, 100.0] {
            assert_relative_eq!(line.value(x), (-0.01 * x).exp(), epsilon = 1e-4);
        }
    }

    #[test]
    fn empty_table_fails() {
        assert!(InterpolatedLine::linear(vec![]).is_err());
    }
}
