//! Time scalars and the year-fraction convention.
//!
//! The engine treats time as an opaque, totally-ordered day count. All the
//! simulation layers need from it is `<`, subtraction (yielding a [`Span`])
//! and a conversion of spans into floating-point years, which is what
//! [`YearFraction`] provides.

use std::fmt;

/// Simulation time coordinate, an integer day count.
///
/// Only ordering and arithmetic matter; day zero is whatever the composer
/// decides it is.
pub type Time = i64;

/// Interval between two [`Time`] values, in days.
pub type Span = i64;

/// Day-count convention converting [`Span`]s to floating-point years.
///
/// One instance is carried per simulation (inside the context handed to
/// `init`) rather than as process-wide state, so concurrent simulators with
/// different conventions cannot interfere.
///
/// # Examples
///
/// ```
/// use mcsim_core::types::time::YearFraction;
///
/// let yf = YearFraction::default();
/// assert_eq!(yf.ratio(), 365.0);
/// assert!((yf.years(365) - 1.0).abs() < 1e-12);
///
/// let act_360 = YearFraction::new(360.0);
/// assert!((act_360.years(180) - 0.5).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct YearFraction {
    ratio: f64,
}

impl YearFraction {
    /// Creates a convention with the given days-per-year ratio.
    pub const fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    /// The days-per-year ratio.
    #[inline]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Converts a span in days to years.
    #[inline]
    pub fn years(&self, dt: Span) -> f64 {
        dt as f64 / self.ratio
    }
}

impl Default for YearFraction {
    /// ACT/365, the convention of the rest of this engine's defaults.
    fn default() -> Self {
        Self { ratio: 365.0 }
    }
}

impl fmt::Display for YearFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACT/{}", self.ratio)
    }
}
