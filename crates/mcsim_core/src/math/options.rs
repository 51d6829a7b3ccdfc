//! Closed-form option values: intrinsic, Black (lognormal forward) and
//! Bachelier (normal forward).

use crate::math::distributions::{norm_cdf, norm_pdf};
use crate::math::numeric::TINY;

/// Plain-vanilla option side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptionKind {
    /// Right to buy at the strike.
    Call,
    /// Right to sell at the strike.
    Put,
}

impl OptionKind {
    /// +1.0 for calls, -1.0 for puts.
    pub fn sign(self) -> f64 {
        match self {
            Self::Call => 1.0,
            Self::Put => -1.0,
        }
    }
}

/// Discounted intrinsic value against a forward.
pub fn intrinsic(kind: OptionKind, strike: f64, forward: f64, discount_factor: f64) -> f64 {
    match kind {
        OptionKind::Call => discount_factor * (forward - strike).max(0.0),
        OptionKind::Put => discount_factor * (strike - forward).max(0.0),
    }
}

/// Black formula on a lognormal forward.
///
/// Degenerate variance (`volatility² · maturity` below [`TINY`]) collapses to
/// the intrinsic value.
pub fn black(
    kind: OptionKind,
    strike: f64,
    maturity: f64,
    forward: f64,
    volatility: f64,
    discount_factor: f64,
) -> f64 {
    if volatility * volatility * maturity < TINY {
        return intrinsic(kind, strike, forward, discount_factor);
    }

    let stddev = volatility * maturity.sqrt();
    let d1 = ((forward / strike).ln() + 0.5 * volatility * volatility * maturity) / stddev;
    let d2 = d1 - stddev;

    match kind {
        OptionKind::Call => discount_factor * (forward * norm_cdf(d1) - strike * norm_cdf(d2)),
        OptionKind::Put => discount_factor * (strike * norm_cdf(-d2) - forward * norm_cdf(-d1)),
    }
}

/// Bachelier formula on a normally distributed forward.
///
/// Degenerate variance collapses to the intrinsic value.
pub fn bachelier(
    kind: OptionKind,
    strike: f64,
    maturity: f64,
    forward: f64,
    volatility: f64,
    discount_factor: f64,
) -> f64 {
    if volatility * volatility * maturity < TINY {
        return intrinsic(kind, strike, forward, discount_factor);
    }

    let stddev = volatility * maturity.sqrt();
    let d = (forward - strike) / stddev;
    let call = (forward - strike) * norm_cdf(d) + stddev * norm_pdf(d);

    match kind {
        OptionKind::Call => discount_factor * call,
        OptionKind::Put => discount_factor * (call - forward + strike),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn intrinsic_values() {
        assert_eq!(intrinsic(OptionKind::Call, 100.0, 110.0, 1.0), 10.0);
        assert_eq!(intrinsic(OptionKind::Call, 100.0, 90.0, 1.0), 0.0);
        assert_eq!(intrinsic(OptionKind::Put, 100.0, 90.0, 0.5), 5.0);
    }

    #[test]
    fn black_atm_reference() {
        // ATM Black value = F * (2 * N(sigma * sqrt(T) / 2) - 1).
        let value = black(OptionKind::Call, 100.0, 1.0, 100.0, 0.2, 1.0);
        let expected = 100.0 * (2.0 * norm_cdf(0.1) - 1.0);
        assert_relative_eq!(value, expected, epsilon = 1e-6);
    }

    #[test]
    fn black_put_call_parity() {
        let (f, k, t, v, df) = (105.0, 100.0, 2.0, 0.3, 0.9);
        let call = black(OptionKind::Call, k, t, f, v, df);
        let put = black(OptionKind::Put, k, t, f, v, df);
        assert_relative_eq!(call - put, df * (f - k), epsilon = 1e-8);
    }

    #[test]
    fn black_zero_vol_is_intrinsic() {
        let value = black(OptionKind::Call, 100.0, 1.0, 110.0, 0.0, 0.95);
        assert_relative_eq!(value, 0.95 * 10.0, epsilon = 1e-12);
    }

    #[test]
    fn bachelier_atm_reference() {
        // ATM Bachelier value = sigma * sqrt(T) / sqrt(2 pi).
        let value = bachelier(OptionKind::Call, 100.0, 1.0, 100.0, 5.0, 1.0);
        assert_relative_eq!(
            value,
            5.0 / (2.0 * std::f64::consts::PI).sqrt(),
            epsilon = 1e-8
        );
    }

    #[test]
    fn bachelier_put_call_parity() {
        let (f, k, t, v, df) = (102.0, 100.0, 0.5, 8.0, 0.97);
        let call = bachelier(OptionKind::Call, k, t, f, v, df);
        let put = bachelier(OptionKind::Put, k, t, f, v, df);
        assert_relative_eq!(call - put, df * (f - k), epsilon = 1e-8);
    }
}
