//! Yield-curve models and their bond sub-agents.
//!
//! A yield curve is an agent whose scalar state is a model-specific short
//! rate, extended with the two discount observables: `discount()` is the
//! rolling money-market numeraire (unity at reset, path dependent) and
//! `discount_to(t)` the price at the current time of a zero-coupon bond
//! paying one unit at `t >= time`.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_agents::agent::Agent;
use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::Time;

mod bonds;
mod composite;
mod hull_white;
mod market;
mod simple;

pub use bonds::{RollingBond, SpotBond, TermBond};
pub use composite::{CombinedCurve, ShiftKind, ShiftedCurve};
pub use hull_white::HullWhiteCurve;
pub use market::{LiborCurve, SwapCurve};
pub use simple::{ConstantRateCurve, StaticCurve};

/// The discount-factor contract of a yield-curve agent.
///
/// # Invariants
///
/// - `discount_to(time)` is one,
/// - discount factors are positive,
/// - under a zero-volatility model, `discount()` at time `t` reproduces the
///   input curve's `df(t)` and `discount_to(T)` reproduces `df(T)/df(t)`.
pub trait YieldCurve: Agent<State = f64> {
    /// Rolling discount bond (cash numeraire): unity at reset, accumulated
    /// along the path.
    fn discount(&self) -> SimResult<f64>;

    /// Price at the current time of a discount bond maturing at `t`.
    fn discount_to(&self, t: Time) -> SimResult<f64>;
}

/// Shared handle to any yield-curve agent.
pub type SharedCurve = Rc<RefCell<dyn YieldCurve>>;
