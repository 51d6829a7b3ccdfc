//! Single-coupon instruments.

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::linkage::{require, DepList, Shared, SharedScalar};
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::Time;
use mcsim_core::xml::XmlTag;

use crate::curves::{SharedCurve, YieldCurve};
use crate::instruments::InstrumentState;

fn check_coupon_dates(fix: Time, start: Time, end: Time, pay: Time) -> SimResult<()> {
    if pay < fix {
        return Err(SimError::InvalidSchedule(format!(
            "payment date {} before fixing date {}",
            pay, fix
        )));
    }
    if end < start {
        return Err(SimError::InvalidSchedule(format!(
            "accrual end {} before accrual start {}",
            end, start
        )));
    }
    Ok(())
}

/// A single dated payment: `amount * df(pay)` before the pay date, the
/// amount as a flow at the pay date, then matured.
pub struct FixedPayment {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    curve: Option<SharedCurve>,
    pay: Time,
    amount: f64,
}

impl FixedPayment {
    /// An unconfigured payment.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            pay: 0,
            amount: 0.0,
        }
    }

    /// Connects the discount curve and sets the payment terms.
    pub fn setup<Y: YieldCurve + 'static>(&mut self, curve: &Shared<Y>, pay: Time, amount: f64) {
        self.deps.clear();
        self.deps.push(curve);
        self.curve = Some(curve.clone() as SharedCurve);
        self.pay = pay;
        self.amount = amount;
    }

    /// Connects the discount curve and sets the terms as a fixed-rate coupon
    /// accruing over `[start, end]` and paying `rate * year_fraction` at
    /// `pay`.
    pub fn setup_coupon<Y: YieldCurve + 'static>(
        &mut self,
        curve: &Shared<Y>,
        start: Time,
        end: Time,
        pay: Time,
        rate: f64,
        year_fraction: f64,
    ) -> SimResult<()> {
        check_coupon_dates(start, start, end, pay)?;
        self.setup(curve, pay, rate * year_fraction);
        Ok(())
    }

    fn revalue(&mut self) -> SimResult<bool> {
        if self.core.state.matured {
            self.core.state.flow = 0.0;
            self.core.state.value = 0.0;
            return Ok(false);
        }

        if self.core.time() >= self.pay {
            self.core.state.flow = self.amount;
            self.core.state.value = 0.0;
            self.core.state.matured = true;
        } else {
            let curve = require(&self.curve, "fixed payment curve")?;
            self.core.state.value = self.amount * curve.borrow().discount_to(self.pay)?;
        }
        Ok(true)
    }
}

impl Default for FixedPayment {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for FixedPayment {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.curve, "fixed payment curve").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.revalue().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.revalue()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("pay", self.pay).attr("amount", self.amount)
    }
}

mcsim_agents::impl_agent!(FixedPayment);

/// A fixed-rate coupon is a fixed payment whose amount is derived from a
/// rate and an accrual year fraction; see
/// [`FixedPayment::setup_coupon`].
pub type FixedCoupon = FixedPayment;

/// Vanilla floating coupon: the rate fixes at the fix date from the forward
/// implied by the discount curve over the accrual period,
/// `multiplier * (df(start) / df(end) - 1)`.
pub struct VanillaFloatCoupon {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    curve: Option<SharedCurve>,
    fix: Time,
    accrual_start: Time,
    accrual_end: Time,
    pay: Time,
    multiplier: f64,
    year_fraction: f64,
    amount: f64,
    fixed: bool,
}

impl VanillaFloatCoupon {
    /// An unconfigured coupon.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            fix: 0,
            accrual_start: 0,
            accrual_end: 0,
            pay: 0,
            multiplier: 0.0,
            year_fraction: 0.0,
            amount: 0.0,
            fixed: false,
        }
    }

    /// Connects the discount curve and sets the coupon terms.
    #[allow(clippy::too_many_arguments)]
    pub fn setup<Y: YieldCurve + 'static>(
        &mut self,
        curve: &Shared<Y>,
        fix: Time,
        start: Time,
        end: Time,
        pay: Time,
        multiplier: f64,
        year_fraction: f64,
    ) -> SimResult<()> {
        check_coupon_dates(fix, start, end, pay)?;
        self.deps.clear();
        self.deps.push(curve);
        self.curve = Some(curve.clone() as SharedCurve);
        self.fix = fix;
        self.accrual_start = start;
        self.accrual_end = end;
        self.pay = pay;
        self.multiplier = multiplier;
        self.year_fraction = year_fraction;
        Ok(())
    }

    fn forward_rate(&self) -> SimResult<f64> {
        let curve = require(&self.curve, "float coupon curve")?;
        let df_start = curve.borrow().discount_to(self.accrual_start)?;
        let df_end = curve.borrow().discount_to(self.accrual_end)?;
        Ok(self.multiplier * (df_start / df_end - 1.0))
    }

    fn revalue(&mut self) -> SimResult<bool> {
        if self.core.state.matured {
            self.core.state.flow = 0.0;
            self.core.state.value = 0.0;
            return Ok(false);
        }

        if self.core.time() >= self.pay {
            self.core.state.flow = self.amount;
            self.core.state.value = 0.0;
            self.core.state.matured = true;
            return Ok(true);
        }

        if !self.fixed {
            self.amount = self.forward_rate()? * self.year_fraction;
            if self.core.time() >= self.fix {
                self.fixed = true;
            }
        }

        let curve = require(&self.curve, "float coupon curve")?;
        self.core.state.value = self.amount * curve.borrow().discount_to(self.pay)?;
        Ok(true)
    }
}

impl Default for VanillaFloatCoupon {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for VanillaFloatCoupon {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.curve, "float coupon curve")?;
        if self.fix < self.core.start() {
            return Err(SimError::InvalidSchedule(format!(
                "fixing date {} before simulation start {}",
                self.fix,
                self.core.start()
            )));
        }
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.fixed = false;
        self.revalue().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.revalue()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("fix", self.fix)
            .attr("start", self.accrual_start)
            .attr("end", self.accrual_end)
            .attr("pay", self.pay)
            .attr("multiplier", self.multiplier)
    }
}

mcsim_agents::impl_agent!(VanillaFloatCoupon);

/// Floating coupon fixing against an external index process instead of the
/// curve's forward. The index must report the forward value of the
/// underlying after any corrections.
pub struct IndexedFloatCoupon {
    inner: VanillaFloatCoupon,
    index: Option<SharedScalar>,
}

impl IndexedFloatCoupon {
    /// An unconfigured coupon.
    pub fn new() -> Self {
        Self {
            inner: VanillaFloatCoupon::new(),
            index: None,
        }
    }

    /// Connects the discount curve and the fixing index, and sets the
    /// coupon terms.
    #[allow(clippy::too_many_arguments)]
    pub fn setup<Y, I>(
        &mut self,
        curve: &Shared<Y>,
        index: &Shared<I>,
        fix: Time,
        start: Time,
        end: Time,
        pay: Time,
        multiplier: f64,
        year_fraction: f64,
    ) -> SimResult<()>
    where
        Y: YieldCurve + 'static,
        I: Agent<State = f64> + 'static,
    {
        self.inner
            .setup(curve, fix, start, end, pay, multiplier, year_fraction)?;
        self.inner.deps.push(index);
        self.index = Some(index.clone() as SharedScalar);
        Ok(())
    }
}

impl Default for IndexedFloatCoupon {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for IndexedFloatCoupon {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.inner.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.inner.core
    }
    fn deps(&self) -> &DepList {
        &self.inner.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.index, "indexed coupon index")?;
        self.inner.on_init()
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.inner.fixed = false;
        self.on_update().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let coupon = &mut self.inner;
        if coupon.core.state.matured {
            coupon.core.state.flow = 0.0;
            coupon.core.state.value = 0.0;
            return Ok(false);
        }

        if coupon.core.time() >= coupon.pay {
            coupon.core.state.flow = coupon.amount;
            coupon.core.state.value = 0.0;
            coupon.core.state.matured = true;
            return Ok(true);
        }

        if !coupon.fixed {
            let index = require(&self.index, "indexed coupon index")?;
            coupon.amount =
                index.borrow().state() * coupon.multiplier * coupon.year_fraction;
            if coupon.core.time() >= coupon.fix {
                coupon.fixed = true;
            }
        }

        let curve = require(&coupon.curve, "float coupon curve")?;
        coupon.core.state.value = coupon.amount * curve.borrow().discount_to(coupon.pay)?;
        Ok(true)
    }
}

mcsim_agents::impl_agent!(IndexedFloatCoupon);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::ConstantRateCurve;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::Lifecycle;
    use mcsim_agents::basic::Constant;
    use mcsim_agents::driver::SimContext;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn curve(rate: f64) -> Shared<ConstantRateCurve> {
        Rc::new(RefCell::new(ConstantRateCurve::new(rate)))
    }

    #[test]
    fn fixed_payment_discounts_then_pays() {
        let ctx = SimContext::standalone();
        let yc = curve(0.05);
        let mut payment = FixedPayment::new();
        payment.setup(&yc, 365, 100.0);

        payment.init(0, 730, &ctx).unwrap();
        payment.reset().unwrap();
        let state = payment.state();
        assert_relative_eq!(state.value, 100.0 * (-0.05f64).exp(), epsilon = 1e-9);
        assert_relative_eq!(state.flow, 0.0);

        payment.update(365).unwrap();
        let state = payment.state();
        assert_relative_eq!(state.flow, 100.0);
        assert_relative_eq!(state.value, 0.0);
        assert!(state.matured);

        payment.update(400).unwrap();
        let state = payment.state();
        assert_relative_eq!(state.flow, 0.0);
        assert!(!payment.is_live());
    }

    #[test]
    fn fixed_coupon_amount_is_rate_times_year_fraction() {
        let ctx = SimContext::standalone();
        let yc = curve(0.05);
        let mut coupon = FixedCoupon::new();
        coupon
            .setup_coupon(&yc, 0, 182, 182, 0.04, 0.5)
            .unwrap();
        coupon.init(0, 365, &ctx).unwrap();
        coupon.reset().unwrap();
        coupon.update(182).unwrap();
        assert_relative_eq!(coupon.state().flow, 0.02, epsilon = 1e-12);
    }

    #[test]
    fn vanilla_float_fixes_the_forward() {
        let ctx = SimContext::standalone();
        let yc = curve(0.05);
        let mut coupon = VanillaFloatCoupon::new();
        coupon.setup(&yc, 30, 30, 212, 212, 1.0, 0.5).unwrap();

        coupon.init(0, 365, &ctx).unwrap();
        coupon.reset().unwrap();

        // Forward over [30, 212] under a flat 5% curve.
        let expected_rate = (0.05_f64 * 182.0 / 365.0).exp() - 1.0;
        coupon.update(30).unwrap();
        let value = coupon.state().value;
        assert!(value > 0.0);

        coupon.update(212).unwrap();
        assert_relative_eq!(coupon.state().flow, expected_rate * 0.5, epsilon = 1e-9);
    }

    #[test]
    fn fixing_before_start_is_rejected() {
        let ctx = SimContext::standalone();
        let yc = curve(0.05);
        let mut coupon = VanillaFloatCoupon::new();
        coupon.setup(&yc, 10, 10, 100, 100, 1.0, 0.25).unwrap();
        let err = coupon.init(20, 365, &ctx).unwrap_err();
        assert!(matches!(err, SimError::InvalidSchedule(_)));
    }

    #[test]
    fn indexed_float_reads_the_index() {
        let ctx = SimContext::standalone();
        let yc = curve(0.0);
        let index = Rc::new(RefCell::new(Constant::new(0.03)));
        let mut coupon = IndexedFloatCoupon::new();
        coupon
            .setup(&yc, &index, 30, 30, 212, 212, 2.0, 0.5)
            .unwrap();

        coupon.init(0, 365, &ctx).unwrap();
        coupon.reset().unwrap();
        coupon.update(212).unwrap();
        assert_relative_eq!(coupon.state().flow, 0.03 * 2.0 * 0.5, epsilon = 1e-12);
    }
}
