//! Weighted aggregation of instruments, optionally self-financing through a
//! cash account.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::basic::Constant;
use mcsim_agents::linkage::{DepList, Shared, SharedScalar};
use mcsim_core::types::error::SimResult;
use mcsim_core::xml::XmlTag;

use crate::instruments::{Cash, InstrumentState, SharedInstrument};

/// Weighted sum of instrument states. Weights are agents themselves, so a
/// strategy can rebalance along the path.
///
/// With a cash account attached the portfolio becomes self-financing:
/// instrument flows are swept into the account (earning interest from the
/// next period), the portfolio's own `flow` reads zero, and the account
/// balance is folded into the portfolio value. Net instrument flows remain
/// visible on the account's ledger.
pub struct Portfolio {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    cash: Option<Shared<Cash>>,
    items: Vec<(SharedInstrument, SharedScalar)>,
}

impl Portfolio {
    /// An empty portfolio.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            cash: None,
            items: Vec::new(),
        }
    }

    /// Removes every instrument and the cash account.
    pub fn clear(&mut self) {
        self.deps.clear();
        self.items.clear();
        self.cash = None;
    }

    /// Attaches a cash account accruing at `rate`, making the portfolio
    /// self-financing.
    pub fn set_cash_account<C>(
        &mut self,
        rate: &Shared<C>,
        initial_value: f64,
        loan_spread: f64,
        deposit_spread: f64,
    ) where
        C: Agent<State = f64> + 'static,
    {
        let mut cash = Cash::new();
        cash.setup(rate, initial_value, loan_spread, deposit_spread);
        let cash = Rc::new(RefCell::new(cash));
        self.deps.push(&cash);
        self.cash = Some(cash);
    }

    /// The attached cash account, if any.
    pub fn cash_account(&self) -> Option<Shared<Cash>> {
        self.cash.clone()
    }

    /// Adds an instrument at a fixed weight.
    pub fn add_instrument<I>(&mut self, instrument: &Shared<I>, weight: f64)
    where
        I: Agent<State = InstrumentState> + 'static,
    {
        let weight = Rc::new(RefCell::new(Constant::new(weight)));
        self.add_instrument_weighted(instrument, &weight);
    }

    /// Adds an instrument whose weight is itself an agent.
    pub fn add_instrument_weighted<I, W>(&mut self, instrument: &Shared<I>, weight: &Shared<W>)
    where
        I: Agent<State = InstrumentState> + 'static,
        W: Agent<State = f64> + 'static,
    {
        self.deps.push(instrument);
        self.deps.push(weight);
        self.items.push((
            instrument.clone() as SharedInstrument,
            weight.clone() as SharedScalar,
        ));
    }

    /// Number of held instruments.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no instruments are held.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn aggregate(&mut self) -> SimResult<bool> {
        self.core.state.clear();
        for (instrument, weight) in &self.items {
            self.core.state += instrument.borrow().state() * weight.borrow().state();
        }

        if let Some(cash) = &self.cash {
            // Sweep the period's flows into the account; they start earning
            // interest from the next accrual.
            cash.borrow_mut().transaction(self.core.state.flow);
            self.core.state.flow = 0.0;
            self.core.state.value += cash.borrow().state().value;
        }

        Ok(!self.core.state.matured)
    }
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Portfolio {
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

    fn on_reset(&mut self) -> SimResult<()> {
        self.aggregate().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.aggregate()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("instruments", self.items.len())
            .attr("self_financing", self.cash.is_some())
    }
}

mcsim_agents::impl_agent!(Portfolio);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curves::ConstantRateCurve;
    use crate::instruments::FixedPayment;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::Lifecycle;
    use mcsim_agents::driver::SimContext;

    fn payment(curve: &Shared<ConstantRateCurve>, pay: i64, amount: f64) -> Shared<FixedPayment> {
        let mut p = FixedPayment::new();
        p.setup(curve, pay, amount);
        Rc::new(RefCell::new(p))
    }

    #[test]
    fn weighted_sum_of_instruments() {
        let ctx = SimContext::standalone();
        let curve = Rc::new(RefCell::new(ConstantRateCurve::new(0.0)));
        let a = payment(&curve, 100, 10.0);
        let b = payment(&curve, 200, 10.0);

        let mut portfolio = Portfolio::new();
        portfolio.add_instrument(&a, 1.0);
        portfolio.add_instrument(&b, 3.0);

        portfolio.init(0, 365, &ctx).unwrap();
        portfolio.reset().unwrap();
        assert_relative_eq!(portfolio.state().value, 40.0, epsilon = 1e-12);

        portfolio.update(100).unwrap();
        let state = portfolio.state();
        assert_relative_eq!(state.flow, 10.0, epsilon = 1e-12);
        assert_relative_eq!(state.value, 30.0, epsilon = 1e-12);
    }

    #[test]
    fn self_financing_portfolio_routes_flows_to_cash() {
        let ctx = SimContext::standalone();
        let curve = Rc::new(RefCell::new(ConstantRateCurve::new(0.0)));
        let rate = Rc::new(RefCell::new(mcsim_agents::basic::Constant::new(0.0)));
        let instrument = payment(&curve, 100, 10.0);

        let mut portfolio = Portfolio::new();
        portfolio.set_cash_account(&rate, 0.0, 0.0, 0.0);
        portfolio.add_instrument(&instrument, 1.0);

        portfolio.init(0, 365, &ctx).unwrap();
        portfolio.reset().unwrap();

        for fix in [50, 100, 200, 300] {
            portfolio.update(fix).unwrap();
            // Self-financing: the portfolio itself never shows a flow.
            assert_relative_eq!(portfolio.state().flow, 0.0);
        }

        // The payment landed in the account and the total value carried.
        let cash = portfolio.cash_account().unwrap();
        assert_relative_eq!(cash.borrow().state().value, 10.0, epsilon = 1e-12);
        assert_relative_eq!(portfolio.state().value, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn agent_weights_rebalance_mid_path() {
        let ctx = SimContext::standalone();
        let curve = Rc::new(RefCell::new(ConstantRateCurve::new(0.0)));
        let instrument = payment(&curve, 300, 10.0);
        let weight = Rc::new(RefCell::new(Constant::new(1.0)));

        let mut portfolio = Portfolio::new();
        portfolio.add_instrument_weighted(&instrument, &weight);

        portfolio.init(0, 365, &ctx).unwrap();
        portfolio.reset().unwrap();
        portfolio.update(50).unwrap();
        assert_relative_eq!(portfolio.state().value, 10.0, epsilon = 1e-12);

        weight.borrow_mut().set(2.5);
        portfolio.update(100).unwrap();
        assert_relative_eq!(portfolio.state().value, 25.0, epsilon = 1e-12);
    }
}
