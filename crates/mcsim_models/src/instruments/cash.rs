//! The interest-accruing cash account and its asynchronous flow connector.

use std::cell::RefCell;
use std::rc::Rc;

use mcsim_agents::agent::{Agent, AgentCore, Lifecycle, Process};
use mcsim_agents::linkage::{require, DepList, Shared, SharedScalar};
use mcsim_core::types::error::SimResult;
use mcsim_core::xml::XmlTag;

use crate::instruments::InstrumentState;

/// Interest-accruing cash balance.
///
/// Each step applies the trapezoidal accrual
/// `balance * (exp(r * dt) + exp(r_prev * dt)) / 2` with the rate read from
/// the connected rate agent plus a spread: the deposit spread while the
/// balance is non-negative, the loan spread while it is negative.
///
/// Flows arrive two ways. Synchronous sources registered with
/// [`connect_flow`](Cash::connect_flow) are pulled during the account's own
/// update. Asynchronous sources go through a [`FlowConnector`] sibling that
/// pushes [`transaction`](Cash::transaction)s after the account has already
/// updated; the connector reconciles the accumulated delta into the exposed
/// `flow` when both sit at the same time. Direct `transaction` calls between
/// updates (deposits, withdrawals, portfolio sweeps) use the same channel.
pub struct Cash {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    rate: Option<SharedScalar>,
    rate_handle: Option<Rc<RefCell<dyn Lifecycle>>>,
    flows: Vec<SharedScalar>,
    loan_spread: f64,
    deposit_spread: f64,
    last_rate: f64,
    local_flow: f64,
}

impl Cash {
    /// An unconfigured account.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            rate: None,
            rate_handle: None,
            flows: Vec::new(),
            loan_spread: 0.0,
            deposit_spread: 0.0,
            last_rate: 0.0,
            local_flow: 0.0,
        }
    }

    /// Connects the accrual rate agent and sets the starting balance and
    /// spreads. The balance is latched when `init` runs.
    pub fn setup<C>(
        &mut self,
        rate: &Shared<C>,
        initial_value: f64,
        loan_spread: f64,
        deposit_spread: f64,
    ) where
        C: Agent<State = f64> + 'static,
    {
        self.core.state.clear();
        self.core.state.value = initial_value;
        self.loan_spread = loan_spread;
        self.deposit_spread = deposit_spread;

        self.deps.clear();
        self.deps.push(rate);
        self.rate = Some(rate.clone() as SharedScalar);
        self.rate_handle = Some(rate.clone() as Rc<RefCell<dyn Lifecycle>>);
    }

    /// Deposits (positive) or withdraws (negative) funds.
    pub fn transaction(&mut self, amount: f64) {
        self.local_flow -= amount;
        self.core.state.value += amount;
    }

    /// Registers a synchronous cashflow source pulled at every update.
    pub fn connect_flow<C: Agent<State = f64> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.push(source);
        self.flows.push(source.clone() as SharedScalar);
    }

    /// Drops every synchronous cashflow source, keeping the rate agent.
    pub fn clear_flows(&mut self) {
        self.flows.clear();
        self.deps.clear();
        if let Some(rate) = &self.rate_handle {
            self.deps.push_erased(rate.clone());
        }
    }

    /// Moves the asynchronous delta into the exposed `flow`; called by the
    /// connector once both agents sit at the same time.
    fn reconcile_flow(&mut self) {
        self.core.state.flow += self.local_flow;
        self.local_flow = 0.0;
    }

    fn accrual_rate(&self) -> SimResult<f64> {
        let rate = require(&self.rate, "cash account rate")?;
        let spread = if self.core.state.value >= 0.0 {
            self.deposit_spread
        } else {
            self.loan_spread
        };
        Ok(rate.borrow().state() + spread)
    }
}

impl Default for Cash {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Cash {
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
        require(&self.rate, "cash account rate")?;
        self.last_rate = self.accrual_rate()?;
        self.local_flow = 0.0;
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.last_rate = self.accrual_rate()?;
        self.local_flow = 0.0;
        self.on_update().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        let pulled: Vec<f64> = self.flows.iter().map(|f| f.borrow().state()).collect();
        for amount in pulled {
            self.transaction(amount);
        }

        let dt = self.core.dt_years();
        let rate = self.accrual_rate()?;
        self.core.state.value *= ((rate * dt).exp() + (self.last_rate * dt).exp()) / 2.0;
        self.last_rate = rate;

        self.core.state.flow = self.local_flow;
        self.local_flow = 0.0;
        Ok(true)
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("loan_spread", self.loan_spread)
            .attr("deposit_spread", self.deposit_spread)
    }
}

mcsim_agents::impl_agent!(Cash);

/// Feeds transactions into a cash account without making the account a
/// dependency, so that agents depending on the account can still feed back
/// into it.
///
/// The traversal order must place the connector after the account at every
/// fix; connecting sources that are also parents of the account guarantees
/// this, since the account finishes updating before any of its parents run.
/// The connector's scalar state mirrors the account balance.
pub struct FlowConnector {
    core: AgentCore<f64>,
    deps: DepList,
    account: Option<Shared<Cash>>,
    sources: Vec<SharedScalar>,
}

impl FlowConnector {
    /// An unconfigured connector.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            account: None,
            sources: Vec::new(),
        }
    }

    /// Binds the target account. Deliberately not connected as a
    /// dependency.
    pub fn set_account(&mut self, account: &Shared<Cash>) {
        self.account = Some(account.clone());
        self.core.state = 0.0;
    }

    /// Registers a cashflow source drained into the account each step.
    pub fn connect<C: Agent<State = f64> + 'static>(&mut self, source: &Shared<C>) {
        self.deps.push(source);
        self.sources.push(source.clone() as SharedScalar);
    }

    fn drain(&mut self) -> SimResult<bool> {
        let account = require(&self.account, "flow connector account")?.clone();
        for source in &self.sources {
            account.borrow_mut().transaction(source.borrow().state());
        }

        let mut account = account.borrow_mut();
        if account.core.time() == self.core.time() {
            account.reconcile_flow();
        }
        self.core.state = account.core.state.value;
        Ok(true)
    }
}

impl Default for FlowConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for FlowConnector {
    type State = f64;

    fn core(&self) -> &AgentCore<f64> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<f64> {
        &mut self.core
    }
    fn deps(&self) -> &DepList {
        &self.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.account, "flow connector account").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.drain().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.drain()
    }
}

mcsim_agents::impl_agent!(FlowConnector);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mcsim_agents::basic::Constant;
    use mcsim_agents::driver::SimContext;

    fn rate(r: f64) -> Shared<Constant<f64>> {
        Rc::new(RefCell::new(Constant::new(r)))
    }

    #[test]
    fn balance_accrues_continuously_compounded_interest() {
        let ctx = SimContext::standalone();
        let mut cash = Cash::new();
        cash.setup(&rate(0.10), 1.0, 0.0, 0.0);

        cash.init(0, 730, &ctx).unwrap();
        cash.reset().unwrap();
        for fix in [180, 365, 545, 730] {
            cash.update(fix).unwrap();
            // With a constant rate the trapezoid is exact.
            assert_relative_eq!(
                cash.state().value,
                (0.10 * fix as f64 / 365.0).exp(),
                epsilon = 1e-6
            );
        }
    }

    #[test]
    fn spreads_follow_the_balance_sign() {
        let ctx = SimContext::standalone();
        let mut deposit = Cash::new();
        deposit.setup(&rate(0.05), 1.0, 0.10, 0.01);
        deposit.init(0, 365, &ctx).unwrap();
        deposit.reset().unwrap();
        deposit.update(365).unwrap();
        assert_relative_eq!(deposit.state().value, (0.06f64).exp(), epsilon = 1e-9);

        let mut loan = Cash::new();
        loan.setup(&rate(0.05), -1.0, 0.10, 0.01);
        loan.init(0, 365, &ctx).unwrap();
        loan.reset().unwrap();
        loan.update(365).unwrap();
        assert_relative_eq!(loan.state().value, -(0.15f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn transactions_adjust_balance_and_surface_as_flow() {
        let ctx = SimContext::standalone();
        let mut cash = Cash::new();
        cash.setup(&rate(0.0), 0.0, 0.0, 0.0);
        cash.init(0, 365, &ctx).unwrap();
        cash.reset().unwrap();

        cash.transaction(50.0);
        assert_relative_eq!(cash.state().value, 50.0);

        cash.update(100).unwrap();
        assert_relative_eq!(cash.state().value, 50.0);
        assert_relative_eq!(cash.state().flow, -50.0);

        cash.update(200).unwrap();
        assert_relative_eq!(cash.state().flow, 0.0);
    }

    #[test]
    fn synchronous_flows_are_pulled_each_update() {
        let ctx = SimContext::standalone();
        let mut cash = Cash::new();
        cash.setup(&rate(0.0), 0.0, 0.0, 0.0);
        let feed = rate(2.0); // constant inflow of 2 per step
        cash.connect_flow(&feed);

        cash.init(0, 365, &ctx).unwrap();
        cash.reset().unwrap();
        let after_reset = cash.state().value;
        cash.update(100).unwrap();
        assert_relative_eq!(cash.state().value, after_reset + 2.0);
        cash.update(200).unwrap();
        assert_relative_eq!(cash.state().value, after_reset + 4.0);
    }

    #[test]
    fn reset_restores_the_initial_balance() {
        let ctx = SimContext::standalone();
        let mut cash = Cash::new();
        cash.setup(&rate(0.10), 1.0, 0.0, 0.0);
        cash.init(0, 730, &ctx).unwrap();
        cash.reset().unwrap();
        cash.update(365).unwrap();
        assert!(cash.state().value > 1.0);
        cash.reset().unwrap();
        assert_relative_eq!(cash.state().value, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn connector_reconciles_when_times_agree() {
        let ctx = SimContext::standalone();
        let cash = Rc::new(RefCell::new(Cash::new()));
        cash.borrow_mut().setup(&rate(0.0), 0.0, 0.0, 0.0);

        let feed = rate(5.0);
        let mut connector = FlowConnector::new();
        connector.set_account(&cash);
        connector.connect(&feed);

        cash.borrow_mut().init(0, 365, &ctx).unwrap();
        connector.init(0, 365, &ctx).unwrap();
        cash.borrow_mut().reset().unwrap();
        connector.reset().unwrap();
        // The reset drain already lands one deposit.
        assert_relative_eq!(cash.borrow().state().value, 5.0);

        // Account first, connector second, as the traversal order would.
        cash.borrow_mut().update(100).unwrap();
        assert_relative_eq!(cash.borrow().state().flow, 0.0);
        connector.update(100).unwrap();

        let state = cash.borrow().state();
        assert_relative_eq!(state.value, 10.0);
        // The asynchronous deposit shows up in the account flow at once.
        assert_relative_eq!(state.flow, -5.0);
        assert_relative_eq!(connector.state(), 10.0);
    }
}
