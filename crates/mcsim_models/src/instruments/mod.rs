//! Priced instruments over the composite `{value, flow, matured}` state.

use std::cell::RefCell;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign};
use std::rc::Rc;

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::linkage::{require, DepList, Shared, SharedFlag, SharedScalar};
use mcsim_core::types::error::SimResult;

mod cash;
mod coupons;
mod forward;
mod legs;
mod portfolio;

pub use cash::{Cash, FlowConnector};
pub use coupons::{FixedCoupon, FixedPayment, IndexedFloatCoupon, VanillaFloatCoupon};
pub use forward::{Forward, OptionInstrument, OptionModel};
pub use legs::{FixedLeg, PortfolioEventLeg, PortfolioFixedLeg, RiskyLeg};
pub use portfolio::Portfolio;

/// State of an instrument we can price.
///
/// Addition and scaling are element-wise on `value` and `flow`; a sum is
/// matured only when every term is.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstrumentState {
    /// Market value.
    pub value: f64,
    /// Actual cashflows since the last time step.
    pub flow: f64,
    /// True once the asset has terminated.
    pub matured: bool,
}

impl InstrumentState {
    /// Zero value and flow, not matured.
    pub fn clear(&mut self) {
        self.value = 0.0;
        self.flow = 0.0;
        self.matured = false;
    }
}

impl AddAssign for InstrumentState {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
        self.flow += rhs.flow;
        self.matured = self.matured && rhs.matured;
    }
}

impl Add for InstrumentState {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

impl MulAssign<f64> for InstrumentState {
    fn mul_assign(&mut self, weight: f64) {
        self.value *= weight;
        self.flow *= weight;
    }
}

impl Mul<f64> for InstrumentState {
    type Output = Self;

    fn mul(mut self, weight: f64) -> Self {
        self *= weight;
        self
    }
}

impl DivAssign<f64> for InstrumentState {
    fn div_assign(&mut self, weight: f64) {
        self.value /= weight;
        self.flow /= weight;
    }
}

impl Div<f64> for InstrumentState {
    type Output = Self;

    fn div(mut self, weight: f64) -> Self {
        self /= weight;
        self
    }
}

/// Shared handle to any instrument agent.
pub type SharedInstrument = Rc<RefCell<dyn Agent<State = InstrumentState>>>;

/// User-composed instrument: flows, value and optional maturity are read
/// from arbitrary scalar and boolean agents.
pub struct BasicInstrument {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    flows: Option<SharedScalar>,
    value: Option<SharedScalar>,
    matured: Option<SharedFlag>,
}

impl BasicInstrument {
    /// An unconfigured instrument.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            flows: None,
            value: None,
            matured: None,
        }
    }

    /// Connects the flow and value agents.
    pub fn setup<F, V>(&mut self, flows: &Shared<F>, value: &Shared<V>)
    where
        F: Agent<State = f64> + 'static,
        V: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(flows);
        self.deps.push(value);
        self.flows = Some(flows.clone() as SharedScalar);
        self.value = Some(value.clone() as SharedScalar);
        self.matured = None;
    }

    /// Additionally connects a maturity flag agent.
    pub fn set_matured<M: Agent<State = bool> + 'static>(&mut self, matured: &Shared<M>) {
        self.deps.push(matured);
        self.matured = Some(matured.clone() as SharedFlag);
    }

    fn read(&mut self) -> SimResult<bool> {
        let flows = require(&self.flows, "basic instrument flows")?;
        let value = require(&self.value, "basic instrument value")?;
        self.core.state.flow = flows.borrow().state();
        self.core.state.value = value.borrow().state();
        if let Some(matured) = &self.matured {
            self.core.state.matured = matured.borrow().state();
        }
        Ok(true)
    }
}

impl Default for BasicInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for BasicInstrument {
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
        require(&self.flows, "basic instrument flows")?;
        require(&self.value, "basic instrument value").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.read().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.read()
    }
}

mcsim_agents::impl_agent!(BasicInstrument);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mcsim_agents::agent::Lifecycle;
    use mcsim_agents::basic::{Constant, TimeProcess};
    use mcsim_agents::driver::SimContext;

    #[test]
    fn state_arithmetic() {
        let a = InstrumentState {
            value: 10.0,
            flow: 1.0,
            matured: true,
        };
        let b = InstrumentState {
            value: 5.0,
            flow: -1.0,
            matured: false,
        };

        let sum = a + b;
        assert_relative_eq!(sum.value, 15.0);
        assert_relative_eq!(sum.flow, 0.0);
        assert!(!sum.matured);

        let scaled = a * 2.0;
        assert_relative_eq!(scaled.value, 20.0);
        assert_relative_eq!(scaled.flow, 2.0);
        assert!(scaled.matured);

        let divided = a / 2.0;
        assert_relative_eq!(divided.value, 5.0);

        let both = a + a;
        assert!(both.matured);
    }

    #[test]
    fn clear_resets_everything() {
        let mut s = InstrumentState {
            value: 1.0,
            flow: 2.0,
            matured: true,
        };
        s.clear();
        assert_eq!(s, InstrumentState::default());
    }

    #[test]
    fn basic_instrument_mirrors_its_sources() {
        let ctx = SimContext::standalone();
        let flows = Rc::new(RefCell::new(Constant::new(3.0)));
        let value = Rc::new(RefCell::new(TimeProcess::new()));
        let mut instrument = BasicInstrument::new();
        instrument.setup(&flows, &value);

        instrument.init(0, 100, &ctx).unwrap();
        instrument.reset().unwrap();
        instrument.update(42).unwrap();
        let state = instrument.state();
        assert_relative_eq!(state.flow, 3.0);
        assert_relative_eq!(state.value, 42.0);
        assert!(!state.matured);
    }
}
