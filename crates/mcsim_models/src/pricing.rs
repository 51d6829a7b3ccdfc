//! Option value processes over simulated forwards.

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::linkage::{require, DepList, Shared, SharedScalar};
use mcsim_core::math::options::{black, OptionKind};
use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::Time;
use mcsim_core::xml::XmlTag;

/// Undiscounted Black value of an option on a simulated forward, revalued
/// at every step with the remaining time to expiry.
///
/// Goes to zero and non-live at expiry; combine with a discount bond for
/// present values, or use the option instrument for settlement flows.
pub struct BlackScholesProcess {
    core: AgentCore<f64>,
    deps: DepList,
    forward: Option<SharedScalar>,
    volatility: Option<SharedScalar>,
    notional: f64,
    kind: OptionKind,
    strike: f64,
    expiry: Time,
}

impl BlackScholesProcess {
    /// An unconfigured process.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            forward: None,
            volatility: None,
            notional: 0.0,
            kind: OptionKind::Call,
            strike: 0.0,
            expiry: 0,
        }
    }

    /// Connects the forward and volatility processes and sets the contract
    /// terms.
    pub fn setup<F, V>(
        &mut self,
        forward: &Shared<F>,
        volatility: &Shared<V>,
        notional: f64,
        kind: OptionKind,
        strike: f64,
        expiry: Time,
    ) where
        F: Agent<State = f64> + 'static,
        V: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(forward);
        self.deps.push(volatility);
        self.forward = Some(forward.clone() as SharedScalar);
        self.volatility = Some(volatility.clone() as SharedScalar);
        self.notional = notional;
        self.kind = kind;
        self.strike = strike;
        self.expiry = expiry;
    }

    fn revalue(&mut self) -> SimResult<bool> {
        if self.core.time() >= self.expiry {
            self.core.state = 0.0;
            return Ok(false);
        }

        let forward = require(&self.forward, "black-scholes forward")?;
        let volatility = require(&self.volatility, "black-scholes volatility")?;
        let t = self.core.years(self.expiry - self.core.time());
        self.core.state = self.notional
            * black(
                self.kind,
                self.strike,
                t,
                forward.borrow().state(),
                volatility.borrow().state(),
                1.0,
            );
        Ok(true)
    }
}

impl Default for BlackScholesProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for BlackScholesProcess {
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
        require(&self.forward, "black-scholes forward")?;
        require(&self.volatility, "black-scholes volatility").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.revalue().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.revalue()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("kind", format!("{:?}", self.kind))
            .attr("strike", self.strike)
            .attr("expiry", self.expiry)
            .attr("notional", self.notional)
    }
}

mcsim_agents::impl_agent!(BlackScholesProcess);
