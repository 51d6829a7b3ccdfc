//! Market-model curves driven by simulated rate agents.
//!
//! Neither model enforces arbitrage by construction; the correct drift must
//! be encoded in the underlying rate processes.

use mcsim_agents::agent::{AgentCore, Process};
use mcsim_agents::linkage::{DepList, Shared, SharedScalar};
use mcsim_agents::Agent;
use mcsim_core::types::error::{SimError, SimResult};
use mcsim_core::types::time::{Span, Time};
use mcsim_core::xml::XmlTag;

use super::YieldCurve;

/// Multi-factor LIBOR market curve: one forward-rate agent per tenor
/// interval on a regular grid.
///
/// The numeraire rolls with the first rate; `discount_to` composes the
/// piecewise-flat forwards along the grid. Rates beyond the last interval
/// use the last listed forward.
///
/// ```no_run
/// # use std::{cell::RefCell, rc::Rc};
/// # use mcsim_agents::basic::Constant;
/// # use mcsim_models::curves::LiborCurve;
/// let mut yc = LiborCurve::new(91);
/// yc.add_rate(&Rc::new(RefCell::new(Constant::new(0.02)))); // spot 3m
/// yc.add_rate(&Rc::new(RefCell::new(Constant::new(0.025)))); // 3m-6m
/// yc.add_rate(&Rc::new(RefCell::new(Constant::new(0.03)))); // 6m onwards
/// ```
pub struct LiborCurve {
    core: AgentCore<f64>,
    deps: DepList,
    rates: Vec<SharedScalar>,
    forward_dfs: Vec<f64>,
    spot_df: f64,
    tenor: Span,
}

impl LiborCurve {
    /// A curve over a grid with the given tenor step.
    pub fn new(tenor: Span) -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            rates: Vec::new(),
            forward_dfs: Vec::new(),
            spot_df: 1.0,
            tenor,
        }
    }

    /// Replaces the tenor step.
    pub fn set_tenor(&mut self, tenor: Span) {
        self.tenor = tenor;
    }

    /// Appends the forward-rate agent of the next grid interval.
    pub fn add_rate<C: Agent<State = f64> + 'static>(&mut self, rate: &Shared<C>) {
        self.deps.push(rate);
        self.rates.push(rate.clone() as SharedScalar);
        self.forward_dfs.push(1.0);
    }

    /// Disconnects every rate agent.
    pub fn clear(&mut self) {
        self.deps.clear();
        self.rates.clear();
        self.forward_dfs.clear();
    }

    fn roll(&mut self) -> SimResult<bool> {
        let dt = self.core.dt_years();
        self.spot_df *= (-self.rates[0].borrow().state() * dt).exp();

        let tenor_years = self.core.years(self.tenor);
        let mut df = 1.0;
        for (i, rate) in self.rates.iter().enumerate() {
            df *= (-rate.borrow().state() * tenor_years).exp();
            self.forward_dfs[i] = df;
        }

        self.core.state = self.rates[0].borrow().state();
        Ok(true)
    }
}

impl Process for LiborCurve {
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
        if self.rates.is_empty() {
            return Err(SimError::not_configured(
                "libor curve",
                "no rate agents connected",
            ));
        }
        if self.tenor < 1 {
            return Err(SimError::InvalidSchedule(
                "libor curve tenor must be at least one day".to_string(),
            ));
        }
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.spot_df = 1.0;
        self.roll().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.roll()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("tenor", self.tenor).attr("factors", self.rates.len())
    }
}

mcsim_agents::impl_agent!(LiborCurve);

impl YieldCurve for LiborCurve {
    fn discount(&self) -> SimResult<f64> {
        Ok(self.spot_df)
    }

    fn discount_to(&self, t: Time) -> SimResult<f64> {
        let dt = t - self.core.time();
        let intervals = (dt / self.tenor) as usize;
        let clamped = intervals.min(self.rates.len() - 1);

        let stub = self.core.years(dt - clamped as Span * self.tenor);
        let df = (-self.rates[clamped].borrow().state() * stub).exp();

        if intervals == 0 {
            Ok(df)
        } else {
            let whole = self.forward_dfs[(intervals - 1).min(self.forward_dfs.len() - 1)];
            Ok(whole * df)
        }
    }
}

struct SwapRate {
    rate: SharedScalar,
    tenor: Span,
}

/// Multi-factor swap-rate market curve: one swap-rate agent per listed
/// maturity.
///
/// `discount_to(t)` discounts at the rate of the largest listed tenor at or
/// below `t` (unity when `t` sits before the first tenor); the numeraire
/// rolls with the first rate.
pub struct SwapCurve {
    core: AgentCore<f64>,
    deps: DepList,
    rates: Vec<SwapRate>,
    spot_df: f64,
}

impl SwapCurve {
    /// An empty curve.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            rates: Vec::new(),
            spot_df: 1.0,
        }
    }

    /// Appends a swap-rate agent with its maturity tenor. Call in ascending
    /// tenor order.
    pub fn add_rate<C: Agent<State = f64> + 'static>(&mut self, rate: &Shared<C>, tenor: Span) {
        self.deps.push(rate);
        self.rates.push(SwapRate {
            rate: rate.clone() as SharedScalar,
            tenor,
        });
    }

    /// Disconnects every rate agent.
    pub fn clear(&mut self) {
        self.deps.clear();
        self.rates.clear();
    }

    fn roll(&mut self) -> SimResult<bool> {
        let dt = self.core.dt_years();
        self.spot_df *= (-self.rates[0].rate.borrow().state() * dt).exp();
        self.core.state = self.rates[0].rate.borrow().state();
        Ok(true)
    }
}

impl Default for SwapCurve {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for SwapCurve {
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
        if self.rates.is_empty() {
            return Err(SimError::not_configured(
                "swap curve",
                "no rate agents connected",
            ));
        }
        Ok(())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.spot_df = 1.0;
        self.roll().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.roll()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("factors", self.rates.len())
    }
}

mcsim_agents::impl_agent!(SwapCurve);

impl YieldCurve for SwapCurve {
    fn discount(&self) -> SimResult<f64> {
        Ok(self.spot_df)
    }

    fn discount_to(&self, t: Time) -> SimResult<f64> {
        let pillar = self
            .rates
            .iter()
            .filter(|r| r.tenor <= t)
            .max_by_key(|r| r.tenor);
        match pillar {
            None => Ok(1.0),
            Some(r) => Ok((-r.rate.borrow().state() * self.core.years(t)).exp()),
        }
    }
}
