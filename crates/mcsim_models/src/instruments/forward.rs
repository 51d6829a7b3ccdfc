//! Forward and option instruments on a simulated security.

use mcsim_agents::agent::{Agent, AgentCore, Process};
use mcsim_agents::linkage::{require, DepList, Shared, SharedScalar};
use mcsim_core::math::options::{bachelier, black, intrinsic, OptionKind};
use mcsim_core::types::error::SimResult;
use mcsim_core::types::time::Time;
use mcsim_core::xml::XmlTag;

use crate::curves::{SharedCurve, YieldCurve};
use crate::instruments::InstrumentState;

/// Linear payoff `notional * (S - K)` settling at expiry.
///
/// The strike and notional are read from their agents and latched when the
/// configured start time is reached; before expiry the payoff is valued
/// against the discount bond maturing at expiry, at expiry it surfaces as a
/// flow and the instrument matures.
pub struct Forward {
    core: AgentCore<InstrumentState>,
    deps: DepList,
    curve: Option<SharedCurve>,
    security: Option<SharedScalar>,
    notional: Option<SharedScalar>,
    strike: Option<SharedScalar>,
    start: Time,
    expiry: Time,
    started: bool,
    actual_strike: f64,
    actual_notional: f64,
}

impl Forward {
    /// An unconfigured forward.
    pub fn new() -> Self {
        Self {
            core: AgentCore::new(),
            deps: DepList::new(),
            curve: None,
            security: None,
            notional: None,
            strike: None,
            start: 0,
            expiry: 0,
            started: false,
            actual_strike: 0.0,
            actual_notional: 0.0,
        }
    }

    /// Connects the discount curve, the underlying security and the
    /// notional and strike agents, and sets the start and expiry dates.
    pub fn setup<Y, U, N, K>(
        &mut self,
        curve: &Shared<Y>,
        security: &Shared<U>,
        notional: &Shared<N>,
        strike: &Shared<K>,
        start: Time,
        expiry: Time,
    ) where
        Y: YieldCurve + 'static,
        U: Agent<State = f64> + 'static,
        N: Agent<State = f64> + 'static,
        K: Agent<State = f64> + 'static,
    {
        self.deps.clear();
        self.deps.push(curve);
        self.deps.push(security);
        self.deps.push(notional);
        self.deps.push(strike);
        self.curve = Some(curve.clone() as SharedCurve);
        self.security = Some(security.clone() as SharedScalar);
        self.notional = Some(notional.clone() as SharedScalar);
        self.strike = Some(strike.clone() as SharedScalar);
        self.start = start;
        self.expiry = expiry;
        self.started = false;
    }

    fn latch_terms(&mut self) -> SimResult<()> {
        if !self.started && self.core.time() >= self.start {
            let strike = require(&self.strike, "forward strike")?;
            let notional = require(&self.notional, "forward notional")?;
            self.actual_strike = strike.borrow().state();
            self.actual_notional = notional.borrow().state();
            self.started = true;
        }
        Ok(())
    }

    fn revalue(&mut self) -> SimResult<bool> {
        if self.core.state.matured {
            self.core.state.value = 0.0;
            self.core.state.flow = 0.0;
            return Ok(false);
        }

        self.latch_terms()?;

        let security = require(&self.security, "forward security")?;
        let spot = security.borrow().state();

        if self.core.time() >= self.expiry {
            self.core.state.value = 0.0;
            self.core.state.flow = self.actual_notional * (spot - self.actual_strike);
            self.core.state.matured = true;
        } else {
            let curve = require(&self.curve, "forward curve")?;
            let df = curve.borrow().discount_to(self.expiry)?;
            self.core.state.value = self.actual_notional * (spot - self.actual_strike) * df;
            self.core.state.flow = 0.0;
        }
        Ok(true)
    }
}

impl Default for Forward {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for Forward {
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
        require(&self.curve, "forward curve")?;
        require(&self.security, "forward security")?;
        require(&self.notional, "forward notional")?;
        require(&self.strike, "forward strike").map(|_| ())
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.started = false;
        self.revalue().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.revalue()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("start", self.start).attr("expiry", self.expiry)
    }
}

mcsim_agents::impl_agent!(Forward);

/// Valuation model of an [`OptionInstrument`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionModel {
    /// Lognormal forward (Black).
    BlackScholes,
    /// Normally distributed forward (Bachelier).
    Normal,
}

/// Vanilla option settling its intrinsic value at expiry and valued
/// before expiry with Black-Scholes or Bachelier on the forward
/// `S / df(expiry)`.
pub struct OptionInstrument {
    forward: Forward,
    volatility: Option<SharedScalar>,
    kind: OptionKind,
    model: OptionModel,
}

impl OptionInstrument {
    /// An unconfigured option.
    pub fn new() -> Self {
        Self {
            forward: Forward::new(),
            volatility: None,
            kind: OptionKind::Call,
            model: OptionModel::BlackScholes,
        }
    }

    /// Connects curve, volatility, security, notional and strike agents,
    /// and sets the contract terms.
    #[allow(clippy::too_many_arguments)]
    pub fn setup<Y, V, U, N, K>(
        &mut self,
        curve: &Shared<Y>,
        volatility: &Shared<V>,
        security: &Shared<U>,
        notional: &Shared<N>,
        kind: OptionKind,
        strike: &Shared<K>,
        start: Time,
        expiry: Time,
        model: OptionModel,
    ) where
        Y: YieldCurve + 'static,
        V: Agent<State = f64> + 'static,
        U: Agent<State = f64> + 'static,
        N: Agent<State = f64> + 'static,
        K: Agent<State = f64> + 'static,
    {
        self.forward
            .setup(curve, security, notional, strike, start, expiry);
        self.forward.deps.push(volatility);
        self.volatility = Some(volatility.clone() as SharedScalar);
        self.kind = kind;
        self.model = model;
    }

    fn revalue(&mut self) -> SimResult<bool> {
        let fwd = &mut self.forward;
        if fwd.core.state.matured {
            fwd.core.state.value = 0.0;
            fwd.core.state.flow = 0.0;
            return Ok(false);
        }

        fwd.latch_terms()?;

        let security = require(&fwd.security, "option security")?;
        let spot = security.borrow().state();

        if fwd.core.time() >= fwd.expiry {
            fwd.core.state.value = 0.0;
            fwd.core.state.flow =
                fwd.actual_notional * intrinsic(self.kind, fwd.actual_strike, spot, 1.0);
            fwd.core.state.matured = true;
            return Ok(true);
        }

        let curve = require(&fwd.curve, "option curve")?;
        let volatility = require(&self.volatility, "option volatility")?;
        let df = curve.borrow().discount_to(fwd.expiry)?;
        let t = fwd.core.years(fwd.expiry - fwd.core.time());
        let vol = volatility.borrow().state();
        // The forward of the underlying, implied from spot and the bond.
        let implied_forward = spot / df;

        let value = match self.model {
            OptionModel::BlackScholes => {
                black(self.kind, fwd.actual_strike, t, implied_forward, vol, df)
            }
            OptionModel::Normal => {
                bachelier(self.kind, fwd.actual_strike, t, implied_forward, vol, df)
            }
        };
        fwd.core.state.value = fwd.actual_notional * value;
        fwd.core.state.flow = 0.0;
        Ok(true)
    }
}

impl Default for OptionInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl Process for OptionInstrument {
    type State = InstrumentState;

    fn core(&self) -> &AgentCore<InstrumentState> {
        &self.forward.core
    }
    fn core_mut(&mut self) -> &mut AgentCore<InstrumentState> {
        &mut self.forward.core
    }
    fn deps(&self) -> &DepList {
        &self.forward.deps
    }

    fn on_init(&mut self) -> SimResult<()> {
        require(&self.volatility, "option volatility")?;
        self.forward.on_init()
    }

    fn on_reset(&mut self) -> SimResult<()> {
        self.forward.started = false;
        self.revalue().map(|_| ())
    }

    fn on_update(&mut self) -> SimResult<bool> {
        self.revalue()
    }

    fn dump_attrs(&self, tag: XmlTag) -> XmlTag {
        tag.attr("kind", format!("{:?}", self.kind))
            .attr("model", format!("{:?}", self.model))
            .attr("start", self.forward.start)
            .attr("expiry", self.forward.expiry)
    }
}

mcsim_agents::impl_agent!(OptionInstrument);

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

    fn constant(v: f64) -> Shared<Constant<f64>> {
        Rc::new(RefCell::new(Constant::new(v)))
    }

    fn flat_curve(rate: f64) -> Shared<ConstantRateCurve> {
        Rc::new(RefCell::new(ConstantRateCurve::new(rate)))
    }

    #[test]
    fn forward_values_and_settles() {
        let ctx = SimContext::standalone();
        let curve = flat_curve(0.05);
        let security = constant(110.0);
        let notional = constant(2.0);
        let strike = constant(100.0);

        let mut fwd = Forward::new();
        fwd.setup(&curve, &security, &notional, &strike, 0, 365);
        fwd.init(0, 730, &ctx).unwrap();
        fwd.reset().unwrap();

        let df = (-0.05f64).exp();
        assert_relative_eq!(fwd.state().value, 2.0 * 10.0 * df, epsilon = 1e-9);
        assert_relative_eq!(fwd.state().flow, 0.0);

        fwd.update(365).unwrap();
        assert_relative_eq!(fwd.state().flow, 20.0, epsilon = 1e-12);
        assert_relative_eq!(fwd.state().value, 0.0);
        assert!(fwd.state().matured);
    }

    #[test]
    fn forward_latches_strike_at_start() {
        let ctx = SimContext::standalone();
        let curve = flat_curve(0.0);
        let security = constant(100.0);
        let notional = constant(1.0);
        let strike = constant(100.0);

        let mut fwd = Forward::new();
        fwd.setup(&curve, &security, &notional, &strike, 100, 365);
        fwd.init(0, 730, &ctx).unwrap();
        fwd.reset().unwrap();

        // Before the start nothing is latched: value uses zero terms.
        assert_relative_eq!(fwd.state().value, 0.0);

        fwd.update(100).unwrap();
        // Terms latch; repricing the strike later must not re-latch.
        strike.borrow_mut().set(150.0);
        fwd.update(200).unwrap();
        assert_relative_eq!(fwd.state().value, 0.0, epsilon = 1e-12); // S == K at latch

        security.borrow_mut().set(120.0);
        fwd.update(365).unwrap();
        assert_relative_eq!(fwd.state().flow, 20.0, epsilon = 1e-12);
    }

    #[test]
    fn option_converges_to_intrinsic_at_expiry() {
        let ctx = SimContext::standalone();
        let curve = flat_curve(0.0);
        let security = constant(110.0);
        let notional = constant(1.0);
        let strike = constant(100.0);
        let volatility = constant(0.2);

        let mut option = OptionInstrument::new();
        option.setup(
            &curve,
            &volatility,
            &security,
            &notional,
            OptionKind::Call,
            &strike,
            0,
            365,
            OptionModel::BlackScholes,
        );
        option.init(0, 730, &ctx).unwrap();
        option.reset().unwrap();

        // Before expiry the option is worth at least its intrinsic value.
        assert!(option.state().value >= 10.0);

        option.update(365).unwrap();
        assert_relative_eq!(option.state().flow, 10.0, epsilon = 1e-12);
        assert!(option.state().matured);
    }

    #[test]
    fn bachelier_option_prices_atm() {
        let ctx = SimContext::standalone();
        let curve = flat_curve(0.0);
        let security = constant(100.0);
        let notional = constant(1.0);
        let strike = constant(100.0);
        let volatility = constant(5.0);

        let mut option = OptionInstrument::new();
        option.setup(
            &curve,
            &volatility,
            &security,
            &notional,
            OptionKind::Put,
            &strike,
            0,
            365,
            OptionModel::Normal,
        );
        option.init(0, 730, &ctx).unwrap();
        option.reset().unwrap();

        // ATM normal value: sigma sqrt(T) / sqrt(2 pi).
        assert_relative_eq!(
            option.state().value,
            5.0 / (2.0 * std::f64::consts::PI).sqrt(),
            epsilon = 1e-9
        );
    }
}
